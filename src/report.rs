//! Issue aggregation: bounded, ranked findings for the external reporter.
//!
//! Three sources feed the report, in priority order:
//!
//! 1. **Aggregated events**: synthetic event edges grouped by the set of
//!    their targets, so the same multi-signal interaction repeated over many
//!    ticks collapses into one issue with an occurrence count. Events
//!    touching fewer than two qualifying targets are noise and dropped.
//! 2. **Graph drivers**: remaining sources ranked by spectral influence.
//!    Scoped side-effect drivers always surface; weak one-target drivers are
//!    filtered out.
//! 3. **Density fallback**: when the graph yields nothing, the busiest
//!    non-redundant Local signals above a density floor.
//!
//! Output is capped at a small N. Issues are derived views, never persisted.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::analysis::{ViolationKind, ViolationMap, ViolationRecord};
use crate::config::EngineConfig;
use crate::graph::{CausalGraph, NodeKind};
use crate::ranker::spectral_influence;
use crate::registry::{Role, SignalRegistry};

/// Which measurement ranked an issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueMetric {
    Influence,
    Density,
}

/// One ranked finding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RankedIssue {
    pub label: String,
    pub metric: IssueMetric,
    pub score: f32,
    pub reason: String,
    pub violations: Vec<ViolationRecord>,
}

/// Everything the external reporter needs to render.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Report {
    pub issues: Vec<RankedIssue>,
    pub redundant: HashSet<String>,
    pub violations: ViolationMap,
}

struct EventGroup {
    count: u32,
    targets: Vec<String>,
}

/// Build the bounded ranked issue list.
pub fn identify_top_issues(
    graph: &CausalGraph,
    registry: &SignalRegistry,
    redundant: &HashSet<String>,
    config: &EngineConfig,
) -> Vec<RankedIssue> {
    let influence = spectral_influence(
        graph,
        config.ranker_max_iterations,
        config.ranker_tolerance,
        config.ranker_base_weight,
    );

    // Signature -> merged occurrences. Two distinct interactions touching the
    // same signal set deliberately merge (dedup is purely by target set).
    let mut event_groups: HashMap<String, EventGroup> = HashMap::new();
    // (label, target_count, is_effect, score), influence-ranked below.
    let mut drivers: Vec<(&str, usize, bool, f32)> = Vec::new();

    for source in graph.sorted_sources() {
        let Some(targets) = graph.targets(source) else {
            continue;
        };
        if targets.is_empty() {
            continue;
        }

        if graph.node_kind(source) == Some(NodeKind::Event) {
            // Qualifying targets: registered, non-anchor.
            let mut valid: Vec<String> = targets
                .keys()
                .filter(|t| registry.role(t).map_or(false, |r| !r.is_anchor()))
                .cloned()
                .collect();
            if valid.len() < 2 {
                continue; // single-target events are noise
            }
            valid.sort_unstable();
            let signature = valid.join("|");
            event_groups
                .entry(signature)
                .and_modify(|g| g.count += 1)
                .or_insert(EventGroup { count: 1, targets: valid });
            continue;
        }

        // Anchors and projections are never reported as drivers.
        if let Some(role) = registry.role(source) {
            if role.is_anchor() || role == Role::Projection {
                continue;
            }
        }

        let score = influence.get(source).copied().unwrap_or(0.0);
        let is_effect = graph.node_kind(source) == Some(NodeKind::Driver);

        // Side-effect drivers always surface; other one-target drivers must
        // carry real influence.
        if !is_effect && targets.len() < 2 && score < 0.05 {
            continue;
        }
        drivers.push((source, targets.len(), is_effect, score));
    }

    // Stable sort on a lexicographically sorted source list keeps ties
    // deterministic.
    drivers.sort_by(|a, b| b.3.partial_cmp(&a.3).unwrap_or(std::cmp::Ordering::Equal));

    let mut issues: Vec<RankedIssue> = Vec::with_capacity(config.report_limit);

    // 1. Aggregated events, widest first, top two.
    let mut events: Vec<(&String, &EventGroup)> = event_groups.iter().collect();
    events.sort_by(|a, b| {
        b.1.targets
            .len()
            .cmp(&a.1.targets.len())
            .then_with(|| a.0.cmp(b.0))
    });
    for (_, group) in events.iter().take(2.min(config.report_limit)) {
        let primary = &group.targets[0];
        issues.push(RankedIssue {
            label: format!("Global_Event({primary})"),
            metric: IssueMetric::Influence,
            score: 1.0,
            reason: format!(
                "Global sync event: an external trigger updates {} signals \
                 simultaneously. Occurred {} times.",
                group.targets.len(),
                group.count
            ),
            violations: group
                .targets
                .iter()
                .map(|t| ViolationRecord {
                    kind: ViolationKind::CausalLeak,
                    target: t.clone(),
                    similarity: None,
                })
                .collect(),
        });
    }

    // 2. Graph drivers fill the remaining slots.
    for &(label, target_count, is_effect, score) in drivers
        .iter()
        .take(config.report_limit.saturating_sub(issues.len()))
    {
        let targets = graph
            .targets(label)
            .map(|t| {
                let mut names: Vec<String> = t.keys().cloned().collect();
                names.sort_unstable();
                names
            })
            .unwrap_or_default();

        let reason = if is_effect {
            "Side-effect driver: a scoped effect writes to downstream state.".to_string()
        } else {
            format!("Sync driver: acts as a prime mover for {target_count} downstream signals.")
        };

        issues.push(RankedIssue {
            label: label.to_string(),
            metric: IssueMetric::Influence,
            score: if score > 0.0 { score } else { target_count as f32 },
            reason,
            violations: targets
                .into_iter()
                .map(|t| ViolationRecord {
                    kind: ViolationKind::CausalLeak,
                    target: t,
                    similarity: None,
                })
                .collect(),
        });
    }

    // 3. Density fallback when the graph was silent.
    if issues.is_empty() {
        let mut dense: Vec<(&str, u32)> = registry
            .iter()
            .filter(|(label, signal)| {
                signal.role() == Role::Local
                    && !redundant.contains(*label)
                    && signal.density() > config.density_floor
            })
            .map(|(label, signal)| (label, signal.density()))
            .collect();
        dense.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        for (label, density) in dense.into_iter().take(config.report_limit) {
            issues.push(RankedIssue {
                label: label.to_string(),
                metric: IssueMetric::Density,
                score: density as f32,
                reason: format!(
                    "High frequency: {density} pulses in the current window; \
                     potential main-thread saturation."
                ),
                violations: Vec::new(),
            });
        }
    }

    issues.truncate(config.report_limit);
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegisterOptions;

    fn local_registry(labels: &[&str]) -> SignalRegistry {
        let mut registry = SignalRegistry::new(50);
        for &label in labels {
            registry.register(label, Role::Local, RegisterOptions::default());
        }
        registry
    }

    fn issues_for(graph: &CausalGraph, registry: &SignalRegistry) -> Vec<RankedIssue> {
        identify_top_issues(graph, registry, &HashSet::new(), &EngineConfig::default())
    }

    #[test]
    fn test_repeated_event_signature_merges_with_count() {
        let registry = local_registry(&["user", "theme"]);
        let mut graph = CausalGraph::new();
        for tick in 1..=3 {
            let event = format!("Event_Tick_{tick}");
            graph.attribute(&event, NodeKind::Event, "user");
            graph.attribute(&event, NodeKind::Event, "theme");
        }

        let issues = issues_for(&graph, &registry);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].metric, IssueMetric::Influence);
        assert_eq!(issues[0].score, 1.0);
        assert!(issues[0].reason.contains("Occurred 3 times"));
        assert_eq!(issues[0].violations.len(), 2);
    }

    #[test]
    fn test_single_target_events_are_noise() {
        let registry = local_registry(&["lonely"]);
        let mut graph = CausalGraph::new();
        graph.attribute("Event_Tick_1", NodeKind::Event, "lonely");

        assert!(issues_for(&graph, &registry).is_empty());
    }

    #[test]
    fn test_event_targets_exclude_anchors() {
        let mut registry = local_registry(&["local_sig"]);
        registry.register("ctx", Role::Context, RegisterOptions::default());

        let mut graph = CausalGraph::new();
        graph.attribute("Event_Tick_1", NodeKind::Event, "local_sig");
        graph.attribute("Event_Tick_1", NodeKind::Event, "ctx");

        // Only one qualifying target left: the event is noise.
        assert!(issues_for(&graph, &registry).is_empty());
    }

    #[test]
    fn test_side_effect_driver_surfaces_with_one_target() {
        let registry = local_registry(&["written_state"]);
        let mut graph = CausalGraph::new();
        graph.attribute("sync_effect", NodeKind::Driver, "written_state");

        let issues = issues_for(&graph, &registry);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].label, "sync_effect");
        assert!(issues[0].reason.contains("Side-effect driver"));
    }

    #[test]
    fn test_weak_single_target_signal_driver_filtered() {
        // A dominant hub dilutes the normalized influence of the one-target
        // source "a" below the 0.05 floor.
        let mut labels: Vec<String> = (0..20).map(|i| format!("t{i:02}")).collect();
        labels.push("a".to_string());
        labels.push("b".to_string());
        labels.push("hub".to_string());
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        let registry = local_registry(&refs);

        let mut graph = CausalGraph::new();
        for i in 0..20 {
            graph.attribute("hub", NodeKind::Signal, &format!("t{i:02}"));
        }
        graph.attribute("a", NodeKind::Signal, "b");

        let issues = issues_for(&graph, &registry);
        assert!(issues.iter().any(|i| i.label == "hub"));
        assert!(!issues.iter().any(|i| i.label == "a"));
    }

    #[test]
    fn test_anchor_and_projection_sources_never_reported() {
        let mut registry = local_registry(&["t1", "t2"]);
        registry.register("ctx_src", Role::Context, RegisterOptions::default());
        registry.register("proj_src", Role::Projection, RegisterOptions::default());

        let mut graph = CausalGraph::new();
        graph.attribute("ctx_src", NodeKind::Signal, "t1");
        graph.attribute("ctx_src", NodeKind::Signal, "t2");
        graph.attribute("proj_src", NodeKind::Signal, "t1");
        graph.attribute("proj_src", NodeKind::Signal, "t2");

        assert!(issues_for(&graph, &registry).is_empty());
    }

    #[test]
    fn test_density_fallback_ranks_hot_locals() {
        let mut registry = SignalRegistry::new(50);
        for label in ["busy", "busier", "idle"] {
            registry.register(label, Role::Local, RegisterOptions::default());
        }
        for i in 0..40 {
            registry.advance_tick(|label| match label {
                "busier" => true,
                "busy" => i % 4 != 0,
                _ => false,
            });
        }

        let issues = issues_for(&CausalGraph::new(), &registry);
        assert_eq!(issues.len(), 2, "idle signal is below the floor");
        assert_eq!(issues[0].label, "busier");
        assert_eq!(issues[0].metric, IssueMetric::Density);
        assert!(issues[0].score > issues[1].score);
    }

    #[test]
    fn test_density_fallback_skips_redundant_signals() {
        let mut registry = SignalRegistry::new(50);
        registry.register("mirror", Role::Local, RegisterOptions::default());
        for _ in 0..40 {
            registry.advance_tick(|_| true);
        }

        let redundant: HashSet<String> = ["mirror".to_string()].into_iter().collect();
        let issues = identify_top_issues(
            &CausalGraph::new(),
            &registry,
            &redundant,
            &EngineConfig::default(),
        );
        assert!(issues.is_empty());
    }

    #[test]
    fn test_report_capped_at_limit() {
        let registry = local_registry(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        let mut graph = CausalGraph::new();
        // Four independent multi-target drivers.
        for (driver, t1, t2) in [
            ("d1", "a", "b"),
            ("d2", "c", "d"),
            ("d3", "e", "f"),
            ("d4", "g", "h"),
        ] {
            graph.attribute(driver, NodeKind::Driver, t1);
            graph.attribute(driver, NodeKind::Driver, t2);
        }

        let issues = issues_for(&graph, &registry);
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn test_report_serializes() {
        let registry = local_registry(&["user", "theme"]);
        let mut graph = CausalGraph::new();
        graph.attribute("Event_Tick_1", NodeKind::Event, "user");
        graph.attribute("Event_Tick_1", NodeKind::Event, "theme");

        let report = Report {
            issues: issues_for(&graph, &registry),
            redundant: HashSet::new(),
            violations: ViolationMap::new(),
        };
        let json = serde_json::to_string(&report).expect("report must serialize");
        assert!(json.contains("influence"));
        assert!(json.contains("causal_leak"));
    }
}
