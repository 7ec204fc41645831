//! Correlation analyzer: classifies pairwise signal relationships.
//!
//! Consumes a snapshot of dirty labels plus the full registry and decides,
//! per pair, whether the signals are redundant (synchronous phase wins) or
//! causally leaking (a one-tick lead/lag phase wins by a margin). Results
//! land in the redundancy set and the violation map; labels untouched by the
//! current snapshot keep their prior classification.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::core::circular_similarity;
use crate::graph::CausalGraph;
use crate::registry::{Signal, SignalRegistry};

/// What kind of architectural problem a violation records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// One signal's pulse reliably precedes another's by one tick.
    CausalLeak,
    /// Local state mirrors an anchor (Context/Store) signal.
    ContextMirror,
    /// Two Local signals are statistically indistinguishable.
    DuplicateState,
}

/// A single finding, attached to the label judged to be the cause (or, for
/// redundancy, the offender).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub kind: ViolationKind,
    pub target: String,
    pub similarity: Option<f32>,
}

/// Violations keyed by the offending label, deduplicated by (kind, target).
pub type ViolationMap = HashMap<String, Vec<ViolationRecord>>;

/// Bookkeeping from one analysis pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassOutcome {
    /// Pairwise comparisons actually performed.
    pub comparisons: u64,
    /// Violation records newly added this pass.
    pub new_violations: u64,
}

/// The three circular similarities for a pair, one per phase.
struct Phases {
    sync: f32,
    lead: f32,
    lag: f32,
    max: f32,
}

fn phases(a: &Signal, b: &Signal) -> Phases {
    let sync = circular_similarity(a.window(), b.window(), 0);
    let lead = circular_similarity(a.window(), b.window(), 1);
    let lag = circular_similarity(a.window(), b.window(), -1);
    Phases {
        sync,
        lead,
        lag,
        max: sync.max(lead).max(lag),
    }
}

/// Insert a violation unless an identical (kind, target) record already
/// exists under this key. Returns whether anything was added.
fn push_violation(
    map: &mut ViolationMap,
    key: &str,
    kind: ViolationKind,
    target: &str,
    similarity: Option<f32>,
) -> bool {
    let records = map.entry(key.to_string()).or_default();
    if records
        .iter()
        .any(|r| r.kind == kind && r.target == target)
    {
        return false;
    }
    records.push(ViolationRecord {
        kind,
        target: target.to_string(),
        similarity,
    });
    true
}

/// Run one analysis pass over the dirty snapshot.
///
/// Every dirty signal is compared against every registered signal whose
/// density gives statistical confidence (>= 2 pulses in the window). When
/// both sides of a pair are dirty, only the lexicographically smaller label
/// does the work, so a tie is never classified twice.
///
/// The pass is infallible by design: malformed state degrades to skipped
/// comparisons, never a panic in the caller's control flow.
pub fn run_pass(
    registry: &SignalRegistry,
    graph: &CausalGraph,
    dirty: &HashSet<String>,
    redundant: &mut HashSet<String>,
    violations: &mut ViolationMap,
    config: &EngineConfig,
) -> PassOutcome {
    let mut outcome = PassOutcome::default();

    let mut dirty_sorted: Vec<&str> = dirty.iter().map(String::as_str).collect();
    dirty_sorted.sort_unstable();

    let all_labels = registry.sorted_labels();

    for a_label in dirty_sorted {
        let Some(a) = registry.get(a_label) else {
            // A pulse for an unregistered label: nothing to analyze.
            continue;
        };

        for &b_label in &all_labels {
            if a_label == b_label {
                continue;
            }
            // Dirty-dirty pairs would otherwise be visited from both sides.
            if dirty.contains(b_label) && a_label > b_label {
                continue;
            }
            let Some(b) = registry.get(b_label) else {
                continue;
            };
            // Require 2+ pulses on both sides for statistical confidence.
            if a.density() < 2 || b.density() < 2 {
                continue;
            }

            outcome.comparisons += 1;
            let phases = phases(a, b);

            if phases.max <= config.similarity_threshold {
                continue;
            }

            if phases.sync >= phases.max {
                outcome.new_violations +=
                    classify_redundancy(a_label, a, b_label, b, &phases, redundant, violations);
            } else if phases.max - phases.sync >= config.causal_margin {
                outcome.new_violations += classify_causal_leak(
                    a_label, a, b_label, b, &phases, graph, violations, config,
                );
            }
            // A lead/lag winner inside the causal margin is noise: no record.
        }
    }

    outcome
}

/// The synchronous phase won: the pair is collinear. Role-based tie-break
/// decides who gets flagged.
fn classify_redundancy(
    a_label: &str,
    a: &Signal,
    b_label: &str,
    b: &Signal,
    phases: &Phases,
    redundant: &mut HashSet<String>,
    violations: &mut ViolationMap,
) -> u64 {
    use crate::registry::Role;

    let role_a = a.role();
    let role_b = b.role();

    // Two anchors may legitimately correlate.
    if role_a.is_anchor() && role_b.is_anchor() {
        return 0;
    }
    // Projections are derived; they mirror their inputs by construction.
    if role_a == Role::Projection || role_b == Role::Projection {
        return 0;
    }

    let similarity = Some(phases.max);
    let mut added = 0u64;

    match (role_a.is_anchor(), role_b.is_anchor()) {
        // Local mirroring an anchor: the anchor is the source of truth.
        (false, true) => {
            redundant.insert(a_label.to_string());
            debug!(signal = a_label, anchor = b_label, sim = phases.max, "context mirror");
            added += push_violation(
                violations,
                a_label,
                ViolationKind::ContextMirror,
                b_label,
                similarity,
            ) as u64;
        }
        (true, false) => {
            redundant.insert(b_label.to_string());
            debug!(signal = b_label, anchor = a_label, sim = phases.max, "context mirror");
            added += push_violation(
                violations,
                b_label,
                ViolationKind::ContextMirror,
                a_label,
                similarity,
            ) as u64;
        }
        // Duplicate local state: both sides are redundant.
        (false, false) => {
            redundant.insert(a_label.to_string());
            redundant.insert(b_label.to_string());
            debug!(a = a_label, b = b_label, sim = phases.max, "duplicate state");
            let (key, target) = if a_label <= b_label {
                (a_label, b_label)
            } else {
                (b_label, a_label)
            };
            added += push_violation(
                violations,
                key,
                ViolationKind::DuplicateState,
                target,
                similarity,
            ) as u64;
        }
        (true, true) => unreachable!("anchor pair handled above"),
    }

    added
}

/// A one-tick phase won by the causal margin: attribute cause -> effect,
/// unless volatility or an existing event attribution says it is noise.
#[allow(clippy::too_many_arguments)]
fn classify_causal_leak(
    a_label: &str,
    a: &Signal,
    b_label: &str,
    b: &Signal,
    phases: &Phases,
    graph: &CausalGraph,
    violations: &mut ViolationMap,
    config: &EngineConfig,
) -> u64 {
    // High-frequency streams (animations) lead and lag everything; hinting
    // on them is spam.
    if a.density() > config.volatility_threshold || b.density() > config.volatility_threshold {
        trace!(a = a_label, b = b_label, "causal hint suppressed: volatile signal");
        return 0;
    }

    // lead: a pulses at t, b follows at t+1. lag: the reverse.
    let (cause, effect) = if phases.lead >= phases.lag {
        (a_label, b_label)
    } else {
        (b_label, a_label)
    };

    // Already explained by a same-tick sibling event: not a chain.
    if graph.is_event_explained(effect) {
        trace!(effect, "causal hint suppressed: event-driven");
        return 0;
    }

    debug!(cause, effect, sim = phases.max, "causal leak");
    push_violation(
        violations,
        cause,
        ViolationKind::CausalLeak,
        effect,
        Some(phases.max),
    ) as u64
}
