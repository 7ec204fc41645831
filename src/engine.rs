//! The engine instance: composition root for every subsystem.
//!
//! An explicit, cloneable handle owned by whoever wires the instrumentation
//! up; there is no process-wide global. All mutation entry points run
//! synchronously on the host's thread in invocation order. The hot path
//! (`record`) is O(1): breaker count, one graph edge, two set inserts. The
//! expensive pairwise analysis is deferred to idle time against a dirty-set
//! snapshot taken and cleared at schedule time, so pulses arriving during a
//! pass accumulate cleanly for the next one, never lost and never classified
//! twice.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::analysis::{self, ViolationMap};
use crate::breaker::CircuitBreaker;
use crate::config::EngineConfig;
use crate::graph::{CausalGraph, NodeKind};
use crate::registry::{RegisterOptions, Role, SignalRegistry};
use crate::report::{identify_top_issues, Report};
use crate::scheduler::{InlineScheduler, Scheduler};
use crate::Result;

/// Read-only performance counters.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct EngineMetrics {
    /// Wall-clock duration of the most recent analysis pass.
    pub last_analysis_duration_ms: f64,
    /// Total pairwise comparisons performed since creation.
    pub comparison_count: u64,
    /// Unix timestamp (ms) of the most recent analysis pass.
    pub last_analysis_timestamp_ms: u64,
    /// Normalized binary entropy of the last committed tick: how spread the
    /// tick's pulses were across the registered signals. 1.0 with an empty
    /// registry.
    pub system_entropy: f32,
    /// Total violation records raised since creation.
    pub alert_count: u64,
}

struct EngineInner {
    config: EngineConfig,
    registry: SignalRegistry,
    breaker: CircuitBreaker,
    graph: CausalGraph,
    /// Labels that pulsed in the current (uncommitted) tick.
    pending: HashSet<String>,
    /// Labels that pulsed since the last scheduled analysis pass.
    dirty: HashSet<String>,
    redundant: HashSet<String>,
    violations: ViolationMap,
    metrics: EngineMetrics,
    tick: u64,
    tick_scheduled: bool,
    current_driver: Option<String>,
    last_prune: Instant,
}

/// Temporal correlation & causality engine.
///
/// Cheap to clone; clones share state. See the crate docs for the data flow.
#[derive(Clone)]
pub struct BasisEngine {
    inner: Arc<RwLock<EngineInner>>,
    scheduler: Arc<dyn Scheduler>,
}

impl Default for BasisEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BasisEngine {
    /// Engine with default configuration and the synchronous-immediate
    /// scheduler.
    pub fn new() -> Self {
        Self::build(EngineConfig::default(), Arc::new(InlineScheduler))
    }

    /// Engine with default configuration and a host scheduler.
    pub fn with_scheduler(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::build(EngineConfig::default(), scheduler)
    }

    /// Engine with explicit configuration.
    pub fn with_config(config: EngineConfig, scheduler: Arc<dyn Scheduler>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, scheduler))
    }

    fn build(config: EngineConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        let inner = EngineInner {
            registry: SignalRegistry::new(config.window_size),
            breaker: CircuitBreaker::new(config.breaker_threshold, config.breaker_window),
            graph: CausalGraph::new(),
            pending: HashSet::new(),
            dirty: HashSet::new(),
            redundant: HashSet::new(),
            violations: ViolationMap::new(),
            metrics: EngineMetrics {
                system_entropy: 1.0,
                ..Default::default()
            },
            tick: 0,
            tick_scheduled: false,
            current_driver: None,
            last_prune: Instant::now(),
            config,
        };
        Self {
            inner: Arc::new(RwLock::new(inner)),
            scheduler,
        }
    }

    // === Lifecycle ===

    /// Register a signal with the default options. Idempotent.
    pub fn register(&self, label: &str, role: Role) {
        self.register_with(label, role, RegisterOptions::default());
    }

    /// Register a signal. A no-op if the label is already present or the
    /// options ask for suppression.
    pub fn register_with(&self, label: &str, role: Role, opts: RegisterOptions) {
        self.inner.write().registry.register(label, role, opts);
    }

    /// Remove a signal and every piece of bookkeeping keyed by it: breaker
    /// state, graph edges, pending/dirty membership, redundancy status, and
    /// violations in either direction.
    pub fn unregister(&self, label: &str) {
        let mut inner = self.inner.write();
        inner.registry.unregister(label);
        inner.breaker.forget(label);
        inner.graph.remove_node(label);
        inner.pending.remove(label);
        inner.dirty.remove(label);
        inner.redundant.remove(label);
        inner.violations.remove(label);
        for records in inner.violations.values_mut() {
            records.retain(|r| r.target != label);
        }
        inner.violations.retain(|_, records| !records.is_empty());
    }

    // === Hot path ===

    /// Record one state-mutation pulse for `label`.
    ///
    /// Returns `false` when the circuit breaker blocks the update. Pulses
    /// for unregistered labels are accepted (and still counted by the
    /// breaker) but have no window to land in.
    ///
    /// Multiple calls for the same label inside one tick coalesce into a
    /// single pulse bit.
    pub fn record(&self, label: &str) -> bool {
        let schedule = {
            let mut inner = self.inner.write();

            if !inner.breaker.admit(label) {
                return false;
            }

            // Causal attribution: an active driver claims the edge;
            // otherwise a synthetic per-tick event node groups same-tick
            // siblings without inventing a chain between them.
            match inner.current_driver.clone() {
                Some(driver) if driver != label => {
                    inner.graph.attribute(&driver, NodeKind::Driver, label);
                }
                Some(_) => {} // a driver pulsing itself is not an edge
                None => {
                    let event = format!("Event_Tick_{}", inner.tick);
                    inner.graph.attribute(&event, NodeKind::Event, label);
                }
            }

            inner.pending.insert(label.to_string());
            inner.dirty.insert(label.to_string());

            if inner.tick_scheduled {
                false
            } else {
                inner.tick_scheduled = true;
                true
            }
        };

        // The lock is released before the scheduler runs, so a synchronous
        // scheduler may commit the tick right here.
        if schedule {
            let engine = self.clone();
            self.scheduler
                .schedule_tick(Box::new(move || engine.commit_tick()));
        }
        true
    }

    /// Open a causal-attribution scope: until the returned guard drops,
    /// every recorded pulse is attributed to `label` instead of a synthetic
    /// event node.
    ///
    /// Scopes nest; the guard restores the previous driver on drop (on every
    /// exit path, panics included). Guards are expected to drop in reverse
    /// order of creation.
    #[must_use = "the driver scope ends when the guard is dropped"]
    pub fn driver_scope(&self, label: &str) -> DriverGuard {
        let prev = self
            .inner
            .write()
            .current_driver
            .replace(label.to_string());
        DriverGuard {
            engine: self.clone(),
            prev,
        }
    }

    // === Tick commit & deferred analysis ===

    /// Commit the pending tick: advance every registered window, then hand
    /// the dirty snapshot to the idle-time analyzer.
    fn commit_tick(&self) {
        let snapshot = {
            let mut inner = self.inner.write();
            inner.tick_scheduled = false;
            inner.tick += 1;

            let mut pulsed = 0usize;
            {
                let EngineInner {
                    registry, pending, ..
                } = &mut *inner;
                registry.advance_tick(|label| {
                    let hit = pending.contains(label);
                    pulsed += hit as usize;
                    hit
                });
            }
            let registered = inner.registry.len();
            inner.metrics.system_entropy = tick_entropy(pulsed, registered);
            trace!(tick = inner.tick, pulses = pulsed, "tick committed");
            inner.pending.clear();

            if inner.last_prune.elapsed() >= inner.config.prune_interval {
                let ttl = inner.config.event_ttl;
                inner.graph.prune_expired(ttl);
                inner.last_prune = Instant::now();
            }

            if inner.dirty.is_empty() {
                None
            } else {
                // Snapshot taken and cleared before the idle callback fires:
                // pulses during analysis land in the next snapshot.
                Some(std::mem::take(&mut inner.dirty))
            }
        };

        if let Some(dirty) = snapshot {
            let engine = self.clone();
            self.scheduler
                .schedule_idle(Box::new(move || engine.run_analysis(dirty)));
        }
    }

    fn run_analysis(&self, dirty: HashSet<String>) {
        let started = Instant::now();
        let mut inner = self.inner.write();

        let outcome = {
            let EngineInner {
                registry,
                graph,
                redundant,
                violations,
                config,
                ..
            } = &mut *inner;
            analysis::run_pass(registry, graph, &dirty, redundant, violations, config)
        };

        inner.metrics.comparison_count += outcome.comparisons;
        inner.metrics.alert_count += outcome.new_violations;
        inner.metrics.last_analysis_duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        inner.metrics.last_analysis_timestamp_ms = unix_millis();
        debug!(
            dirty = dirty.len(),
            comparisons = outcome.comparisons,
            new_violations = outcome.new_violations,
            "analysis pass complete"
        );
    }

    // === Read-only surface ===

    /// Current performance counters.
    pub fn snapshot_metrics(&self) -> EngineMetrics {
        self.inner.read().metrics
    }

    /// Build the bounded ranked report, filtering out issues scoring below
    /// `min_score`, together with the redundancy set and violation map.
    pub fn generate_report(&self, min_score: f32) -> Report {
        let inner = self.inner.read();
        let mut issues =
            identify_top_issues(&inner.graph, &inner.registry, &inner.redundant, &inner.config);
        issues.retain(|issue| issue.score >= min_score);
        Report {
            issues,
            redundant: inner.redundant.clone(),
            violations: inner.violations.clone(),
        }
    }

    /// Labels currently classified as redundant.
    pub fn redundant_labels(&self) -> HashSet<String> {
        self.inner.read().redundant.clone()
    }

    /// Current violation map, keyed by offending label.
    pub fn violations(&self) -> ViolationMap {
        self.inner.read().violations.clone()
    }

    /// Whether the breaker has paused this label.
    pub fn is_paused(&self, label: &str) -> bool {
        self.inner.read().breaker.is_paused(label)
    }

    /// Explicitly un-pause a breaker-tripped label.
    pub fn resume(&self, label: &str) {
        self.inner.write().breaker.resume(label);
    }

    /// Window density for a registered label.
    pub fn density(&self, label: &str) -> Option<u32> {
        self.inner.read().registry.get(label).map(|s| s.density())
    }

    /// Number of committed ticks.
    pub fn current_tick(&self) -> u64 {
        self.inner.read().tick
    }

    /// Sorted `(source, target, weight)` view of the causal graph.
    pub fn graph_snapshot(&self) -> Vec<(String, String, u32)> {
        self.inner.read().graph.snapshot()
    }
}

/// RAII guard for a causal-attribution scope. Restores the previously
/// active driver when dropped.
pub struct DriverGuard {
    engine: BasisEngine,
    prev: Option<String>,
}

impl Drop for DriverGuard {
    fn drop(&mut self) {
        self.engine.inner.write().current_driver = self.prev.take();
    }
}

/// Normalized binary entropy of "a registered signal pulsed this tick".
///
/// An empty registry is maximally uncertain by convention.
fn tick_entropy(pulsed: usize, registered: usize) -> f32 {
    if registered == 0 {
        return 1.0;
    }
    let p = pulsed as f32 / registered as f32;
    if p <= 0.0 || p >= 1.0 {
        return 0.0;
    }
    -(p * p.log2() + (1.0 - p) * (1.0 - p).log2())
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    fn manual_engine() -> (BasisEngine, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let engine = BasisEngine::with_scheduler(scheduler.clone());
        (engine, scheduler)
    }

    #[test]
    fn test_same_tick_pulses_coalesce() {
        let (engine, scheduler) = manual_engine();
        engine.register("sig", Role::Local);

        engine.record("sig");
        engine.record("sig");
        engine.record("sig");
        scheduler.flush();

        assert_eq!(engine.current_tick(), 1);
        assert_eq!(engine.density("sig"), Some(1));
    }

    #[test]
    fn test_record_for_unregistered_label_is_safe() {
        let (engine, scheduler) = manual_engine();
        assert!(engine.record("ghost"));
        scheduler.flush();
        assert_eq!(engine.density("ghost"), None);
    }

    #[test]
    fn test_breaker_blocks_and_resume_clears() {
        let scheduler = Arc::new(ManualScheduler::new());
        let config = EngineConfig {
            breaker_threshold: 3,
            ..Default::default()
        };
        let engine = BasisEngine::with_config(config, scheduler.clone()).unwrap();
        engine.register("loop", Role::Local);

        for _ in 0..3 {
            assert!(engine.record("loop"));
        }
        assert!(!engine.record("loop"));
        assert!(engine.is_paused("loop"));
        assert!(!engine.record("loop"), "no implicit recovery");

        engine.resume("loop");
        assert!(engine.record("loop"));
    }

    #[test]
    fn test_driver_scope_attributes_edges() {
        let (engine, scheduler) = manual_engine();
        engine.register("target", Role::Local);

        {
            let _scope = engine.driver_scope("sync_effect");
            engine.record("target");
        }
        scheduler.flush();

        let snapshot = engine.graph_snapshot();
        assert_eq!(
            snapshot,
            vec![("sync_effect".to_string(), "target".to_string(), 1)]
        );
    }

    #[test]
    fn test_driver_scope_restores_previous_on_drop() {
        let (engine, scheduler) = manual_engine();
        engine.register("a", Role::Local);
        engine.register("b", Role::Local);

        let _outer = engine.driver_scope("outer");
        {
            let _inner = engine.driver_scope("inner_effect");
            engine.record("a");
        }
        engine.record("b");
        scheduler.flush();

        let snapshot = engine.graph_snapshot();
        assert!(snapshot.contains(&("inner_effect".to_string(), "a".to_string(), 1)));
        assert!(snapshot.contains(&("outer".to_string(), "b".to_string(), 1)));
    }

    #[test]
    fn test_undriven_siblings_share_one_event_node() {
        let (engine, scheduler) = manual_engine();
        engine.register("sibling_a", Role::Local);
        engine.register("sibling_b", Role::Local);

        engine.record("sibling_a");
        engine.record("sibling_b");
        scheduler.flush();

        let snapshot = engine.graph_snapshot();
        let sources: HashSet<&str> = snapshot.iter().map(|(s, _, _)| s.as_str()).collect();
        assert_eq!(sources.len(), 1, "same-tick siblings share an event node");
        assert!(sources.iter().next().unwrap().starts_with("Event_Tick_"));
    }

    #[test]
    fn test_dirty_snapshot_drives_comparison_count() {
        let (engine, scheduler) = manual_engine();
        engine.register("x", Role::Local);
        engine.register("y", Role::Local);

        for _ in 0..3 {
            engine.record("x");
            engine.record("y");
            scheduler.flush();
        }

        // First pass is density-gated (one pulse each); the next two passes
        // each perform the single unique comparison for the dirty pair.
        assert_eq!(engine.snapshot_metrics().comparison_count, 2);
    }

    #[test]
    fn test_no_analysis_without_dirty_signals() {
        let (engine, scheduler) = manual_engine();
        engine.register("idle_1", Role::Local);
        engine.register("idle_2", Role::Local);
        scheduler.flush();

        let metrics = engine.snapshot_metrics();
        assert_eq!(metrics.comparison_count, 0);
        assert_eq!(metrics.last_analysis_timestamp_ms, 0);
    }

    #[test]
    fn test_unregister_evicts_classification() {
        let (engine, scheduler) = manual_engine();
        engine.register("twin_a", Role::Local);
        engine.register("twin_b", Role::Local);

        for _ in 0..2 {
            engine.record("twin_a");
            engine.record("twin_b");
            scheduler.flush();
        }
        assert!(engine.redundant_labels().contains("twin_a"));

        engine.unregister("twin_a");
        assert!(!engine.redundant_labels().contains("twin_a"));
        assert!(
            !engine
                .violations()
                .values()
                .flatten()
                .any(|r| r.target == "twin_a"),
            "violations targeting the signal must be evicted"
        );
        assert!(engine.graph_snapshot().iter().all(|(s, t, _)| {
            s != "twin_a" && t != "twin_a"
        }));
    }

    #[test]
    fn test_entropy_defaults_to_max_and_tracks_ticks() {
        let (engine, scheduler) = manual_engine();
        assert_eq!(engine.snapshot_metrics().system_entropy, 1.0);

        engine.register("a", Role::Local);
        engine.register("b", Role::Local);
        engine.record("a");
        scheduler.flush();

        // Half the registry pulsed: maximum binary entropy.
        let entropy = engine.snapshot_metrics().system_entropy;
        assert!((entropy - 1.0).abs() < 1e-6);

        engine.record("a");
        engine.record("b");
        scheduler.flush();
        // Everything pulsed: no uncertainty.
        assert_eq!(engine.snapshot_metrics().system_entropy, 0.0);
    }

    #[test]
    fn test_inline_scheduler_makes_progress() {
        // Headless fallback: every record commits its own tick immediately.
        let engine = BasisEngine::new();
        engine.register("solo", Role::Local);
        engine.record("solo");
        engine.record("solo");

        assert_eq!(engine.current_tick(), 2);
        assert_eq!(engine.density("solo"), Some(2));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = BasisEngine::with_config(
            EngineConfig {
                window_size: 0,
                ..Default::default()
            },
            Arc::new(InlineScheduler),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_tick_entropy_bounds() {
        assert_eq!(tick_entropy(0, 0), 1.0);
        assert_eq!(tick_entropy(0, 10), 0.0);
        assert_eq!(tick_entropy(10, 10), 0.0);
        assert!((tick_entropy(5, 10) - 1.0).abs() < 1e-6);
    }
}
