//! Engine configuration: every heuristic threshold is a tunable knob.
//!
//! The defaults mirror the values the engine shipped with; none of them are
//! hard invariants. In particular the causal margin and volatility threshold
//! are empirical, so hosts with unusual pulse patterns are expected to adjust
//! them rather than treat them as fixed law.

use std::time::Duration;

use crate::{Error, Result};

/// Default ring-buffer window size in ticks.
pub const WINDOW_SIZE: usize = 50;

/// Default similarity above which two signals are considered related.
pub const SIMILARITY_THRESHOLD: f32 = 0.88;

/// Default margin by which a lead/lag similarity must beat the synchronous
/// similarity before a causal-leak classification is made.
pub const CAUSAL_MARGIN: f32 = 0.05;

/// Default density above which a signal is considered volatile
/// (animation-driven, excluded from causal hints).
pub const VOLATILITY_THRESHOLD: u32 = 25;

/// Default circuit-breaker hard limit: updates per rolling window.
pub const BREAKER_THRESHOLD: u32 = 150;

/// Default circuit-breaker rolling window.
pub const BREAKER_WINDOW: Duration = Duration::from_secs(1);

/// Default time-to-live for synthetic event nodes in the causal graph.
pub const EVENT_TTL: Duration = Duration::from_secs(10);

/// Default minimum interval between graph pruning sweeps.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(1);

/// Tunable parameters for a [`BasisEngine`](crate::BasisEngine) instance.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Ring-buffer window size `W` in ticks.
    pub window_size: usize,
    /// Similarity above which a pair is considered related.
    pub similarity_threshold: f32,
    /// Required `max - sync` margin for a causal-leak classification.
    pub causal_margin: f32,
    /// Density above which a signal is volatile (causal hints suppressed).
    pub volatility_threshold: u32,
    /// Circuit-breaker hard limit per rolling window.
    pub breaker_threshold: u32,
    /// Circuit-breaker rolling window length.
    pub breaker_window: Duration,
    /// TTL for synthetic event nodes in the causal graph.
    pub event_ttl: Duration,
    /// Minimum interval between graph pruning sweeps.
    pub prune_interval: Duration,
    /// Power-iteration cap for the influence ranker.
    pub ranker_max_iterations: usize,
    /// RMS score-delta tolerance at which power iteration stops.
    pub ranker_tolerance: f32,
    /// Base existence weight added to every node each round so sinks never
    /// decay to zero.
    pub ranker_base_weight: f32,
    /// Maximum number of ranked issues in a report.
    pub report_limit: usize,
    /// Minimum density for the report's raw-density fallback.
    pub density_floor: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE,
            similarity_threshold: SIMILARITY_THRESHOLD,
            causal_margin: CAUSAL_MARGIN,
            volatility_threshold: VOLATILITY_THRESHOLD,
            breaker_threshold: BREAKER_THRESHOLD,
            breaker_window: BREAKER_WINDOW,
            event_ttl: EVENT_TTL,
            prune_interval: PRUNE_INTERVAL,
            ranker_max_iterations: 20,
            ranker_tolerance: 0.001,
            ranker_base_weight: 0.01,
            report_limit: 3,
            density_floor: 25,
        }
    }
}

impl EngineConfig {
    /// Check that the configuration is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 2 {
            return Err(Error::InvalidConfig(format!(
                "window_size must be >= 2, got {}",
                self.window_size
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::InvalidConfig(format!(
                "similarity_threshold must be in [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.causal_margin < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "causal_margin must be >= 0, got {}",
                self.causal_margin
            )));
        }
        if self.breaker_threshold == 0 {
            return Err(Error::InvalidConfig(
                "breaker_threshold must be > 0".into(),
            ));
        }
        if self.ranker_max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "ranker_max_iterations must be > 0".into(),
            ));
        }
        Ok(())
    }
}
