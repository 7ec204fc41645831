//! # basis-core
//!
//! Live diagnostic engine for instrumented state signals. Watches a stream of
//! discrete state-mutation pulses and infers architectural problems:
//!
//! - **Redundancy**: two signals whose pulse patterns are statistically
//!   indistinguishable (duplicate state, or local state mirroring an anchor).
//! - **Causal leaks**: one signal's pulse reliably precedes another's by
//!   exactly one tick, doubling work downstream.
//! - **Runaway loops**: a signal updating faster than the circuit breaker's
//!   hard rate limit.
//!
//! ## Quick Start
//! ```rust
//! use basis_core::{BasisEngine, Role};
//!
//! let engine = BasisEngine::new();
//! engine.register("cart_total", Role::Local);
//! engine.register("cart_total_copy", Role::Local);
//!
//! // Instrumentation shims call record() on every state mutation.
//! engine.record("cart_total");
//! engine.record("cart_total_copy");
//!
//! let report = engine.generate_report(0.0);
//! assert!(report.issues.len() <= 3);
//! ```
//!
//! ## Architecture
//! ```text
//! record(label) ──► CircuitBreaker gate ──► CausalGraph attribution
//!                                               │
//!                        pending/dirty sets ◄───┘
//!                                │
//!                  tick commit (scheduled, coalesced)
//!                                │
//!              ring buffers advance, dirty snapshot taken
//!                                │
//!              CorrelationAnalyzer (deferred to idle time)
//!                                │
//!              redundancy set + violation map ──► IssueAggregator
//! ```
//!
//! The engine is an explicit instance owned by a composition root; there is
//! no process-wide global. All mutation entry points run synchronously on the
//! host's thread in invocation order. The two scheduling primitives (tick and
//! idle) are pluggable via the [`Scheduler`] trait.

// === Core modules ===
pub mod analysis;
pub mod breaker;
pub mod config;
pub mod core;
pub mod engine;
pub mod graph;
pub mod ranker;
pub mod registry;
pub mod report;
pub mod scheduler;

// === Re-exports for convenience ===

pub use crate::config::EngineConfig;
pub use crate::core::{circular_similarity, PulseWindow};
pub use crate::engine::{BasisEngine, DriverGuard, EngineMetrics};
pub use crate::graph::{CausalGraph, NodeKind};
pub use crate::ranker::spectral_influence;
pub use crate::registry::{RegisterOptions, Role, SignalRegistry};
pub use crate::analysis::{ViolationKind, ViolationMap, ViolationRecord};
pub use crate::report::{IssueMetric, RankedIssue, Report};
pub use crate::scheduler::{InlineScheduler, ManualScheduler, Scheduler};

// === Error types ===

/// Crate-level error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
