//! Signal registry: per-signal ring buffers, role tags, and lifecycle.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::PulseWindow;

/// Classification of a signal's origin, used to break ties when attributing
/// redundancy.
///
/// Context and Store signals are "anchors": sources of truth that may
/// legitimately correlate with each other. Local signals are eligible to be
/// flagged redundant. Projection signals are derived values and are excluded
/// from redundancy scanning entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Component-local state. The default, eligible for redundancy flags.
    Local,
    /// Shared context value; an anchor.
    Context,
    /// Derived/memoized value, excluded from redundancy scanning.
    Projection,
    /// External store; an anchor, same treatment as Context.
    Store,
}

impl Role {
    /// Anchors are sources of truth; two anchors correlating is
    /// architecturally valid and never flagged.
    #[inline]
    pub fn is_anchor(self) -> bool {
        matches!(self, Role::Context | Role::Store)
    }
}

/// Registration options supplied by the instrumentation shim.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegisterOptions {
    /// Skip tracking for this signal entirely.
    pub suppress: bool,
}

/// A tracked signal: its windowed pulse history plus role tag.
#[derive(Clone, Debug)]
pub struct Signal {
    window: PulseWindow,
    role: Role,
}

impl Signal {
    #[inline]
    pub fn window(&self) -> &PulseWindow {
        &self.window
    }

    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    #[inline]
    pub fn density(&self) -> u32 {
        self.window.density()
    }
}

/// Owns every tracked signal. Pure bookkeeping: no side effects beyond
/// memory.
#[derive(Debug)]
pub struct SignalRegistry {
    signals: HashMap<String, Signal>,
    window_size: usize,
}

impl SignalRegistry {
    pub fn new(window_size: usize) -> Self {
        Self {
            signals: HashMap::new(),
            window_size,
        }
    }

    /// Register a signal with a zeroed window. Idempotent: a no-op if the
    /// label is already present or the caller asked for suppression.
    pub fn register(&mut self, label: &str, role: Role, opts: RegisterOptions) {
        if opts.suppress || self.signals.contains_key(label) {
            return;
        }
        self.signals.insert(
            label.to_string(),
            Signal {
                window: PulseWindow::new(self.window_size),
                role,
            },
        );
    }

    /// Remove a signal. Unknown labels are a silent no-op.
    pub fn unregister(&mut self, label: &str) {
        self.signals.remove(label);
    }

    #[inline]
    pub fn contains(&self, label: &str) -> bool {
        self.signals.contains_key(label)
    }

    #[inline]
    pub fn get(&self, label: &str) -> Option<&Signal> {
        self.signals.get(label)
    }

    #[inline]
    pub fn role(&self, label: &str) -> Option<Role> {
        self.signals.get(label).map(|s| s.role)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Signal)> {
        self.signals.iter().map(|(label, s)| (label.as_str(), s))
    }

    /// Labels in lexicographic order, for deterministic iteration in the
    /// analyzer and reporter.
    pub fn sorted_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.signals.keys().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }

    /// Advance one tick: write a pulse bit into every registered window.
    ///
    /// `pulsed` decides per label whether this tick's slot is 1 or 0.
    pub fn advance_tick(&mut self, mut pulsed: impl FnMut(&str) -> bool) {
        for (label, signal) in self.signals.iter_mut() {
            signal.window.push(pulsed(label));
        }
    }
}
