//! Causal attribution graph: "what changed in response to what".
//!
//! A directed, weighted multigraph. Edge weight is occurrence count. Sources
//! are either explicitly tracked drivers (scoped effects) or synthetic
//! per-tick event nodes representing "these targets changed in the same
//! uninstrumented tick"; the synthetic node prevents falsely inferring a
//! chain between simultaneous siblings. Synthetic nodes carry a birth instant
//! and are pruned, with their edges, once they outlive a TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// What a graph node represents. Recorded at attribution time so the
/// reporter never has to sniff label strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// A registered (or at least recorded) signal.
    Signal,
    /// An explicitly tracked driver (a scoped side effect).
    Driver,
    /// A synthetic per-tick event node.
    Event,
}

/// Directed weighted multigraph of causal attributions.
#[derive(Debug, Default)]
pub struct CausalGraph {
    edges: HashMap<String, HashMap<String, u32>>,
    kinds: HashMap<String, NodeKind>,
    event_births: HashMap<String, Instant>,
}

impl CausalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or reinforce) the edge `source -> target`.
    ///
    /// `source_kind` tags the source node; targets are always signals.
    /// Self-edges are stored (the influence ranker skips them) so the raw
    /// occurrence count stays faithful to what was observed.
    pub fn attribute(&mut self, source: &str, source_kind: NodeKind, target: &str) {
        self.kinds
            .entry(source.to_string())
            .or_insert(source_kind);
        self.kinds
            .entry(target.to_string())
            .or_insert(NodeKind::Signal);
        if source_kind == NodeKind::Event {
            self.event_births
                .entry(source.to_string())
                .or_insert_with(Instant::now);
        }
        *self
            .edges
            .entry(source.to_string())
            .or_default()
            .entry(target.to_string())
            .or_insert(0) += 1;
    }

    /// Outgoing edges of a source, if any.
    #[inline]
    pub fn targets(&self, source: &str) -> Option<&HashMap<String, u32>> {
        self.edges.get(source)
    }

    #[inline]
    pub fn node_kind(&self, label: &str) -> Option<NodeKind> {
        self.kinds.get(label).copied()
    }

    /// Sources in lexicographic order, for deterministic reporting.
    pub fn sorted_sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = self.edges.keys().map(String::as_str).collect();
        sources.sort_unstable();
        sources
    }

    /// All node labels (sources and targets) in lexicographic order.
    pub fn sorted_nodes(&self) -> Vec<&str> {
        let mut nodes: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        nodes.sort_unstable();
        nodes
    }

    /// Whether any live synthetic event node already points at `label`.
    ///
    /// Used by the analyzer to suppress causal-leak noise: a signal driven by
    /// a same-tick sibling event does not also need a statistical hint.
    pub fn is_event_explained(&self, label: &str) -> bool {
        self.event_births.keys().any(|event| {
            self.edges
                .get(event)
                .is_some_and(|targets| targets.contains_key(label))
        })
    }

    /// Delete synthetic event nodes older than `ttl`, together with their
    /// edges. Returns the number of nodes removed.
    pub fn prune_expired(&mut self, ttl: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .event_births
            .iter()
            .filter(|(_, born)| now.duration_since(**born) > ttl)
            .map(|(label, _)| label.clone())
            .collect();

        for label in &expired {
            self.event_births.remove(label);
            self.edges.remove(label);
            self.kinds.remove(label);
            // Event nodes are never targets, so no incoming sweep is needed.
        }

        if !expired.is_empty() {
            debug!(pruned = expired.len(), "expired event nodes removed");
        }
        expired.len()
    }

    /// Remove every edge touching `label` and the node itself. Called when a
    /// signal is unregistered.
    pub fn remove_node(&mut self, label: &str) {
        self.edges.remove(label);
        self.kinds.remove(label);
        self.event_births.remove(label);
        for targets in self.edges.values_mut() {
            targets.remove(label);
        }
        self.edges.retain(|_, targets| !targets.is_empty());
    }

    /// Total number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(HashMap::len).sum()
    }

    /// Total number of known nodes.
    pub fn node_count(&self) -> usize {
        self.kinds.len()
    }

    /// Flat snapshot of `(source, target, weight)` triples, sorted, for
    /// external read-only inspection.
    pub fn snapshot(&self) -> Vec<(String, String, u32)> {
        let mut out: Vec<(String, String, u32)> = self
            .edges
            .iter()
            .flat_map(|(source, targets)| {
                targets
                    .iter()
                    .map(move |(target, weight)| (source.clone(), target.clone(), *weight))
            })
            .collect();
        out.sort();
        out
    }
}
