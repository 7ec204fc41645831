//! Influence ranking: power iteration over the causal graph.
//!
//! A node is influential when it triggers targets that are themselves
//! influential: score flows *against* edge direction, so "prime movers" whose
//! changes propagate widely float to the top. Self-loops are skipped to
//! prevent unbounded inflation, and every node receives a small base weight
//! each round so true sinks never decay to zero.

use std::collections::HashMap;

use crate::graph::CausalGraph;

/// Rank every graph node by spectral influence.
///
/// Scores are renormalized to sum to 1 after each round. Iteration stops when
/// the RMS score delta drops below `tolerance` or after `max_iterations`
/// rounds.
pub fn spectral_influence(
    graph: &CausalGraph,
    max_iterations: usize,
    tolerance: f32,
    base_weight: f32,
) -> HashMap<String, f32> {
    let nodes = graph.sorted_nodes();
    if nodes.is_empty() {
        return HashMap::new();
    }

    let n = nodes.len();
    let mut scores: HashMap<&str, f32> = nodes.iter().map(|&node| (node, 1.0 / n as f32)).collect();

    for _ in 0..max_iterations {
        let mut next: HashMap<&str, f32> = HashMap::with_capacity(n);
        let mut total = 0.0f32;

        for &source in &nodes {
            let mut influence = 0.0f32;
            if let Some(outgoing) = graph.targets(source) {
                for (target, weight) in outgoing {
                    // Self-loops would inflate without bound under iteration.
                    if target != source {
                        influence +=
                            scores.get(target.as_str()).copied().unwrap_or(0.0) * *weight as f32;
                    }
                }
            }
            let value = influence + base_weight;
            next.insert(source, value);
            total += value;
        }

        let mut delta_sq = 0.0f32;
        for &node in &nodes {
            let normalized = next[node] / total;
            let diff = normalized - scores[node];
            delta_sq += diff * diff;
            next.insert(node, normalized);
        }

        scores = next;
        if (delta_sq / n as f32).sqrt() < tolerance {
            break;
        }
    }

    scores
        .into_iter()
        .map(|(node, score)| (node.to_string(), score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    fn graph_from_edges(edges: &[(&str, &str, u32)]) -> CausalGraph {
        let mut graph = CausalGraph::new();
        for &(source, target, weight) in edges {
            for _ in 0..weight {
                graph.attribute(source, NodeKind::Signal, target);
            }
        }
        graph
    }

    fn rank(graph: &CausalGraph) -> HashMap<String, f32> {
        spectral_influence(graph, 20, 0.001, 0.01)
    }

    #[test]
    fn test_empty_graph_yields_no_scores() {
        assert!(rank(&CausalGraph::new()).is_empty());
    }

    #[test]
    fn test_star_topology_ranks_hub_first() {
        let graph = graph_from_edges(&[
            ("event", "a", 1),
            ("event", "b", 1),
            ("event", "c", 1),
        ]);
        let scores = rank(&graph);

        assert!(scores["event"] > scores["a"]);
        assert!(scores["event"] > scores["b"]);
        assert!(scores["event"] > scores["c"]);
    }

    #[test]
    fn test_chain_ranks_root_above_middle_above_leaf() {
        let graph = graph_from_edges(&[("root", "mid", 1), ("mid", "leaf", 1)]);
        let scores = rank(&graph);

        assert!(scores["root"] > scores["mid"]);
        assert!(scores["mid"] > scores["leaf"]);
    }

    #[test]
    fn test_two_cycle_converges_to_half_each() {
        let graph = graph_from_edges(&[("a", "b", 1), ("b", "a", 1)]);
        let scores = rank(&graph);

        assert!((scores["a"] - 0.5).abs() < 0.05, "a = {}", scores["a"]);
        assert!((scores["b"] - 0.5).abs() < 0.05, "b = {}", scores["b"]);
    }

    #[test]
    fn test_self_loops_are_ignored() {
        let graph = graph_from_edges(&[("a", "a", 10), ("a", "b", 1)]);
        let scores = rank(&graph);

        // a's score comes only from driving b; the self-edge adds nothing.
        assert!(scores["a"] > scores["b"]);
        assert!(scores["a"] < 0.9, "self-loop inflated a: {}", scores["a"]);
    }

    #[test]
    fn test_scores_sum_to_one() {
        let graph = graph_from_edges(&[
            ("a", "b", 2),
            ("b", "c", 1),
            ("c", "a", 3),
            ("d", "a", 1),
        ]);
        let total: f32 = rank(&graph).values().sum();
        assert!((total - 1.0).abs() < 1e-3, "total = {total}");
    }

    #[test]
    fn test_heavier_edges_mean_more_influence() {
        let graph = graph_from_edges(&[("busy", "x", 5), ("quiet", "x", 1)]);
        let scores = rank(&graph);
        assert!(scores["busy"] > scores["quiet"]);
    }
}
