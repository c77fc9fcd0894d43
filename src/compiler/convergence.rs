//! First convergence points among a set of branch heads

use crate::nodes::{NodeGraph, NodeId};
use std::collections::{HashMap, HashSet};

/// A node where two or more heads meet, with the indices of those heads
pub(crate) type ConvergencePoint = (NodeId, Vec<usize>);

/// Find the first nodes where the paths of several heads meet
///
/// A node reached by two or more heads is a candidate. A candidate is first
/// when no other candidate lies on a path from one of its contributing heads
/// to it. Traversal never enters `stop`. Points are returned in breadth-first
/// discovery order so compilation is deterministic.
pub(crate) fn first_convergence_points(
    graph: &NodeGraph,
    heads: &[NodeId],
    stop: Option<NodeId>,
) -> Vec<ConvergencePoint> {
    let mut reach: Vec<HashSet<NodeId>> = Vec::with_capacity(heads.len());
    let mut discovery = Vec::new();
    let mut seen = HashSet::new();
    for &head in heads {
        let reached = graph.reachable_from(head, stop);
        for &id in &reached {
            if seen.insert(id) {
                discovery.push(id);
            }
        }
        reach.push(reached.into_iter().collect());
    }

    let contributors = |id: NodeId| -> Vec<usize> {
        (0..heads.len()).filter(|&i| reach[i].contains(&id)).collect()
    };
    let candidates: Vec<ConvergencePoint> = discovery
        .into_iter()
        .map(|id| (id, contributors(id)))
        .filter(|(_, heads)| heads.len() >= 2)
        .collect();

    let mut descendants: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
    let mut points = Vec::new();
    for (id, contributing) in &candidates {
        let preceded = candidates.iter().any(|(other, _)| {
            if other == id || !contributing.iter().any(|&i| reach[i].contains(other)) {
                return false;
            }
            descendants
                .entry(*other)
                .or_insert_with(|| graph.reachable_from(*other, stop).into_iter().collect())
                .contains(id)
        });
        if !preceded {
            points.push((*id, contributing.clone()));
        }
    }
    points
}
