//! Structural queries over the connection graph
//!
//! Reachability, cycle detection and special-subgraph membership. Every
//! traversal threads an explicit visited set so malformed input can never
//! recurse without bound.

use super::graph::{ConnectRejection, NodeGraph};
use super::node::NodeId;
use super::port::{PortRef, PortSlot};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Edges of a graph, optionally extended by one hypothetical edge
struct EdgeView<'a> {
    graph: &'a NodeGraph,
    extra: Option<(PortRef, PortRef)>,
}

impl<'a> EdgeView<'a> {
    fn new(graph: &'a NodeGraph) -> Self {
        Self { graph, extra: None }
    }

    fn with_edge(graph: &'a NodeGraph, a: PortRef, b: PortRef) -> Self {
        Self {
            graph,
            extra: Some((a, b)),
        }
    }

    fn links(&self, port: PortRef) -> Vec<PortRef> {
        let mut peers = self
            .graph
            .node(port.node)
            .and_then(|n| n.port(port.slot))
            .map(|p| p.connections().to_vec())
            .unwrap_or_default();
        if let Some((a, b)) = self.extra {
            if a == port && !peers.contains(&b) {
                peers.push(b);
            } else if b == port && !peers.contains(&a) {
                peers.push(a);
            }
        }
        peers
    }

    /// Nodes captured by one special node
    ///
    /// Expansion runs forward from nodes fed by the special node's auxiliary
    /// outputs and backward from nodes feeding its auxiliary inputs, over
    /// primary edges only. The special node itself is never a member.
    fn subgraph_of(&self, special: NodeId) -> BTreeSet<NodeId> {
        let mut members = BTreeSet::new();
        let Some(node) = self.graph.node(special) else {
            return members;
        };

        let mut forward_seen = HashSet::new();
        let mut backward_seen = HashSet::new();
        for (index, aux) in node.aux_ports().iter().enumerate() {
            let forward = aux.is_output();
            let seen = if forward {
                &mut forward_seen
            } else {
                &mut backward_seen
            };
            let mut queue: VecDeque<NodeId> = self
                .links(PortRef::aux(special, index))
                .into_iter()
                .filter(|peer| peer.slot.is_primary())
                .map(|peer| peer.node)
                .collect();

            while let Some(current) = queue.pop_front() {
                if current == special || !seen.insert(current) {
                    continue;
                }
                members.insert(current);
                let (port, wanted) = if forward {
                    (PortRef::output(current), PortSlot::Input)
                } else {
                    (PortRef::input(current), PortSlot::Output)
                };
                for peer in self.links(port) {
                    if peer.slot == wanted {
                        queue.push_back(peer.node);
                    }
                }
            }
        }
        members
    }

    /// Member node -> special nodes whose subgraph contains it
    fn membership(&self) -> BTreeMap<NodeId, Vec<NodeId>> {
        let mut owners: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for special in self.graph.nodes().filter(|n| n.is_special()) {
            for member in self.subgraph_of(special.id) {
                owners.entry(member).or_default().push(special.id);
            }
        }
        owners
    }
}

impl NodeGraph {
    /// Distinct nodes fed by this node's primary output, in connection order
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(node) = self.node(id) {
            for peer in node.output().connections() {
                if peer.slot == PortSlot::Input && !out.contains(&peer.node) {
                    out.push(peer.node);
                }
            }
        }
        out
    }

    /// Distinct nodes feeding this node's primary input through their primary output
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(node) = self.node(id) {
            for peer in node.input().connections() {
                if peer.slot == PortSlot::Output && !out.contains(&peer.node) {
                    out.push(peer.node);
                }
            }
        }
        out
    }

    /// Whether `to` can be reached from `from` over primary edges
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if visited.insert(current) {
                queue.extend(self.successors(current));
            }
        }
        false
    }

    /// Nodes reachable from `start` over primary edges in breadth-first
    /// order, including `start`; traversal never enters `stop`
    pub fn reachable_from(&self, start: NodeId, stop: Option<NodeId>) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            if Some(current) == stop || !visited.insert(current) {
                continue;
            }
            order.push(current);
            queue.extend(self.successors(current));
        }
        order
    }

    /// Topological order of all nodes over primary edges, `None` on a cycle
    pub fn topological_order(&self) -> Option<Vec<NodeId>> {
        let mut in_degree: HashMap<NodeId, usize> = self.node_ids().map(|id| (id, 0)).collect();
        for id in self.node_ids() {
            for next in self.successors(id) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree += 1;
                }
            }
        }

        // Kahn's algorithm, seeded in id order for a stable result
        let mut queue: VecDeque<NodeId> = self
            .node_ids()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut result = Vec::with_capacity(self.len());
        while let Some(id) = queue.pop_front() {
            result.push(id);
            for next in self.successors(id) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        (result.len() == self.len()).then_some(result)
    }

    /// Exhaustive check for a directed cycle among primary edges
    pub fn has_primary_cycle(&self) -> bool {
        self.topological_order().is_none()
    }

    /// Members of a special node's subgraph
    pub fn special_subgraph(&self, special: NodeId) -> BTreeSet<NodeId> {
        EdgeView::new(self).subgraph_of(special)
    }

    /// Every captured node with the special nodes that capture it
    pub fn subgraph_membership(&self) -> BTreeMap<NodeId, Vec<NodeId>> {
        EdgeView::new(self).membership()
    }

    /// Special nodes whose subgraph contains `id`
    pub fn subgraph_owners(&self, id: NodeId) -> Vec<NodeId> {
        self.subgraph_membership().remove(&id).unwrap_or_default()
    }

    pub fn is_captured(&self, id: NodeId) -> bool {
        !self.subgraph_owners(id).is_empty()
    }

    /// Nodes with an empty primary input that are connected somewhere and
    /// not captured by a special subgraph
    pub fn real_input_nodes(&self) -> Vec<NodeId> {
        let membership = self.subgraph_membership();
        self.nodes()
            .filter(|n| n.has_connections() && !n.input().is_connected())
            .filter(|n| !membership.contains_key(&n.id))
            .map(|n| n.id)
            .collect()
    }

    /// Nodes with an empty primary output that are connected somewhere and
    /// not captured by a special subgraph
    pub fn real_output_nodes(&self) -> Vec<NodeId> {
        let membership = self.subgraph_membership();
        self.nodes()
            .filter(|n| n.has_connections() && !n.output().is_connected())
            .filter(|n| !membership.contains_key(&n.id))
            .map(|n| n.id)
            .collect()
    }

    /// Refuse edges that would put a node into two special subgraphs
    pub(crate) fn check_subgraph_rule(
        &self,
        output: PortRef,
        input: PortRef,
    ) -> Result<(), ConnectRejection> {
        if !self.nodes().any(|n| n.is_special()) {
            return Ok(());
        }
        let before = EdgeView::new(self).membership();
        let after = EdgeView::with_edge(self, output, input).membership();
        for (node, owners) in &after {
            let previous = before.get(node).map_or(0, Vec::len);
            if owners.len() > 1 && owners.len() > previous {
                return Err(ConnectRejection::SubgraphConflict {
                    node: *node,
                    first: owners[0],
                    second: owners[1],
                });
            }
        }
        Ok(())
    }
}
