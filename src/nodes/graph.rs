//! Node graph data structures and edit operations
//!
//! The graph is the sole owner of every node. Edges live in the connected
//! sets of both ports and are only created or removed through [`NodeGraph::link`]
//! and [`NodeGraph::unlink`], which keep the two sides symmetric.

use super::catalog::LayerCatalog;
use super::node::{Node, NodeId};
use super::port::{PortRef, PortType};
use glam::Vec2;
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Why a connection request was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectRejection {
    #[error("port {0} does not exist")]
    UnknownPort(PortRef),
    #[error("cannot connect a port to itself")]
    SamePort,
    #[error("cannot connect two ports of the same node")]
    SameNode,
    #[error("both ports are {0:?} ports")]
    SameDirection(PortType),
    #[error("auxiliary ports of different special nodes cannot be joined")]
    AuxiliaryToAuxiliary,
    #[error("node #{node} would belong to the subgraphs of #{first} and #{second}")]
    SubgraphConflict {
        node: NodeId,
        first: NodeId,
        second: NodeId,
    },
    #[error("connection would create a cycle")]
    Cycle,
}

/// A graph containing layer nodes and their connections
#[derive(Debug, Clone)]
pub struct NodeGraph {
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    next_node_id: NodeId,
    catalog: LayerCatalog,
}

impl NodeGraph {
    /// Creates a new empty graph using the built-in layer catalog
    pub fn new() -> Self {
        Self::with_catalog(LayerCatalog::builtin())
    }

    /// Creates a new empty graph with a custom catalog
    pub fn with_catalog(catalog: LayerCatalog) -> Self {
        Self {
            nodes: BTreeMap::new(),
            next_node_id: 0,
            catalog,
        }
    }

    pub fn catalog(&self) -> &LayerCatalog {
        &self.catalog
    }

    /// Creates a node of the given type, special if the catalog says so
    pub fn create_node(&mut self, layer_type: &str, position: Vec2) -> NodeId {
        let node = match self.catalog.special_kind(layer_type) {
            Some(kind) => Node::new_special(0, layer_type, kind, position),
            None => Node::new(0, layer_type, position),
        };
        self.add_node(node)
    }

    /// Adds a node to the graph and returns its ID
    ///
    /// Any edges the node carries are dropped; edges are only created
    /// through [`NodeGraph::connect`].
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = self.next_node_id;
        self.insert_node_with_id(id, node)
    }

    /// Adds a node to the graph with a specific ID, replacing any node
    /// previously stored under it
    pub fn insert_node_with_id(&mut self, id: NodeId, mut node: Node) -> NodeId {
        if self.nodes.contains_key(&id) {
            self.remove_node(id);
        }
        node.id = id;
        for slot in node.slots().collect::<Vec<_>>() {
            if let Some(port) = node.port_mut(slot) {
                port.take_connections();
                port.highlighted = false;
            }
        }
        self.nodes.insert(id, node);
        // Keep ids unique and never reuse one; the last id leaves the
        // counter where it is
        if let Some(next) = id.checked_add(1) {
            self.next_node_id = self.next_node_id.max(next);
        }
        debug!("Added node #{}", id);
        id
    }

    /// Removes a node after severing all of its edges
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        self.disconnect_all(node_id);
        let removed = self.nodes.remove(&node_id);
        if removed.is_some() {
            debug!("Removed node #{}", node_id);
        }
        removed
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Mutable access for parameters, label and position
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Nodes in id order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Display label of a node, or its id when it no longer exists
    pub fn label(&self, id: NodeId) -> String {
        self.node(id)
            .map(|n| n.label.clone())
            .unwrap_or_else(|| format!("#{}", id))
    }

    /// Direction of an existing port
    pub fn port_type(&self, port: PortRef) -> Option<PortType> {
        self.node(port.node)?.port(port.slot).map(|p| p.port_type)
    }

    /// Whether the two ports share an edge
    pub fn is_connected(&self, a: PortRef, b: PortRef) -> bool {
        self.node(a.node)
            .and_then(|n| n.port(a.slot))
            .is_some_and(|p| p.is_connected_to(b))
    }

    /// Decide whether `source` and `target` may be joined
    pub fn can_connect(&self, source: PortRef, target: PortRef) -> Result<(), ConnectRejection> {
        let source_type = self
            .port_type(source)
            .ok_or(ConnectRejection::UnknownPort(source))?;
        let target_type = self
            .port_type(target)
            .ok_or(ConnectRejection::UnknownPort(target))?;

        if source == target {
            return Err(ConnectRejection::SamePort);
        }
        if source.node == target.node {
            return Err(ConnectRejection::SameNode);
        }
        if source_type == target_type {
            return Err(ConnectRejection::SameDirection(source_type));
        }
        if self.is_connected(source, target) {
            return Ok(());
        }

        let (output, input) = if source_type == PortType::Output {
            (source, target)
        } else {
            (target, source)
        };

        if output.slot.is_auxiliary() && input.slot.is_auxiliary() {
            return Err(ConnectRejection::AuxiliaryToAuxiliary);
        }

        self.check_subgraph_rule(output, input)?;

        if output.slot.is_primary() && input.slot.is_primary() && self.reaches(input.node, output.node) {
            return Err(ConnectRejection::Cycle);
        }

        Ok(())
    }

    /// Connect two ports, returning false when the edge is not allowed
    ///
    /// Reconnecting an existing edge succeeds without changing anything.
    pub fn connect(&mut self, source: PortRef, target: PortRef) -> bool {
        match self.can_connect(source, target) {
            Ok(()) => {
                if !self.is_connected(source, target) {
                    self.link(source, target);
                    debug!("Connected {} <-> {}", source, target);
                }
                true
            }
            Err(reason) => {
                debug!("Rejected connection {} <-> {}: {}", source, target, reason);
                false
            }
        }
    }

    /// Remove the edge between two ports if present
    pub fn disconnect(&mut self, a: PortRef, b: PortRef) {
        if self.unlink(a, b) {
            debug!("Disconnected {} <-> {}", a, b);
        }
    }

    /// Remove every edge on all ports of a node
    pub fn disconnect_all(&mut self, node_id: NodeId) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        let mut severed = Vec::new();
        for slot in node.slots().collect::<Vec<_>>() {
            if let Some(port) = node.port_mut(slot) {
                for peer in port.take_connections() {
                    severed.push(peer);
                }
            }
        }
        for peer in &severed {
            if let Some(port) = self.nodes.get_mut(&peer.node).and_then(|n| n.port_mut(peer.slot)) {
                port.detach_node(node_id);
            }
        }
        if !severed.is_empty() {
            debug!("Severed {} edge(s) of node #{}", severed.len(), node_id);
        }
    }

    /// Set the transient highlight flag of a port
    pub fn set_highlighted(&mut self, port: PortRef, highlighted: bool) {
        if let Some(p) = self.nodes.get_mut(&port.node).and_then(|n| n.port_mut(port.slot)) {
            p.highlighted = highlighted;
        }
    }

    /// Clone the given nodes, offset by `offset`, keeping only the edges
    /// whose both ends are part of the selection
    pub fn duplicate_nodes(&mut self, ids: &[NodeId], offset: Vec2) -> Vec<NodeId> {
        let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
        let mut copies = Vec::new();
        for &id in ids {
            if mapping.contains_key(&id) {
                continue;
            }
            let Some(original) = self.node(id) else {
                continue;
            };
            let mut copy = original.clone();
            copy.position += offset;
            let new_id = self.add_node(copy);
            mapping.insert(id, new_id);
            copies.push(new_id);
        }

        // Only outgoing sides are walked so each edge is replayed once
        let mut edges = Vec::new();
        for (&old, &new) in &mapping {
            let Some(node) = self.node(old) else { continue };
            for slot in node.slots() {
                let Some(port) = node.port(slot) else { continue };
                if !port.is_output() {
                    continue;
                }
                for peer in port.connections() {
                    if let Some(&peer_new) = mapping.get(&peer.node) {
                        edges.push((PortRef::new(new, slot), PortRef::new(peer_new, peer.slot)));
                    }
                }
            }
        }
        edges.sort();
        for (from, to) in edges {
            self.connect(from, to);
        }
        info!("Duplicated {} node(s)", copies.len());
        copies
    }

    /// Register an edge on both ports
    fn link(&mut self, a: PortRef, b: PortRef) {
        if let Some(port) = self.nodes.get_mut(&a.node).and_then(|n| n.port_mut(a.slot)) {
            port.attach(b);
        }
        if let Some(port) = self.nodes.get_mut(&b.node).and_then(|n| n.port_mut(b.slot)) {
            port.attach(a);
        }
    }

    /// Remove an edge from both ports, returning whether it existed
    fn unlink(&mut self, a: PortRef, b: PortRef) -> bool {
        let mut removed = false;
        if let Some(port) = self.nodes.get_mut(&a.node).and_then(|n| n.port_mut(a.slot)) {
            removed |= port.detach(b);
        }
        if let Some(port) = self.nodes.get_mut(&b.node).and_then(|n| n.port_mut(b.slot)) {
            removed |= port.detach(a);
        }
        removed
    }
}

impl Default for NodeGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::port::PortSlot;

    fn chain(graph: &mut NodeGraph, types: &[&str]) -> Vec<NodeId> {
        let ids: Vec<NodeId> = types
            .iter()
            .map(|t| graph.create_node(t, Vec2::ZERO))
            .collect();
        for pair in ids.windows(2) {
            assert!(graph.connect(PortRef::output(pair[0]), PortRef::input(pair[1])));
        }
        ids
    }

    #[test]
    fn test_connect_is_symmetric() {
        let mut graph = NodeGraph::new();
        let ids = chain(&mut graph, &["LayerDense", "LayerActivation"]);
        let a = graph.node(ids[0]).unwrap();
        let b = graph.node(ids[1]).unwrap();
        assert_eq!(a.output().connections(), &[PortRef::input(ids[1])]);
        assert_eq!(b.input().connections(), &[PortRef::output(ids[0])]);
    }

    #[test]
    fn test_connect_rejects_self_and_same_node() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        assert!(!graph.connect(PortRef::output(a), PortRef::output(a)));
        assert!(!graph.connect(PortRef::output(a), PortRef::input(a)));
        assert!(!graph.node(a).unwrap().has_connections());
        assert_eq!(
            graph.can_connect(PortRef::output(a), PortRef::input(a)),
            Err(ConnectRejection::SameNode)
        );
    }

    #[test]
    fn test_connect_rejects_same_direction() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        let b = graph.create_node("LayerDense", Vec2::ZERO);
        assert!(!graph.connect(PortRef::input(a), PortRef::input(b)));
        assert!(!graph.connect(PortRef::output(a), PortRef::output(b)));
    }

    #[test]
    fn test_connect_accepts_either_order_and_is_idempotent() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        let b = graph.create_node("LayerDense", Vec2::ZERO);
        assert!(graph.connect(PortRef::input(b), PortRef::output(a)));
        assert!(graph.connect(PortRef::output(a), PortRef::input(b)));
        assert_eq!(graph.node(a).unwrap().output().connections().len(), 1);
        assert_eq!(graph.node(b).unwrap().input().connections().len(), 1);
    }

    #[test]
    fn test_connect_rejects_cycle() {
        let mut graph = NodeGraph::new();
        let ids = chain(&mut graph, &["LayerDense", "LayerDense", "LayerDense"]);
        assert_eq!(
            graph.can_connect(PortRef::output(ids[2]), PortRef::input(ids[0])),
            Err(ConnectRejection::Cycle)
        );
        assert!(!graph.connect(PortRef::output(ids[2]), PortRef::input(ids[0])));
    }

    #[test]
    fn test_unknown_port_is_rejected() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        let b = graph.create_node("LayerDense", Vec2::ZERO);
        assert!(!graph.connect(PortRef::aux(a, 0), PortRef::input(b)));
        assert!(!graph.connect(PortRef::output(a), PortRef::input(99)));
    }

    #[test]
    fn test_disconnect_and_disconnect_all() {
        let mut graph = NodeGraph::new();
        let ids = chain(&mut graph, &["LayerDense", "LayerDense", "LayerDense"]);
        graph.disconnect(PortRef::output(ids[0]), PortRef::input(ids[1]));
        graph.disconnect(PortRef::output(ids[0]), PortRef::input(ids[1]));
        assert!(!graph.node(ids[0]).unwrap().has_connections());

        graph.disconnect_all(ids[1]);
        assert!(!graph.node(ids[1]).unwrap().has_connections());
        assert!(!graph.node(ids[2]).unwrap().has_connections());
    }

    #[test]
    fn test_remove_node_leaves_no_dangling_edges() {
        let mut graph = NodeGraph::new();
        let ids = chain(&mut graph, &["LayerDense", "LayerDense", "LayerDense"]);
        assert!(graph.remove_node(ids[1]).is_some());
        assert!(graph.node(ids[1]).is_none());
        for id in [ids[0], ids[2]] {
            assert!(!graph.node(id).unwrap().has_connections());
        }
        // Ids are never reused
        let fresh = graph.create_node("LayerDense", Vec2::ZERO);
        assert_eq!(fresh, 3);
    }

    #[test]
    fn test_special_nodes_get_aux_ports() {
        let mut graph = NodeGraph::new();
        let rnn = graph.create_node("LayerLSTM", Vec2::ZERO);
        let dense = graph.create_node("LayerDense", Vec2::ZERO);
        assert_eq!(graph.node(rnn).unwrap().aux_ports().len(), 3);
        assert!(graph.node(dense).unwrap().aux_ports().is_empty());
        assert_eq!(graph.port_type(PortRef::aux(rnn, 2)), Some(PortType::Input));
        assert_eq!(graph.port_type(PortRef::new(rnn, PortSlot::Aux(3))), None);
    }

    #[test]
    fn test_duplicate_keeps_internal_edges_only() {
        let mut graph = NodeGraph::new();
        let ids = chain(&mut graph, &["LayerDense", "LayerActivation", "LayerDense"]);
        graph.node_mut(ids[0]).unwrap().float_params = vec![16.0];

        let copies = graph.duplicate_nodes(&ids[..2], Vec2::new(50.0, 0.0));
        assert_eq!(copies.len(), 2);
        let first = graph.node(copies[0]).unwrap();
        assert_eq!(first.float_params, vec![16.0]);
        assert_eq!(first.position, Vec2::new(50.0, 0.0));
        assert!(!first.input().is_connected());
        assert_eq!(first.output().connections(), &[PortRef::input(copies[1])]);
        assert!(!graph.node(copies[1]).unwrap().output().is_connected());
        // Originals untouched
        assert_eq!(graph.node(ids[1]).unwrap().output().connections().len(), 1);
    }

    #[test]
    fn test_highlight_flag() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        graph.set_highlighted(PortRef::output(a), true);
        assert!(graph.node(a).unwrap().output().highlighted);
    }

    #[test]
    fn test_insert_with_last_id_keeps_counter() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        let last = graph.insert_node_with_id(NodeId::MAX, Node::new(0, "LayerDense", Vec2::ZERO));
        assert_eq!(last, NodeId::MAX);
        let b = graph.create_node("LayerDense", Vec2::ZERO);
        assert_eq!(b, a + 1);
        assert_eq!(graph.node_ids().count(), 3);
    }
}
