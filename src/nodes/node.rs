//! Node types and core node functionality

use super::catalog::{AuxPortSpec, SpecialKind};
use super::port::{Port, PortSlot, PortType};
use crate::constants;
use glam::Vec2;

/// Unique identifier for a node
pub type NodeId = usize;

/// Type of node - plain layer or special node with auxiliary ports
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Regular single-input, single-output layer
    Plain,
    /// Layer that models internal substructure through auxiliary ports
    Special {
        kind: SpecialKind,
        aux_ports: Vec<Port>,
    },
}

/// One layer instance in the network graph
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    pub layer_type: String,
    pub position: Vec2,
    pub string_params: Vec<String>,
    pub float_params: Vec<f32>,
    pub(crate) input: Port,
    pub(crate) output: Port,
    pub(crate) kind: NodeKind,
}

impl Node {
    /// Creates a new plain node
    pub fn new(id: NodeId, layer_type: impl Into<String>, position: Vec2) -> Self {
        let layer_type = layer_type.into();
        Self {
            id,
            label: layer_type.clone(),
            layer_type,
            position,
            string_params: Vec::new(),
            float_params: Vec::new(),
            input: Port::new(constants::port::INPUT, PortType::Input),
            output: Port::new(constants::port::OUTPUT, PortType::Output),
            kind: NodeKind::Plain,
        }
    }

    /// Creates a new special node with the auxiliary ports of its kind
    pub fn new_special(
        id: NodeId,
        layer_type: impl Into<String>,
        kind: SpecialKind,
        position: Vec2,
    ) -> Self {
        let aux_ports = kind
            .aux_ports()
            .iter()
            .map(|spec: &AuxPortSpec| Port::new(spec.name, spec.port_type))
            .collect();
        Self {
            kind: NodeKind::Special { kind, aux_ports },
            ..Self::new(id, layer_type, position)
        }
    }

    pub fn with_string_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.string_params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_float_params(mut self, params: impl Into<Vec<f32>>) -> Self {
        self.float_params = params.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Check if this is a special node
    pub fn is_special(&self) -> bool {
        matches!(self.kind, NodeKind::Special { .. })
    }

    pub fn special_kind(&self) -> Option<SpecialKind> {
        match &self.kind {
            NodeKind::Special { kind, .. } => Some(*kind),
            NodeKind::Plain => None,
        }
    }

    /// Primary input port
    pub fn input(&self) -> &Port {
        &self.input
    }

    /// Primary output port
    pub fn output(&self) -> &Port {
        &self.output
    }

    /// Auxiliary ports, empty for plain nodes
    pub fn aux_ports(&self) -> &[Port] {
        match &self.kind {
            NodeKind::Special { aux_ports, .. } => aux_ports,
            NodeKind::Plain => &[],
        }
    }

    /// Look up a port by slot
    pub fn port(&self, slot: PortSlot) -> Option<&Port> {
        match slot {
            PortSlot::Input => Some(&self.input),
            PortSlot::Output => Some(&self.output),
            PortSlot::Aux(i) => self.aux_ports().get(i),
        }
    }

    pub(crate) fn port_mut(&mut self, slot: PortSlot) -> Option<&mut Port> {
        match slot {
            PortSlot::Input => Some(&mut self.input),
            PortSlot::Output => Some(&mut self.output),
            PortSlot::Aux(i) => match &mut self.kind {
                NodeKind::Special { aux_ports, .. } => aux_ports.get_mut(i),
                NodeKind::Plain => None,
            },
        }
    }

    /// Every slot this node owns, primary first
    pub fn slots(&self) -> impl Iterator<Item = PortSlot> {
        [PortSlot::Input, PortSlot::Output]
            .into_iter()
            .chain((0..self.aux_ports().len()).map(PortSlot::Aux))
    }

    /// Whether any port (primary or auxiliary) has an edge
    pub fn has_connections(&self) -> bool {
        self.input.is_connected()
            || self.output.is_connected()
            || self.aux_ports().iter().any(Port::is_connected)
    }

    /// Number of edges across all ports
    pub fn connection_count(&self) -> usize {
        self.input.connections().len()
            + self.output.connections().len()
            + self.aux_ports().iter().map(|p| p.connections().len()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_node_creation() {
        let node = Node::new(4, "LayerDense", Vec2::new(10.0, 20.0))
            .with_float_params([8.0, 4.0])
            .with_string_params(["relu"]);
        assert_eq!(node.label, "LayerDense");
        assert_eq!(node.input().name, "in");
        assert_eq!(node.output().name, "out");
        assert!(node.aux_ports().is_empty());
        assert!(node.port(PortSlot::Aux(0)).is_none());
        assert_eq!(node.slots().count(), 2);
        assert!(!node.has_connections());
    }

    #[test]
    fn test_special_node_creation() {
        let node = Node::new_special(1, "LayerRouter", SpecialKind::Router, Vec2::ZERO);
        assert!(node.is_special());
        assert_eq!(node.aux_ports().len(), 3);
        assert_eq!(node.port(PortSlot::Aux(1)).map(|p| p.port_type), Some(PortType::Input));
        assert_eq!(node.slots().count(), 5);
    }
}
