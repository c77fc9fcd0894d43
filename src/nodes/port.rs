//! Port types and functionality for node connections

use super::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a port (input or output)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortType {
    Input,
    Output,
}

impl PortType {
    /// The direction a port must have to connect to this one
    pub fn opposite(self) -> Self {
        match self {
            PortType::Input => PortType::Output,
            PortType::Output => PortType::Input,
        }
    }
}

/// Which port of a node a reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PortSlot {
    /// Primary input
    Input,
    /// Primary output
    Output,
    /// Auxiliary port of a special node, by index
    Aux(usize),
}

impl PortSlot {
    /// Primary ports are the main input and output of a node
    pub fn is_primary(self) -> bool {
        !matches!(self, PortSlot::Aux(_))
    }

    pub fn is_auxiliary(self) -> bool {
        matches!(self, PortSlot::Aux(_))
    }
}

/// Stable identity of a port: owning node plus slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub slot: PortSlot,
}

impl PortRef {
    pub fn new(node: NodeId, slot: PortSlot) -> Self {
        Self { node, slot }
    }

    /// Primary input of a node
    pub fn input(node: NodeId) -> Self {
        Self::new(node, PortSlot::Input)
    }

    /// Primary output of a node
    pub fn output(node: NodeId) -> Self {
        Self::new(node, PortSlot::Output)
    }

    /// Auxiliary port of a special node
    pub fn aux(node: NodeId, index: usize) -> Self {
        Self::new(node, PortSlot::Aux(index))
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            PortSlot::Input => write!(f, "#{}.in", self.node),
            PortSlot::Output => write!(f, "#{}.out", self.node),
            PortSlot::Aux(i) => write!(f, "#{}.aux{}", self.node, i),
        }
    }
}

/// Represents a connection point on a node
///
/// The connected set is only ever changed by the owning graph, which keeps
/// both sides of every edge in step.
#[derive(Debug, Clone)]
pub struct Port {
    pub name: String,
    pub port_type: PortType,
    connected: Vec<PortRef>,
    /// Editor hover state, never persisted
    pub highlighted: bool,
}

impl Port {
    /// Creates a new unconnected port
    pub fn new(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            name: name.into(),
            port_type,
            connected: Vec::new(),
            highlighted: false,
        }
    }

    /// Checks if this port is an input
    pub fn is_input(&self) -> bool {
        matches!(self.port_type, PortType::Input)
    }

    /// Checks if this port is an output
    pub fn is_output(&self) -> bool {
        matches!(self.port_type, PortType::Output)
    }

    /// Ports this one is connected to, in connection order
    pub fn connections(&self) -> &[PortRef] {
        &self.connected
    }

    pub fn is_connected(&self) -> bool {
        !self.connected.is_empty()
    }

    pub fn is_connected_to(&self, other: PortRef) -> bool {
        self.connected.contains(&other)
    }

    pub(crate) fn attach(&mut self, other: PortRef) {
        if !self.connected.contains(&other) {
            self.connected.push(other);
        }
    }

    pub(crate) fn detach(&mut self, other: PortRef) -> bool {
        let before = self.connected.len();
        self.connected.retain(|p| *p != other);
        self.connected.len() != before
    }

    pub(crate) fn detach_node(&mut self, node: NodeId) {
        self.connected.retain(|p| p.node != node);
    }

    pub(crate) fn take_connections(&mut self) -> Vec<PortRef> {
        std::mem::take(&mut self.connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_is_idempotent() {
        let mut port = Port::new("in", PortType::Input);
        port.attach(PortRef::output(3));
        port.attach(PortRef::output(3));
        assert_eq!(port.connections().len(), 1);
        assert!(port.detach(PortRef::output(3)));
        assert!(!port.detach(PortRef::output(3)));
        assert!(!port.is_connected());
    }

    #[test]
    fn test_slot_kinds() {
        assert!(PortSlot::Input.is_primary());
        assert!(PortSlot::Aux(0).is_auxiliary());
        assert_eq!(PortType::Input.opposite(), PortType::Output);
        assert_eq!(PortRef::aux(2, 1).to_string(), "#2.aux1");
    }
}
