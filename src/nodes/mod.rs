//! Node system - network graph data structures, edge rules and validation

pub mod catalog;
pub mod graph;
pub mod node;
pub mod port;
pub mod traversal;
pub mod validation;

// Re-export core types
pub use catalog::{AuxPortSpec, AuxRole, LayerCatalog, LayerTypeInfo, Reduction, SpecialKind};
pub use graph::{ConnectRejection, NodeGraph};
pub use node::{Node, NodeId, NodeKind};
pub use port::{Port, PortRef, PortSlot, PortType};
pub use validation::{Diagnostic, Severity, ValidationReport};
