//! layerweave core library
//!
//! Neural network topology graphs with legal-edge rules and validation, and
//! a compiler that lowers them into sequential and parallel layer groups
//! for a native engine.

pub mod compiler;
pub mod config;
pub mod constants;
pub mod document;
pub mod engine;
pub mod error;
pub mod nodes;

// Re-export commonly used types
pub use compiler::{build_network, lower, AuxLink, CompositeKind, CompositeLayer, GraphCompiler};
pub use config::{CompilerConfig, TrainSettings};
pub use document::{DocumentFile, NetworkDocument};
pub use engine::{AuxBinding, EngineCapabilities, EngineError, LayerEngine, RecordingEngine};
pub use error::{BuildError, CompileError, ConfigError, DocumentError};
pub use nodes::{
    ConnectRejection, Node, NodeGraph, NodeId, PortRef, PortSlot, Reduction, ValidationReport,
};
