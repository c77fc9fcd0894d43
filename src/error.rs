//! Error types for compilation, lowering, persistence and configuration
//!
//! Structural problems with a network are reported as diagnostics in a
//! [`ValidationReport`]. The errors here are hard failures that stop an
//! operation.

use crate::engine::EngineError;
use crate::nodes::{ConnectRejection, NodeId, PortRef, PortSlot, ValidationReport};
use thiserror::Error;

/// Compilation failure
#[derive(Error, Debug)]
pub enum CompileError {
    /// The network failed validation; the report holds every diagnostic
    #[error("Invalid network structure: {}", .0.summary())]
    InvalidNetwork(ValidationReport),

    #[error("Network has no input nodes")]
    NoInputs,

    /// The graph is valid but cannot be written as nested sequential and
    /// parallel groups, for example when one branch feeds two merges
    #[error("Network topology at node #{node} cannot be expressed as a layer tree: {reason}")]
    UnsupportedTopology { node: NodeId, reason: String },
}

/// Failure while building a network in an engine
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The engine refused a step; `step` names the layer being built
    #[error("Engine failed while {step}: {source}")]
    Engine {
        step: String,
        #[source]
        source: EngineError,
    },
}

/// Failure while saving or loading a network document
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection {index} references missing node index {node}")]
    MissingNode { index: usize, node: usize },

    #[error("Connection {index} references missing port {slot:?} on node index {node}")]
    MissingPort {
        index: usize,
        node: usize,
        slot: PortSlot,
    },

    #[error("Connection {index} ({from} -> {to}) was rejected: {reason}")]
    RejectedConnection {
        index: usize,
        from: PortRef,
        to: PortRef,
        reason: ConnectRejection,
    },

    #[error("Node id {0} appears more than once")]
    DuplicateNodeId(NodeId),

    #[error("Node id {0} is out of range")]
    InvalidNodeId(NodeId),
}

/// Failure while loading configuration or capability files
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
