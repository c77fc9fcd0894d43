//! Interface to the native layer engine
//!
//! The compiler output is lowered into any [`LayerEngine`]. The engine owns
//! the layers it creates and hands back opaque handles.

pub mod capabilities;
pub mod recording;

pub use capabilities::{EngineCapabilities, LayerUsage};
pub use recording::{EngineOp, RecordingEngine};

use crate::nodes::AuxRole;
use std::fmt;
use thiserror::Error;

/// Failure reported by an engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("unknown layer type '{0}'")]
    UnknownLayerType(String),

    #[error("unknown reduction '{0}'")]
    UnknownReduction(String),

    #[error("handle {0} was not created by this engine")]
    UnknownHandle(String),

    #[error("{0}")]
    Rejected(String),
}

/// Auxiliary port of a special layer bound to an inner layer
#[derive(Debug, Clone, PartialEq)]
pub struct AuxBinding<H> {
    pub port: usize,
    pub role: AuxRole,
    pub handle: H,
}

/// Layer construction operations of a native engine
pub trait LayerEngine {
    type Handle: Clone + fmt::Debug;

    /// Create a plain layer
    fn create_layer(
        &mut self,
        layer_type: &str,
        float_params: &[f32],
        string_params: &[String],
    ) -> Result<Self::Handle, EngineError>;

    /// Create a special layer wrapping an already built internal sequence
    ///
    /// `bindings` tells which inner layers each auxiliary port feeds or
    /// reads from.
    fn create_special(
        &mut self,
        layer_type: &str,
        float_params: &[f32],
        string_params: &[String],
        inner: &[Self::Handle],
        bindings: &[AuxBinding<Self::Handle>],
    ) -> Result<Self::Handle, EngineError>;

    /// Create a merge over already built branches
    fn create_merge(
        &mut self,
        reduction: &str,
        branches: &[Vec<Self::Handle>],
    ) -> Result<Self::Handle, EngineError>;

    /// Append a layer to the network being built
    fn add_layer(&mut self, handle: Self::Handle) -> Result<(), EngineError>;
}
