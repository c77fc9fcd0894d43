//! Engine that records every construction call

use super::{AuxBinding, EngineCapabilities, EngineError, LayerEngine};
use log::debug;

/// One recorded engine call
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOp {
    CreateLayer {
        handle: usize,
        layer_type: String,
        float_params: Vec<f32>,
        string_params: Vec<String>,
        inner: Vec<usize>,
        bindings: Vec<AuxBinding<usize>>,
    },
    CreateMerge {
        handle: usize,
        reduction: String,
        branches: Vec<Vec<usize>>,
    },
    AddLayer(usize),
}

/// Dry-run engine with integer handles
///
/// With capabilities attached it rejects layer types and reductions the
/// capabilities do not list.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    ops: Vec<EngineOp>,
    next_handle: usize,
    capabilities: Option<EngineCapabilities>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capabilities(capabilities: EngineCapabilities) -> Self {
        Self {
            capabilities: Some(capabilities),
            ..Self::default()
        }
    }

    pub fn ops(&self) -> &[EngineOp] {
        &self.ops
    }

    /// Handles appended to the network, in order
    pub fn added(&self) -> Vec<usize> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                EngineOp::AddLayer(handle) => Some(*handle),
                _ => None,
            })
            .collect()
    }

    /// Layer type recorded for a handle, `None` for merges
    pub fn layer_type(&self, handle: usize) -> Option<&str> {
        self.ops.iter().find_map(|op| match op {
            EngineOp::CreateLayer {
                handle: h,
                layer_type,
                ..
            } if *h == handle => Some(layer_type.as_str()),
            _ => None,
        })
    }

    fn check_layer_type(&self, layer_type: &str) -> Result<(), EngineError> {
        match &self.capabilities {
            Some(caps) if !caps.layer_types.contains(layer_type) => {
                Err(EngineError::UnknownLayerType(layer_type.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn check_handle(&self, handle: usize) -> Result<(), EngineError> {
        if handle < self.next_handle {
            Ok(())
        } else {
            Err(EngineError::UnknownHandle(handle.to_string()))
        }
    }

    fn allocate(&mut self) -> usize {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl LayerEngine for RecordingEngine {
    type Handle = usize;

    fn create_layer(
        &mut self,
        layer_type: &str,
        float_params: &[f32],
        string_params: &[String],
    ) -> Result<usize, EngineError> {
        self.create_special(layer_type, float_params, string_params, &[], &[])
    }

    fn create_special(
        &mut self,
        layer_type: &str,
        float_params: &[f32],
        string_params: &[String],
        inner: &[usize],
        bindings: &[AuxBinding<usize>],
    ) -> Result<usize, EngineError> {
        self.check_layer_type(layer_type)?;
        for &handle in inner.iter().chain(bindings.iter().map(|b| &b.handle)) {
            self.check_handle(handle)?;
        }
        let handle = self.allocate();
        debug!("Engine: layer {} = {}", handle, layer_type);
        self.ops.push(EngineOp::CreateLayer {
            handle,
            layer_type: layer_type.to_string(),
            float_params: float_params.to_vec(),
            string_params: string_params.to_vec(),
            inner: inner.to_vec(),
            bindings: bindings.to_vec(),
        });
        Ok(handle)
    }

    fn create_merge(&mut self, reduction: &str, branches: &[Vec<usize>]) -> Result<usize, EngineError> {
        if let Some(caps) = &self.capabilities {
            if !caps.reductions.is_empty() && !caps.reductions.contains(reduction) {
                return Err(EngineError::UnknownReduction(reduction.to_string()));
            }
        }
        for &handle in branches.iter().flatten() {
            self.check_handle(handle)?;
        }
        let handle = self.allocate();
        debug!("Engine: merge {} = {} over {} branch(es)", handle, reduction, branches.len());
        self.ops.push(EngineOp::CreateMerge {
            handle,
            reduction: reduction.to_string(),
            branches: branches.to_vec(),
        });
        Ok(handle)
    }

    fn add_layer(&mut self, handle: usize) -> Result<(), EngineError> {
        self.check_handle(handle)?;
        self.ops.push(EngineOp::AddLayer(handle));
        Ok(())
    }
}
