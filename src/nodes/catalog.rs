//! Layer type catalog with per-type metadata
//!
//! Every behavior that depends on a node's type tag (auxiliary ports,
//! merge/reduction semantics) is looked up here explicitly.

use super::port::PortType;
use crate::constants;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Operator combining the outputs of parallel branches
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    Sum,
    Average,
    Concat,
    /// Engine-specific reduction passed through by name
    Named(String),
}

impl Reduction {
    /// Parse a reduction from its engine name
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sum" => Reduction::Sum,
            "average" | "avg" | "mean" => Reduction::Average,
            "concat" | "concatenate" => Reduction::Concat,
            _ => Reduction::Named(name.trim().to_string()),
        }
    }

    /// Name understood by the native engine
    pub fn name(&self) -> &str {
        match self {
            Reduction::Sum => "sum",
            Reduction::Average => "average",
            Reduction::Concat => "concat",
            Reduction::Named(name) => name,
        }
    }
}

impl Default for Reduction {
    fn default() -> Self {
        Reduction::from_name(constants::DEFAULT_REDUCTION)
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Role of an auxiliary port inside a special node's substructure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxRole {
    /// Previous time step output fed back into the subgraph
    Feedback,
    /// Subgraph entry
    Mirror,
    /// Subgraph exit
    Pass,
    /// Router gating weights
    ExpertWeights,
    /// Router expert branches
    Experts,
}

/// Fixed description of one auxiliary port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxPortSpec {
    pub name: &'static str,
    pub port_type: PortType,
    pub role: AuxRole,
}

const fn aux(name: &'static str, port_type: PortType, role: AuxRole) -> AuxPortSpec {
    AuxPortSpec { name, port_type, role }
}

const RECURRENT_PORTS: [AuxPortSpec; 3] = [
    aux(constants::port::FEEDBACK, PortType::Output, AuxRole::Feedback),
    aux(constants::port::MIRROR, PortType::Output, AuxRole::Mirror),
    aux(constants::port::PASS, PortType::Input, AuxRole::Pass),
];

const WRAPPER_PORTS: [AuxPortSpec; 2] = [
    aux(constants::port::MIRROR, PortType::Output, AuxRole::Mirror),
    aux(constants::port::PASS, PortType::Input, AuxRole::Pass),
];

const ROUTER_PORTS: [AuxPortSpec; 3] = [
    aux(constants::port::MIRROR, PortType::Output, AuxRole::Mirror),
    aux(constants::port::EXPERTS_WEIGHT, PortType::Input, AuxRole::ExpertWeights),
    aux(constants::port::EXPERTS, PortType::Input, AuxRole::Experts),
];

/// Kinds of special nodes, each with a fixed auxiliary port layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialKind {
    Recurrent,
    Stacked,
    Repetitive,
    Router,
}

impl SpecialKind {
    /// Auxiliary ports in their fixed order
    pub fn aux_ports(self) -> &'static [AuxPortSpec] {
        match self {
            SpecialKind::Recurrent => &RECURRENT_PORTS,
            SpecialKind::Stacked | SpecialKind::Repetitive => &WRAPPER_PORTS,
            SpecialKind::Router => &ROUTER_PORTS,
        }
    }
}

/// Metadata for one layer type
#[derive(Debug, Clone, PartialEq)]
pub struct LayerTypeInfo {
    pub layer_type: String,
    pub description: String,
    /// Set for types that own auxiliary ports
    pub special: Option<SpecialKind>,
    /// Set for types that merge several incoming branches
    pub merges: bool,
    /// Reduction the type declares; merge types without one use the
    /// compiler's default
    pub reduction: Option<Reduction>,
}

impl LayerTypeInfo {
    /// Plain single-input layer
    pub fn plain(layer_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            layer_type: layer_type.into(),
            description: description.into(),
            special: None,
            merges: false,
            reduction: None,
        }
    }

    pub fn with_special(mut self, kind: SpecialKind) -> Self {
        self.special = Some(kind);
        self
    }

    /// Merge type with a fixed reduction
    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.merges = true;
        self.reduction = Some(reduction);
        self
    }

    /// Merge type whose reduction is chosen per node
    pub fn merging(mut self) -> Self {
        self.merges = true;
        self
    }

    pub fn is_merge(&self) -> bool {
        self.merges
    }
}

static BUILTIN: Lazy<LayerCatalog> = Lazy::new(|| {
    let mut catalog = LayerCatalog::new();
    for (name, description) in [
        ("LayerDense", "Fully connected layer with bias"),
        ("LayerDenseNoBias", "Fully connected layer without bias"),
        ("LayerBias", "Trainable bias"),
        ("LayerGlobalAffine", "Global scale and shift"),
        ("LayerActivation", "Element-wise activation"),
        ("LayerSoftmax", "Softmax"),
        ("LayerSoftmin", "Softmin"),
        ("LayerDropout", "Dropout regularization"),
        ("LayerGaussianNoise", "Additive gaussian noise"),
        ("LayerBatchNormalization", "Batch normalization"),
        ("LayerConvolution2D", "2D convolution"),
        ("LayerMaxPool2D", "2D max pooling"),
        ("LayerAveragePooling2D", "2D average pooling"),
        ("LayerZeroPadding2D", "2D zero padding"),
        ("LayerChannelBias", "Per-channel bias"),
    ] {
        catalog.register(LayerTypeInfo::plain(name, description));
    }

    for name in ["LayerRNN", "LayerSimpleRNN", "LayerSimplestRNN", "LayerGRU", "LayerLSTM"] {
        catalog.register(
            LayerTypeInfo::plain(name, "Recurrent layer").with_special(SpecialKind::Recurrent),
        );
    }
    catalog.register(
        LayerTypeInfo::plain("LayerStacked", "Stacks its inner subgraph")
            .with_special(SpecialKind::Stacked),
    );
    catalog.register(
        LayerTypeInfo::plain("LayerRepetitive", "Repeats its inner subgraph")
            .with_special(SpecialKind::Repetitive),
    );
    catalog.register(
        LayerTypeInfo::plain("LayerRouter", "Routes input across expert branches")
            .with_special(SpecialKind::Router),
    );

    catalog.register(
        LayerTypeInfo::plain(constants::layer::PARALLEL, "Merge with configurable reduction")
            .merging(),
    );
    catalog.register(
        LayerTypeInfo::plain("LayerParallelSum", "Sums parallel branches")
            .with_reduction(Reduction::Sum),
    );
    catalog.register(
        LayerTypeInfo::plain("LayerParallelAverage", "Averages parallel branches")
            .with_reduction(Reduction::Average),
    );
    catalog.register(
        LayerTypeInfo::plain("LayerParallelConcat", "Concatenates parallel branches")
            .with_reduction(Reduction::Concat),
    );
    catalog
});

/// Registry of known layer types
#[derive(Debug, Clone, Default)]
pub struct LayerCatalog {
    types: BTreeMap<String, LayerTypeInfo>,
}

impl LayerCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the layer types the editor ships with
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Register (or replace) a layer type
    pub fn register(&mut self, info: LayerTypeInfo) {
        self.types.insert(info.layer_type.clone(), info);
    }

    pub fn get(&self, layer_type: &str) -> Option<&LayerTypeInfo> {
        self.types.get(layer_type)
    }

    pub fn contains(&self, layer_type: &str) -> bool {
        self.types.contains_key(layer_type)
    }

    /// Special kind for a type tag; unknown tags are plain
    pub fn special_kind(&self, layer_type: &str) -> Option<SpecialKind> {
        self.get(layer_type).and_then(|info| info.special)
    }

    /// Whether nodes of this type may receive several primary inputs
    pub fn is_merge(&self, layer_type: &str) -> bool {
        self.get(layer_type).is_some_and(LayerTypeInfo::is_merge)
    }

    /// Reduction a node of this type declares
    ///
    /// The generic parallel layer takes its reduction from its first string
    /// parameter when one is given.
    pub fn reduction_for(&self, layer_type: &str, string_params: &[String]) -> Option<Reduction> {
        let info = self.get(layer_type)?;
        if layer_type == constants::layer::PARALLEL {
            if let Some(name) = string_params.first().filter(|s| !s.trim().is_empty()) {
                return Some(Reduction::from_name(name));
            }
        }
        info.reduction.clone()
    }

    /// All registered type tags in sorted order
    pub fn layer_types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}
