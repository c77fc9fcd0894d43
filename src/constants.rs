//! Crate-wide constants and default values
//!
//! Centralized location for names and tags shared by the graph, the compiler
//! and the persistence layer.

/// Primary port names
pub mod port {
    /// Name of every node's primary input port
    pub const INPUT: &str = "in";

    /// Name of every node's primary output port
    pub const OUTPUT: &str = "out";

    /// Recurrent feedback (previous time step) port
    pub const FEEDBACK: &str = "OUT t-1";

    /// Entry of a special node's internal subgraph
    pub const MIRROR: &str = "IN mirror";

    /// Exit of a special node's internal subgraph
    pub const PASS: &str = "OUT pass";

    /// Router gating input
    pub const EXPERTS_WEIGHT: &str = "experts weight";

    /// Router expert outputs
    pub const EXPERTS: &str = "experts";
}

/// Tags used for structural composite layers
pub mod composite {
    /// Type tag of a parallel branch group
    pub const PARALLEL: &str = "parallel";

    /// Type tag of a structural sequential chain
    pub const SEQUENTIAL: &str = "sequential";
}

/// Layer type tags with dedicated handling
pub mod layer {
    /// Generic merge layer whose reduction comes from its first string parameter
    pub const PARALLEL: &str = "LayerParallel";
}

/// Network document constants
pub mod document {
    /// Current document format version
    pub const VERSION: &str = "1.0";

    /// Creator string written into document metadata
    pub const CREATOR: &str = "layerweave 0.1";
}

/// Default reduction name used when a convergence node declares none
pub const DEFAULT_REDUCTION: &str = "concat";

/// Regularizer name meaning "no regularization"
pub const NO_REGULARIZER: &str = "None";
