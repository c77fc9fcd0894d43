//! Composite layer tree produced by the compiler

use crate::constants;
use crate::nodes::{AuxRole, Node, NodeId, Reduction};
use serde::Serialize;
use std::fmt;

/// What a composite layer stands for
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompositeKind {
    /// A real layer backed by a graph node
    Layer {
        node: NodeId,
        float_params: Vec<f32>,
        string_params: Vec<String>,
        /// Compiled internal subgraph of a special node
        inner: Vec<CompositeLayer>,
        /// Which inner nodes each auxiliary port is wired to
        aux_links: Vec<AuxLink>,
    },
    /// Structural chain; an empty one is an identity branch
    Sequential,
    /// Structural group of branches combined by a reduction
    Parallel {
        reduction: Reduction,
        /// Convergence node absorbed by this group
        merge_node: Option<NodeId>,
    },
}

/// Edge between an auxiliary port of a special layer and a node of its
/// internal subgraph
///
/// For output roles (`Feedback`, `Mirror`) the node is a subgraph head fed
/// by the port. For input roles it is the node whose output the port takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuxLink {
    pub port: usize,
    pub role: AuxRole,
    pub node: NodeId,
}

/// One node of the compiled layer tree
///
/// Children of a node-backed layer follow it in sequence. Children of a
/// parallel layer are its branches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeLayer {
    pub layer_type: String,
    #[serde(flatten)]
    pub kind: CompositeKind,
    pub children: Vec<CompositeLayer>,
}

impl CompositeLayer {
    /// Layer carrying a node's type and parameters
    pub fn from_node(node: &Node, inner: Vec<CompositeLayer>) -> Self {
        Self {
            layer_type: node.layer_type.clone(),
            kind: CompositeKind::Layer {
                node: node.id,
                float_params: node.float_params.clone(),
                string_params: node.string_params.clone(),
                inner,
                aux_links: Vec::new(),
            },
            children: Vec::new(),
        }
    }

    /// Attach the auxiliary wiring of a special layer
    pub fn with_aux_links(mut self, links: Vec<AuxLink>) -> Self {
        if let CompositeKind::Layer { aux_links, .. } = &mut self.kind {
            *aux_links = links;
        }
        self
    }

    pub fn sequential(children: Vec<CompositeLayer>) -> Self {
        Self {
            layer_type: constants::composite::SEQUENTIAL.to_string(),
            kind: CompositeKind::Sequential,
            children,
        }
    }

    pub fn parallel(
        reduction: Reduction,
        merge_node: Option<NodeId>,
        branches: Vec<CompositeLayer>,
    ) -> Self {
        Self {
            layer_type: constants::composite::PARALLEL.to_string(),
            kind: CompositeKind::Parallel {
                reduction,
                merge_node,
            },
            children: branches,
        }
    }

    /// Originating node, `None` for structural layers
    pub fn source(&self) -> Option<NodeId> {
        match &self.kind {
            CompositeKind::Layer { node, .. } => Some(*node),
            _ => None,
        }
    }

    pub fn reduction(&self) -> Option<&Reduction> {
        match &self.kind {
            CompositeKind::Parallel { reduction, .. } => Some(reduction),
            _ => None,
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self.kind, CompositeKind::Parallel { .. })
    }

    pub fn is_structural(&self) -> bool {
        self.source().is_none()
    }

    pub fn inner(&self) -> &[CompositeLayer] {
        match &self.kind {
            CompositeKind::Layer { inner, .. } => inner,
            _ => &[],
        }
    }

    pub fn aux_links(&self) -> &[AuxLink] {
        match &self.kind {
            CompositeKind::Layer { aux_links, .. } => aux_links,
            _ => &[],
        }
    }

    /// Every node id in the subtree, depth-first, inner subgraphs included
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut Vec<NodeId>) {
        if let Some(id) = self.source() {
            ids.push(id);
        }
        for layer in self.inner().iter().chain(&self.children) {
            layer.collect_ids(ids);
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match &self.kind {
            CompositeKind::Layer { node, .. } => writeln!(f, "{}{} #{}", indent, self.layer_type, node)?,
            CompositeKind::Sequential => writeln!(f, "{}{}", indent, self.layer_type)?,
            CompositeKind::Parallel {
                reduction,
                merge_node: Some(merge),
            } => writeln!(f, "{}{}({}) -> #{}", indent, self.layer_type, reduction, merge)?,
            CompositeKind::Parallel { reduction, .. } => {
                writeln!(f, "{}{}({})", indent, self.layer_type, reduction)?
            }
        }
        if !self.inner().is_empty() {
            writeln!(f, "{}  [inner]", indent)?;
            for link in self.aux_links() {
                writeln!(f, "{}    {:?} port {} <-> #{}", indent, link.role, link.port, link.node)?;
            }
            for layer in self.inner() {
                layer.write_tree(f, depth + 2)?;
            }
        }
        for child in &self.children {
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for CompositeLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn test_tree_rendering() {
        let a = Node::new(0, "LayerDense", Vec2::ZERO);
        let b = Node::new(1, "LayerSoftmax", Vec2::ZERO);
        let mut root = CompositeLayer::from_node(&a, Vec::new());
        root.children.push(CompositeLayer::parallel(
            Reduction::Sum,
            Some(7),
            vec![CompositeLayer::from_node(&b, Vec::new()), CompositeLayer::sequential(Vec::new())],
        ));
        assert_eq!(
            root.to_string(),
            "LayerDense #0\n  parallel(sum) -> #7\n    LayerSoftmax #1\n    sequential\n"
        );
        assert_eq!(root.node_ids(), vec![0, 1]);
        assert!(root.children[0].is_structural());
        assert_eq!(root.children[0].reduction(), Some(&Reduction::Sum));
    }

    #[test]
    fn test_special_rendering_lists_aux_links() {
        let rnn = Node::new(2, "LayerGRU", Vec2::ZERO);
        let cell = Node::new(3, "LayerDense", Vec2::ZERO);
        let layer = CompositeLayer::from_node(&rnn, vec![CompositeLayer::from_node(&cell, Vec::new())])
            .with_aux_links(vec![
                AuxLink {
                    port: 1,
                    role: AuxRole::Mirror,
                    node: 3,
                },
                AuxLink {
                    port: 2,
                    role: AuxRole::Pass,
                    node: 3,
                },
            ]);
        assert_eq!(
            layer.to_string(),
            "LayerGRU #2\n  [inner]\n    Mirror port 1 <-> #3\n    Pass port 2 <-> #3\n    LayerDense #3\n"
        );
        assert_eq!(layer.aux_links().len(), 2);
        assert!(CompositeLayer::sequential(Vec::new()).aux_links().is_empty());
    }
}
