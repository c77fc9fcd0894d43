//! Graph compiler - lowers a validated network into a composite layer tree
//!
//! Expansion starts at the real input nodes and follows primary edges.
//! Fan-out is resolved by grouping the branch heads at their first
//! convergence points into parallel layers. Heads that never converge are
//! combined by a parallel layer with the default reduction. Special nodes
//! carry their compiled internal subgraph as `inner`, together with the
//! wiring of their auxiliary ports.
//!
//! Some valid graphs have no tree form, for example a branch that feeds two
//! different merges. Those fail with [`CompileError::UnsupportedTopology`]
//! instead of losing edges.

pub mod composite;
mod convergence;
pub mod lowering;

pub use composite::{AuxLink, CompositeKind, CompositeLayer};
pub use lowering::{build_network, lower};

use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::nodes::{NodeGraph, NodeId};
use log::{debug, info, warn};
use std::collections::HashSet;

/// Compiles node graphs with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct GraphCompiler {
    config: CompilerConfig,
}

impl GraphCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile the graph into a forest of composite layers
    pub fn compile(&self, graph: &NodeGraph) -> Result<Vec<CompositeLayer>, CompileError> {
        let report = graph.validate_network();
        if report.has_errors() {
            return Err(CompileError::InvalidNetwork(report));
        }
        for diagnostic in report.warnings() {
            warn!("{}", diagnostic);
        }

        let inputs = graph.real_input_nodes();
        if inputs.is_empty() {
            return Err(CompileError::NoInputs);
        }

        let input_count = inputs.len();
        let mut expansion = Expansion::new(graph, &self.config);
        let forest = expansion.expand_heads(inputs, None)?;
        info!(
            "Compiled {} node(s) from {} input(s) into {} top-level layer(s)",
            expansion.emitted.len(),
            input_count,
            forest.len()
        );
        Ok(forest)
    }
}

/// Branch head pending a merge, with the group already built in front of it
struct Head {
    node: NodeId,
    prefix: Option<CompositeLayer>,
}

impl Head {
    fn plain(node: NodeId) -> Self {
        Self { node, prefix: None }
    }
}

/// State of one compilation
struct Expansion<'g> {
    graph: &'g NodeGraph,
    config: &'g CompilerConfig,
    emitted: HashSet<NodeId>,
}

impl<'g> Expansion<'g> {
    fn new(graph: &'g NodeGraph, config: &'g CompilerConfig) -> Self {
        Self {
            graph,
            config,
            emitted: HashSet::new(),
        }
    }

    fn unsupported(&self, node: NodeId, reason: impl Into<String>) -> CompileError {
        let reason = reason.into();
        debug!("No tree form at {}: {}", self.graph.label(node), reason);
        CompileError::UnsupportedTopology { node, reason }
    }

    /// Composite layer for a node followed by everything downstream of it,
    /// stopping before `stop`
    fn expand_node(&mut self, id: NodeId, stop: Option<NodeId>) -> Result<Option<CompositeLayer>, CompileError> {
        if Some(id) == stop {
            return Ok(None);
        }
        let graph = self.graph;
        let Some(node) = graph.node(id) else {
            return Ok(None);
        };
        if !self.emitted.insert(id) {
            return Err(self.unsupported(id, "reached by branches that never meet in one group"));
        }
        let inputs = graph.predecessors(id).len();
        if inputs > 1 {
            return Err(self.unsupported(id, format!("its {} inputs do not arrive as one parallel group", inputs)));
        }

        let mut layer = if node.is_special() {
            let (inner, links) = self.expand_subgraph(id)?;
            CompositeLayer::from_node(node, inner).with_aux_links(links)
        } else {
            CompositeLayer::from_node(node, Vec::new())
        };
        layer.children = self.expand_successors(id, stop)?;
        Ok(Some(layer))
    }

    fn expand_successors(&mut self, id: NodeId, stop: Option<NodeId>) -> Result<Vec<CompositeLayer>, CompileError> {
        let successors = self.graph.successors(id);
        let next: Vec<NodeId> = successors.iter().copied().filter(|&n| Some(n) != stop).collect();
        if let Some(merge) = stop {
            // A branch has to end where it enters its merge
            if !next.is_empty() && next.len() < successors.len() {
                let reason = format!("{} feeds it and continues past it", self.graph.label(id));
                return Err(self.unsupported(merge, reason));
            }
        }
        self.expand_heads(next, stop)
    }

    /// Internal subgraph of a special node with the wiring of its auxiliary
    /// ports
    ///
    /// Heads are the nodes fed by auxiliary outputs. Heads that never meet
    /// stay separate entries of the inner list; the links say which port
    /// feeds each of them and which nodes the auxiliary inputs read from.
    fn expand_subgraph(&mut self, special: NodeId) -> Result<(Vec<CompositeLayer>, Vec<AuxLink>), CompileError> {
        let graph = self.graph;
        let Some(node) = graph.node(special) else {
            return Ok((Vec::new(), Vec::new()));
        };
        let specs = node.special_kind().map(|kind| kind.aux_ports()).unwrap_or_default();
        let mut heads = Vec::new();
        let mut links = Vec::new();
        for (index, (port, spec)) in node.aux_ports().iter().zip(specs).enumerate() {
            for peer in port.connections().iter().filter(|p| p.slot.is_primary()) {
                links.push(AuxLink {
                    port: index,
                    role: spec.role,
                    node: peer.node,
                });
                if port.is_output() && !heads.contains(&peer.node) {
                    heads.push(peer.node);
                }
            }
        }
        debug!(
            "Subgraph of {} has {} head(s) and {} aux link(s)",
            graph.label(special),
            heads.len(),
            links.len()
        );

        let inner = if heads.len() > 1 {
            self.converge(heads, None)?.into_iter().flatten().collect()
        } else {
            self.expand_heads(heads, None)?
        };
        Ok((inner, links))
    }

    /// Expand one head directly, or several through a merge
    fn expand_heads(&mut self, heads: Vec<NodeId>, stop: Option<NodeId>) -> Result<Vec<CompositeLayer>, CompileError> {
        match heads.len() {
            0 => Ok(Vec::new()),
            1 => Ok(self.expand_node(heads[0], stop)?.into_iter().collect()),
            _ => self.merge_heads(heads, stop),
        }
    }

    /// Expand several heads into a single sequence of layers
    ///
    /// Heads left over after grouping become the branches of a parallel
    /// layer with the default reduction. Inside a branch that runs up to a
    /// merge, leftover heads mean the branch splits on the way and there is
    /// no tree form for it.
    fn merge_heads(&mut self, heads: Vec<NodeId>, stop: Option<NodeId>) -> Result<Vec<CompositeLayer>, CompileError> {
        let mut chains = self.converge(heads, stop)?;
        chains.retain(|chain| !chain.is_empty());
        if chains.len() <= 1 {
            return Ok(chains.pop().unwrap_or_default());
        }
        if let Some(merge) = stop {
            return Err(self.unsupported(merge, "a branch into it splits before reaching it"));
        }
        debug!("{} unmerged branch(es) joined with the default reduction", chains.len());
        let branches = chains.into_iter().map(as_branch).collect();
        Ok(vec![CompositeLayer::parallel(
            self.config.default_reduction.clone(),
            None,
            branches,
        )])
    }

    /// Group heads at their convergence points until none remain, then
    /// expand what follows each remaining head
    fn converge(&mut self, heads: Vec<NodeId>, stop: Option<NodeId>) -> Result<Vec<Vec<CompositeLayer>>, CompileError> {
        let mut pending: Vec<Head> = heads.into_iter().map(Head::plain).collect();
        loop {
            let nodes: Vec<NodeId> = pending.iter().map(|h| h.node).collect();
            let points = convergence::first_convergence_points(self.graph, &nodes, stop);
            let mut consumed = vec![false; pending.len()];
            let mut groups: Vec<(usize, Head)> = Vec::new();

            for (point, members) in points {
                if let Some(&taken) = members.iter().find(|&&i| consumed[i]) {
                    let reason = format!("{} also feeds another merge", self.graph.label(pending[taken].node));
                    return Err(self.unsupported(point, reason));
                }
                let mut branches = Vec::with_capacity(members.len());
                for &i in &members {
                    consumed[i] = true;
                    let prefix = pending[i].prefix.take();
                    branches.push(self.branch(pending[i].node, prefix, point)?);
                }
                let group = self.parallel_group(point, branches)?;
                groups.push((
                    members[0],
                    Head {
                        node: point,
                        prefix: Some(group),
                    },
                ));
            }
            if groups.is_empty() {
                break;
            }

            let mut next = Vec::with_capacity(pending.len());
            for (i, head) in pending.into_iter().enumerate() {
                if let Some(pos) = groups.iter().position(|(first, _)| *first == i) {
                    next.push(groups.remove(pos).1);
                }
                if !consumed[i] {
                    next.push(head);
                }
            }
            pending = next;
        }

        let mut chains = Vec::with_capacity(pending.len());
        for head in pending {
            chains.push(self.chain(head, stop)?);
        }
        Ok(chains)
    }

    /// Layers from a head up to `stop`, its group first if it has one
    fn chain(&mut self, head: Head, stop: Option<NodeId>) -> Result<Vec<CompositeLayer>, CompileError> {
        match head.prefix {
            Some(group) => {
                let mut steps = vec![group];
                steps.extend(self.after_merge(head.node, stop)?);
                Ok(steps)
            }
            None => Ok(self.expand_node(head.node, stop)?.into_iter().collect()),
        }
    }

    /// One branch of a parallel group, running up to but excluding `until`
    fn branch(
        &mut self,
        node: NodeId,
        prefix: Option<CompositeLayer>,
        until: NodeId,
    ) -> Result<CompositeLayer, CompileError> {
        let steps = self.chain(Head { node, prefix }, Some(until))?;
        Ok(as_branch(steps))
    }

    /// What follows a parallel group that converged on `merge`
    ///
    /// A merge-typed node is absorbed by the group, so only its successors
    /// follow. Any other node follows the group as a regular layer.
    fn after_merge(&mut self, merge: NodeId, stop: Option<NodeId>) -> Result<Vec<CompositeLayer>, CompileError> {
        if Some(merge) == stop {
            return Ok(Vec::new());
        }
        let graph = self.graph;
        let Some(node) = graph.node(merge) else {
            return Ok(Vec::new());
        };
        if graph.catalog().is_merge(&node.layer_type) {
            if !self.emitted.insert(merge) {
                return Err(self.unsupported(merge, "closes two separate parallel groups"));
            }
            self.expand_successors(merge, stop)
        } else {
            Ok(self.expand_node(merge, stop)?.into_iter().collect())
        }
    }

    /// Parallel layer over `branches` converging on `point`
    ///
    /// Every edge into the point has to arrive as its own branch. An edge
    /// from an auxiliary port counts as the identity branch of a subgraph
    /// head.
    fn parallel_group(&self, point: NodeId, branches: Vec<CompositeLayer>) -> Result<CompositeLayer, CompileError> {
        let graph = self.graph;
        let catalog = graph.catalog();
        let node = graph.node(point);
        let aux_entry = node.is_some_and(|n| n.input().connections().iter().any(|p| p.slot.is_auxiliary()));
        let expected = graph.predecessors(point).len() + usize::from(aux_entry);
        if branches.len() != expected {
            return Err(self.unsupported(
                point,
                format!("{} of its {} inputs arrive as parallel branches", branches.len(), expected),
            ));
        }

        let reduction = node
            .and_then(|n| catalog.reduction_for(&n.layer_type, &n.string_params))
            .unwrap_or_else(|| self.config.default_reduction.clone());
        let absorbed = node.is_some_and(|n| catalog.is_merge(&n.layer_type));
        Ok(CompositeLayer::parallel(reduction, absorbed.then_some(point), branches))
    }
}

/// A single step as is, anything else as a sequential chain; no steps is
/// the identity branch
fn as_branch(mut steps: Vec<CompositeLayer>) -> CompositeLayer {
    match steps.len() {
        1 => steps.remove(0),
        _ => CompositeLayer::sequential(steps),
    }
}
