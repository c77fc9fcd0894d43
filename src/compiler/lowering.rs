//! Lowering of composite layer trees into a native engine

use super::{AuxLink, CompositeKind, CompositeLayer, GraphCompiler};
use crate::engine::{AuxBinding, EngineError, LayerEngine};
use crate::error::BuildError;
use crate::nodes::{NodeGraph, NodeId};
use log::info;
use std::collections::HashMap;

/// Handles created so far, by the node they stand for
type NodeHandles<H> = HashMap<NodeId, H>;

/// Instantiate a compiled forest in the engine and append the top-level
/// layers to its network in order
pub fn lower<E: LayerEngine>(forest: &[CompositeLayer], engine: &mut E) -> Result<Vec<E::Handle>, BuildError> {
    let mut created = NodeHandles::new();
    let handles = lower_sequence(forest, engine, &mut created)?;
    for handle in &handles {
        engine.add_layer(handle.clone()).map_err(|source| BuildError::Engine {
            step: format!("adding layer {:?} to the network", handle),
            source,
        })?;
    }
    info!("Lowered {} top-level layer(s) into the engine", handles.len());
    Ok(handles)
}

/// Compile the graph and lower the result; nothing reaches the engine when
/// compilation fails
pub fn build_network<E: LayerEngine>(
    compiler: &GraphCompiler,
    graph: &NodeGraph,
    engine: &mut E,
) -> Result<Vec<E::Handle>, BuildError> {
    let forest = compiler.compile(graph)?;
    lower(&forest, engine)
}

fn lower_sequence<E: LayerEngine>(
    layers: &[CompositeLayer],
    engine: &mut E,
    created: &mut NodeHandles<E::Handle>,
) -> Result<Vec<E::Handle>, BuildError> {
    let mut handles = Vec::new();
    for layer in layers {
        handles.extend(lower_layer(layer, engine, created)?);
    }
    Ok(handles)
}

/// Handles for one composite layer, in execution order
fn lower_layer<E: LayerEngine>(
    layer: &CompositeLayer,
    engine: &mut E,
    created: &mut NodeHandles<E::Handle>,
) -> Result<Vec<E::Handle>, BuildError> {
    match &layer.kind {
        CompositeKind::Layer {
            node,
            float_params,
            string_params,
            inner,
            aux_links,
        } => {
            let result = if inner.is_empty() && aux_links.is_empty() {
                engine.create_layer(&layer.layer_type, float_params, string_params)
            } else {
                let inner_handles = lower_sequence(inner, engine, created)?;
                let bindings = bind_aux_links(aux_links, created, *node)?;
                engine.create_special(&layer.layer_type, float_params, string_params, &inner_handles, &bindings)
            };
            let handle = result.map_err(|source| BuildError::Engine {
                step: format!("creating layer '{}' for node #{}", layer.layer_type, node),
                source,
            })?;
            created.insert(*node, handle.clone());

            let mut handles = vec![handle];
            handles.extend(lower_sequence(&layer.children, engine, created)?);
            Ok(handles)
        }
        CompositeKind::Sequential => lower_sequence(&layer.children, engine, created),
        CompositeKind::Parallel { reduction, merge_node } => {
            let mut branches = Vec::with_capacity(layer.children.len());
            for branch in &layer.children {
                branches.push(lower_layer(branch, engine, created)?);
            }
            let handle = engine
                .create_merge(reduction.name(), &branches)
                .map_err(|source| BuildError::Engine {
                    step: format!("creating {} merge of {} branch(es)", reduction, branches.len()),
                    source,
                })?;
            if let Some(merge) = merge_node {
                created.insert(*merge, handle.clone());
            }
            Ok(vec![handle])
        }
    }
}

/// Resolve the aux links of a special layer against the inner handles
fn bind_aux_links<H: Clone>(
    links: &[AuxLink],
    created: &NodeHandles<H>,
    special: NodeId,
) -> Result<Vec<AuxBinding<H>>, BuildError> {
    links
        .iter()
        .map(|link| {
            let handle = created.get(&link.node).cloned().ok_or_else(|| BuildError::Engine {
                step: format!("binding aux port {} of node #{}", link.port, special),
                source: EngineError::Rejected(format!("node #{} has no layer", link.node)),
            })?;
            Ok(AuxBinding {
                port: link.port,
                role: link.role,
                handle,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCapabilities, EngineOp, RecordingEngine};
    use crate::error::CompileError;
    use crate::nodes::{AuxRole, PortRef};
    use glam::Vec2;

    fn link(graph: &mut NodeGraph, from: NodeId, to: NodeId) {
        assert!(graph.connect(PortRef::output(from), PortRef::input(to)));
    }

    #[test]
    fn test_chain_lowers_to_flat_sequence() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        let b = graph.create_node("LayerSoftmax", Vec2::ZERO);
        link(&mut graph, a, b);

        let mut engine = RecordingEngine::new();
        let handles = build_network(&GraphCompiler::default(), &graph, &mut engine).unwrap();
        assert_eq!(handles, vec![0, 1]);
        assert_eq!(engine.added(), vec![0, 1]);
        assert_eq!(engine.layer_type(1), Some("LayerSoftmax"));
    }

    #[test]
    fn test_merge_created_after_branches() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        let b = graph.create_node("LayerDense", Vec2::ZERO);
        let c = graph.create_node("LayerDense", Vec2::ZERO);
        let m = graph.create_node("LayerParallelSum", Vec2::ZERO);
        link(&mut graph, a, b);
        link(&mut graph, a, c);
        link(&mut graph, b, m);
        link(&mut graph, c, m);

        let mut engine = RecordingEngine::new();
        build_network(&GraphCompiler::default(), &graph, &mut engine).unwrap();
        let merge = engine
            .ops()
            .iter()
            .find_map(|op| match op {
                EngineOp::CreateMerge { handle, reduction, branches } => {
                    Some((*handle, reduction.clone(), branches.clone()))
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(merge.1, "sum");
        assert_eq!(merge.2, vec![vec![1], vec![2]]);
        assert!(merge.2.iter().flatten().all(|&h| h < merge.0));
        assert_eq!(engine.added(), vec![0, merge.0]);
    }

    #[test]
    fn test_special_layer_wraps_inner_handles() {
        let mut graph = NodeGraph::new();
        let rnn = graph.create_node("LayerLSTM", Vec2::ZERO);
        let head = graph.create_node("LayerDense", Vec2::ZERO);
        let cell = graph.create_node("LayerDense", Vec2::ZERO);
        link(&mut graph, rnn, head);
        assert!(graph.connect(PortRef::aux(rnn, 1), PortRef::input(cell)));
        assert!(graph.connect(PortRef::output(cell), PortRef::aux(rnn, 2)));

        let mut engine = RecordingEngine::new();
        build_network(&GraphCompiler::default(), &graph, &mut engine).unwrap();
        assert_eq!(
            engine.ops()[1],
            EngineOp::CreateLayer {
                handle: 1,
                layer_type: "LayerLSTM".to_string(),
                float_params: Vec::new(),
                string_params: Vec::new(),
                inner: vec![0],
                bindings: vec![
                    AuxBinding {
                        port: 1,
                        role: AuxRole::Mirror,
                        handle: 0,
                    },
                    AuxBinding {
                        port: 2,
                        role: AuxRole::Pass,
                        handle: 0,
                    },
                ],
            }
        );
        assert_eq!(engine.added(), vec![1, 2]);
    }

    #[test]
    fn test_engine_failure_names_the_node() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        let b = graph.create_node("LayerSoftmax", Vec2::ZERO);
        link(&mut graph, a, b);

        let mut caps = EngineCapabilities::default();
        caps.layer_types.insert("LayerDense".to_string());
        let mut engine = RecordingEngine::with_capabilities(caps);
        let err = build_network(&GraphCompiler::default(), &graph, &mut engine).unwrap_err();
        match err {
            BuildError::Engine { step, source } => {
                assert_eq!(step, format!("creating layer 'LayerSoftmax' for node #{}", b));
                assert_eq!(source, EngineError::UnknownLayerType("LayerSoftmax".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(engine.added().is_empty());
    }

    #[test]
    fn test_compile_error_stops_before_engine() {
        let mut graph = NodeGraph::new();
        graph.create_node("LayerDense", Vec2::ZERO);
        let mut engine = RecordingEngine::new();
        let err = build_network(&GraphCompiler::default(), &graph, &mut engine).unwrap_err();
        assert!(matches!(err, BuildError::Compile(_)));
        assert!(engine.ops().is_empty());
    }

    #[test]
    fn test_unsupported_topology_stops_before_engine() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        let b = graph.create_node("LayerDense", Vec2::ZERO);
        let x = graph.create_node("LayerParallelSum", Vec2::ZERO);
        let y = graph.create_node("LayerParallelConcat", Vec2::ZERO);
        for (from, to) in [(a, x), (b, x), (a, y), (b, y)] {
            link(&mut graph, from, to);
        }

        let mut engine = RecordingEngine::new();
        let err = build_network(&GraphCompiler::default(), &graph, &mut engine).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Compile(CompileError::UnsupportedTopology { .. })
        ));
        assert!(engine.ops().is_empty());
    }

    #[test]
    fn test_unmerged_inputs_lower_into_one_merge() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        let a_out = graph.create_node("LayerSoftmax", Vec2::ZERO);
        let b = graph.create_node("LayerDense", Vec2::ZERO);
        let b_out = graph.create_node("LayerSoftmax", Vec2::ZERO);
        link(&mut graph, a, a_out);
        link(&mut graph, b, b_out);

        let mut engine = RecordingEngine::new();
        let handles = build_network(&GraphCompiler::default(), &graph, &mut engine).unwrap();
        let merges: Vec<_> = engine
            .ops()
            .iter()
            .filter_map(|op| match op {
                EngineOp::CreateMerge { handle, reduction, branches } => {
                    Some((*handle, reduction.clone(), branches.clone()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(merges, vec![(4, "concat".to_string(), vec![vec![0, 1], vec![2, 3]])]);
        assert_eq!(handles, vec![4]);
        assert_eq!(engine.added(), vec![4]);
    }
}
