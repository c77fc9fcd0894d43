//! Network documents - saving and loading graphs as JSON
//!
//! Connections are stored as pairs of node indices into the `nodes` array
//! plus port slots, and are replayed through [`NodeGraph::connect`] on load
//! so a document can never produce a graph the editor would refuse.

use crate::config::TrainSettings;
use crate::constants;
use crate::error::DocumentError;
use crate::nodes::{Node, NodeGraph, NodeId, PortRef, PortSlot};
use glam::Vec2;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Saved network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDocument {
    pub version: String,
    pub metadata: DocumentMetadata,
    pub nodes: Vec<NodeRecord>,
    pub connections: Vec<ConnectionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_settings: Option<TrainSettings>,
}

/// Metadata for saved documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub created: String,  // RFC 3339 timestamp
    pub modified: String, // RFC 3339 timestamp
    pub creator: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub layer_type: String,
    pub label: String,
    pub position: [f32; 2],
    #[serde(default)]
    pub string_params: Vec<String>,
    #[serde(default)]
    pub float_params: Vec<f32>,
}

/// One end of a saved connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Index into the document's `nodes`
    pub node: usize,
    pub slot: PortSlot,
}

/// Saved connection, always from an output port to an input port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub from: Endpoint,
    pub to: Endpoint,
}

impl DocumentMetadata {
    fn now(description: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            created: now.clone(),
            modified: now,
            creator: constants::document::CREATOR.to_string(),
            description: description.into(),
        }
    }
}

impl NetworkDocument {
    /// Snapshot a graph
    pub fn from_graph(graph: &NodeGraph, train_settings: Option<TrainSettings>) -> Self {
        let index: HashMap<NodeId, usize> =
            graph.node_ids().enumerate().map(|(i, id)| (id, i)).collect();

        let nodes = graph
            .nodes()
            .map(|node| NodeRecord {
                id: node.id,
                layer_type: node.layer_type.clone(),
                label: node.label.clone(),
                position: [node.position.x, node.position.y],
                string_params: node.string_params.clone(),
                float_params: node.float_params.clone(),
            })
            .collect();

        // Edges are recorded from their output side only
        let mut connections = Vec::new();
        for node in graph.nodes() {
            for slot in node.slots() {
                let Some(port) = node.port(slot) else { continue };
                if !port.is_output() {
                    continue;
                }
                for peer in port.connections() {
                    if let (Some(&from), Some(&to)) = (index.get(&node.id), index.get(&peer.node)) {
                        connections.push(ConnectionRecord {
                            from: Endpoint { node: from, slot },
                            to: Endpoint {
                                node: to,
                                slot: peer.slot,
                            },
                        });
                    }
                }
            }
        }

        Self {
            version: constants::document::VERSION.to_string(),
            metadata: DocumentMetadata::now("Neural network topology"),
            nodes,
            connections,
            train_settings,
        }
    }

    /// Rebuild the graph, replaying every connection through `connect`
    pub fn into_graph(&self) -> Result<NodeGraph, DocumentError> {
        let mut graph = NodeGraph::new();
        let mut seen = HashSet::new();
        for record in &self.nodes {
            if record.id == NodeId::MAX {
                return Err(DocumentError::InvalidNodeId(record.id));
            }
            if !seen.insert(record.id) {
                return Err(DocumentError::DuplicateNodeId(record.id));
            }
            let position = Vec2::new(record.position[0], record.position[1]);
            let node = match graph.catalog().special_kind(&record.layer_type) {
                Some(kind) => Node::new_special(record.id, record.layer_type.as_str(), kind, position),
                None => Node::new(record.id, record.layer_type.as_str(), position),
            }
            .with_label(record.label.as_str())
            .with_string_params(record.string_params.iter().cloned())
            .with_float_params(record.float_params.clone());
            graph.insert_node_with_id(record.id, node);
        }

        for (index, connection) in self.connections.iter().enumerate() {
            let from = self.resolve(&graph, index, connection.from)?;
            let to = self.resolve(&graph, index, connection.to)?;
            if let Err(reason) = graph.can_connect(from, to) {
                return Err(DocumentError::RejectedConnection {
                    index,
                    from,
                    to,
                    reason,
                });
            }
            graph.connect(from, to);
        }
        debug!(
            "Rebuilt graph with {} node(s) and {} connection(s)",
            self.nodes.len(),
            self.connections.len()
        );
        Ok(graph)
    }

    fn resolve(&self, graph: &NodeGraph, index: usize, end: Endpoint) -> Result<PortRef, DocumentError> {
        let record = self.nodes.get(end.node).ok_or(DocumentError::MissingNode {
            index,
            node: end.node,
        })?;
        let exists = graph.node(record.id).is_some_and(|n| n.port(end.slot).is_some());
        if !exists {
            return Err(DocumentError::MissingPort {
                index,
                node: end.node,
                slot: end.slot,
            });
        }
        Ok(PortRef::new(record.id, end.slot))
    }

    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        std::fs::write(path, self.to_json()?)?;
        info!("Saved network to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let content = std::fs::read_to_string(path)?;
        let document = Self::from_json(&content)?;
        info!("Loaded network from {}", path.display());
        Ok(document)
    }
}

/// Tracks the file backing the network being edited
#[derive(Debug, Default)]
pub struct DocumentFile {
    /// Current file path (None if never saved)
    path: Option<PathBuf>,
    /// Whether the graph changed since the last save or load
    is_modified: bool,
    /// Creation time of the loaded document, kept across saves
    created: Option<String>,
}

impl DocumentFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.is_modified
    }

    pub fn mark_modified(&mut self) {
        self.is_modified = true;
    }

    /// File name with a trailing `*` when modified
    pub fn display_name(&self) -> String {
        let name = self
            .path
            .as_deref()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("Untitled");
        if self.is_modified {
            format!("{}*", name)
        } else {
            name.to_string()
        }
    }

    /// Save the graph to `path` and make it the current file
    pub fn save_as(
        &mut self,
        path: &Path,
        graph: &NodeGraph,
        train_settings: Option<TrainSettings>,
    ) -> Result<(), DocumentError> {
        let mut document = NetworkDocument::from_graph(graph, train_settings);
        if let Some(created) = &self.created {
            document.metadata.created = created.clone();
        }
        document.save(path)?;
        self.created = Some(document.metadata.created);
        self.path = Some(path.to_path_buf());
        self.is_modified = false;
        Ok(())
    }

    /// Save to the current path; `Ok(false)` when there is none yet
    pub fn save(
        &mut self,
        graph: &NodeGraph,
        train_settings: Option<TrainSettings>,
    ) -> Result<bool, DocumentError> {
        match self.path.clone() {
            Some(path) => self.save_as(&path, graph, train_settings).map(|_| true),
            None => Ok(false),
        }
    }

    /// Load a network and make `path` the current file
    pub fn open(&mut self, path: &Path) -> Result<(NodeGraph, Option<TrainSettings>), DocumentError> {
        let document = NetworkDocument::load(path)?;
        let graph = document.into_graph()?;
        self.created = Some(document.metadata.created);
        self.path = Some(path.to_path_buf());
        self.is_modified = false;
        Ok((graph, document.train_settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NodeGraph {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::new(10.0, 20.0));
        let rnn = graph.create_node("LayerGRU", Vec2::ZERO);
        let cell = graph.create_node("LayerDense", Vec2::ZERO);
        graph.node_mut(a).unwrap().float_params = vec![4.0, 8.0];
        assert!(graph.connect(PortRef::output(a), PortRef::input(rnn)));
        assert!(graph.connect(PortRef::aux(rnn, 1), PortRef::input(cell)));
        assert!(graph.connect(PortRef::output(cell), PortRef::aux(rnn, 2)));
        graph
    }

    #[test]
    fn test_round_trip_keeps_ids_and_edges() {
        let mut graph = sample();
        let gap = graph.create_node("LayerSoftmax", Vec2::ZERO);
        let tail = graph.create_node("LayerSoftmax", Vec2::ZERO);
        assert!(graph.connect(PortRef::output(1), PortRef::input(tail)));
        graph.remove_node(gap);
        let document = NetworkDocument::from_graph(&graph, None);
        let json = document.to_json().unwrap();
        let restored = NetworkDocument::from_json(&json).unwrap().into_graph().unwrap();

        assert_eq!(restored.node_ids().collect::<Vec<_>>(), graph.node_ids().collect::<Vec<_>>());
        assert_eq!(NetworkDocument::from_graph(&restored, None).connections, document.connections);
        assert_eq!(restored.validate_network(), graph.validate_network());
        assert_eq!(restored.node(0).unwrap().float_params, vec![4.0, 8.0]);
    }

    #[test]
    fn test_aux_edges_are_restored() {
        let graph = sample();
        let restored = NetworkDocument::from_graph(&graph, None).into_graph().unwrap();
        assert!(restored.is_connected(PortRef::aux(1, 1), PortRef::input(2)));
        assert!(restored.is_connected(PortRef::output(2), PortRef::aux(1, 2)));
        assert!(restored.is_captured(2));
    }

    #[test]
    fn test_rejected_connection_is_an_error() {
        let mut document = NetworkDocument::from_graph(&sample(), None);
        // closes a cycle with the first connection
        document.connections.push(ConnectionRecord {
            from: Endpoint {
                node: 1,
                slot: PortSlot::Output,
            },
            to: Endpoint {
                node: 0,
                slot: PortSlot::Input,
            },
        });
        let err = document.into_graph().unwrap_err();
        assert!(matches!(err, DocumentError::RejectedConnection { index: 3, .. }));
    }

    #[test]
    fn test_dangling_references() {
        let mut document = NetworkDocument::from_graph(&sample(), None);
        document.connections[0].to.node = 42;
        assert!(matches!(
            document.into_graph(),
            Err(DocumentError::MissingNode { index: 0, node: 42 })
        ));

        let mut document = NetworkDocument::from_graph(&sample(), None);
        document.connections[0].from.slot = PortSlot::Aux(5);
        assert!(matches!(
            document.into_graph(),
            Err(DocumentError::MissingPort { index: 0, .. })
        ));
    }

    #[test]
    fn test_out_of_range_node_id_is_an_error() {
        let mut document = NetworkDocument::from_graph(&sample(), None);
        document.nodes[2].id = NodeId::MAX;
        let json = document.to_json().unwrap();
        assert!(json.contains(&NodeId::MAX.to_string()));
        let err = NetworkDocument::from_json(&json).unwrap().into_graph().unwrap_err();
        assert!(matches!(err, DocumentError::InvalidNodeId(id) if id == NodeId::MAX));
    }

    #[test]
    fn test_document_file_save_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.json");
        let mut file = DocumentFile::new();
        assert_eq!(file.display_name(), "Untitled");
        assert!(!file.save(&sample(), None).unwrap());

        file.save_as(&path, &sample(), Some(TrainSettings::default())).unwrap();
        file.mark_modified();
        assert_eq!(file.display_name(), "net.json*");

        let mut reopened = DocumentFile::new();
        let (graph, settings) = reopened.open(&path).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(settings, Some(TrainSettings::default()));
        assert_eq!(reopened.display_name(), "net.json");
    }
}
