//! Structural validation of a network graph
//!
//! Validation never fails: every problem is reported as a [`Diagnostic`]
//! tagged error (blocks compilation) or warning (informational).

use super::graph::NodeGraph;
use super::node::NodeId;
use super::port::PortRef;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// One validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Node the finding is about, if any
    pub node: Option<NodeId>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, node: Option<NodeId>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            node,
        }
    }

    pub fn warning(message: impl Into<String>, node: Option<NodeId>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            node,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "error: {}", self.message),
            Severity::Warning => write!(f, "warning: {}", self.message),
        }
    }
}

/// Ordered collection of diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, message: impl Into<String>, node: Option<NodeId>) {
        self.push(Diagnostic::error(message, node));
    }

    pub fn warning(&mut self, message: impl Into<String>, node: Option<NodeId>) {
        self.push(Diagnostic::warning(message, node));
    }

    /// Append every diagnostic of another report
    pub fn extend(&mut self, other: ValidationReport) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Error messages joined into one line
    pub fn summary(&self) -> String {
        self.errors()
            .map(|d| d.message.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl NodeGraph {
    /// Check the whole network structure
    pub fn validate_network(&self) -> ValidationReport {
        let mut report = ValidationReport::new();

        for node in self.nodes() {
            if !node.has_connections() {
                report.error(format!("Node '{}' is disconnected", node.label), Some(node.id));
            }
        }

        let inputs = self.real_input_nodes();
        let outputs: HashSet<NodeId> = self.real_output_nodes().into_iter().collect();
        if inputs.is_empty() {
            report.error("Network has no input nodes", None);
        }
        if outputs.is_empty() {
            report.error("Network has no output nodes", None);
        }

        for &input in &inputs {
            if !self.reaches_any(input, &outputs) {
                report.error(
                    format!("Input node '{}' has no path to any output", self.label(input)),
                    Some(input),
                );
            }
        }

        for node in self.nodes() {
            let incoming = node.input().connections().len();
            if incoming > 1 && !self.catalog().is_merge(&node.layer_type) {
                report.error(
                    format!(
                        "Node '{}' receives {} inputs but type '{}' does not merge branches",
                        node.label, incoming, node.layer_type
                    ),
                    Some(node.id),
                );
            }
        }

        self.validate_special_subgraphs(&mut report);

        debug!(
            "Validated {} node(s): {} error(s), {} warning(s)",
            self.len(),
            report.errors().count(),
            report.warnings().count()
        );
        report
    }

    fn reaches_any(&self, start: NodeId, targets: &HashSet<NodeId>) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            if targets.contains(&current) {
                return true;
            }
            if visited.insert(current) {
                queue.extend(self.successors(current));
            }
        }
        false
    }

    fn validate_special_subgraphs(&self, report: &mut ValidationReport) {
        for (member, owners) in self.subgraph_membership() {
            if owners.len() > 1 {
                let names: Vec<String> = owners.iter().map(|&o| format!("'{}'", self.label(o))).collect();
                report.error(
                    format!(
                        "Node '{}' belongs to several special subgraphs: {}",
                        self.label(member),
                        names.join(", ")
                    ),
                    Some(member),
                );
            }
        }

        for special in self.nodes().filter(|n| n.is_special()) {
            let members = self.special_subgraph(special.id);
            for &member_id in &members {
                let Some(member) = self.node(member_id) else {
                    continue;
                };
                if !member.input().is_connected() {
                    report.error(
                        format!(
                            "Node '{}' inside the subgraph of '{}' has no input",
                            member.label, special.label
                        ),
                        Some(member_id),
                    );
                }
                if !member.output().is_connected() {
                    report.error(
                        format!(
                            "Node '{}' inside the subgraph of '{}' has no output",
                            member.label, special.label
                        ),
                        Some(member_id),
                    );
                }

                let outside: BTreeSet<NodeId> = member
                    .input()
                    .connections()
                    .iter()
                    .chain(member.output().connections())
                    .filter(|peer| !self.is_inside(special.id, &members, **peer))
                    .map(|peer| peer.node)
                    .collect();
                for other in outside {
                    report.error(
                        format!(
                            "Node '{}' inside the subgraph of '{}' is connected to '{}' outside it",
                            member.label,
                            special.label,
                            self.label(other)
                        ),
                        Some(member_id),
                    );
                }
            }
        }
    }

    /// A peer counts as inside when it is another member or one of the
    /// owning node's auxiliary ports
    fn is_inside(&self, special: NodeId, members: &BTreeSet<NodeId>, peer: PortRef) -> bool {
        if peer.node == special {
            return peer.slot.is_auxiliary();
        }
        members.contains(&peer.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn messages(report: &ValidationReport) -> Vec<String> {
        report.diagnostics.iter().map(|d| d.message.clone()).collect()
    }

    #[test]
    fn test_valid_chain_has_no_diagnostics() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        let b = graph.create_node("LayerActivation", Vec2::ZERO);
        assert!(graph.connect(PortRef::output(a), PortRef::input(b)));
        assert!(graph.validate_network().is_empty());
    }

    #[test]
    fn test_fresh_node_only_reports_disconnected() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        let b = graph.create_node("LayerDense", Vec2::ZERO);
        assert!(graph.connect(PortRef::output(a), PortRef::input(b)));
        let fresh = graph.create_node("LayerDropout", Vec2::ZERO);

        let report = graph.validate_network();
        assert_eq!(messages(&report), vec!["Node 'LayerDropout' is disconnected".to_string()]);
        assert_eq!(report.diagnostics[0].node, Some(fresh));
        assert_eq!(graph.real_input_nodes(), vec![a]);
        assert_eq!(graph.real_output_nodes(), vec![b]);
    }

    #[test]
    fn test_empty_network_reports_missing_io() {
        let graph = NodeGraph::new();
        let report = graph.validate_network();
        assert_eq!(
            messages(&report),
            vec!["Network has no input nodes", "Network has no output nodes"]
        );
        assert!(report.has_errors());
    }

    #[test]
    fn test_fan_in_requires_merge_type() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        let b = graph.create_node("LayerDense", Vec2::ZERO);
        let join = graph.create_node("LayerDense", Vec2::ZERO);
        assert!(graph.connect(PortRef::output(a), PortRef::input(join)));
        assert!(graph.connect(PortRef::output(b), PortRef::input(join)));

        let report = graph.validate_network();
        assert_eq!(report.errors().count(), 1);
        assert!(report.summary().contains("does not merge"));

        graph.node_mut(join).unwrap().layer_type = "LayerParallelConcat".to_string();
        assert!(graph.validate_network().is_empty());
    }

    #[test]
    fn test_special_subgraph_members_must_be_closed() {
        let mut graph = NodeGraph::new();
        let input = graph.create_node("LayerDense", Vec2::ZERO);
        let rnn = graph.create_node("LayerRNN", Vec2::ZERO);
        let output = graph.create_node("LayerDense", Vec2::ZERO);
        let inner = graph.create_node("LayerDense", Vec2::ZERO);
        assert!(graph.connect(PortRef::output(input), PortRef::input(rnn)));
        assert!(graph.connect(PortRef::output(rnn), PortRef::input(output)));
        assert!(graph.connect(PortRef::aux(rnn, 1), PortRef::input(inner)));

        let report = graph.validate_network();
        assert_eq!(
            messages(&report),
            vec!["Node 'LayerDense' inside the subgraph of 'LayerRNN' has no output"]
        );

        assert!(graph.connect(PortRef::output(inner), PortRef::aux(rnn, 2)));
        assert!(graph.validate_network().is_empty());
    }

    #[test]
    fn test_special_member_connected_outside() {
        let mut graph = NodeGraph::new();
        let input = graph.create_node("LayerDense", Vec2::ZERO);
        let stacked = graph.create_node("LayerStacked", Vec2::ZERO);
        let inner = graph.create_node("LayerParallelSum", Vec2::ZERO);
        let stray = graph.create_node("LayerActivation", Vec2::ZERO);
        assert!(graph.connect(PortRef::output(input), PortRef::input(stacked)));
        assert!(graph.connect(PortRef::aux(stacked, 0), PortRef::input(inner)));
        // Forward capture does not pull in nodes feeding a member
        assert!(graph.connect(PortRef::output(stray), PortRef::input(inner)));

        assert!(!graph.is_captured(stray));
        let report = graph.validate_network();
        assert!(report
            .errors()
            .any(|d| d.message.contains("outside it") && d.node == Some(inner)));
        assert!(report
            .errors()
            .any(|d| d.message.contains("has no output") && d.node == Some(inner)));
    }

    #[test]
    fn test_node_feeding_pass_port_is_captured() {
        let mut graph = NodeGraph::new();
        let a = graph.create_node("LayerDense", Vec2::ZERO);
        let stacked = graph.create_node("LayerStacked", Vec2::ZERO);
        let b = graph.create_node("LayerDense", Vec2::ZERO);
        assert!(graph.connect(PortRef::output(a), PortRef::aux(stacked, 1)));
        assert!(graph.connect(PortRef::output(stacked), PortRef::input(b)));

        assert!(graph.is_captured(a));
        assert_eq!(graph.real_input_nodes(), vec![stacked]);
        let report = graph.validate_network();
        assert_eq!(
            messages(&report),
            vec!["Node 'LayerDense' inside the subgraph of 'LayerStacked' has no input"]
        );
        assert_eq!(report.diagnostics[0].node, Some(a));
    }
}
