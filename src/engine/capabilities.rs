//! Lists of what a native engine offers, and checks of a network against them

use crate::config::TrainSettings;
use crate::error::ConfigError;
use crate::nodes::{NodeGraph, ValidationReport};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Names an engine accepts, as reported by the engine itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineCapabilities {
    pub layer_types: BTreeSet<String>,
    pub activations: BTreeSet<String>,
    pub initializers: BTreeSet<String>,
    pub reductions: BTreeSet<String>,
    pub losses: BTreeSet<String>,
    pub optimizers: BTreeSet<String>,
    pub regularizers: BTreeSet<String>,
    /// Raw usage text per layer type
    pub usage: BTreeMap<String, String>,
}

/// Parsed usage text of one layer type
///
/// The engine describes a layer as
/// `description\nstring descriptions;...\nnumeric descriptions;...`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerUsage {
    pub description: String,
    pub string_params: Vec<String>,
    /// `None` when the usage text has no numeric line
    pub float_params: Option<Vec<String>>,
}

impl LayerUsage {
    pub fn parse(text: &str) -> Self {
        let mut lines = text.split('\n');
        let description = lines.next().unwrap_or_default().trim().to_string();
        let string_params = lines.next().map(split_descriptions).unwrap_or_default();
        let float_params = lines.next().map(split_descriptions);
        Self {
            description,
            string_params,
            float_params,
        }
    }
}

fn split_descriptions(line: &str) -> Vec<String> {
    line.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl EngineCapabilities {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn usage_for(&self, layer_type: &str) -> Option<LayerUsage> {
        self.usage.get(layer_type).map(|text| LayerUsage::parse(text))
    }

    /// Check every node's type and parameters
    pub fn check_nodes(&self, graph: &NodeGraph) -> ValidationReport {
        let mut report = ValidationReport::new();
        for node in graph.nodes() {
            let layer_type = node.layer_type.as_str();
            if !self.layer_types.contains(layer_type) {
                report.error(
                    format!("Layer type '{}' is not available", layer_type),
                    Some(node.id),
                );
                continue;
            }
            let Some(usage) = self.usage_for(layer_type) else {
                continue;
            };

            for (desc, value) in usage.string_params.iter().zip(&node.string_params) {
                let desc = desc.to_lowercase();
                let missing = if desc.contains("activation") {
                    (!self.activations.contains(value)).then_some("Activation")
                } else if desc.contains("initializer") {
                    (!self.initializers.contains(value)).then_some("Initializer")
                } else if desc.contains("reduction") {
                    (!self.reductions.contains(value)).then_some("Reduction")
                } else {
                    None
                };
                if let Some(what) = missing {
                    report.error(
                        format!(
                            "{} '{}' is not available for layer '{}'",
                            what, value, layer_type
                        ),
                        Some(node.id),
                    );
                }
            }

            if let Some(expected) = &usage.float_params {
                if expected.len() != node.float_params.len() {
                    report.warning(
                        format!(
                            "Layer '{}' has {} numeric parameters but expects {}",
                            layer_type,
                            node.float_params.len(),
                            expected.len()
                        ),
                        Some(node.id),
                    );
                }
            }
        }
        report
    }

    /// Check loss, optimizer and regularizer names
    pub fn check_train_settings(&self, settings: &TrainSettings) -> ValidationReport {
        let mut report = ValidationReport::new();
        if !self.losses.contains(&settings.loss) {
            report.error(format!("Loss function '{}' is not available", settings.loss), None);
        }
        if !self.optimizers.contains(&settings.optimizer) {
            report.error(format!("Optimizer '{}' is not available", settings.optimizer), None);
        }
        if settings.has_regularizer() && !self.regularizers.contains(&settings.regularizer) {
            report.error(
                format!("Regularizer '{}' is not available", settings.regularizer),
                None,
            );
        }
        report
    }
}
