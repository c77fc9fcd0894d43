//! Compiler configuration and training settings

use crate::constants;
use crate::error::ConfigError;
use crate::nodes::{Reduction, ValidationReport};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;

/// Settings that steer compilation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Reduction used when a convergence point declares none
    pub default_reduction: Reduction,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_reduction: Reduction::from_name(constants::DEFAULT_REDUCTION),
        }
    }
}

impl CompilerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

pub mod ranges {
    use std::ops::RangeInclusive;

    pub const EPOCHS: RangeInclusive<u32> = 1..=10_000;
    pub const BATCH_SIZE: RangeInclusive<u32> = 1..=1_000;
    pub const LEARNING_RATE: RangeInclusive<f32> = 0.0001..=1.0;
    pub const UNIT: RangeInclusive<f32> = 0.0..=1.0;
}

/// Training settings stored alongside a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrainSettings {
    pub epochs: u32,
    pub batch_size: u32,
    pub loss: String,
    pub optimizer: String,
    pub learning_rate: f32,
    pub momentum: f32,
    pub decay: f32,
    pub regularizer: String,
    pub regularizer_param: f32,
    pub random_batch_order: bool,
    pub class_balancing: bool,
    pub keep_best: bool,
    pub validation_batch_size: u32,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 32,
            loss: "MeanSquaredError".to_string(),
            optimizer: "Adam".to_string(),
            learning_rate: 0.001,
            momentum: 0.9,
            decay: 0.0,
            regularizer: constants::NO_REGULARIZER.to_string(),
            regularizer_param: 0.01,
            random_batch_order: true,
            class_balancing: true,
            keep_best: true,
            validation_batch_size: 32,
        }
    }
}

impl TrainSettings {
    /// Report every value outside its allowed range
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();
        check_range(&mut report, "epochs", self.epochs, ranges::EPOCHS);
        check_range(&mut report, "batch size", self.batch_size, ranges::BATCH_SIZE);
        check_range(&mut report, "learning rate", self.learning_rate, ranges::LEARNING_RATE);
        check_range(&mut report, "momentum", self.momentum, ranges::UNIT);
        check_range(&mut report, "decay", self.decay, ranges::UNIT);
        check_range(&mut report, "regularizer parameter", self.regularizer_param, ranges::UNIT);
        check_range(
            &mut report,
            "validation batch size",
            self.validation_batch_size,
            ranges::BATCH_SIZE,
        );
        report
    }

    pub fn has_regularizer(&self) -> bool {
        !self.regularizer.is_empty() && self.regularizer != constants::NO_REGULARIZER
    }
}

fn check_range<T>(report: &mut ValidationReport, name: &str, value: T, range: RangeInclusive<T>)
where
    T: PartialOrd + std::fmt::Display,
{
    if !range.contains(&value) {
        report.error(
            format!(
                "Training setting {} = {} is outside {}..={}",
                name,
                value,
                range.start(),
                range.end()
            ),
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_defaults_are_valid() {
        let settings = TrainSettings::default();
        assert!(settings.validate().is_empty());
        assert!(!settings.has_regularizer());
        assert_eq!(settings.epochs, 100);
        assert_eq!(settings.batch_size, 32);
    }

    #[test]
    fn test_out_of_range_values_are_reported() {
        let settings = TrainSettings {
            epochs: 0,
            learning_rate: 2.0,
            momentum: -0.1,
            ..TrainSettings::default()
        };
        let report = settings.validate();
        assert_eq!(report.errors().count(), 3);
        assert!(report.summary().contains("learning rate"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: TrainSettings =
            serde_json::from_str(r#"{"epochs": 5, "batchSize": 8, "optimizer": "SGD"}"#).unwrap();
        assert_eq!(settings.epochs, 5);
        assert_eq!(settings.batch_size, 8);
        assert_eq!(settings.optimizer, "SGD");
        assert_eq!(settings.loss, "MeanSquaredError");
    }

    #[test]
    fn test_compiler_config_json() {
        let config = CompilerConfig::from_json(r#"{"default_reduction": "sum"}"#).unwrap();
        assert_eq!(config.default_reduction, Reduction::Sum);
        assert_eq!(CompilerConfig::from_json("{}").unwrap(), CompilerConfig::default());
        assert!(CompilerConfig::from_json("not json").is_err());
    }
}
