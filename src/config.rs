//! Experiment configuration.
//!
//! Loaded from JSON and validated before any trial is touched, so a bad
//! model name or batch size fails before cropping starts.

use std::{collections::BTreeSet, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    crop::CropGeometry,
    error::{CropError, Result},
    registry::ModelKind,
    Float,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    pub model: ModelKind,
    /// Ordered class names; label `i` is `class_names[i]`.
    pub class_names: Vec<String>,

    pub train_count: usize,
    pub test_count: usize,
    #[serde(default = "default_validation_frac")]
    pub validation_frac: f64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_dropout_rate")]
    pub dropout_rate: Float,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: Float,

    /// Absent means one crop spanning the whole trial.
    #[serde(default)]
    pub crop: Option<CropGeometry>,
    /// Stream crops per batch instead of cropping every partition up front.
    #[serde(default)]
    pub data_generator: bool,
}

fn default_validation_frac() -> f64 {
    0.1
}

fn default_batch_size() -> usize {
    32
}

fn default_epochs() -> usize {
    3
}

fn default_shuffle() -> bool {
    true
}

fn default_dropout_rate() -> Float {
    0.5
}

fn default_learning_rate() -> Float {
    0.001
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::DeepConvNet,
            class_names: ["Right Hand", "Left Hand", "Rest", "Feet"]
                .into_iter()
                .map(String::from)
                .collect(),
            train_count: 80,
            test_count: 20,
            validation_frac: default_validation_frac(),
            batch_size: default_batch_size(),
            epochs: default_epochs(),
            shuffle: default_shuffle(),
            seed: None,
            dropout_rate: default_dropout_rate(),
            learning_rate: default_learning_rate(),
            crop: None,
            data_generator: false,
        }
    }
}

impl ExperimentConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.class_names.len() < 2 {
            return Err(CropError::invalid_config("at least two classes are needed"));
        }
        let distinct: BTreeSet<_> = self.class_names.iter().collect();
        if distinct.len() != self.class_names.len() {
            return Err(CropError::invalid_config("class names must be unique"));
        }
        if self.train_count == 0 {
            return Err(CropError::invalid_config("train count must be positive"));
        }
        if !(0.0..1.0).contains(&self.validation_frac) {
            return Err(CropError::invalid_config(format!(
                "validation fraction {} must be in [0, 1)",
                self.validation_frac
            )));
        }
        if self.batch_size == 0 {
            return Err(CropError::invalid_config("batch size must be positive"));
        }
        if self.epochs == 0 {
            return Err(CropError::invalid_config("epochs must be positive"));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(CropError::invalid_config(format!(
                "dropout rate {} must be in [0, 1)",
                self.dropout_rate
            )));
        }
        if !(self.learning_rate > 0.0) {
            return Err(CropError::invalid_config(format!(
                "learning rate {} must be positive",
                self.learning_rate
            )));
        }
        Ok(())
    }
}
