use std::{fmt, str::FromStr};

use crate::{
    error::{CropError, Result},
    Float,
};

/// Closed set of classifiers an experiment can ask for.
///
/// Names are resolved when the configuration is loaded; an unknown name never
/// reaches the training loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum ModelKind {
    DeepConvNet,
    ShallowNet,
    EegNet,
}

static REGISTRY: [(&str, ModelKind); 3] = [
    ("DeepConvNet", ModelKind::DeepConvNet),
    ("ShallowNet", ModelKind::ShallowNet),
    ("EEGNet", ModelKind::EegNet),
];

/// Dimensions a model is built for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelInputs {
    pub n_classes: usize,
    pub n_channels: usize,
    pub crop_samples: usize,
    pub dropout_rate: Float,
    pub learning_rate: Float,
}

/// What the external trainer has to instantiate: which model, fed with
/// (1, channels, crop samples) inputs, producing `n_classes` outputs, and the
/// step size to optimize it with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelBlueprint {
    pub kind: ModelKind,
    pub input_shape: [usize; 3],
    pub n_classes: usize,
    pub dropout_rate: Float,
    pub learning_rate: Float,
}

impl ModelKind {
    pub fn name(self) -> &'static str {
        REGISTRY
            .iter()
            .find(|(_, kind)| *kind == self)
            .map_or("", |(name, _)| *name)
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        REGISTRY.iter().map(|(name, _)| *name)
    }

    pub fn blueprint(self, inputs: &ModelInputs) -> Result<ModelBlueprint> {
        if inputs.n_classes < 2 {
            return Err(CropError::invalid_config(format!(
                "{self} needs at least 2 classes, got {}",
                inputs.n_classes
            )));
        }
        if inputs.n_channels == 0 || inputs.crop_samples == 0 {
            return Err(CropError::invalid_config(format!(
                "{self} input of {} channels x {} samples",
                inputs.n_channels, inputs.crop_samples
            )));
        }
        if !(0.0..1.0).contains(&inputs.dropout_rate) {
            return Err(CropError::invalid_config(format!(
                "dropout rate {} must be in [0, 1)",
                inputs.dropout_rate
            )));
        }
        if !(inputs.learning_rate > 0.0) {
            return Err(CropError::invalid_config(format!(
                "learning rate {} must be positive",
                inputs.learning_rate
            )));
        }

        Ok(ModelBlueprint {
            kind: self,
            input_shape: [1, inputs.n_channels, inputs.crop_samples],
            n_classes: inputs.n_classes,
            dropout_rate: inputs.dropout_rate,
            learning_rate: inputs.learning_rate,
        })
    }
}

impl FromStr for ModelKind {
    type Err = CropError;

    fn from_str(s: &str) -> Result<Self> {
        REGISTRY
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| {
                CropError::invalid_config(format!(
                    "unknown model `{s}`, expected one of: {}",
                    Self::names().collect::<Vec<_>>().join(", ")
                ))
            })
    }
}

impl TryFrom<String> for ModelKind {
    type Error = CropError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ModelKind> for &'static str {
    fn from(kind: ModelKind) -> Self {
        kind.name()
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> ModelInputs {
        ModelInputs {
            n_classes: 4,
            n_channels: 44,
            crop_samples: 1125,
            dropout_rate: 0.5,
            learning_rate: 0.001,
        }
    }

    #[test]
    fn names_roundtrip() {
        for name in ModelKind::names() {
            let kind: ModelKind = name.parse().unwrap();
            assert_eq!(kind.to_string(), name);
        }
    }

    #[test]
    fn unknown_name_lists_known_ones() {
        let err = "ResNet".parse::<ModelKind>().unwrap_err();
        assert!(matches!(err, CropError::InvalidConfig(_)));
        assert!(err.to_string().contains("DeepConvNet, ShallowNet, EEGNet"));
    }

    #[test]
    fn serde_goes_through_registry() {
        let kind: ModelKind = serde_json::from_str(r#""EEGNet""#).unwrap();
        assert_eq!(kind, ModelKind::EegNet);
        assert_eq!(serde_json::to_string(&kind).unwrap(), r#""EEGNet""#);
        assert!(serde_json::from_str::<ModelKind>(r#""eval(DeepConvNet)""#).is_err());
    }

    #[test]
    fn blueprint_shape() {
        let blueprint = ModelKind::ShallowNet.blueprint(&inputs()).unwrap();
        assert_eq!(blueprint.input_shape, [1, 44, 1125]);
        assert_eq!(blueprint.n_classes, 4);
        assert_eq!(blueprint.learning_rate, 0.001);
    }

    #[test]
    fn blueprint_rejects_bad_inputs() {
        let mut bad = inputs();
        bad.n_classes = 1;
        assert!(ModelKind::DeepConvNet.blueprint(&bad).is_err());

        let mut bad = inputs();
        bad.dropout_rate = 1.0;
        assert!(ModelKind::DeepConvNet.blueprint(&bad).is_err());

        let mut bad = inputs();
        bad.learning_rate = 0.0;
        assert!(ModelKind::DeepConvNet.blueprint(&bad).is_err());
    }
}
