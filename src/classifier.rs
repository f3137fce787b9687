//! Posture classifier
//!
//! The live loop treats the classifier as an opaque scoring function. The
//! bundled implementation evaluates a small dense network exported to JSON:
//! one `[1, 12]` float32 input, one `[1, 1]` float32 output in `[0, 1]`.

use crate::error::MonitorError;
use crate::types::{FeatureVector, FEATURE_COUNT};
use serde::{Deserialize, Serialize};

/// Maps a normalized feature vector to a good-posture score in `[0, 1]`
pub trait PostureClassifier {
    fn score(&self, features: &FeatureVector) -> f32;
}

impl<F> PostureClassifier for F
where
    F: Fn(&FeatureVector) -> f32,
{
    fn score(&self, features: &FeatureVector) -> f32 {
        self(features)
    }
}

/// Layer activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
}

impl Activation {
    fn apply(&self, x: f32) -> f32 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

/// Fully connected layer, weights stored row-major as `[out][in]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    pub activation: Activation,
}

impl DenseLayer {
    fn input_dim(&self) -> usize {
        self.weights.first().map(|row| row.len()).unwrap_or(0)
    }

    fn output_dim(&self) -> usize {
        self.weights.len()
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                let sum: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum();
                self.activation.apply(sum + b)
            })
            .collect()
    }
}

/// Feed-forward network exported from training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseModel {
    input_dim: usize,
    layers: Vec<DenseLayer>,
}

impl DenseModel {
    /// Build a model, checking that layer shapes chain from 12 inputs to 1 output
    pub fn new(layers: Vec<DenseLayer>) -> Result<Self, MonitorError> {
        let model = Self {
            input_dim: FEATURE_COUNT,
            layers,
        };
        model.validate()?;
        Ok(model)
    }

    /// Load a model from its JSON export
    pub fn from_json(json: &str) -> Result<Self, MonitorError> {
        let model: DenseModel = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    pub fn to_json(&self) -> Result<String, MonitorError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Number of weights and biases
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.output_dim() * l.input_dim() + l.bias.len())
            .sum()
    }

    fn validate(&self) -> Result<(), MonitorError> {
        if self.input_dim != FEATURE_COUNT {
            return Err(MonitorError::InvalidModel(format!(
                "model expects {} inputs, frames carry {}",
                self.input_dim, FEATURE_COUNT
            )));
        }

        if self.layers.is_empty() {
            return Err(MonitorError::InvalidModel("model has no layers".to_string()));
        }

        let mut expected_in = self.input_dim;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.output_dim() == 0 {
                return Err(MonitorError::InvalidModel(format!("layer {} is empty", i)));
            }
            if let Some(row) = layer.weights.iter().find(|row| row.len() != expected_in) {
                return Err(MonitorError::InvalidModel(format!(
                    "layer {} expects {} inputs per unit, found a row of {}",
                    i,
                    expected_in,
                    row.len()
                )));
            }
            if layer.bias.len() != layer.output_dim() {
                return Err(MonitorError::InvalidModel(format!(
                    "layer {} has {} units but {} biases",
                    i,
                    layer.output_dim(),
                    layer.bias.len()
                )));
            }
            let non_finite = layer
                .weights
                .iter()
                .flatten()
                .chain(&layer.bias)
                .any(|v| !v.is_finite());
            if non_finite {
                return Err(MonitorError::InvalidModel(format!(
                    "layer {} contains non-finite parameters",
                    i
                )));
            }
            expected_in = layer.output_dim();
        }

        if expected_in != 1 {
            return Err(MonitorError::InvalidModel(format!(
                "model must produce a single score, final layer has {} units",
                expected_in
            )));
        }

        Ok(())
    }
}

impl PostureClassifier for DenseModel {
    fn score(&self, features: &FeatureVector) -> f32 {
        let mut activations = features.to_f32().to_vec();
        for layer in &self.layers {
            activations = layer.forward(&activations);
        }
        activations.first().copied().unwrap_or(0.0).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn single_unit(weights: Vec<f32>, bias: f32, activation: Activation) -> DenseLayer {
        DenseLayer {
            weights: vec![weights],
            bias: vec![bias],
            activation,
        }
    }

    fn features(value: f64) -> FeatureVector {
        FeatureVector::new([value; FEATURE_COUNT]).unwrap()
    }

    #[test]
    fn test_logistic_model_scores() {
        let model = DenseModel::new(vec![single_unit(
            vec![1.0; FEATURE_COUNT],
            0.0,
            Activation::Sigmoid,
        )])
        .unwrap();

        assert!((model.score(&features(0.0)) - 0.5).abs() < 1e-6);
        assert!(model.score(&features(1.0)) > 0.99);
        assert!(model.score(&features(-1.0)) < 0.01);
    }

    #[test]
    fn test_hidden_layer_relu() {
        // Two hidden units: one sees the sum, one sees the negated sum
        let hidden = DenseLayer {
            weights: vec![vec![1.0; FEATURE_COUNT], vec![-1.0; FEATURE_COUNT]],
            bias: vec![0.0, 0.0],
            activation: Activation::Relu,
        };
        let output = single_unit(vec![1.0, 0.0], 0.0, Activation::Linear);
        let model = DenseModel::new(vec![hidden, output]).unwrap();

        assert!((model.score(&features(0.05)) - 0.6).abs() < 1e-5);
        // Negative sum is zeroed by relu
        assert_eq!(model.score(&features(-1.0)), 0.0);
        // Linear output above one is clamped
        assert_eq!(model.score(&features(1.0)), 1.0);
        assert_eq!(model.layer_count(), 2);
        assert_eq!(model.parameter_count(), 2 * FEATURE_COUNT + 2 + 2 + 1);
    }

    #[test]
    fn test_rejects_wrong_input_width() {
        let result = DenseModel::new(vec![single_unit(vec![1.0; 5], 0.0, Activation::Sigmoid)]);
        assert!(matches!(result, Err(MonitorError::InvalidModel(_))));
    }

    #[test]
    fn test_rejects_multi_output() {
        let layer = DenseLayer {
            weights: vec![vec![1.0; FEATURE_COUNT], vec![1.0; FEATURE_COUNT]],
            bias: vec![0.0, 0.0],
            activation: Activation::Sigmoid,
        };
        assert!(DenseModel::new(vec![layer]).is_err());
    }

    #[test]
    fn test_rejects_bias_mismatch_and_empty() {
        let layer = DenseLayer {
            weights: vec![vec![1.0; FEATURE_COUNT]],
            bias: vec![],
            activation: Activation::Sigmoid,
        };
        assert!(DenseModel::new(vec![layer]).is_err());
        assert!(DenseModel::new(vec![]).is_err());
    }

    #[test]
    fn test_from_json() {
        let json = format!(
            r#"{{
                "input_dim": 12,
                "layers": [
                    {{ "weights": [{:?}], "bias": [0.0], "activation": "sigmoid" }}
                ]
            }}"#,
            vec![0.0f32; FEATURE_COUNT]
        );
        let model = DenseModel::from_json(&json).unwrap();
        assert!((model.score(&features(3.0)) - 0.5).abs() < 1e-6);

        let bad_dim = json.replace("\"input_dim\": 12", "\"input_dim\": 8");
        assert!(DenseModel::from_json(&bad_dim).is_err());
    }

    #[test]
    fn test_closure_classifier() {
        let always_good = |_: &FeatureVector| 0.9f32;
        assert_eq!(always_good.score(&features(0.0)), 0.9);
    }
}
