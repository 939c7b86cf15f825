//! Load scorer
//!
//! A small fixed-topology dense network (6 → 16 → 8 → 1) mapping a feature
//! vector to a load score. Hidden layers use ReLU, the output a sigmoid; the
//! output is scaled to an integer in [0, 100]. The scorer holds no state
//! between calls.

use crate::error::EngineError;
use crate::types::{FeatureVector, FEATURE_COUNT};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Layer widths from input to output
pub const TOPOLOGY: [usize; 4] = [FEATURE_COUNT, 16, 8, 1];

/// Score returned while no weights are loaded
pub const NEUTRAL_SCORE: u8 = 50;

/// Seed used when a host asks for the stock weights
pub const DEFAULT_WEIGHT_SEED: u64 = 42;

/// One dense layer; `weights` is `[outputs][inputs]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl DenseLayer {
    fn zeros(inputs: usize, outputs: usize) -> Self {
        Self {
            weights: vec![vec![0.0; inputs]; outputs],
            bias: vec![0.0; outputs],
        }
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }
}

/// Weights for the three dense layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerWeights {
    pub layers: Vec<DenseLayer>,
}

impl ScorerWeights {
    /// All-zero weights of the right shape
    pub fn zeros() -> Self {
        Self {
            layers: TOPOLOGY
                .windows(2)
                .map(|pair| DenseLayer::zeros(pair[0], pair[1]))
                .collect(),
        }
    }

    /// Glorot-uniform weights with zero bias, deterministic for `seed`
    pub fn seeded(seed: u64) -> Self {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let layers = TOPOLOGY
            .windows(2)
            .map(|pair| {
                let (inputs, outputs) = (pair[0], pair[1]);
                let limit = (6.0 / (inputs + outputs) as f64).sqrt();
                let weights = (0..outputs)
                    .map(|_| (0..inputs).map(|_| rng.gen_range(-limit..limit)).collect())
                    .collect();
                DenseLayer {
                    weights,
                    bias: vec![0.0; outputs],
                }
            })
            .collect();
        Self { layers }
    }

    /// Check every layer against the fixed topology
    pub fn validate(&self) -> Result<(), EngineError> {
        let expected = TOPOLOGY.len() - 1;
        if self.layers.len() != expected {
            return Err(EngineError::InvalidWeights(format!(
                "expected {} layers, got {}",
                expected,
                self.layers.len()
            )));
        }

        for (i, (layer, pair)) in self.layers.iter().zip(TOPOLOGY.windows(2)).enumerate() {
            let (inputs, outputs) = (pair[0], pair[1]);
            if layer.weights.len() != outputs || layer.bias.len() != outputs {
                return Err(EngineError::InvalidWeights(format!(
                    "layer {} must have {} outputs",
                    i, outputs
                )));
            }
            if layer.weights.iter().any(|row| row.len() != inputs) {
                return Err(EngineError::InvalidWeights(format!(
                    "layer {} must have {} inputs",
                    i, inputs
                )));
            }
            let finite = layer
                .weights
                .iter()
                .flatten()
                .chain(&layer.bias)
                .all(|v| v.is_finite());
            if !finite {
                return Err(EngineError::InvalidWeights(format!(
                    "layer {} contains non-finite values",
                    i
                )));
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let weights: Self = serde_json::from_str(json)?;
        weights.validate()?;
        Ok(weights)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Sigmoid output in (0, 1)
    fn forward(&self, features: &FeatureVector) -> f64 {
        let last = self.layers.len().saturating_sub(1);
        let mut activations = features.as_array().to_vec();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&activations);
            activations = if i == last {
                z.into_iter().map(sigmoid).collect()
            } else {
                z.into_iter().map(relu).collect()
            };
        }
        activations.first().copied().unwrap_or(f64::NAN)
    }
}

fn relu(x: f64) -> f64 {
    x.max(0.0)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Maps feature vectors to integer load scores
#[derive(Debug, Clone, Default)]
pub struct LoadScorer {
    model: Option<ScorerWeights>,
}

impl LoadScorer {
    /// Scorer with no weights; every call returns [`NEUTRAL_SCORE`]
    pub fn uninitialized() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: ScorerWeights) -> Result<Self, EngineError> {
        let mut scorer = Self::default();
        scorer.load(weights)?;
        Ok(scorer)
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            model: Some(ScorerWeights::seeded(seed)),
        }
    }

    pub fn load(&mut self, weights: ScorerWeights) -> Result<(), EngineError> {
        weights.validate()?;
        self.model = Some(weights);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    pub fn weights(&self) -> Option<&ScorerWeights> {
        self.model.as_ref()
    }

    pub fn score(&self, features: &FeatureVector) -> u8 {
        let Some(model) = &self.model else {
            return NEUTRAL_SCORE;
        };
        if features.as_array().iter().any(|v| !v.is_finite()) {
            tracing::debug!("Non-finite feature, using neutral score");
            return NEUTRAL_SCORE;
        }
        let output = model.forward(features);
        if !output.is_finite() {
            tracing::debug!("Scorer produced a non-finite output, using neutral score");
            return NEUTRAL_SCORE;
        }
        (output * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn constant(bias: f64) -> ScorerWeights {
        let mut weights = ScorerWeights::zeros();
        weights.layers[2].bias[0] = bias;
        weights
    }

    #[test]
    fn test_uninitialized_scorer_is_neutral() {
        let scorer = LoadScorer::uninitialized();
        assert!(!scorer.is_initialized());
        assert_eq!(scorer.score(&FeatureVector::new([1.0; FEATURE_COUNT])), 50);
    }

    #[test]
    fn test_zero_weights_score_fifty() {
        let scorer = LoadScorer::with_weights(ScorerWeights::zeros()).unwrap();
        assert_eq!(scorer.score(&FeatureVector::default()), 50);
    }

    #[test]
    fn test_output_bias_sets_score() {
        // sigmoid(ln(9)) = 0.9
        let scorer = LoadScorer::with_weights(constant(9f64.ln())).unwrap();
        assert_eq!(scorer.score(&FeatureVector::default()), 90);

        let saturated = LoadScorer::with_weights(constant(50.0)).unwrap();
        assert_eq!(saturated.score(&FeatureVector::default()), 100);

        let floor = LoadScorer::with_weights(constant(-50.0)).unwrap();
        assert_eq!(floor.score(&FeatureVector::default()), 0);
    }

    #[test]
    fn test_feature_path_through_hidden_layers() {
        let mut weights = ScorerWeights::zeros();
        weights.layers[0].weights[0][4] = 1.0;
        weights.layers[1].weights[0][0] = 1.0;
        weights.layers[2].weights[0][0] = 4.0;
        weights.layers[2].bias[0] = -2.0;
        let scorer = LoadScorer::with_weights(weights).unwrap();

        let calm = FeatureVector::new([0.0; FEATURE_COUNT]);
        let tense = FeatureVector::new([0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(scorer.score(&calm), 12);
        assert_eq!(scorer.score(&tense), 88);
    }

    #[test]
    fn test_seeded_weights_are_deterministic() {
        let a = ScorerWeights::seeded(7);
        let b = ScorerWeights::seeded(7);
        let c = ScorerWeights::seeded(8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.validate().is_ok());
        assert!(a.layers.iter().all(|l| l.bias.iter().all(|&v| v == 0.0)));

        let limit = (6.0f64 / 22.0).sqrt();
        assert!(a.layers[0].weights.iter().flatten().all(|w| w.abs() <= limit));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut weights = ScorerWeights::zeros();
        weights.layers[1].weights[3].push(0.0);
        assert!(matches!(weights.validate(), Err(EngineError::InvalidWeights(_))));

        let mut short = ScorerWeights::zeros();
        short.layers.pop();
        assert!(matches!(
            LoadScorer::with_weights(short),
            Err(EngineError::InvalidWeights(_))
        ));
    }

    #[test]
    fn test_weights_json_roundtrip() {
        let weights = ScorerWeights::seeded(3);
        let json = weights.to_json().unwrap();
        let restored = ScorerWeights::from_json(&json).unwrap();
        for (a, b) in weights.layers.iter().zip(&restored.layers) {
            for (row_a, row_b) in a.weights.iter().zip(&b.weights) {
                for (x, y) in row_a.iter().zip(row_b) {
                    assert!((x - y).abs() < 1e-12);
                }
            }
        }

        assert!(ScorerWeights::from_json(r#"{"layers": []}"#).is_err());
    }

    #[test]
    fn test_non_finite_features_fall_back_to_neutral() {
        let mut weights = ScorerWeights::zeros();
        weights.layers[0].weights[0][0] = 1.0;
        weights.layers[1].weights[0][0] = 1.0;
        weights.layers[2].weights[0][0] = 1.0;
        let scorer = LoadScorer::with_weights(weights).unwrap();
        assert_eq!(
            scorer.score(&FeatureVector::new([f64::NAN, 0.0, 0.0, 0.0, 0.0, 0.0])),
            50
        );
    }
}
