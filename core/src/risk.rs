//! Risk scoring engine: customs-risk classifier.
//!
//! Model: logistic regression over standardized RiskFeatureVectors,
//! trained by full-batch gradient descent with L2 regularisation and
//! balanced class weights. Training has no random component, so a fixed
//! training set always yields the same model, bit for bit.
//!
//! Category policy:
//!   p <  LOW_MEDIUM_THRESHOLD                          → Low
//!   LOW_MEDIUM_THRESHOLD <= p < MEDIUM_HIGH_THRESHOLD  → Medium
//!   p >= MEDIUM_HIGH_THRESHOLD                         → High
//! (defaults; the live values come from RiskThresholds in config)

use crate::{
    config::{RiskThresholds, TrainingConfig},
    encoder::{
        CustomsRecord, FeatureEncoder, HistoricalAggregates, RiskFeatureVector, FEATURE_COUNT,
        FEATURE_NAMES, INDICATOR_COUNT,
    },
    error::{TradeError, TradeResult},
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ── Constants ────────────────────────────────────────────────────────────────

pub const LOW_MEDIUM_THRESHOLD: f64 = 0.33;
pub const MEDIUM_HIGH_THRESHOLD: f64 = 0.66;

/// Columns with a spread below this are treated as constant.
const MIN_FEATURE_SCALE: f64 = 1e-12;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Cleared,
    Penalized,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cleared => "cleared",
            Self::Penalized => "penalized",
        }
    }

    fn target(&self) -> f64 {
        match self {
            Self::Cleared => 0.0,
            Self::Penalized => 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledFeatures {
    pub features: RiskFeatureVector,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    pub fn from_probability(p: f64, thresholds: &RiskThresholds) -> Self {
        if p < thresholds.low_medium {
            Self::Low
        } else if p < thresholds.medium_high {
            Self::Medium
        } else {
            Self::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributingFactor {
    pub name: String,
    /// Signed contribution to the logit.
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub probability: f64,
    pub category: RiskCategory,
    /// Descending |weight|, ties broken by feature index.
    pub contributing_factors: Vec<ContributingFactor>,
}

impl RiskAssessment {
    pub fn top_factors(&self, n: usize) -> &[ContributingFactor] {
        &self.contributing_factors[..n.min(self.contributing_factors.len())]
    }
}

/// Turn labeled customs history into a training set, encoding every
/// shipment against the same aggregates that scoring will use.
pub fn build_training_set(
    records: &[CustomsRecord],
    aggregates: &HistoricalAggregates,
) -> TradeResult<Vec<LabeledFeatures>> {
    records
        .iter()
        .map(|r| -> TradeResult<LabeledFeatures> {
            Ok(LabeledFeatures {
                features: FeatureEncoder::encode(&r.shipment, Some(aggregates))?,
                outcome: if r.penalized { Outcome::Penalized } else { Outcome::Cleared },
            })
        })
        .collect()
}

// ── Model ────────────────────────────────────────────────────────────────────

/// A trained model. Deserialization goes through `validate`, so a model
/// handed over from another process always has the encoder's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredRiskModel")]
pub struct RiskModel {
    pub feature_names: Vec<String>,
    weights: Vec<f64>,
    bias: f64,
    means: Vec<f64>,
    scales: Vec<f64>,
    /// Training rows in which each indicator feature was set.
    support: Vec<usize>,
    pub cleared_count: usize,
    pub penalized_count: usize,
    pub iterations: usize,
}

/// Wire form of a RiskModel before its shape has been checked.
#[derive(Deserialize)]
struct StoredRiskModel {
    feature_names: Vec<String>,
    weights: Vec<f64>,
    bias: f64,
    means: Vec<f64>,
    scales: Vec<f64>,
    support: Vec<usize>,
    cleared_count: usize,
    penalized_count: usize,
    iterations: usize,
}

impl TryFrom<StoredRiskModel> for RiskModel {
    type Error = TradeError;

    fn try_from(stored: StoredRiskModel) -> TradeResult<Self> {
        let model = Self {
            feature_names: stored.feature_names,
            weights: stored.weights,
            bias: stored.bias,
            means: stored.means,
            scales: stored.scales,
            support: stored.support,
            cleared_count: stored.cleared_count,
            penalized_count: stored.penalized_count,
            iterations: stored.iterations,
        };
        model.validate()?;
        Ok(model)
    }
}

impl RiskModel {
    /// Check that every parameter vector matches the feature layout the
    /// encoder produces. Scoring indexes into these vectors directly.
    pub fn validate(&self) -> TradeResult<()> {
        for actual in [
            self.feature_names.len(),
            self.weights.len(),
            self.means.len(),
            self.scales.len(),
        ] {
            if actual != FEATURE_COUNT {
                return Err(TradeError::FeatureDimension { expected: FEATURE_COUNT, actual });
            }
        }
        if self.support.len() != INDICATOR_COUNT {
            return Err(TradeError::FeatureDimension {
                expected: INDICATOR_COUNT,
                actual: self.support.len(),
            });
        }
        if let Some(j) = self.feature_names.iter().zip(FEATURE_NAMES).position(|(a, b)| a.as_str() != b) {
            return Err(TradeError::InvalidParameter {
                name: "risk_model.feature_names",
                reason: format!(
                    "position {j} holds '{}', encoder produces '{}'",
                    self.feature_names[j], FEATURE_NAMES[j]
                ),
            });
        }
        let finite = self.bias.is_finite()
            && self.weights.iter().chain(&self.means).all(|x| x.is_finite())
            && self.scales.iter().all(|s| s.is_finite() && *s > 0.0);
        if !finite {
            return Err(TradeError::Numerical {
                context: "risk model",
                reason: "parameters must be finite and scales positive".into(),
            });
        }
        Ok(())
    }

    pub fn train(training_set: &[LabeledFeatures], config: &TrainingConfig) -> TradeResult<Self> {
        if training_set.is_empty() {
            return Err(TradeError::EmptyInput { what: "risk training set" });
        }
        for row in training_set {
            check_vector(&row.features)?;
        }

        let penalized_count = training_set
            .iter()
            .filter(|r| r.outcome == Outcome::Penalized)
            .count();
        let cleared_count = training_set.len() - penalized_count;
        for (outcome, available) in [
            (Outcome::Cleared, cleared_count),
            (Outcome::Penalized, penalized_count),
        ] {
            if available < config.min_samples_per_class {
                return Err(TradeError::InsufficientTrainingData {
                    class: outcome.label().to_string(),
                    available,
                    required: config.min_samples_per_class,
                });
            }
        }

        let n = training_set.len() as f64;
        let d = FEATURE_COUNT;

        // Standardization parameters
        let mut means = vec![0.0; d];
        for row in training_set {
            for (m, x) in means.iter_mut().zip(&row.features.values) {
                *m += x;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut scales = vec![0.0; d];
        for row in training_set {
            for j in 0..d {
                scales[j] += (row.features.values[j] - means[j]).powi(2);
            }
        }
        for s in scales.iter_mut() {
            let std = (*s / n).sqrt();
            *s = if std < MIN_FEATURE_SCALE { 1.0 } else { std };
        }

        let mut support = vec![0usize; INDICATOR_COUNT];
        for row in training_set {
            for (j, count) in support.iter_mut().enumerate() {
                if row.features.values[j] != 0.0 {
                    *count += 1;
                }
            }
        }

        let standardized: Vec<Vec<f64>> = training_set
            .iter()
            .map(|r| standardize(&r.features.values, &means, &scales))
            .collect();

        // Balanced class weights: each class contributes half the loss.
        let class_weight = |o: Outcome| match o {
            Outcome::Cleared => n / (2.0 * cleared_count as f64),
            Outcome::Penalized => n / (2.0 * penalized_count as f64),
        };
        let row_weights: Vec<f64> = training_set.iter().map(|r| class_weight(r.outcome)).collect();
        let total_weight: f64 = row_weights.iter().sum();

        let mut weights = vec![0.0; d];
        let mut bias = 0.0;
        let mut iterations = 0;

        for _ in 0..config.max_iterations {
            iterations += 1;
            let mut grad_w = vec![0.0; d];
            let mut grad_b = 0.0;

            for ((x, row), rw) in standardized.iter().zip(training_set).zip(&row_weights) {
                let p = sigmoid(bias + dot(&weights, x));
                let err = rw * (p - row.outcome.target());
                grad_b += err;
                for (g, xi) in grad_w.iter_mut().zip(x) {
                    *g += err * xi;
                }
            }

            let mut max_step: f64 = 0.0;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                let step = config.learning_rate * (g / total_weight + config.l2_penalty * *w);
                *w -= step;
                max_step = max_step.max(step.abs());
            }
            let step_b = config.learning_rate * grad_b / total_weight;
            bias -= step_b;
            max_step = max_step.max(step_b.abs());

            if !max_step.is_finite() {
                return Err(TradeError::Numerical {
                    context: "risk training",
                    reason: format!("gradient diverged at iteration {iterations}"),
                });
            }
            if max_step < config.tolerance {
                break;
            }
        }

        log::info!(
            "risk: trained on {} rows ({} cleared, {} penalized) in {} iterations",
            training_set.len(),
            cleared_count,
            penalized_count,
            iterations
        );

        Ok(Self {
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            weights,
            bias,
            means,
            scales,
            support,
            cleared_count,
            penalized_count,
            iterations,
        })
    }

    pub fn score(
        &self,
        features: &RiskFeatureVector,
        thresholds: &RiskThresholds,
    ) -> TradeResult<RiskAssessment> {
        check_vector(features)?;

        for (j, &count) in self.support.iter().enumerate() {
            if count == 0 && features.values[j] != 0.0 {
                return Err(TradeError::OutOfDomainFeature {
                    feature: self.feature_names[j].clone(),
                });
            }
        }

        let z = standardize(&features.values, &self.means, &self.scales);
        let contributions: Vec<f64> = self.weights.iter().zip(&z).map(|(w, x)| w * x).collect();
        let probability = sigmoid(self.bias + contributions.iter().sum::<f64>());

        let mut indexed: Vec<(usize, f64)> = contributions
            .into_iter()
            .enumerate()
            .filter(|(_, c)| *c != 0.0)
            .collect();
        indexed.sort_by(|a, b| by_magnitude_then_index(*a, *b));

        Ok(RiskAssessment {
            probability,
            category: RiskCategory::from_probability(probability, thresholds),
            contributing_factors: indexed
                .into_iter()
                .map(|(j, weight)| ContributingFactor {
                    name: self.feature_names[j].clone(),
                    weight,
                })
                .collect(),
        })
    }

    /// Global importances: |coefficient| on the standardized scale,
    /// descending, ties broken by feature index.
    pub fn feature_importances(&self) -> Vec<ContributingFactor> {
        let mut indexed: Vec<(usize, f64)> =
            self.weights.iter().map(|w| w.abs()).enumerate().collect();
        indexed.sort_by(|a, b| by_magnitude_then_index(*a, *b));
        indexed
            .into_iter()
            .map(|(j, weight)| ContributingFactor {
                name: self.feature_names[j].clone(),
                weight,
            })
            .collect()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn check_vector(v: &RiskFeatureVector) -> TradeResult<()> {
    if v.len() != FEATURE_COUNT {
        return Err(TradeError::FeatureDimension {
            expected: FEATURE_COUNT,
            actual: v.len(),
        });
    }
    if let Some(j) = v.values.iter().position(|x| !x.is_finite()) {
        return Err(TradeError::Numerical {
            context: "risk feature vector",
            reason: format!("feature '{}' is not finite", FEATURE_NAMES[j]),
        });
    }
    Ok(())
}

fn standardize(x: &[f64], means: &[f64], scales: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(means)
        .zip(scales)
        .map(|((v, m), s)| (v - m) / s)
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn by_magnitude_then_index(a: (usize, f64), b: (usize, f64)) -> Ordering {
    b.1.abs().total_cmp(&a.1.abs()).then(a.0.cmp(&b.0))
}
