// =============================================================================
// Serializable probabilistic classifiers
// =============================================================================
//
// Base models and the meta-classifier share one family so a bundle round-trips
// through a single JSON artifact. Every model emits a probability vector in
// the canonical class order `[down, neutral, up]`.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// A probability-emitting classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    /// Multinomial logistic regression: `softmax(W x + b)`, W is K×D.
    Softmax { weights: Vec<Vec<f64>>, bias: Vec<f64> },
    /// Gaussian naive Bayes with per-class diagonal variances.
    GaussianNb {
        priors: Vec<f64>,
        means: Vec<Vec<f64>>,
        variances: Vec<Vec<f64>>,
    },
}

fn invalid(component: &str, reason: impl Into<String>) -> EngineError {
    EngineError::InvalidModel {
        component: component.to_string(),
        reason: reason.into(),
    }
}

fn rectangular(rows: &[Vec<f64>]) -> Option<usize> {
    let width = rows.first()?.len();
    rows.iter().all(|r| r.len() == width).then_some(width)
}

impl Classifier {
    pub fn n_classes(&self) -> usize {
        match self {
            Self::Softmax { bias, .. } => bias.len(),
            Self::GaussianNb { priors, .. } => priors.len(),
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Self::Softmax { weights, .. } => weights.first().map_or(0, |r| r.len()),
            Self::GaussianNb { means, .. } => means.first().map_or(0, |r| r.len()),
        }
    }

    /// Structural validation: consistent shapes, finite parameters, positive
    /// variances and priors.
    pub fn validate(&self, component: &str) -> Result<()> {
        match self {
            Self::Softmax { weights, bias } => {
                let width = rectangular(weights)
                    .ok_or_else(|| invalid(component, "weight matrix is empty or ragged"))?;
                if width == 0 {
                    return Err(invalid(component, "weight rows are empty"));
                }
                if weights.len() != bias.len() {
                    return Err(invalid(
                        component,
                        format!("{} weight rows vs {} bias terms", weights.len(), bias.len()),
                    ));
                }
                let all_finite = weights.iter().flatten().chain(bias.iter()).all(|v| v.is_finite());
                if !all_finite {
                    return Err(invalid(component, "non-finite parameter"));
                }
            }
            Self::GaussianNb {
                priors,
                means,
                variances,
            } => {
                let width = rectangular(means)
                    .ok_or_else(|| invalid(component, "mean matrix is empty or ragged"))?;
                if width == 0 || rectangular(variances) != Some(width) {
                    return Err(invalid(component, "variance matrix does not match means"));
                }
                if priors.len() != means.len() || variances.len() != means.len() {
                    return Err(invalid(component, "class count disagrees across parameters"));
                }
                if priors.iter().any(|p| !p.is_finite() || *p <= 0.0) {
                    return Err(invalid(component, "priors must be finite and positive"));
                }
                if means.iter().flatten().any(|m| !m.is_finite()) {
                    return Err(invalid(component, "non-finite mean"));
                }
                if variances.iter().flatten().any(|v| !v.is_finite() || *v <= 0.0) {
                    return Err(invalid(component, "variances must be finite and positive"));
                }
            }
        }
        Ok(())
    }

    /// Class probabilities for one input row.
    pub fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>> {
        if x.len() != self.n_features() {
            return Err(EngineError::SchemaMismatch {
                detail: format!(
                    "classifier expects {} inputs, got {}",
                    self.n_features(),
                    x.len()
                ),
            });
        }
        let scores: Vec<f64> = match self {
            Self::Softmax { weights, bias } => weights
                .iter()
                .zip(bias)
                .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + b)
                .collect(),
            Self::GaussianNb {
                priors,
                means,
                variances,
            } => priors
                .iter()
                .zip(means.iter().zip(variances))
                .map(|(prior, (mu, var))| {
                    let log_lik: f64 = x
                        .iter()
                        .zip(mu.iter().zip(var))
                        .map(|(v, (m, s2))| {
                            -0.5 * ((2.0 * std::f64::consts::PI * s2).ln() + (v - m).powi(2) / s2)
                        })
                        .sum();
                    prior.ln() + log_lik
                })
                .collect(),
        };
        softmax(&scores)
    }
}

/// Numerically stable softmax.
pub fn softmax(scores: &[f64]) -> Result<Vec<f64>> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Err(EngineError::InvalidProbabilities(
            "non-finite class score".to_string(),
        ));
    }
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(EngineError::InvalidProbabilities(
            "softmax normaliser is degenerate".to_string(),
        ));
    }
    Ok(exps.into_iter().map(|e| e / total).collect())
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Per-feature standardisation `(x - mean) / scale` fitted at training time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn validate(&self, n_features: usize) -> Result<()> {
        if self.mean.len() != n_features || self.scale.len() != n_features {
            return Err(invalid(
                "preprocessor",
                format!(
                    "scaler has {}/{} terms for {} features",
                    self.mean.len(),
                    self.scale.len(),
                    n_features
                ),
            ));
        }
        if self.mean.iter().any(|m| !m.is_finite())
            || self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0)
        {
            return Err(invalid("preprocessor", "scale must be finite and positive"));
        }
        Ok(())
    }

    pub fn transform(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }
}
