// =============================================================================
// Arm selection policies
// =============================================================================
//
// UCB1:     untried arms first (lowest id), then
//           mean + c * sqrt(2 ln N / n)
//           where n counts resolved AND pending pulls of the arm, so an arm
//           with many in-flight pulls is not hammered while rewards are late,
//           and mean uses resolved pulls only.
// Thompson: one Gaussian draw per arm around its mean with spread
//           reward_scale / sqrt(resolved + 1), from a seeded RNG.
//
// Ties always go to the lowest arm id.
// =============================================================================

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Per-arm view handed to a policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmView<'a> {
    pub id: &'a str,
    pub mean: f64,
    pub resolved: u64,
    pub pending: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionPolicy {
    Ucb1 {
        #[serde(default = "default_exploration")]
        exploration: f64,
    },
    Thompson {
        #[serde(default)]
        seed: u64,
        #[serde(default = "default_reward_scale")]
        reward_scale: f64,
    },
}

fn default_exploration() -> f64 {
    10.0
}

fn default_reward_scale() -> f64 {
    50.0
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::Ucb1 {
            exploration: default_exploration(),
        }
    }
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ucb1 { exploration } => write!(f, "ucb1(c={exploration})"),
            Self::Thompson { seed, reward_scale } => {
                write!(f, "thompson(seed={seed}, scale={reward_scale})")
            }
        }
    }
}

/// Pick the index of the winning arm. `arms` must be sorted by id.
pub fn choose(policy: &SelectionPolicy, arms: &[ArmView<'_>], rng: &mut StdRng) -> Option<usize> {
    if arms.is_empty() {
        return None;
    }
    match policy {
        SelectionPolicy::Ucb1 { exploration } => Some(ucb1(*exploration, arms)),
        SelectionPolicy::Thompson { reward_scale, .. } => {
            let scores: Vec<f64> = arms
                .iter()
                .map(|a| {
                    let spread = reward_scale.abs() / ((a.resolved + 1) as f64).sqrt();
                    a.mean + spread * standard_normal(rng)
                })
                .collect();
            Some(argmax(&scores))
        }
    }
}

fn ucb1(exploration: f64, arms: &[ArmView<'_>]) -> usize {
    if let Some(untried) = arms.iter().position(|a| a.resolved + a.pending == 0) {
        return untried;
    }
    let total: u64 = arms.iter().map(|a| a.resolved + a.pending).sum();
    let ln_total = (total as f64).ln();
    let scores: Vec<f64> = arms
        .iter()
        .map(|a| {
            let n = (a.resolved + a.pending) as f64;
            a.mean + exploration * (2.0 * ln_total / n).sqrt()
        })
        .collect();
    argmax(&scores)
}

/// First index of the maximum; NaN never wins.
fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, s) in scores.iter().enumerate().skip(1) {
        if *s > scores[best] || scores[best].is_nan() {
            best = i;
        }
    }
    best
}

/// Box–Muller standard normal draw.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
