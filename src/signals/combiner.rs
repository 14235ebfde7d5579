// =============================================================================
// Signal Combiner — model + cohort + mood blend with eligibility gating
// =============================================================================
//
//   model_alpha   = (p_up - p_down) * model_alpha_scale_bps
//   base_alpha    = (w_m * model_alpha + Σ w_k * conf_k * alpha_k)
//                   / (w_m + Σ w_k * conf_k)          over Usable cohorts only
//   combined      = base * (1 + clamp(mood, -1, 1) * k * sign(base)),  k < 1
//
// The mood factor stays strictly positive, so it scales the magnitude but
// can never flip the sign of the blend.
//
// Eligibility (first failing gate is reported):
//   confidence >= CONF_MIN
//   |combined| >= ALPHA_MIN
//   combined != 0
//   if require_consensus: some Usable cohort shares the sign and clears its
//   kind's threshold (S_MIN / M_MIN / S_MIN_SOCIAL)
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::cohort::AssessedCohortSignal;
use crate::decision::record::IneligibilityReason;
use crate::model::ClassProbabilities;
use crate::signals::thresholds::ThresholdConfig;
use crate::types::Direction;

fn default_model_weight() -> f64 {
    1.0
}

fn default_model_alpha_scale_bps() -> f64 {
    100.0
}

fn default_mood_max_adjustment() -> f64 {
    0.25
}

/// Blend weights and scales. Thresholds are deliberately not part of this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinerConfig {
    #[serde(default = "default_model_weight")]
    pub model_weight: f64,

    /// Basis points implied by a full `p_up - p_down` spread of 1.0.
    #[serde(default = "default_model_alpha_scale_bps")]
    pub model_alpha_scale_bps: f64,

    /// Largest relative change mood may apply, in [0, 1).
    #[serde(default = "default_mood_max_adjustment")]
    pub mood_max_adjustment: f64,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            model_weight: default_model_weight(),
            model_alpha_scale_bps: default_model_alpha_scale_bps(),
            mood_max_adjustment: default_mood_max_adjustment(),
        }
    }
}

/// Output of one combination, before the DecisionEngine wraps it into a
/// SignalRecord.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedSignal {
    pub model_alpha_bps: f64,
    pub combined_alpha_bps: f64,
    pub confidence: f64,
    pub eligible: bool,
    pub direction: Direction,
    pub ineligibility_reason: Option<IneligibilityReason>,
}

#[derive(Debug, Clone)]
pub struct SignalCombiner {
    config: CombinerConfig,
}

impl SignalCombiner {
    pub fn new(config: CombinerConfig) -> Self {
        let mut config = config;
        if !config.mood_max_adjustment.is_finite() {
            config.mood_max_adjustment = 0.0;
        }
        // Strictly below 1 so the mood factor never reaches zero.
        config.mood_max_adjustment = config.mood_max_adjustment.clamp(0.0, 0.99);
        if !config.model_weight.is_finite() || config.model_weight < 0.0 {
            config.model_weight = 0.0;
        }
        Self { config }
    }

    pub fn model_alpha(&self, probs: &ClassProbabilities) -> f64 {
        probs.spread() * self.config.model_alpha_scale_bps
    }

    /// Weighted blend of model alpha and usable cohort alphas.
    pub fn blend(&self, model_alpha_bps: f64, cohorts: &[AssessedCohortSignal]) -> f64 {
        let mut num = self.config.model_weight * model_alpha_bps;
        let mut den = self.config.model_weight;
        for c in cohorts.iter().filter(|c| c.is_usable()) {
            let w = c.weight.max(0.0) * c.confidence;
            num += w * c.alpha_bps;
            den += w;
        }
        if den > 0.0 {
            num / den
        } else {
            0.0
        }
    }

    /// Bounded, sign-preserving mood adjustment. `mood` is a sentiment score
    /// in [-1, 1]; positive mood strengthens longs and damps shorts.
    pub fn apply_mood(&self, base_alpha_bps: f64, mood: Option<f64>) -> f64 {
        let Some(mood) = mood.filter(|m| m.is_finite()) else {
            return base_alpha_bps;
        };
        let sign = Direction::from_alpha(base_alpha_bps).sign();
        base_alpha_bps * (1.0 + mood.clamp(-1.0, 1.0) * self.config.mood_max_adjustment * sign)
    }

    pub fn combine(
        &self,
        probs: &ClassProbabilities,
        cohorts: &[AssessedCohortSignal],
        mood: Option<f64>,
        thresholds: &ThresholdConfig,
    ) -> CombinedSignal {
        let model_alpha_bps = self.model_alpha(probs);
        let combined_alpha_bps = self.apply_mood(self.blend(model_alpha_bps, cohorts), mood);
        let confidence = probs.confidence();

        let ineligibility_reason = gate(confidence, combined_alpha_bps, cohorts, thresholds);
        let eligible = ineligibility_reason.is_none();
        let direction = if eligible {
            Direction::from_alpha(combined_alpha_bps)
        } else {
            Direction::Neutral
        };

        CombinedSignal {
            model_alpha_bps,
            combined_alpha_bps,
            confidence,
            eligible,
            direction,
            ineligibility_reason,
        }
    }
}

fn gate(
    confidence: f64,
    alpha: f64,
    cohorts: &[AssessedCohortSignal],
    t: &ThresholdConfig,
) -> Option<IneligibilityReason> {
    if confidence < t.conf_min {
        return Some(IneligibilityReason::LowConfidence);
    }
    if alpha.abs() < t.alpha_min {
        return Some(IneligibilityReason::InsufficientAlpha);
    }
    if alpha == 0.0 {
        return Some(IneligibilityReason::NoDirection);
    }
    if t.require_consensus {
        let mut usable = cohorts.iter().filter(|c| c.is_usable()).peekable();
        if usable.peek().is_none() {
            return Some(IneligibilityReason::CohortUnavailable);
        }
        let agrees = usable.any(|c| {
            // Zero never agrees with either side.
            c.alpha_bps != 0.0
                && c.alpha_bps.signum() == alpha.signum()
                && c.alpha_bps.abs() >= c.kind.consensus_threshold(t)
        });
        if !agrees {
            return Some(IneligibilityReason::NoConsensus);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::{CohortKind, CohortStatus, DegradedReason};
    use proptest::prelude::*;

    fn cohort(kind: CohortKind, alpha: f64, status: CohortStatus) -> AssessedCohortSignal {
        AssessedCohortSignal {
            cohort_id: format!("{kind}"),
            kind,
            weight: 0.5,
            alpha_bps: alpha,
            confidence: 1.0,
            sample_size: 100,
            status,
        }
    }

    fn combiner(scale: f64) -> SignalCombiner {
        SignalCombiner::new(CombinerConfig {
            model_weight: 1.0,
            model_alpha_scale_bps: scale,
            mood_max_adjustment: 0.25,
        })
    }

    #[test]
    fn low_confidence_blocks_regardless_of_alpha() {
        // Confidence 0.267 against CONF_MIN 0.60.
        let probs = ClassProbabilities::new(0.267, 0.466, 0.267).unwrap();
        let t = ThresholdConfig::new(0.60, 0.0, 0.0, 0.0, 0.0, false).unwrap();
        let out = combiner(1.0e6).combine(&probs, &[], None, &t);
        assert!(!out.eligible);
        assert_eq!(out.ineligibility_reason, Some(IneligibilityReason::LowConfidence));
        assert_eq!(out.direction, Direction::Neutral);

        let skewed = ClassProbabilities::new(0.0, 0.733, 0.267).unwrap();
        let out = combiner(1.0e6).combine(&skewed, &[], None, &t);
        assert!(out.combined_alpha_bps.abs() > 1.0e5);
        assert!(!out.eligible);
    }

    #[test]
    fn model_only_sell_passes_without_consensus() {
        let probs = ClassProbabilities::new(0.65, 0.30, 0.05).unwrap();
        let cohorts = [cohort(CohortKind::Smart, 0.0, CohortStatus::Usable)];
        let t = ThresholdConfig::new(0.60, 25.0, 5.0, 5.0, 5.0, false).unwrap();
        let out = combiner(75.0).combine(&probs, &cohorts, None, &t);
        assert!((out.combined_alpha_bps + 30.0).abs() < 1e-9);
        assert!(out.eligible);
        assert_eq!(out.direction, Direction::Sell);

        // The same inputs fail once consensus is required.
        let strict = ThresholdConfig { require_consensus: true, ..t };
        let out = combiner(75.0).combine(&probs, &cohorts, None, &strict);
        assert_eq!(out.ineligibility_reason, Some(IneligibilityReason::NoConsensus));
        assert_eq!(out.direction, Direction::Neutral);
    }

    #[test]
    fn degraded_cohorts_are_excluded_from_blend_and_consensus() {
        let probs = ClassProbabilities::new(0.1, 0.2, 0.7).unwrap();
        let degraded = cohort(
            CohortKind::Mid,
            -500.0,
            CohortStatus::Degraded(DegradedReason::Stale),
        );
        let c = combiner(100.0);
        assert!((c.blend(60.0, &[degraded.clone()]) - 60.0).abs() < 1e-12);

        let t = ThresholdConfig::new(0.5, 10.0, 0.0, 0.0, 0.0, true).unwrap();
        let out = c.combine(&probs, &[degraded], None, &t);
        assert_eq!(out.ineligibility_reason, Some(IneligibilityReason::CohortUnavailable));
    }

    #[test]
    fn consensus_uses_kind_threshold() {
        let probs = ClassProbabilities::new(0.1, 0.2, 0.7).unwrap();
        let t = ThresholdConfig::new(0.5, 10.0, 50.0, 5.0, 50.0, true).unwrap();
        let smart = cohort(CohortKind::Smart, 20.0, CohortStatus::Usable);
        let mid = cohort(CohortKind::Mid, 20.0, CohortStatus::Usable);
        let c = combiner(100.0);
        assert!(!c.combine(&probs, &[smart.clone()], None, &t).eligible);
        let out = c.combine(&probs, &[smart, mid], None, &t);
        assert!(out.eligible);
        assert_eq!(out.direction, Direction::Buy);
    }

    #[test]
    fn exact_zero_alpha_is_neutral() {
        let probs = ClassProbabilities::new(0.4, 0.2, 0.4).unwrap();
        let t = ThresholdConfig::new(0.0, 0.0, 0.0, 0.0, 0.0, false).unwrap();
        let out = combiner(100.0).combine(&probs, &[], Some(0.8), &t);
        assert_eq!(out.combined_alpha_bps, 0.0);
        assert!(!out.eligible);
        assert_eq!(out.ineligibility_reason, Some(IneligibilityReason::NoDirection));
        assert_eq!(out.direction, Direction::Neutral);
    }

    #[test]
    fn mood_scales_but_never_flips() {
        let c = combiner(100.0);
        assert!((c.apply_mood(40.0, Some(1.0)) - 50.0).abs() < 1e-12);
        assert!((c.apply_mood(40.0, Some(-1.0)) - 30.0).abs() < 1e-12);
        assert!((c.apply_mood(-40.0, Some(1.0)) + 30.0).abs() < 1e-12);
        assert_eq!(c.apply_mood(40.0, Some(f64::NAN)), 40.0);
        assert_eq!(c.apply_mood(40.0, Some(50.0)), c.apply_mood(40.0, Some(1.0)));

        let extreme = SignalCombiner::new(CombinerConfig {
            mood_max_adjustment: 5.0,
            ..CombinerConfig::default()
        });
        assert!(extreme.apply_mood(-10.0, Some(1.0)) < 0.0);
    }

    fn probs_strategy() -> impl Strategy<Value = ClassProbabilities> {
        (0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0)
            .prop_filter("non-zero mass", |(a, b, c)| a + b + c > 1e-3)
            .prop_map(|(a, b, c)| {
                let s = a + b + c;
                let (d, u) = (a / s, c / s);
                ClassProbabilities::new(d, 1.0 - d - u, u)
                    .or_else(|_| ClassProbabilities::new(d, (1.0 - d - u).max(0.0), u))
                    .unwrap_or_else(|_| ClassProbabilities::new(0.0, 1.0, 0.0).unwrap())
            })
    }

    fn cohort_strategy() -> impl Strategy<Value = AssessedCohortSignal> {
        (0usize..3, -80.0f64..80.0, 0.0f64..1.0, any::<bool>()).prop_map(|(k, alpha, conf, ok)| {
            let kind = [CohortKind::Smart, CohortKind::Mid, CohortKind::SmartSocial][k];
            AssessedCohortSignal {
                cohort_id: format!("c{k}"),
                kind,
                weight: 0.5,
                alpha_bps: alpha,
                confidence: conf,
                sample_size: 50,
                status: if ok {
                    CohortStatus::Usable
                } else {
                    CohortStatus::Degraded(DegradedReason::InsufficientSample)
                },
            }
        })
    }

    proptest! {
        #[test]
        fn raising_any_threshold_never_makes_a_signal_eligible(
            probs in probs_strategy(),
            cohorts in prop::collection::vec(cohort_strategy(), 0..4),
            mood in -1.0f64..1.0,
            base in (0.0f64..1.0, 0.0f64..60.0, 0.0f64..40.0, 0.0f64..40.0, 0.0f64..40.0, any::<bool>()),
            bump in 0.0f64..30.0,
            which in 0usize..5,
        ) {
            let (conf, alpha, s, m, ss, consensus) = base;
            let t = ThresholdConfig::new(conf, alpha, s, m, ss, consensus).unwrap();
            let mut raised = t;
            match which {
                0 => raised.conf_min = (conf + bump / 30.0).min(1.0),
                1 => raised.alpha_min = alpha + bump,
                2 => raised.s_min = s + bump,
                3 => raised.m_min = m + bump,
                _ => raised.s_min_social = ss + bump,
            }
            let c = combiner(100.0);
            let lo = c.combine(&probs, &cohorts, Some(mood), &t);
            let hi = c.combine(&probs, &cohorts, Some(mood), &raised);
            prop_assert!(!hi.eligible || lo.eligible);
            // Direction is NEUTRAL exactly when ineligible.
            prop_assert_eq!(lo.direction == Direction::Neutral, !lo.eligible);
        }
    }
}
