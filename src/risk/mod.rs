//! Risk aggregation and routing
//!
//! `RiskAggregator` condenses a round's findings into one assessment and
//! `RiskRouter` turns that assessment into the next move. Both are pure.

use crate::config::RoutingConfig;
use crate::models::{
    Finding, FindingStatus, RiskAssessment, RiskHint, RoutingDecision, RoutingOutcome,
};
use crate::synthesis::SynthesisPolicy;
use std::collections::BTreeSet;

/// Score used when no finding states a risk signal.
pub const NEUTRAL_RISK: f64 = 0.5;

/// Findings -> RiskAssessment
#[derive(Debug, Clone)]
pub struct RiskAggregator {
    ok_weight: f64,
    degraded_weight: f64,
}

impl RiskAggregator {
    pub fn new(policy: &SynthesisPolicy) -> Self {
        Self {
            ok_weight: policy.ok_weight,
            degraded_weight: policy.degraded_weight,
        }
    }

    fn status_weight(&self, status: FindingStatus) -> f64 {
        match status {
            FindingStatus::Ok => self.ok_weight,
            FindingStatus::Degraded => self.degraded_weight,
            FindingStatus::Failed => 0.0,
        }
    }

    /// Weighted mean of stated risk signals over usable findings. Failed
    /// findings are ignored entirely.
    pub fn assess(&self, round: u32, findings: &[Finding]) -> RiskAssessment {
        let mut flags = BTreeSet::new();
        let mut signals = Vec::new();

        for finding in findings.iter().filter(|f| f.is_usable()) {
            flags.extend(finding.payload.risk_flags());
            if let Some(signal) = finding.payload.risk_signal() {
                let weight = finding.confidence * self.status_weight(finding.status);
                signals.push((signal, weight));
            }
        }

        let total_weight: f64 = signals.iter().map(|(_, w)| w).sum();
        let overall_risk_score = if signals.is_empty() {
            NEUTRAL_RISK
        } else if total_weight > 0.0 {
            signals.iter().map(|(s, w)| s * w).sum::<f64>() / total_weight
        } else {
            signals.iter().map(|(s, _)| s).sum::<f64>() / signals.len() as f64
        };
        let overall_risk_score = overall_risk_score.clamp(0.0, 1.0);

        RiskAssessment {
            round,
            overall_risk_score,
            flags,
            hint: hint_for(overall_risk_score),
            contributing: signals.len(),
        }
    }
}

impl Default for RiskAggregator {
    fn default() -> Self {
        Self::new(&SynthesisPolicy::default())
    }
}

/// Risk-limit bands
pub fn hint_for(score: f64) -> RiskHint {
    if score > 0.8 {
        RiskHint::Halt
    } else if score > 0.6 {
        RiskHint::Reduce
    } else if score > 0.4 {
        RiskHint::Monitor
    } else {
        RiskHint::Proceed
    }
}

/// Assessment -> RoutingDecision
#[derive(Debug, Clone)]
pub struct RiskRouter {
    abort_threshold: f64,
    reevaluate_threshold: f64,
    reentry_stage: String,
}

impl RiskRouter {
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            abort_threshold: config.abort_threshold,
            reevaluate_threshold: config.reevaluate_threshold,
            reentry_stage: config.reentry_stage.clone(),
        }
    }

    /// Rounds are numbered from 0, so `max_rounds` passes end at round
    /// `max_rounds - 1`. Abort compares with `>=`, re-evaluation with `>`.
    pub fn route(&self, assessment: &RiskAssessment, round: u32, max_rounds: u32) -> RoutingDecision {
        let score = assessment.overall_risk_score;
        let has_round_left = round + 1 < max_rounds;

        let (outcome, target_stage, capped) = if score >= self.abort_threshold {
            (RoutingOutcome::Abort, None, false)
        } else if score > self.reevaluate_threshold && has_round_left {
            (RoutingOutcome::Loop, Some(self.reentry_stage.clone()), false)
        } else if score > self.reevaluate_threshold {
            (RoutingOutcome::Advance, None, true)
        } else {
            (RoutingOutcome::Advance, None, false)
        };

        RoutingDecision {
            round,
            outcome,
            target_stage,
            assessment: assessment.clone(),
            capped,
        }
    }
}

impl Default for RiskRouter {
    fn default() -> Self {
        Self::new(&RoutingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentRole, FindingPayload, Stance};
    use crate::testing::{assessment, finding};

    fn risk_finding(score: f64, confidence: f64, status: FindingStatus) -> Finding {
        let mut f = finding(AgentRole::RiskController, "risk_control", Stance::Hold, confidence);
        f.status = status;
        f.payload = FindingPayload::RiskControl {
            overall_risk_score: score,
            alerts: vec![format!("alert {}", score)],
            recommendations: vec![],
        };
        f
    }

    #[test]
    fn test_assess_weighted_mean() {
        let mut macro_view = finding(AgentRole::MacroStrategist, "specialists", Stance::Hold, 0.5);
        macro_view.payload = FindingPayload::Macro {
            market_regime: "transition".to_string(),
            outlook: String::new(),
            key_drivers: vec![],
            regime_risk: Some(0.6),
        };
        let findings = vec![risk_finding(0.2, 1.0, FindingStatus::Ok), macro_view];

        let a = RiskAggregator::default().assess(0, &findings);
        // (0.2 * 1.0 + 0.6 * 0.5) / 1.5
        assert!((a.overall_risk_score - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(a.contributing, 2);
        assert_eq!(a.hint, RiskHint::Proceed);
        assert!(a.flags.contains("alert 0.2"));
    }

    #[test]
    fn test_assess_ignores_failed_and_defaults_to_neutral() {
        let failed = Finding::failed(AgentRole::RiskController, "risk_control", 0, 3, "timeout");
        let a = RiskAggregator::default().assess(0, &[failed]);
        assert_eq!(a.overall_risk_score, NEUTRAL_RISK);
        assert_eq!(a.contributing, 0);
        assert_eq!(a.hint, RiskHint::Monitor);
    }

    #[test]
    fn test_degraded_counts_half() {
        let findings = vec![
            risk_finding(0.0, 1.0, FindingStatus::Ok),
            risk_finding(0.9, 1.0, FindingStatus::Degraded),
        ];
        let a = RiskAggregator::default().assess(0, &findings);
        assert!((a.overall_risk_score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_hint_bands() {
        assert_eq!(hint_for(0.85), RiskHint::Halt);
        assert_eq!(hint_for(0.7), RiskHint::Reduce);
        assert_eq!(hint_for(0.5), RiskHint::Monitor);
        assert_eq!(hint_for(0.4), RiskHint::Proceed);
    }

    #[test]
    fn test_route_priority() {
        let router = RiskRouter::default();

        let abort = router.route(&assessment(0, 0.95, &[]), 0, 3);
        assert_eq!(abort.outcome, RoutingOutcome::Abort);

        // abort wins even on the last round
        let abort_last = router.route(&assessment(2, 0.9, &[]), 2, 3);
        assert_eq!(abort_last.outcome, RoutingOutcome::Abort);

        let looped = router.route(&assessment(0, 0.75, &[]), 0, 3);
        assert_eq!(looped.outcome, RoutingOutcome::Loop);
        assert_eq!(looped.target_stage.as_deref(), Some("core_analysts"));

        let capped = router.route(&assessment(2, 0.75, &[]), 2, 3);
        assert_eq!(capped.outcome, RoutingOutcome::Advance);
        assert!(capped.capped);

        let calm = router.route(&assessment(0, 0.2, &[]), 0, 3);
        assert_eq!(calm.outcome, RoutingOutcome::Advance);
        assert!(!calm.capped);
    }

    #[test]
    fn test_route_boundaries() {
        let router = RiskRouter::default();

        // exactly at re-evaluate does not loop
        let at_reevaluate = router.route(&assessment(0, 0.7, &[]), 0, 3);
        assert_eq!(at_reevaluate.outcome, RoutingOutcome::Advance);
        assert!(!at_reevaluate.capped);

        // exactly at abort aborts
        let at_abort = router.route(&assessment(0, 0.9, &[]), 0, 3);
        assert_eq!(at_abort.outcome, RoutingOutcome::Abort);
    }

    #[test]
    fn test_route_never_loops_past_cap() {
        let router = RiskRouter::new(&RoutingConfig {
            reevaluate_threshold: 0.5,
            ..RoutingConfig::default()
        });
        for max_rounds in 1..5 {
            for round in 0..max_rounds {
                let d = router.route(&assessment(round, 0.6, &[]), round, max_rounds);
                if round + 1 == max_rounds {
                    assert_ne!(d.outcome, RoutingOutcome::Loop);
                    assert!(d.capped);
                } else {
                    assert_eq!(d.outcome, RoutingOutcome::Loop);
                }
            }
        }
    }

    #[test]
    fn test_route_is_idempotent() {
        let router = RiskRouter::default();
        let a = assessment(1, 0.72, &["concentration"]);
        assert_eq!(router.route(&a, 1, 3), router.route(&a, 1, 3));
    }
}
