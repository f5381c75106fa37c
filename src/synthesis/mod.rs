//! Decision synthesis
//!
//! Weighted vote over the committee's findings. Synthesis reads nothing but
//! the transcript, so replaying a stored transcript reproduces the decision.

use crate::audit::Transcript;
use crate::models::{
    Action, ActionTally, AgentRole, ClaimDimension, Conflict, Decision, Finding, FindingPayload,
    FindingStatus, RationaleRef, RoutingOutcome, Terminal,
};
use crate::risk::NEUTRAL_RISK;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

const NEUTRAL_ALIGNMENT: f64 = 0.5;
/// Assumed when no data specialist finding voted.
const DEFAULT_DATA_QUALITY: f64 = 0.7;

/// Vote weights and conflict thresholds
#[derive(Debug, Clone)]
pub struct SynthesisPolicy {
    pub ok_weight: f64,
    pub degraded_weight: f64,
    /// Stance polarity gap counted as a directional conflict.
    pub direction_conflict_spread: i8,
    /// Risk signal gap counted as a risk conflict.
    pub risk_conflict_spread: f64,
    /// Multiplier applied to risk-adjusted confidence when the round cap cut
    /// re-evaluation short.
    pub cap_penalty: f64,
}

impl Default for SynthesisPolicy {
    fn default() -> Self {
        Self {
            ok_weight: 1.0,
            degraded_weight: 0.5,
            direction_conflict_spread: 2,
            risk_conflict_spread: 0.4,
            cap_penalty: 0.8,
        }
    }
}

impl SynthesisPolicy {
    /// Failed findings always weigh zero.
    pub fn status_weight(&self, status: FindingStatus) -> f64 {
        match status {
            FindingStatus::Ok => self.ok_weight,
            FindingStatus::Degraded => self.degraded_weight,
            FindingStatus::Failed => 0.0,
        }
    }

    pub fn weight(&self, finding: &Finding) -> f64 {
        finding.confidence * self.status_weight(finding.status)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Synthesizer {
    policy: SynthesisPolicy,
}

impl Synthesizer {
    pub fn new(policy: SynthesisPolicy) -> Self {
        Self { policy }
    }

    pub fn synthesize(&self, transcript: &Transcript) -> Decision {
        let voting = voting_set(transcript);
        let conflicts = self.detect_conflicts(transcript, &voting);
        let data_quality_factor = data_quality(&voting);
        let evidence_seqs: Vec<u64> = voting.iter().map(|(seq, _)| *seq).collect();

        let rationale = RationaleRef {
            transcript_id: transcript.transcript_id,
            final_round: transcript.final_round(),
            evidence_seqs,
        };
        let deadline_exceeded = transcript.deadline_exceeded();
        let last_routing = transcript.last_routing_decision();

        let voters: Vec<&Finding> = voting
            .iter()
            .map(|(_, f)| *f)
            .filter(|f| f.stance.is_some())
            .collect();
        let votes = self.tally(&voters);

        if last_routing.map(|d| d.outcome) == Some(RoutingOutcome::Abort) {
            let dissents = voters
                .iter()
                .filter(|f| f.stance.map(|s| s.polarity() > 0).unwrap_or(false))
                .map(|f| f.reference())
                .collect();

            return Decision {
                action: Action::RiskHalt,
                confidence: 0.0,
                risk_adjusted_confidence: 0.0,
                risk_penalized: false,
                deadline_exceeded,
                terminal: Terminal::Aborted,
                votes,
                dissents,
                conflicts,
                macro_alignment: macro_alignment(Action::RiskHalt, &voting),
                data_quality_factor,
                rationale,
            };
        }

        let total_status_weight: f64 = voters
            .iter()
            .map(|f| self.policy.status_weight(f.status))
            .sum();

        let (action, confidence) = match votes.first() {
            Some(winner) if winner.weight > 0.0 && total_status_weight > 0.0 => (
                winner.action,
                (winner.weight / total_status_weight).clamp(0.0, 1.0),
            ),
            _ => (Action::NoAction, 0.0),
        };

        let final_risk = transcript
            .last_risk_assessment()
            .map(|a| a.overall_risk_score)
            .unwrap_or(NEUTRAL_RISK);
        let risk_penalized = last_routing.map(|d| d.capped).unwrap_or(false);

        let mut risk_adjusted_confidence = confidence * (1.0 - final_risk);
        if risk_penalized {
            risk_adjusted_confidence *= self.policy.cap_penalty;
        }

        let dissents = voters
            .iter()
            .filter(|f| f.stance.map(Action::from) != Some(action))
            .map(|f| f.reference())
            .collect();

        debug!(
            %action,
            confidence,
            risk_adjusted_confidence,
            conflicts = conflicts.len(),
            "Synthesized decision"
        );

        Decision {
            action,
            confidence,
            risk_adjusted_confidence: risk_adjusted_confidence.clamp(0.0, 1.0),
            risk_penalized,
            deadline_exceeded,
            terminal: Terminal::Synthesized,
            votes,
            dissents,
            conflicts,
            macro_alignment: macro_alignment(action, &voting),
            data_quality_factor,
            rationale,
        }
    }

    /// Tallies ordered winner first. Ties go to the more conservative action.
    fn tally(&self, voters: &[&Finding]) -> Vec<ActionTally> {
        let mut tallies: BTreeMap<Action, ActionTally> = BTreeMap::new();

        for finding in voters {
            let Some(stance) = finding.stance else {
                continue;
            };
            let action = Action::from(stance);
            let tally = tallies.entry(action).or_insert(ActionTally {
                action,
                weight: 0.0,
                voters: 0,
            });
            tally.weight += self.policy.weight(finding);
            tally.voters += 1;
        }

        let mut ordered: Vec<ActionTally> = tallies.into_values().collect();
        ordered.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(Ordering::Equal)
                .then_with(|| conservatism(a.action).cmp(&conservatism(b.action)))
        });
        ordered
    }

    /// Pairs drawn from the voting set, plus every pair of usable findings
    /// from the same round, so disagreement a later round superseded is kept.
    fn detect_conflicts(&self, transcript: &Transcript, voting: &[(u64, &Finding)]) -> Vec<Conflict> {
        let voters: HashSet<u64> = voting.iter().map(|(seq, _)| *seq).collect();
        let usable: Vec<(u64, &Finding)> = transcript
            .outcomes()
            .filter(|(_, f)| f.is_usable())
            .collect();

        let mut conflicts = Vec::new();

        for (i, (seq_a, first)) in usable.iter().enumerate() {
            for (seq_b, second) in &usable[i + 1..] {
                let same_slot = first.agent == second.agent && first.stage == second.stage;
                let comparable = first.round == second.round
                    || (voters.contains(seq_a) && voters.contains(seq_b));
                if same_slot || !comparable {
                    continue;
                }

                if let (Some(a), Some(b)) = (first.stance, second.stance) {
                    let spread = (a.polarity() - b.polarity()).abs();
                    if spread >= self.policy.direction_conflict_spread {
                        conflicts.push(conflict(ClaimDimension::Direction, first, second, spread as f64));
                    }
                }

                if let (Some(a), Some(b)) = (first.payload.risk_signal(), second.payload.risk_signal()) {
                    let spread = (a - b).abs();
                    if spread > self.policy.risk_conflict_spread {
                        conflicts.push(conflict(ClaimDimension::Risk, first, second, spread));
                    }
                }
            }
        }

        conflicts
    }
}

/// Fit of `action` with the latest market regime in the voting set.
fn macro_alignment(action: Action, voting: &[(u64, &Finding)]) -> f64 {
    let regime = voting.iter().rev().find_map(|(_, f)| match &f.payload {
        FindingPayload::Macro { market_regime, .. } => Some(market_regime.as_str()),
        _ => None,
    });
    let Some(regime) = regime else {
        return NEUTRAL_ALIGNMENT;
    };

    match (action, regime) {
        (Action::StrongBuy, "bull_market") => 0.9,
        (Action::Buy, "bull_market") => 0.8,
        (Action::StrongBuy, "bear_market") => 0.2,
        (Action::Sell, "bear_market") => 0.8,
        (Action::Hold, "transition") => 0.7,
        _ => NEUTRAL_ALIGNMENT,
    }
}

fn data_quality(voting: &[(u64, &Finding)]) -> f64 {
    voting
        .iter()
        .rev()
        .find_map(|(_, f)| match &f.payload {
            FindingPayload::DataIntelligence {
                data_quality_score, ..
            } => Some(data_quality_score.clamp(0.0, 1.0)),
            _ => None,
        })
        .unwrap_or(DEFAULT_DATA_QUALITY)
}

/// Latest usable finding per (stage, agent) slot, in transcript order.
fn voting_set(transcript: &Transcript) -> Vec<(u64, &Finding)> {
    let mut latest: BTreeMap<(&str, AgentRole), (u64, &Finding)> = BTreeMap::new();

    for (seq, finding) in transcript.outcomes() {
        if !finding.is_usable() {
            continue;
        }
        let slot = (finding.stage.as_str(), finding.agent);
        match latest.get(&slot) {
            Some((_, existing)) if existing.round > finding.round => {}
            _ => {
                latest.insert(slot, (seq, finding));
            }
        }
    }

    let mut voting: Vec<(u64, &Finding)> = latest.into_values().collect();
    voting.sort_by_key(|(seq, _)| *seq);
    voting
}

/// Lower sorts first: neutral before directional, bearish before bullish.
fn conservatism(action: Action) -> (u8, i8) {
    let polarity: i8 = match action {
        Action::StrongBuy => 2,
        Action::Buy => 1,
        Action::Hold | Action::NoAction | Action::RiskHalt => 0,
        Action::Sell => -1,
        Action::StrongSell => -2,
    };
    (polarity.unsigned_abs(), polarity)
}

fn conflict(dimension: ClaimDimension, first: &Finding, second: &Finding, spread: f64) -> Conflict {
    Conflict {
        dimension,
        first: first.reference(),
        second: second.reference(),
        spread,
    }
}
