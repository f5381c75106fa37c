//! Investment committee minutes
//!
//! Human-readable digest compiled from a transcript and the decision it produced.

use super::{AuditEvent, Transcript};
use crate::models::{
    AgentRole, ClaimDimension, Decision, FindingStatus, RoutingOutcome, Stance, Terminal,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub role: AgentRole,
    pub title: String,
    pub contributions: usize,
    pub degraded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MinuteEntry {
    pub stage: String,
    pub agent: AgentRole,
    pub status: FindingStatus,
    pub stance: Option<Stance>,
    pub confidence: f64,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundMinutes {
    pub round: u32,
    pub stages: Vec<String>,
    pub entries: Vec<MinuteEntry>,
    pub risk_score: Option<f64>,
    pub routing: Option<RoutingOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitteeMinutes {
    pub transcript_id: Uuid,
    pub request_id: Uuid,
    pub participants: Vec<Participant>,
    pub rounds: Vec<RoundMinutes>,
    pub key_debates: Vec<String>,
    pub consensus: Vec<String>,
    pub decision_process: Vec<String>,
    pub resolution: String,
}

impl CommitteeMinutes {
    pub fn compile(transcript: &Transcript, decision: &Decision) -> Self {
        let mut participants: BTreeMap<AgentRole, Participant> = BTreeMap::new();
        let mut rounds: BTreeMap<u32, RoundMinutes> = BTreeMap::new();

        for event in &transcript.events {
            let round = rounds.entry(event.round).or_insert_with(|| RoundMinutes {
                round: event.round,
                stages: Vec::new(),
                entries: Vec::new(),
                risk_score: None,
                routing: None,
            });

            match &event.event {
                AuditEvent::StageEntered { stage, .. } => round.stages.push(stage.clone()),
                AuditEvent::AgentOutcome { finding } => {
                    let participant =
                        participants
                            .entry(finding.agent)
                            .or_insert_with(|| Participant {
                                role: finding.agent,
                                title: finding.agent.title().to_string(),
                                contributions: 0,
                                degraded: 0,
                                failed: 0,
                            });
                    participant.contributions += 1;
                    match finding.status {
                        FindingStatus::Degraded => participant.degraded += 1,
                        FindingStatus::Failed => participant.failed += 1,
                        FindingStatus::Ok => {}
                    }

                    round.entries.push(MinuteEntry {
                        stage: finding.stage.clone(),
                        agent: finding.agent,
                        status: finding.status,
                        stance: finding.stance,
                        confidence: finding.confidence,
                        note: finding
                            .failure_reason
                            .clone()
                            .filter(|_| finding.status == FindingStatus::Failed)
                            .unwrap_or_else(|| finding.summary.clone()),
                    });
                }
                AuditEvent::RiskComputed { assessment } => {
                    round.risk_score = Some(assessment.overall_risk_score)
                }
                AuditEvent::RoutingDecided { decision } => round.routing = Some(decision.outcome),
                AuditEvent::AgentAttempt { .. } | AuditEvent::DeadlineExceeded { .. } => {}
            }
        }

        let key_debates = decision
            .conflicts
            .iter()
            .map(|c| {
                let dimension = match c.dimension {
                    ClaimDimension::Direction => "direction",
                    ClaimDimension::Risk => "risk",
                };
                format!(
                    "{} (round {}) vs {} (round {}) disagree on {} by {:.2}",
                    c.first.agent.title(),
                    c.first.round,
                    c.second.agent.title(),
                    c.second.round,
                    dimension,
                    c.spread
                )
            })
            .collect();

        let voters: usize = decision.votes.iter().map(|t| t.voters).sum();
        let mut consensus: Vec<String> = decision
            .votes
            .iter()
            .map(|t| {
                format!(
                    "{} of {} voting members favour {} (weight {:.2})",
                    t.voters, voters, t.action, t.weight
                )
            })
            .collect();
        if decision.data_quality_factor > 0.7 {
            consensus.push(format!(
                "Data quality is sound (score {:.2})",
                decision.data_quality_factor
            ));
        }
        if decision.macro_alignment > 0.7 {
            consensus.push("Decision is well aligned with the macro regime".to_string());
        }

        let rounds: Vec<RoundMinutes> = rounds.into_values().collect();
        let decision_process = decision_process(&rounds, transcript, decision);

        let resolution = match decision.terminal {
            Terminal::Aborted => "Committee halted on risk grounds; no position taken".to_string(),
            Terminal::Synthesized => format!(
                "Resolved: {} with confidence {:.2} (risk-adjusted {:.2})",
                decision.action, decision.confidence, decision.risk_adjusted_confidence
            ),
        };

        Self {
            transcript_id: transcript.transcript_id,
            request_id: transcript.request_id,
            participants: participants.into_values().collect(),
            rounds,
            key_debates,
            consensus,
            decision_process,
            resolution,
        }
    }
}

fn decision_process(rounds: &[RoundMinutes], transcript: &Transcript, decision: &Decision) -> Vec<String> {
    let mut steps = Vec::new();

    for round in rounds {
        let settled = round.entries.len();
        let failed = round
            .entries
            .iter()
            .filter(|e| e.status == FindingStatus::Failed)
            .count();
        let mut line = format!(
            "Round {}: {} stage(s), {} finding(s), {} failed",
            round.round,
            round.stages.len(),
            settled,
            failed
        );
        if let Some(score) = round.risk_score {
            line.push_str(&format!(", risk {:.2}", score));
        }
        if let Some(outcome) = round.routing {
            let label = match outcome {
                RoutingOutcome::Advance => "advance",
                RoutingOutcome::Loop => "re-analysis requested",
                RoutingOutcome::Abort => "risk halt",
            };
            line.push_str(&format!(" -> {}", label));
        }
        steps.push(line);
    }

    if transcript.deadline_exceeded() {
        steps.push("Overall deadline exceeded; synthesis used partial findings".to_string());
    }
    if decision.risk_penalized {
        steps.push("Round cap reached with elevated risk; confidence penalized".to_string());
    }
    steps.push(format!(
        "Weighted vote over {} finding(s) with {} conflict(s) recorded",
        decision.rationale.evidence_seqs.len(),
        decision.conflicts.len()
    ));

    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditRecorder;
    use crate::models::FindingPayload;
    use crate::synthesis::Synthesizer;
    use crate::testing::{assessment, finding};

    #[tokio::test]
    async fn test_minutes_record_consensus_and_debates() {
        let recorder = AuditRecorder::new(Uuid::new_v4());
        recorder
            .record(
                0,
                AuditEvent::StageEntered {
                    stage: "panel".to_string(),
                    agents: vec![AgentRole::DataIntelligence, AgentRole::MacroStrategist],
                },
            )
            .await;

        let mut data = finding(AgentRole::DataIntelligence, "panel", Stance::Buy, 0.8);
        data.payload = FindingPayload::DataIntelligence {
            market_snapshot: serde_json::json!({}),
            sentiment_score: 0.5,
            data_quality_score: 0.85,
            anomalies: vec![],
        };
        let mut macro_view = finding(AgentRole::MacroStrategist, "panel", Stance::Buy, 0.9);
        macro_view.payload = FindingPayload::Macro {
            market_regime: "bull_market".to_string(),
            outlook: "Supportive liquidity".to_string(),
            key_drivers: vec![],
            regime_risk: Some(0.2),
        };
        let bear = finding(AgentRole::ContrarianSkeptic, "panel", Stance::StrongSell, 0.4);
        for f in [data, macro_view, bear] {
            recorder.record(0, AuditEvent::AgentOutcome { finding: f }).await;
        }
        recorder
            .record(0, AuditEvent::RiskComputed { assessment: assessment(0, 0.2, &[]) })
            .await;

        let transcript = recorder.finish().await;
        let decision = Synthesizer::default().synthesize(&transcript);
        let minutes = CommitteeMinutes::compile(&transcript, &decision);

        assert_eq!(minutes.participants.len(), 3);
        assert_eq!(minutes.rounds.len(), 1);
        assert_eq!(minutes.rounds[0].risk_score, Some(0.2));
        assert_eq!(minutes.key_debates.len(), 2);
        assert!(minutes
            .consensus
            .iter()
            .any(|c| c.starts_with("Data quality is sound")));
        assert!(minutes
            .consensus
            .iter()
            .any(|c| c.contains("macro regime")));
        assert!(minutes.resolution.starts_with("Resolved: buy"));
    }
}
