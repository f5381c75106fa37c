//! Audit recording and replay
//!
//! Every deliberation is recorded as an append-only transcript. The transcript
//! is the only input synthesis needs, so a stored transcript can be replayed
//! into the identical decision.

use crate::models::{AgentRole, Finding, RiskAssessment, RoutingDecision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod minutes;
pub mod sink;

pub use minutes::CommitteeMinutes;
pub use sink::{CommitteeRecord, InMemoryResultSink, ResultSink};

/// Result of a single reasoning attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptResult {
    Succeeded,
    Failed { error: String, transient: bool },
    /// Cut off by the agent's own timeout while in flight.
    TimedOut,
    /// Cancelled in flight by the overall deadline.
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    StageEntered {
        stage: String,
        agents: Vec<AgentRole>,
    },
    AgentAttempt {
        stage: String,
        agent: AgentRole,
        attempt: u32,
        result: AttemptResult,
    },
    AgentOutcome {
        finding: Finding,
    },
    RiskComputed {
        assessment: RiskAssessment,
    },
    RoutingDecided {
        decision: RoutingDecision,
    },
    DeadlineExceeded {
        stage: String,
        unsettled: Vec<AgentRole>,
    },
}

/// One recorded event. Never mutated after recording.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub round: u32,
    pub event: AuditEvent,
}

type Slot = (u32, String, AgentRole);

#[derive(Default)]
struct RecorderState {
    events: Vec<TranscriptEvent>,
    /// Attempts started but not yet recorded, by (round, stage, agent).
    in_flight: HashMap<Slot, u32>,
}

impl RecorderState {
    fn push(&mut self, round: u32, event: AuditEvent) -> u64 {
        let seq = self.events.len() as u64;
        self.events.push(TranscriptEvent {
            seq,
            timestamp: Utc::now(),
            round,
            event,
        });
        seq
    }
}

/// Append-only event sink shared by the orchestrator and in-flight agents.
#[derive(Clone)]
pub struct AuditRecorder {
    transcript_id: Uuid,
    request_id: Uuid,
    state: Arc<RwLock<RecorderState>>,
}

impl AuditRecorder {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            transcript_id: Uuid::new_v4(),
            request_id,
            state: Arc::new(RwLock::new(RecorderState::default())),
        }
    }

    /// Append an event, returning its sequence number.
    pub async fn record(&self, round: u32, event: AuditEvent) -> u64 {
        self.state.write().await.push(round, event)
    }

    /// Mark an attempt as in flight so it can still be recorded if the
    /// invocation is cut off before it settles.
    pub async fn begin_attempt(&self, round: u32, stage: &str, agent: AgentRole, attempt: u32) {
        let mut state = self.state.write().await;
        state.in_flight.insert((round, stage.to_string(), agent), attempt);
    }

    /// Record a settled attempt and clear its in-flight mark in one step.
    pub async fn settle_attempt(
        &self,
        round: u32,
        stage: &str,
        agent: AgentRole,
        attempt: u32,
        result: AttemptResult,
    ) -> u64 {
        let mut state = self.state.write().await;
        state.in_flight.remove(&(round, stage.to_string(), agent));
        state.push(
            round,
            AuditEvent::AgentAttempt {
                stage: stage.to_string(),
                agent,
                attempt,
                result,
            },
        )
    }

    /// Close out an attempt left in flight, recording it with `result`.
    /// Returns the attempt number, or `None` when nothing was in flight.
    pub async fn interrupt_attempt(
        &self,
        round: u32,
        stage: &str,
        agent: AgentRole,
        result: AttemptResult,
    ) -> Option<u32> {
        let mut state = self.state.write().await;
        let attempt = state.in_flight.remove(&(round, stage.to_string(), agent))?;
        state.push(
            round,
            AuditEvent::AgentAttempt {
                stage: stage.to_string(),
                agent,
                attempt,
                result,
            },
        );
        Some(attempt)
    }

    /// Attempts recorded so far for one slot.
    pub async fn attempt_count(&self, round: u32, stage: &str, agent: AgentRole) -> u32 {
        let state = self.state.read().await;
        count_attempts(&state.events, round, stage, agent) as u32
    }

    /// Whether an outcome has already been recorded for the slot.
    pub async fn has_outcome(&self, round: u32, stage: &str, agent: AgentRole) -> bool {
        let state = self.state.read().await;
        state.events.iter().any(|e| match &e.event {
            AuditEvent::AgentOutcome { finding } => {
                e.round == round && finding.stage == stage && finding.agent == agent
            }
            _ => false,
        })
    }

    /// Immutable copy of everything recorded so far.
    pub async fn snapshot(&self) -> Transcript {
        let state = self.state.read().await;
        Transcript {
            transcript_id: self.transcript_id,
            request_id: self.request_id,
            events: state.events.clone(),
        }
    }

    pub async fn finish(self) -> Transcript {
        self.snapshot().await
    }
}

fn count_attempts(events: &[TranscriptEvent], round: u32, stage: &str, agent: AgentRole) -> usize {
    events
        .iter()
        .filter(|e| {
            e.round == round
                && matches!(
                    &e.event,
                    AuditEvent::AgentAttempt { stage: s, agent: a, .. } if s == stage && *a == agent
                )
        })
        .count()
}

/// Ordered record of one deliberation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    pub transcript_id: Uuid,
    pub request_id: Uuid,
    pub events: Vec<TranscriptEvent>,
}

impl Transcript {
    /// Every recorded finding with the sequence number of its outcome event.
    pub fn outcomes(&self) -> impl Iterator<Item = (u64, &Finding)> {
        self.events.iter().filter_map(|e| match &e.event {
            AuditEvent::AgentOutcome { finding } => Some((e.seq, finding)),
            _ => None,
        })
    }

    pub fn findings(&self) -> Vec<&Finding> {
        self.outcomes().map(|(_, f)| f).collect()
    }

    pub fn findings_for_round(&self, round: u32) -> Vec<&Finding> {
        self.outcomes()
            .map(|(_, f)| f)
            .filter(|f| f.round == round)
            .collect()
    }

    pub fn outcomes_for_round(&self, round: u32) -> Vec<(u64, &Finding)> {
        self.outcomes().filter(|(_, f)| f.round == round).collect()
    }

    pub fn outcome_count(&self, round: u32, stage: &str) -> usize {
        self.outcomes()
            .filter(|(_, f)| f.round == round && f.stage == stage)
            .count()
    }

    pub fn attempts_for(&self, round: u32, stage: &str, agent: AgentRole) -> usize {
        count_attempts(&self.events, round, stage, agent)
    }

    /// Stages entered in a round, in order.
    pub fn stages_entered(&self, round: u32) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| e.round == round)
            .filter_map(|e| match &e.event {
                AuditEvent::StageEntered { stage, .. } => Some(stage.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Number of rounds that entered at least one stage.
    pub fn rounds(&self) -> u32 {
        let rounds: BTreeSet<u32> = self
            .events
            .iter()
            .filter(|e| matches!(e.event, AuditEvent::StageEntered { .. }))
            .map(|e| e.round)
            .collect();
        rounds.len() as u32
    }

    pub fn final_round(&self) -> u32 {
        self.events.iter().map(|e| e.round).max().unwrap_or(0)
    }

    pub fn routing_decisions(&self) -> Vec<&RoutingDecision> {
        self.events
            .iter()
            .filter_map(|e| match &e.event {
                AuditEvent::RoutingDecided { decision } => Some(decision),
                _ => None,
            })
            .collect()
    }

    pub fn last_routing_decision(&self) -> Option<&RoutingDecision> {
        self.routing_decisions().pop()
    }

    pub fn last_risk_assessment(&self) -> Option<&RiskAssessment> {
        self.events.iter().rev().find_map(|e| match &e.event {
            AuditEvent::RiskComputed { assessment } => Some(assessment),
            _ => None,
        })
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e.event, AuditEvent::DeadlineExceeded { .. }))
    }

    /// SHA256 over the serialized transcript
    pub fn integrity_hash(&self) -> String {
        compute_transcript_hash(self)
    }
}

/// Compute SHA256 hash of a transcript for integrity verification.
/// Streams JSON directly into the hasher.
pub fn compute_transcript_hash(transcript: &Transcript) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), transcript).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stance;
    use crate::testing::{assessment, finding};

    #[tokio::test]
    async fn test_record_is_sequenced_and_append_only() {
        let recorder = AuditRecorder::new(Uuid::new_v4());
        let first = recorder
            .record(
                0,
                AuditEvent::StageEntered {
                    stage: "core_analysts".to_string(),
                    agents: vec![AgentRole::FirstOrderQuant],
                },
            )
            .await;
        let before = recorder.snapshot().await;

        let second = recorder
            .record(
                0,
                AuditEvent::AgentOutcome {
                    finding: finding(AgentRole::FirstOrderQuant, "core_analysts", Stance::Buy, 0.9),
                },
            )
            .await;

        assert_eq!((first, second), (0, 1));
        assert_eq!(before.events.len(), 1);

        let after = recorder.snapshot().await;
        assert_eq!(after.events[0], before.events[0]);
        assert_eq!(after.outcome_count(0, "core_analysts"), 1);
        assert_eq!(after.outcomes_for_round(0)[0].0, 1);
        assert!(recorder.has_outcome(0, "core_analysts", AgentRole::FirstOrderQuant).await);
        assert!(!recorder.has_outcome(1, "core_analysts", AgentRole::FirstOrderQuant).await);
    }

    #[tokio::test]
    async fn test_transcript_views() {
        let recorder = AuditRecorder::new(Uuid::new_v4());
        recorder
            .record(
                0,
                AuditEvent::StageEntered {
                    stage: "risk_control".to_string(),
                    agents: vec![AgentRole::RiskController],
                },
            )
            .await;
        recorder
            .record(0, AuditEvent::RiskComputed { assessment: assessment(0, 0.3, &[]) })
            .await;
        recorder
            .record(
                1,
                AuditEvent::StageEntered {
                    stage: "risk_control".to_string(),
                    agents: vec![AgentRole::RiskController],
                },
            )
            .await;
        recorder
            .record(1, AuditEvent::RiskComputed { assessment: assessment(1, 0.6, &["leverage"]) })
            .await;

        let transcript = recorder.finish().await;
        assert_eq!(transcript.rounds(), 2);
        assert_eq!(transcript.final_round(), 1);
        assert_eq!(transcript.stages_entered(1), vec!["risk_control"]);
        assert_eq!(transcript.last_risk_assessment().unwrap().overall_risk_score, 0.6);
        assert!(!transcript.deadline_exceeded());
    }

    #[tokio::test]
    async fn test_integrity_hash_detects_tampering() {
        let recorder = AuditRecorder::new(Uuid::new_v4());
        recorder
            .record(
                0,
                AuditEvent::AgentOutcome {
                    finding: finding(AgentRole::MacroStrategist, "specialists", Stance::Hold, 0.6),
                },
            )
            .await;

        let transcript = recorder.snapshot().await;
        let hash = transcript.integrity_hash();
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, transcript.clone().integrity_hash());

        let mut tampered = transcript;
        if let AuditEvent::AgentOutcome { finding } = &mut tampered.events[0].event {
            finding.confidence = 0.99;
        }
        assert_ne!(hash, tampered.integrity_hash());
    }
}
