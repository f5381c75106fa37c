//! Agent invocation wrapper
//!
//! Runs one agent for one slot under its policy: the whole attempt loop is
//! bounded by the per-agent timeout, transient errors are retried with
//! exponential backoff, and exhaustion degrades to the agent's fallback.
//! The caller always gets exactly one `Finding`.

use crate::agents::{Agent, AgentOpinion};
use crate::audit::{AttemptResult, AuditEvent, AuditRecorder};
use crate::error::OrchestrationError;
use crate::models::{Context, Finding, FindingStatus};
use crate::reasoning::ReasoningClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Per-agent timeout, retry and degrade policy
#[derive(Debug, Clone)]
pub struct AgentPolicy {
    /// Bound on the whole attempt loop, backoff included
    pub timeout: Duration,

    /// Maximum number of reasoning attempts
    pub max_attempts: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier (typically 2.0 for exponential backoff)
    pub backoff_multiplier: f64,

    /// Use the agent's fallback opinion once attempts are exhausted
    pub degrade_on_exhaustion: bool,
}

impl Default for AgentPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(3),
            backoff_multiplier: 2.0,
            degrade_on_exhaustion: true,
        }
    }
}

impl AgentPolicy {
    /// Create a policy with fast retries (for testing)
    pub fn fast() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            degrade_on_exhaustion: true,
        }
    }

    /// Backoff before the given retry (1-based)
    pub fn backoff_duration(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi((retry - 1) as i32);

        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }
}

/// Uniform wrapper around the external reasoning call
pub struct AgentInvoker {
    reasoning: Arc<dyn ReasoningClient>,
}

impl AgentInvoker {
    pub fn new(reasoning: Arc<dyn ReasoningClient>) -> Self {
        Self { reasoning }
    }

    /// Invoke `agent` for one (stage, round) slot. Never fails: every error
    /// ends up as a degraded or failed finding, and exactly one outcome event
    /// is recorded.
    pub async fn invoke(
        &self,
        agent: &dyn Agent,
        ctx: &Context,
        prior: &[Finding],
        stage: &str,
        policy: &AgentPolicy,
        recorder: &AuditRecorder,
    ) -> Finding {
        let role = agent.role();
        let mut attempts = 0u32;

        let result = timeout(
            policy.timeout,
            self.attempt_loop(agent, ctx, prior, stage, policy, recorder, &mut attempts),
        )
        .await;

        let finding = match result {
            Ok(Ok(opinion)) => stamp(role, stage, ctx.round, FindingStatus::Ok, opinion, attempts, None),
            Ok(Err(e)) if policy.degrade_on_exhaustion => {
                warn!(agent = %role, stage, round = ctx.round, attempts, "Degrading to fallback: {}", e);
                stamp(
                    role,
                    stage,
                    ctx.round,
                    FindingStatus::Degraded,
                    agent.fallback(ctx),
                    attempts,
                    Some(e.to_string()),
                )
            }
            Ok(Err(e)) => {
                warn!(agent = %role, stage, round = ctx.round, attempts, "Agent failed: {}", e);
                Finding::failed(role, stage, ctx.round, attempts, e.to_string())
            }
            Err(_) => {
                recorder
                    .interrupt_attempt(ctx.round, stage, role, AttemptResult::TimedOut)
                    .await;
                let err = OrchestrationError::AgentTimeout(format!("{:?}", policy.timeout));
                warn!(agent = %role, stage, round = ctx.round, attempts, "{}", err);
                Finding::failed(role, stage, ctx.round, attempts, err.to_string())
            }
        };

        recorder
            .record(
                ctx.round,
                AuditEvent::AgentOutcome {
                    finding: finding.clone(),
                },
            )
            .await;

        finding
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt_loop(
        &self,
        agent: &dyn Agent,
        ctx: &Context,
        prior: &[Finding],
        stage: &str,
        policy: &AgentPolicy,
        recorder: &AuditRecorder,
        attempts: &mut u32,
    ) -> Result<AgentOpinion, OrchestrationError> {
        let role = agent.role();
        let prompt = agent.prompt(ctx, prior);
        let mut last_error = None;

        for attempt in 1..=policy.max_attempts {
            recorder.begin_attempt(ctx.round, stage, role, attempt).await;
            *attempts = attempt;
            debug!(agent = %role, stage, round = ctx.round, attempt, "Invoking agent");

            let outcome = match self.reasoning.call(&prompt).await {
                Ok(payload) => agent.interpret(&payload, ctx),
                Err(e) => Err(e),
            };

            let result = match &outcome {
                Ok(_) => AttemptResult::Succeeded,
                Err(e) => AttemptResult::Failed {
                    error: e.to_string(),
                    transient: e.is_transient(),
                },
            };
            recorder
                .settle_attempt(ctx.round, stage, role, attempt, result)
                .await;

            match outcome {
                Ok(opinion) => return Ok(opinion),
                Err(e) if !e.is_transient() => {
                    debug!(agent = %role, "Non-retryable error: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    if attempt < policy.max_attempts {
                        let backoff = policy.backoff_duration(attempt);
                        warn!(
                            agent = %role,
                            attempt,
                            max_attempts = policy.max_attempts,
                            "Attempt failed: {}. Retrying in {:?}",
                            e,
                            backoff
                        );
                        sleep(backoff).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            OrchestrationError::AgentInvocation(format!("{} made no attempts", role))
        }))
    }
}

fn stamp(
    agent: crate::models::AgentRole,
    stage: &str,
    round: u32,
    status: FindingStatus,
    opinion: AgentOpinion,
    attempts: u32,
    failure_reason: Option<String>,
) -> Finding {
    Finding {
        agent,
        stage: stage.to_string(),
        round,
        status,
        confidence: opinion.confidence.clamp(0.0, 1.0),
        stance: opinion.stance,
        summary: opinion.summary,
        payload: opinion.payload,
        failure_reason,
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{FirstOrderQuantAgent, RiskControllerAgent};
    use crate::audit::Transcript;
    use crate::models::{AgentRole, Stance};
    use crate::testing::{sample_context, ScriptedReasoner};
    use serde_json::json;
    use uuid::Uuid;

    async fn run(
        reasoner: ScriptedReasoner,
        agent: &dyn Agent,
        policy: AgentPolicy,
    ) -> (Finding, Transcript) {
        let recorder = AuditRecorder::new(Uuid::new_v4());
        let invoker = AgentInvoker::new(Arc::new(reasoner));
        let finding = invoker
            .invoke(agent, &sample_context(), &[], "core_analysts", &policy, &recorder)
            .await;
        (finding, recorder.finish().await)
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = AgentPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
            ..AgentPolicy::default()
        };
        assert_eq!(policy.backoff_duration(0), Duration::ZERO);
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_duration(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_duration(3), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_success_records_attempt_and_outcome() {
        let reasoner = ScriptedReasoner::new().respond(
            AgentRole::RiskController,
            json!({"overall_risk_score": 0.2, "stance": "buy", "confidence": 0.9}),
        );
        let (finding, transcript) = run(reasoner, &RiskControllerAgent, AgentPolicy::fast()).await;

        assert_eq!(finding.status, FindingStatus::Ok);
        assert_eq!(finding.stance, Some(Stance::Buy));
        assert_eq!(finding.attempts, 1);
        assert_eq!(transcript.attempts_for(0, "core_analysts", AgentRole::RiskController), 1);
        assert_eq!(transcript.findings().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_retry_then_succeed() {
        let reasoner = ScriptedReasoner::new()
            .fail_times(AgentRole::FirstOrderQuant, 2)
            .respond(
                AgentRole::FirstOrderQuant,
                json!({
                    "pnl_line": "revenue",
                    "magnitude": "+2%",
                    "kpi_shifts_pct": {"revenue_pct": 2.0},
                    "stance": "buy",
                    "confidence": 0.8
                }),
            );
        let (finding, transcript) = run(reasoner, &FirstOrderQuantAgent, AgentPolicy::fast()).await;

        assert_eq!(finding.status, FindingStatus::Ok);
        assert_eq!(finding.attempts, 3);
        assert_eq!(transcript.attempts_for(0, "core_analysts", AgentRole::FirstOrderQuant), 3);
        assert_eq!(transcript.findings().len(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_degrades_to_fallback() {
        let reasoner = ScriptedReasoner::new().fail_times(AgentRole::RiskController, 10);
        let (finding, transcript) = run(reasoner, &RiskControllerAgent, AgentPolicy::fast()).await;

        assert_eq!(finding.status, FindingStatus::Degraded);
        assert_eq!(finding.stance, Some(Stance::Hold));
        assert_eq!(finding.payload.risk_signal(), Some(0.5));
        assert!(finding.failure_reason.is_some());
        assert_eq!(transcript.attempts_for(0, "core_analysts", AgentRole::RiskController), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_without_degrade_fails() {
        let reasoner = ScriptedReasoner::new().fail_times(AgentRole::RiskController, 10);
        let policy = AgentPolicy {
            degrade_on_exhaustion: false,
            ..AgentPolicy::fast()
        };
        let (finding, _) = run(reasoner, &RiskControllerAgent, policy).await;

        assert_eq!(finding.status, FindingStatus::Failed);
        assert_eq!(finding.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_non_transient_error_stops_retrying() {
        let reasoner = ScriptedReasoner::new().fail_permanently(AgentRole::RiskController);
        let (finding, transcript) = run(reasoner, &RiskControllerAgent, AgentPolicy::fast()).await;

        assert_eq!(finding.status, FindingStatus::Degraded);
        assert_eq!(finding.attempts, 1);
        assert_eq!(transcript.attempts_for(0, "core_analysts", AgentRole::RiskController), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_retried() {
        let reasoner = ScriptedReasoner::new().respond(AgentRole::RiskController, json!({"unexpected": true}));
        let (finding, transcript) = run(reasoner, &RiskControllerAgent, AgentPolicy::fast()).await;

        assert_eq!(finding.status, FindingStatus::Degraded);
        assert_eq!(transcript.attempts_for(0, "core_analysts", AgentRole::RiskController), 3);
    }

    #[tokio::test]
    async fn test_timeout_produces_failed_finding() {
        let reasoner = ScriptedReasoner::new()
            .respond(AgentRole::RiskController, json!({"overall_risk_score": 0.2}))
            .delay(AgentRole::RiskController, Duration::from_millis(300));
        let policy = AgentPolicy {
            timeout: Duration::from_millis(30),
            ..AgentPolicy::fast()
        };
        let (finding, transcript) = run(reasoner, &RiskControllerAgent, policy).await;

        assert_eq!(finding.status, FindingStatus::Failed);
        assert!(finding
            .failure_reason
            .as_deref()
            .unwrap()
            .starts_with("agent timeout after"));
        assert_eq!(transcript.findings().len(), 1);
    }

    #[tokio::test]
    async fn test_timed_out_attempt_is_recorded() {
        let reasoner = ScriptedReasoner::new()
            .respond(AgentRole::RiskController, json!({"overall_risk_score": 0.2}))
            .delay(AgentRole::RiskController, Duration::from_millis(300));
        let policy = AgentPolicy {
            timeout: Duration::from_millis(30),
            ..AgentPolicy::fast()
        };
        let (finding, transcript) = run(reasoner, &RiskControllerAgent, policy).await;

        assert_eq!(finding.attempts, 1);
        assert_eq!(
            transcript.attempts_for(0, "core_analysts", AgentRole::RiskController),
            finding.attempts as usize
        );
        let last_attempt = transcript
            .events
            .iter()
            .rev()
            .find_map(|e| match &e.event {
                AuditEvent::AgentAttempt { result, .. } => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_attempt, AttemptResult::TimedOut);
    }

    #[tokio::test]
    async fn test_timeout_after_retries_counts_every_attempt() {
        // two quick transient failures, then a third call that hangs
        let reasoner = ScriptedReasoner::new()
            .fail_times(AgentRole::RiskController, 2)
            .respond(AgentRole::RiskController, json!({"overall_risk_score": 0.2}));
        let reasoner = Arc::new(reasoner);
        let policy = AgentPolicy {
            timeout: Duration::from_millis(200),
            ..AgentPolicy::fast()
        };

        let recorder = AuditRecorder::new(Uuid::new_v4());
        let invoker = AgentInvoker::new(Arc::new(HangAfter {
            inner: reasoner.clone(),
            calls: 2,
        }));
        let finding = invoker
            .invoke(&RiskControllerAgent, &sample_context(), &[], "risk_control", &policy, &recorder)
            .await;
        let transcript = recorder.finish().await;

        assert_eq!(finding.status, FindingStatus::Failed);
        assert_eq!(finding.attempts, 3);
        assert_eq!(transcript.attempts_for(0, "risk_control", AgentRole::RiskController), 3);
        assert_eq!(transcript.attempts_for(0, "core_analysts", AgentRole::RiskController), 0);
    }

    /// Delegates the first `calls` calls, then never answers.
    struct HangAfter {
        inner: Arc<ScriptedReasoner>,
        calls: u32,
    }

    #[async_trait::async_trait]
    impl ReasoningClient for HangAfter {
        async fn call(&self, prompt: &crate::reasoning::PromptContext) -> crate::Result<serde_json::Value> {
            if self.inner.calls(prompt.agent) >= self.calls {
                std::future::pending::<()>().await;
            }
            self.inner.call(prompt).await
        }
    }
}
