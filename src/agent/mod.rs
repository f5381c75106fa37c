//! Main orchestrator - drives the committee deliberation
//!
//! SEED → STAGES (fan-out / fan-in) → RISK GATE → LOOP? | ABORT? → SYNTHESIZE
//!
//! The orchestrator is the only writer of round state. Agents run in spawned
//! tasks and only ever see an immutable `Context`.

use crate::agents::AgentRegistry;
use crate::audit::{AttemptResult, AuditEvent, AuditRecorder, CommitteeMinutes, ResultSink, Transcript};
use crate::config::CommitteeConfig;
use crate::data::ContextBuilder;
use crate::graph::{Stage, StageGraph, StageMode};
use crate::invocation::AgentInvoker;
use crate::models::{
    AgentRole, CommitteeRequest, Context, Decision, Finding, RiskAssessment, RoutingOutcome,
};
use crate::reasoning::ReasoningClient;
use crate::risk::{RiskAggregator, RiskRouter};
use crate::synthesis::Synthesizer;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEADLINE_REASON: &str = "deadline exceeded";

/// Everything a caller gets back from one deliberation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitteeOutcome {
    pub decision: Decision,
    pub transcript: Transcript,
    pub minutes: CommitteeMinutes,
}

/// Findings a stage settled with, and whether the overall deadline cut it short.
struct StageRun {
    findings: Vec<Finding>,
    deadline_hit: bool,
}

/// Main orchestrator that coordinates the committee
pub struct Orchestrator {
    graph: StageGraph,
    registry: AgentRegistry,
    invoker: Arc<AgentInvoker>,
    context_builder: ContextBuilder,
    sink: Option<Arc<dyn ResultSink>>,
    aggregator: RiskAggregator,
    router: RiskRouter,
    synthesizer: Synthesizer,
    config: CommitteeConfig,
}

impl Orchestrator {
    /// Validates configuration and graph up front; both are hard errors.
    pub fn new(
        graph: StageGraph,
        registry: AgentRegistry,
        reasoning: Arc<dyn ReasoningClient>,
        config: CommitteeConfig,
    ) -> Result<Self> {
        config.validate()?;
        graph.validate(&registry)?;

        let mut routing = config.routing.clone();
        routing.reentry_stage = graph.reentry_stage.clone();

        Ok(Self {
            aggregator: RiskAggregator::new(&config.synthesis),
            router: RiskRouter::new(&routing),
            synthesizer: Synthesizer::new(config.synthesis.clone()),
            invoker: Arc::new(AgentInvoker::new(reasoning)),
            context_builder: ContextBuilder::default(),
            sink: None,
            graph,
            registry,
            config,
        })
    }

    /// Full seven-seat committee with the configured re-entry stage.
    pub fn committee(reasoning: Arc<dyn ReasoningClient>, config: CommitteeConfig) -> Result<Self> {
        let graph = StageGraph::committee().with_reentry(config.routing.reentry_stage.clone());
        Self::new(graph, AgentRegistry::committee(), reasoning, config)
    }

    pub fn with_context_builder(mut self, builder: ContextBuilder) -> Self {
        self.context_builder = builder;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// Run one deliberation to a terminal state.
    pub async fn execute(&self, request: CommitteeRequest) -> Result<CommitteeOutcome> {
        request.validate()?;

        let request_id = request.request_id.unwrap_or_else(Uuid::new_v4);
        let max_rounds = request
            .max_rounds
            .map(|r| r.min(self.config.routing.max_rounds))
            .unwrap_or(self.config.routing.max_rounds);
        let deadline = Instant::now() + self.config.overall_deadline;
        let reentry = self.graph.reentry_index()?;

        info!(
            %request_id,
            topic = %request.topic,
            max_rounds,
            "Committee: starting deliberation"
        );

        let seed = match timeout_at(deadline, self.context_builder.seed(request_id, &request)).await {
            Ok(ctx) => ctx,
            Err(_) => {
                warn!(%request_id, "Data collection hit the deadline; using empty datasets");
                Context::seed(request_id, &request, Default::default())
            }
        };

        let recorder = AuditRecorder::new(request_id);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut accumulated: Vec<Finding> = Vec::new();
        let mut feedback: Option<RiskAssessment> = None;
        let mut round = 0u32;
        let mut start = 0usize;

        'rounds: loop {
            for stage in &self.graph.stages[start..] {
                let run = self
                    .run_stage(stage, &seed, round, &feedback, &accumulated, deadline, &semaphore, &recorder)
                    .await;
                accumulated.extend(run.findings);

                if run.deadline_hit {
                    warn!(%request_id, round, stage = %stage.name, "Overall deadline exceeded; synthesizing");
                    break 'rounds;
                }
            }

            let round_findings: Vec<Finding> = accumulated
                .iter()
                .filter(|f| f.round == round)
                .cloned()
                .collect();
            let assessment = self.aggregator.assess(round, &round_findings);
            recorder
                .record(round, AuditEvent::RiskComputed { assessment: assessment.clone() })
                .await;

            let decision = self.router.route(&assessment, round, max_rounds);
            recorder
                .record(round, AuditEvent::RoutingDecided { decision: decision.clone() })
                .await;

            info!(
                %request_id,
                round,
                risk = assessment.overall_risk_score,
                outcome = ?decision.outcome,
                capped = decision.capped,
                "Risk gate"
            );

            match decision.outcome {
                RoutingOutcome::Loop => {
                    feedback = Some(assessment);
                    round += 1;
                    start = reentry;
                }
                RoutingOutcome::Advance | RoutingOutcome::Abort => break,
            }
        }

        let transcript = recorder.finish().await;
        let decision = self.synthesizer.synthesize(&transcript);
        let minutes = CommitteeMinutes::compile(&transcript, &decision);

        info!(
            %request_id,
            action = %decision.action,
            confidence = decision.confidence,
            risk_adjusted_confidence = decision.risk_adjusted_confidence,
            rounds = transcript.rounds(),
            "Committee: deliberation complete"
        );

        self.persist(request_id, &decision, &transcript);

        Ok(CommitteeOutcome {
            decision,
            transcript,
            minutes,
        })
    }

    /// Re-run synthesis over a stored transcript. No agent is invoked.
    pub fn replay(&self, transcript: &Transcript) -> Decision {
        self.synthesizer.synthesize(transcript)
    }

    /// Hand the result to the sink without waiting on it.
    fn persist(&self, request_id: Uuid, decision: &Decision, transcript: &Transcript) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        let decision = decision.clone();
        let transcript = transcript.clone();

        tokio::spawn(async move {
            if let Err(e) = sink.persist(request_id, &decision, &transcript).await {
                warn!(%request_id, "Persisting committee result failed: {}", e);
            }
        });
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_stage(
        &self,
        stage: &Stage,
        seed: &Context,
        round: u32,
        feedback: &Option<RiskAssessment>,
        accumulated: &[Finding],
        deadline: Instant,
        semaphore: &Arc<Semaphore>,
        recorder: &AuditRecorder,
    ) -> StageRun {
        recorder
            .record(
                round,
                AuditEvent::StageEntered {
                    stage: stage.name.clone(),
                    agents: stage.agents.clone(),
                },
            )
            .await;
        debug!(stage = %stage.name, round, agents = stage.agents.len(), "Stage entered");

        let ctx = Arc::new(seed.for_stage(round, feedback.clone(), accumulated.to_vec()));
        let mut findings = Vec::new();
        let mut deadline_hit = false;

        match stage.mode {
            StageMode::Parallel => {
                let prior = Arc::new(ctx.prior_findings.clone());
                let mut tasks = JoinSet::new();
                for role in &stage.agents {
                    self.spawn_agent(&mut tasks, *role, stage, &ctx, &prior, semaphore, recorder);
                }
                deadline_hit = collect(&mut tasks, deadline, &mut findings).await;
            }
            StageMode::Sequential => {
                for role in &stage.agents {
                    let mut prior = ctx.prior_findings.clone();
                    prior.extend(findings.iter().cloned());

                    let mut tasks = JoinSet::new();
                    self.spawn_agent(&mut tasks, *role, stage, &ctx, &Arc::new(prior), semaphore, recorder);
                    if collect(&mut tasks, deadline, &mut findings).await {
                        deadline_hit = true;
                        break;
                    }
                }
            }
        }

        // Every agent of the stage gets exactly one finding.
        let mut unsettled = Vec::new();
        for role in &stage.agents {
            if findings.iter().any(|f| f.agent == *role) {
                continue;
            }
            if recorder.has_outcome(round, &stage.name, *role).await {
                continue;
            }

            let reason = if deadline_hit {
                unsettled.push(*role);
                DEADLINE_REASON.to_string()
            } else {
                "agent task did not complete".to_string()
            };
            recorder
                .interrupt_attempt(round, &stage.name, *role, AttemptResult::Cancelled)
                .await;
            let attempts = recorder.attempt_count(round, &stage.name, *role).await;
            let failed = Finding::failed(*role, &stage.name, round, attempts, reason);
            recorder
                .record(round, AuditEvent::AgentOutcome { finding: failed.clone() })
                .await;
            findings.push(failed);
        }

        if deadline_hit {
            recorder
                .record(
                    round,
                    AuditEvent::DeadlineExceeded {
                        stage: stage.name.clone(),
                        unsettled,
                    },
                )
                .await;
        }

        StageRun {
            findings,
            deadline_hit,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_agent(
        &self,
        tasks: &mut JoinSet<Finding>,
        role: AgentRole,
        stage: &Stage,
        ctx: &Arc<Context>,
        prior: &Arc<Vec<Finding>>,
        semaphore: &Arc<Semaphore>,
        recorder: &AuditRecorder,
    ) {
        let Some(agent) = self.registry.get(role) else {
            // Unreachable after graph validation; the slot is filled as failed.
            warn!(agent = %role, "Agent not registered");
            return;
        };

        let invoker = Arc::clone(&self.invoker);
        let policy = self.config.policy_for(role).clone();
        let stage_name = stage.name.clone();
        let ctx = Arc::clone(ctx);
        let prior = Arc::clone(prior);
        let semaphore = Arc::clone(semaphore);
        let recorder = recorder.clone();

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            invoker
                .invoke(agent.as_ref(), &ctx, &prior, &stage_name, &policy, &recorder)
                .await
        });
    }
}

/// Drain settled tasks until all finish or the deadline passes. On deadline the
/// remaining tasks are aborted; returns whether that happened.
async fn collect(tasks: &mut JoinSet<Finding>, deadline: Instant, findings: &mut Vec<Finding>) -> bool {
    loop {
        match timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(Ok(finding))) => findings.push(finding),
            Ok(Some(Err(e))) => warn!("Agent task ended abnormally: {}", e),
            Ok(None) => return false,
            Err(_) => {
                tasks.abort_all();
                while let Some(joined) = tasks.join_next().await {
                    if let Ok(finding) = joined {
                        findings.push(finding);
                    }
                }
                return true;
            }
        }
    }
}
