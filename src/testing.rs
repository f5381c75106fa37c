//! Deterministic test doubles shared by the unit tests

use crate::data::{DataQuery, MarketDataSource};
use crate::error::OrchestrationError;
use crate::models::{
    AgentRole, CommitteeRequest, Context, Finding, FindingPayload, FindingStatus, MarketDataset,
    RiskAppetite, RiskAssessment, Stance, TimeHorizon,
};
use crate::reasoning::{PromptContext, ReasoningClient};
use crate::risk::hint_for;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

pub fn sample_request() -> CommitteeRequest {
    CommitteeRequest {
        request_id: None,
        topic: "AI chip export rules".to_string(),
        headline: Some("New export controls announced for data-center GPUs".to_string()),
        content: "Regulators announced tighter export controls on advanced accelerators.".to_string(),
        symbols: vec!["NVDA".to_string()],
        time_horizon: TimeHorizon::Medium,
        risk_appetite: RiskAppetite::Balanced,
        region: Some("US".to_string()),
        max_rounds: None,
    }
}

pub fn sample_context() -> Context {
    Context::seed(Uuid::new_v4(), &sample_request(), MarketDataset::default())
}

pub fn finding(agent: AgentRole, stage: &str, stance: Stance, confidence: f64) -> Finding {
    Finding {
        agent,
        stage: stage.to_string(),
        round: 0,
        status: FindingStatus::Ok,
        confidence,
        stance: Some(stance),
        summary: format!("{} view", agent),
        payload: FindingPayload::Empty,
        failure_reason: None,
        attempts: 1,
    }
}

pub fn assessment(round: u32, score: f64, flags: &[&str]) -> RiskAssessment {
    RiskAssessment {
        round,
        overall_risk_score: score,
        flags: flags.iter().map(|f| f.to_string()).collect(),
        hint: hint_for(score),
        contributing: 1,
    }
}

/// Well-formed reasoning payload for a role.
pub fn role_payload(role: AgentRole, stance: &str, confidence: f64, risk: f64) -> Value {
    let mut payload = match role {
        AgentRole::DataIntelligence => json!({
            "market_snapshot": {"price_movement": {"trend": "up"}},
            "sentiment_score": 0.4,
            "data_quality_score": 0.9,
            "anomalies": []
        }),
        AgentRole::NarrativeArbitrageur => json!({
            "one_liner": "Export rules reshape the GPU story",
            "meme_potential": 0.6,
            "influencers_take": ["watching closely"],
            "lifecycle_days": 10,
            "priced_in": false
        }),
        AgentRole::FirstOrderQuant => json!({
            "pnl_line": "revenue",
            "magnitude": "-2% to +3%",
            "kpi_shifts_pct": {"revenue_pct": 1.0},
            "recurring": true
        }),
        AgentRole::ContrarianSkeptic => json!({
            "red_flags": [],
            "data_validity_risks": [],
            "overreaction_signals": []
        }),
        AgentRole::SecondOrderStrategist => json!({
            "competitor_moves": ["peers reroute supply"],
            "regulatory_watchpoints": [],
            "supply_chain_shift": [],
            "consumer_behavior_change": []
        }),
        AgentRole::MacroStrategist => json!({
            "market_regime": "bull_market",
            "outlook": "Liquidity remains supportive",
            "key_drivers": ["rates"]
        }),
        AgentRole::RiskController => json!({
            "overall_risk_score": risk,
            "alerts": [],
            "recommendations": ["Keep normal monitoring"]
        }),
    };

    payload["stance"] = json!(stance);
    payload["confidence"] = json!(confidence);
    payload
}

#[derive(Default)]
struct Script {
    responses: Vec<Value>,
    served: usize,
    transient_failures: u32,
    permanent_failure: bool,
    delay: Option<Duration>,
}

/// Reasoning client driven by per-role scripts. Successful calls walk the
/// scripted responses in order and repeat the last one.
#[derive(Default)]
pub struct ScriptedReasoner {
    scripts: Mutex<HashMap<AgentRole, Script>>,
    calls: Mutex<HashMap<AgentRole, u32>>,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every role answers with `stance` at `confidence`; the risk controller
    /// reports `risk`.
    pub fn unanimous(stance: &str, confidence: f64, risk: f64) -> Self {
        AgentRole::ALL.iter().fold(Self::new(), |reasoner, role| {
            reasoner.respond(*role, role_payload(*role, stance, confidence, risk))
        })
    }

    fn edit(self, role: AgentRole, f: impl FnOnce(&mut Script)) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            f(scripts.entry(role).or_default());
        }
        self
    }

    pub fn respond(self, role: AgentRole, payload: Value) -> Self {
        self.edit(role, |s| s.responses.push(payload))
    }

    /// Replace every scripted response for a role.
    pub fn respond_only(self, role: AgentRole, payloads: Vec<Value>) -> Self {
        self.edit(role, |s| {
            s.responses = payloads;
            s.served = 0;
        })
    }

    pub fn fail_times(self, role: AgentRole, times: u32) -> Self {
        self.edit(role, |s| s.transient_failures += times)
    }

    pub fn fail_permanently(self, role: AgentRole) -> Self {
        self.edit(role, |s| s.permanent_failure = true)
    }

    pub fn delay(self, role: AgentRole, delay: Duration) -> Self {
        self.edit(role, |s| s.delay = Some(delay))
    }

    pub fn calls(&self, role: AgentRole) -> u32 {
        self.calls
            .lock()
            .map(|c| c.get(&role).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl ReasoningClient for ScriptedReasoner {
    async fn call(&self, prompt: &PromptContext) -> Result<Value> {
        let role = prompt.agent;
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(role).or_insert(0) += 1;
        }

        let (delay, outcome) = {
            let mut scripts = self
                .scripts
                .lock()
                .map_err(|_| OrchestrationError::Reasoning("script lock poisoned".to_string()))?;
            match scripts.get_mut(&role) {
                None => (
                    None,
                    Err(OrchestrationError::Configuration(format!("no script for {}", role))),
                ),
                Some(script) if script.permanent_failure => (
                    script.delay,
                    Err(OrchestrationError::Configuration("gateway rejected request".to_string())),
                ),
                Some(script) if script.transient_failures > 0 => {
                    script.transient_failures -= 1;
                    (
                        script.delay,
                        Err(OrchestrationError::Reasoning("gateway returned 503".to_string())),
                    )
                }
                Some(script) => {
                    let index = script.served.min(script.responses.len().saturating_sub(1));
                    script.served += 1;
                    let response = script.responses.get(index).cloned().ok_or_else(|| {
                        OrchestrationError::MalformedPayload("empty script".to_string())
                    });
                    (script.delay, response)
                }
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

/// Data source that always returns the same payload.
pub struct StaticSource {
    name: String,
    data: Value,
}

impl StaticSource {
    pub fn new(name: &str, data: Value) -> Self {
        Self {
            name: name.to_string(),
            data,
        }
    }
}

#[async_trait]
impl MarketDataSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _query: &DataQuery) -> Result<MarketDataset> {
        let mut dataset = MarketDataset::default();
        dataset.insert(self.name.clone(), self.data.clone());
        Ok(dataset)
    }
}

pub struct FailingSource;

#[async_trait]
impl MarketDataSource for FailingSource {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn fetch(&self, _query: &DataQuery) -> Result<MarketDataset> {
        Err(OrchestrationError::DataSource("connection refused".to_string()))
    }
}
