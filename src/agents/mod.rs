//! Committee agents
//!
//! Each agent turns a shared read-only context plus the findings produced so
//! far into one structured opinion. Agents never call the network themselves:
//! they build a prompt, interpret the reasoning payload, and know their own
//! conservative fallback. Timeouts and retries live in `invocation`.

use crate::error::OrchestrationError;
use crate::models::{AgentRole, Context, Finding, FindingPayload, FindingStatus, Stance};
use crate::reasoning::{truncate, PromptContext};
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub mod analysts;
pub mod specialists;

pub use analysts::{
    ContrarianSkepticAgent, FirstOrderQuantAgent, NarrativeArbitrageurAgent,
    SecondOrderStrategistAgent,
};
pub use specialists::{DataIntelligenceAgent, MacroStrategistAgent, RiskControllerAgent};

const CONTENT_EXCERPT_CHARS: usize = 2000;
const PRIOR_SUMMARY_CHARS: usize = 160;

/// Interpreted agent output, before it is stamped into a `Finding`.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOpinion {
    pub payload: FindingPayload,
    pub stance: Option<Stance>,
    pub confidence: f64,
    pub summary: String,
}

/// Trait for a committee role
pub trait Agent: Send + Sync {
    fn role(&self) -> AgentRole;

    fn system_prompt(&self) -> &'static str;

    fn user_prompt(&self, ctx: &Context, prior: &[Finding]) -> String;

    fn temperature(&self) -> f32 {
        0.1
    }

    /// Turn a reasoning payload into an opinion. Errors mean the payload was
    /// unusable and the call may be retried.
    fn interpret(&self, payload: &Value, ctx: &Context) -> Result<AgentOpinion>;

    /// Conservative default used when the reasoning call cannot be completed.
    fn fallback(&self, ctx: &Context) -> AgentOpinion;

    fn prompt(&self, ctx: &Context, prior: &[Finding]) -> PromptContext {
        PromptContext {
            agent: self.role(),
            system: self.system_prompt().to_string(),
            user: self.user_prompt(ctx, prior),
            temperature: self.temperature(),
        }
    }
}

/// Registry resolving roles to agent implementations
pub struct AgentRegistry {
    agents: HashMap<AgentRole, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.role(), agent);
    }

    pub fn get(&self, role: AgentRole) -> Option<Arc<dyn Agent>> {
        self.agents.get(&role).cloned()
    }

    pub fn contains(&self, role: AgentRole) -> bool {
        self.agents.contains_key(&role)
    }

    pub fn roles(&self) -> Vec<AgentRole> {
        let mut roles: Vec<_> = self.agents.keys().copied().collect();
        roles.sort();
        roles
    }

    /// Full seven-seat investment committee.
    pub fn committee() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DataIntelligenceAgent));
        registry.register(Arc::new(NarrativeArbitrageurAgent));
        registry.register(Arc::new(FirstOrderQuantAgent));
        registry.register(Arc::new(ContrarianSkepticAgent));
        registry.register(Arc::new(SecondOrderStrategistAgent));
        registry.register(Arc::new(MacroStrategistAgent));
        registry.register(Arc::new(RiskControllerAgent));
        registry
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Prompt helpers =================
//

/// Event description shared by every role prompt.
pub(crate) fn describe_event(ctx: &Context) -> String {
    format!(
        "Topic: {}\nHeadline: {}\nContent: {}\nSymbols: {}\nRegion: {}\nTime horizon: {}\nRisk appetite: {}\nRound: {}",
        ctx.topic,
        ctx.headline_or_topic(),
        truncate(&ctx.content, CONTENT_EXCERPT_CHARS),
        if ctx.symbols.is_empty() {
            "N/A".to_string()
        } else {
            ctx.symbols.join(", ")
        },
        ctx.region.as_deref().unwrap_or("N/A"),
        ctx.time_horizon,
        ctx.risk_appetite,
        ctx.round,
    )
}

/// Compact digest of earlier findings plus any risk feedback that caused a loop.
pub(crate) fn describe_prior(ctx: &Context, prior: &[Finding]) -> String {
    let mut out = String::new();

    if let Some(feedback) = &ctx.risk_feedback {
        out.push_str(&format!(
            "\nRisk review of round {} scored {:.2} and requested re-analysis.",
            feedback.round, feedback.overall_risk_score
        ));
        if !feedback.flags.is_empty() {
            let flags: Vec<&str> = feedback.flags.iter().map(String::as_str).collect();
            out.push_str(&format!("\nFlagged risks: {}", flags.join("; ")));
        }
        out.push_str("\nAddress these risks explicitly.");
    }

    let usable: Vec<&Finding> = prior.iter().filter(|f| f.status != FindingStatus::Failed).collect();
    if !usable.is_empty() {
        out.push_str("\n\nCommittee findings so far:");
        for finding in usable {
            out.push_str(&format!(
                "\n- [{} r{}] stance={} confidence={:.2}: {}",
                finding.agent,
                finding.round,
                finding
                    .stance
                    .map(|s| format!("{:?}", s).to_lowercase())
                    .unwrap_or_else(|| "none".to_string()),
                finding.confidence,
                truncate(&finding.summary, PRIOR_SUMMARY_CHARS),
            ));
        }
    }

    out
}

//
// ================= Payload helpers =================
//

pub(crate) fn stance_field(payload: &Value) -> Option<Stance> {
    payload.get("stance").and_then(Value::as_str).and_then(Stance::parse)
}

pub(crate) fn confidence_field(payload: &Value) -> f64 {
    payload
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0)
}

pub(crate) fn required_f64(payload: &Value, key: &str) -> Result<f64> {
    payload.get(key).and_then(Value::as_f64).ok_or_else(|| {
        OrchestrationError::MalformedPayload(format!("missing numeric field '{}'", key))
    })
}

pub(crate) fn required_str(payload: &Value, key: &str) -> Result<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| OrchestrationError::MalformedPayload(format!("missing text field '{}'", key)))
}

pub(crate) fn string_list(payload: &Value, key: &str) -> Vec<String> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
