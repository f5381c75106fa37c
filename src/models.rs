//! Core data models for the investment committee

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::error::OrchestrationError;
use crate::Result;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeHorizon {
    Immediate,
    Short,
    #[default]
    Medium,
    Long,
    Extended,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskAppetite {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

/// The fixed set of committee roles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    DataIntelligence,
    NarrativeArbitrageur,
    FirstOrderQuant,
    ContrarianSkeptic,
    SecondOrderStrategist,
    MacroStrategist,
    RiskController,
}

impl AgentRole {
    pub const ALL: [AgentRole; 7] = [
        AgentRole::DataIntelligence,
        AgentRole::NarrativeArbitrageur,
        AgentRole::FirstOrderQuant,
        AgentRole::ContrarianSkeptic,
        AgentRole::SecondOrderStrategist,
        AgentRole::MacroStrategist,
        AgentRole::RiskController,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::DataIntelligence => "data_intelligence",
            AgentRole::NarrativeArbitrageur => "narrative_arbitrageur",
            AgentRole::FirstOrderQuant => "first_order_quant",
            AgentRole::ContrarianSkeptic => "contrarian_skeptic",
            AgentRole::SecondOrderStrategist => "second_order_strategist",
            AgentRole::MacroStrategist => "macro_strategist",
            AgentRole::RiskController => "risk_controller",
        }
    }

    /// Committee seat title used in the minutes.
    pub fn title(&self) -> &'static str {
        match self {
            AgentRole::DataIntelligence => "Data Intelligence Specialist",
            AgentRole::NarrativeArbitrageur => "Narrative Arbitrageur",
            AgentRole::FirstOrderQuant => "First-Order Impact Quant",
            AgentRole::ContrarianSkeptic => "Contrarian Skeptic",
            AgentRole::SecondOrderStrategist => "Second-Order Effects Strategist",
            AgentRole::MacroStrategist => "Macro Strategist",
            AgentRole::RiskController => "Risk Controller",
        }
    }
}

/// Directional opinion carried by a finding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Stance {
    pub fn polarity(&self) -> i8 {
        match self {
            Stance::StrongBuy => 2,
            Stance::Buy => 1,
            Stance::Hold => 0,
            Stance::Sell => -1,
            Stance::StrongSell => -2,
        }
    }

    /// Lenient parse of a stance label returned by a reasoning call.
    pub fn parse(label: &str) -> Option<Stance> {
        let normalized = label.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "strong_buy" | "very_bullish" => Some(Stance::StrongBuy),
            "buy" | "bullish" | "overweight" | "accumulate" => Some(Stance::Buy),
            "hold" | "neutral" | "wait" => Some(Stance::Hold),
            "sell" | "bearish" | "underweight" | "reduce" => Some(Stance::Sell),
            "strong_sell" | "very_bearish" => Some(Stance::StrongSell),
            _ => None,
        }
    }
}

/// Final committee action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
    NoAction,
    RiskHalt,
}

impl From<Stance> for Action {
    fn from(stance: Stance) -> Self {
        match stance {
            Stance::StrongBuy => Action::StrongBuy,
            Stance::Buy => Action::Buy,
            Stance::Hold => Action::Hold,
            Stance::Sell => Action::Sell,
            Stance::StrongSell => Action::StrongSell,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::StrongBuy => "strong_buy",
            Action::Buy => "buy",
            Action::Hold => "hold",
            Action::Sell => "sell",
            Action::StrongSell => "strong_sell",
            Action::NoAction => "no_action",
            Action::RiskHalt => "risk_halt",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for TimeHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeHorizon::Immediate => "immediate",
            TimeHorizon::Short => "short",
            TimeHorizon::Medium => "medium",
            TimeHorizon::Long => "long",
            TimeHorizon::Extended => "extended",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for RiskAppetite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskAppetite::Conservative => "conservative",
            RiskAppetite::Balanced => "balanced",
            RiskAppetite::Aggressive => "aggressive",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Request =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitteeRequest {
    #[serde(default)]
    pub request_id: Option<Uuid>,
    pub topic: String,
    #[serde(default)]
    pub headline: Option<String>,
    pub content: String,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub time_horizon: TimeHorizon,
    #[serde(default)]
    pub risk_appetite: RiskAppetite,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub max_rounds: Option<u32>,
}

impl CommitteeRequest {
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(OrchestrationError::InvalidRequest(
                "topic is required".to_string(),
            ));
        }
        if self.content.trim().is_empty() {
            return Err(OrchestrationError::InvalidRequest(
                "content is required".to_string(),
            ));
        }
        if self.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(OrchestrationError::InvalidRequest(
                "symbols must not contain blank entries".to_string(),
            ));
        }
        if self.max_rounds == Some(0) {
            return Err(OrchestrationError::InvalidRequest(
                "max_rounds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

//
// ================= Context =================
//

/// Raw datasets fetched before round 0, keyed by source name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketDataset {
    pub sources: BTreeMap<String, Value>,
}

impl MarketDataset {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn insert(&mut self, source: impl Into<String>, data: Value) {
        self.sources.insert(source.into(), data);
    }

    pub fn merge(&mut self, other: MarketDataset) {
        self.sources.extend(other.sources);
    }
}

/// Read-only input bundle handed to agents for one stage of one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub request_id: Uuid,
    pub topic: String,
    pub headline: Option<String>,
    pub content: String,
    pub symbols: Vec<String>,
    pub time_horizon: TimeHorizon,
    pub risk_appetite: RiskAppetite,
    pub region: Option<String>,
    pub round: u32,
    pub market_data: MarketDataset,
    /// Assessment that triggered the loop into this round, if any.
    pub risk_feedback: Option<RiskAssessment>,
    pub prior_findings: Vec<Finding>,
}

impl Context {
    pub fn seed(request_id: Uuid, request: &CommitteeRequest, market_data: MarketDataset) -> Self {
        Self {
            request_id,
            topic: request.topic.trim().to_string(),
            headline: request.headline.clone(),
            content: request.content.clone(),
            symbols: request.symbols.iter().map(|s| s.trim().to_string()).collect(),
            time_horizon: request.time_horizon,
            risk_appetite: request.risk_appetite,
            region: request.region.clone(),
            round: 0,
            market_data,
            risk_feedback: None,
            prior_findings: Vec::new(),
        }
    }

    /// Derive the context for a stage, carrying the findings accumulated so far.
    pub fn for_stage(
        &self,
        round: u32,
        risk_feedback: Option<RiskAssessment>,
        prior_findings: Vec<Finding>,
    ) -> Self {
        Self {
            round,
            risk_feedback,
            prior_findings,
            ..self.clone()
        }
    }

    pub fn headline_or_topic(&self) -> &str {
        self.headline.as_deref().unwrap_or(&self.topic)
    }
}

//
// ================= Findings =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    Ok,
    Degraded,
    Failed,
}

/// Role-specific body of a finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingPayload {
    DataIntelligence {
        market_snapshot: Value,
        sentiment_score: f64,
        data_quality_score: f64,
        anomalies: Vec<String>,
    },
    Narrative {
        one_liner: String,
        meme_potential: f64,
        influencers_take: Vec<String>,
        lifecycle_days: u32,
        priced_in: bool,
    },
    QuantImpact {
        pnl_line: String,
        magnitude: String,
        kpi_shifts_pct: BTreeMap<String, f64>,
        recurring: bool,
    },
    Contrarian {
        red_flags: Vec<String>,
        data_validity_risks: Vec<String>,
        overreaction_signals: Vec<String>,
    },
    SecondOrder {
        competitor_moves: Vec<String>,
        regulatory_watchpoints: Vec<String>,
        supply_chain_shift: Vec<String>,
        consumer_behavior_change: Vec<String>,
    },
    Macro {
        market_regime: String,
        outlook: String,
        key_drivers: Vec<String>,
        regime_risk: Option<f64>,
    },
    RiskControl {
        overall_risk_score: f64,
        alerts: Vec<String>,
        recommendations: Vec<String>,
    },
    Empty,
}

impl FindingPayload {
    /// Explicit risk score stated by the payload, if the role states one.
    pub fn risk_signal(&self) -> Option<f64> {
        match self {
            FindingPayload::RiskControl {
                overall_risk_score, ..
            } => Some(overall_risk_score.clamp(0.0, 1.0)),
            FindingPayload::Macro { regime_risk, .. } => regime_risk.map(|r| r.clamp(0.0, 1.0)),
            _ => None,
        }
    }

    /// Named risk flags raised by the payload.
    pub fn risk_flags(&self) -> Vec<String> {
        match self {
            FindingPayload::Contrarian { red_flags, .. } => red_flags.clone(),
            FindingPayload::RiskControl { alerts, .. } => alerts.clone(),
            FindingPayload::DataIntelligence { anomalies, .. } => anomalies.clone(),
            FindingPayload::SecondOrder {
                regulatory_watchpoints,
                ..
            } => regulatory_watchpoints.clone(),
            _ => Vec::new(),
        }
    }
}

/// One agent's structured opinion for one (stage, round) slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub agent: AgentRole,
    pub stage: String,
    pub round: u32,
    pub status: FindingStatus,
    pub confidence: f64,
    pub stance: Option<Stance>,
    pub summary: String,
    pub payload: FindingPayload,
    pub failure_reason: Option<String>,
    pub attempts: u32,
}

impl Finding {
    pub fn failed(
        agent: AgentRole,
        stage: &str,
        round: u32,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            agent,
            stage: stage.to_string(),
            round,
            status: FindingStatus::Failed,
            confidence: 0.0,
            stance: None,
            summary: String::new(),
            payload: FindingPayload::Empty,
            failure_reason: Some(reason.into()),
            attempts,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.status != FindingStatus::Failed
    }

    pub fn reference(&self) -> FindingRef {
        FindingRef {
            agent: self.agent,
            stage: self.stage.clone(),
            round: self.round,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FindingRef {
    pub agent: AgentRole,
    pub stage: String,
    pub round: u32,
}

//
// ================= Risk & Routing =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskHint {
    Proceed,
    Monitor,
    Reduce,
    Halt,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    pub round: u32,
    pub overall_risk_score: f64,
    pub flags: BTreeSet<String>,
    pub hint: RiskHint,
    /// Number of findings that stated a risk score.
    pub contributing: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoutingOutcome {
    Advance,
    Loop,
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingDecision {
    pub round: u32,
    pub outcome: RoutingOutcome,
    pub target_stage: Option<String>,
    pub assessment: RiskAssessment,
    /// Risk called for another round but the round cap was reached.
    pub capped: bool,
}

//
// ================= Decision =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Terminal {
    Synthesized,
    Aborted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClaimDimension {
    Direction,
    Risk,
}

/// Two findings that disagree on the same claim dimension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conflict {
    pub dimension: ClaimDimension,
    pub first: FindingRef,
    pub second: FindingRef,
    pub spread: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionTally {
    pub action: Action,
    pub weight: f64,
    pub voters: usize,
}

/// Pointer into the transcript that explains a decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RationaleRef {
    pub transcript_id: Uuid,
    pub final_round: u32,
    /// Sequence numbers of the agent-outcome events that voted.
    pub evidence_seqs: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub confidence: f64,
    pub risk_adjusted_confidence: f64,
    pub risk_penalized: bool,
    pub deadline_exceeded: bool,
    pub terminal: Terminal,
    pub votes: Vec<ActionTally>,
    pub dissents: Vec<FindingRef>,
    pub conflicts: Vec<Conflict>,
    /// Fit of the action with the macro strategist's market regime, 0.5 when unknown.
    pub macro_alignment: f64,
    /// Data specialist's quality score behind the decision.
    pub data_quality_factor: f64,
    pub rationale: RationaleRef,
}
