//! Committee configuration
//!
//! Thresholds, timeouts and retry policy are configuration, never constants.
//! Values come from `COMMITTEE_*` environment variables (optionally via `.env`)
//! and fall back to the defaults below.

use crate::error::OrchestrationError;
use crate::invocation::AgentPolicy;
use crate::models::AgentRole;
use crate::synthesis::SynthesisPolicy;
use crate::Result;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Risk routing configuration
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Scores at or above this halt the committee.
    pub abort_threshold: f64,
    /// Scores strictly above this request another round.
    pub reevaluate_threshold: f64,
    /// Upper bound on rounds per request (requests may ask for fewer).
    pub max_rounds: u32,
    /// Stage a loop re-enters.
    pub reentry_stage: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            abort_threshold: 0.9,
            reevaluate_threshold: 0.7,
            max_rounds: 3,
            reentry_stage: "core_analysts".to_string(),
        }
    }
}

/// Reasoning gateway connection settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: None,
            model: "deepseek-v3".to_string(),
            temperature: 0.2,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Market and sentiment data service endpoints
#[derive(Debug, Clone)]
pub struct DataServicesConfig {
    pub stock_service_url: Option<String>,
    pub sentiment_service_url: Option<String>,
    pub request_timeout: Duration,
}

impl Default for DataServicesConfig {
    fn default() -> Self {
        Self {
            stock_service_url: None,
            sentiment_service_url: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommitteeConfig {
    pub routing: RoutingConfig,
    pub default_policy: AgentPolicy,
    pub agent_policies: HashMap<AgentRole, AgentPolicy>,
    pub synthesis: SynthesisPolicy,
    /// Hard deadline for one request; in-flight agents are cancelled past it.
    pub overall_deadline: Duration,
    /// Maximum agents running at once within a stage.
    pub max_concurrency: usize,
    pub gateway: GatewayConfig,
    pub data: DataServicesConfig,
}

impl Default for CommitteeConfig {
    fn default() -> Self {
        Self {
            routing: RoutingConfig::default(),
            default_policy: AgentPolicy::default(),
            agent_policies: HashMap::new(),
            synthesis: SynthesisPolicy::default(),
            overall_deadline: Duration::from_secs(300),
            max_concurrency: 4,
            gateway: GatewayConfig::default(),
            data: DataServicesConfig::default(),
        }
    }
}

impl CommitteeConfig {
    /// Load from the process environment on top of the defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        if let Some(v) = env_parse::<f64>("COMMITTEE_ABORT_THRESHOLD")? {
            config.routing.abort_threshold = v;
        }
        if let Some(v) = env_parse::<f64>("COMMITTEE_REEVALUATE_THRESHOLD")? {
            config.routing.reevaluate_threshold = v;
        }
        if let Some(v) = env_parse::<u32>("COMMITTEE_MAX_ROUNDS")? {
            config.routing.max_rounds = v;
        }
        if let Ok(stage) = env::var("COMMITTEE_REENTRY_STAGE") {
            config.routing.reentry_stage = stage;
        }

        if let Some(ms) = env_parse::<u64>("COMMITTEE_AGENT_TIMEOUT_MS")? {
            config.default_policy.timeout = Duration::from_millis(ms);
        }
        if let Some(v) = env_parse::<u32>("COMMITTEE_AGENT_MAX_ATTEMPTS")? {
            config.default_policy.max_attempts = v;
        }
        if let Some(ms) = env_parse::<u64>("COMMITTEE_BACKOFF_INITIAL_MS")? {
            config.default_policy.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("COMMITTEE_BACKOFF_MAX_MS")? {
            config.default_policy.max_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("COMMITTEE_DEADLINE_MS")? {
            config.overall_deadline = Duration::from_millis(ms);
        }
        if let Some(v) = env_parse::<usize>("COMMITTEE_MAX_CONCURRENCY")? {
            config.max_concurrency = v;
        }
        if let Some(v) = env_parse::<f64>("COMMITTEE_CAP_PENALTY")? {
            config.synthesis.cap_penalty = v;
        }

        config.gateway.url = env::var("LLM_GATEWAY_URL").ok().filter(|s| !s.trim().is_empty());
        if let Ok(model) = env::var("LLM_MODEL") {
            config.gateway.model = model;
        }
        config.data.stock_service_url =
            env::var("STOCK_SERVICE_URL").ok().filter(|s| !s.trim().is_empty());
        config.data.sentiment_service_url =
            env::var("SENTIMENT_SERVICE_URL").ok().filter(|s| !s.trim().is_empty());

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let routing = &self.routing;

        for (name, value) in [
            ("abort_threshold", routing.abort_threshold),
            ("reevaluate_threshold", routing.reevaluate_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(OrchestrationError::Configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if routing.abort_threshold <= routing.reevaluate_threshold {
            return Err(OrchestrationError::Configuration(format!(
                "abort_threshold ({}) must exceed reevaluate_threshold ({})",
                routing.abort_threshold, routing.reevaluate_threshold
            )));
        }

        if routing.max_rounds == 0 {
            return Err(OrchestrationError::Configuration(
                "max_rounds must be at least 1".to_string(),
            ));
        }

        if self.max_concurrency == 0 {
            return Err(OrchestrationError::Configuration(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        for (role, policy) in std::iter::once((None, &self.default_policy))
            .chain(self.agent_policies.iter().map(|(r, p)| (Some(*r), p)))
        {
            if policy.timeout >= self.overall_deadline {
                return Err(OrchestrationError::Configuration(format!(
                    "agent timeout {:?} for {} must be shorter than the overall deadline {:?}",
                    policy.timeout,
                    role.map(|r| r.as_str()).unwrap_or("default policy"),
                    self.overall_deadline
                )));
            }
            if policy.max_attempts == 0 {
                return Err(OrchestrationError::Configuration(
                    "max_attempts must be at least 1".to_string(),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.synthesis.cap_penalty) {
            return Err(OrchestrationError::Configuration(format!(
                "cap_penalty must be within [0, 1], got {}",
                self.synthesis.cap_penalty
            )));
        }

        Ok(())
    }

    pub fn policy_for(&self, role: AgentRole) -> &AgentPolicy {
        self.agent_policies.get(&role).unwrap_or(&self.default_policy)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map(Some).map_err(|_| {
            OrchestrationError::Configuration(format!("{} has an invalid value: {}", key, raw))
        }),
        _ => Ok(None),
    }
}

/// Install the global tracing subscriber. `RUST_LOG` overrides `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
