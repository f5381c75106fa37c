//! Error types for the committee orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Hard failures (surface to the caller)
    // =============================

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =============================
    // Agent-level failures (absorbed into findings)
    // =============================

    /// Carries the elapsed budget, e.g. "500ms".
    #[error("agent timeout after {0}")]
    AgentTimeout(String),

    #[error("Agent invocation error: {0}")]
    AgentInvocation(String),

    #[error("Reasoning call failed: {0}")]
    Reasoning(String),

    #[error("Malformed reasoning payload: {0}")]
    MalformedPayload(String),

    // =============================
    // Collaborator failures
    // =============================

    #[error("Data source error: {0}")]
    DataSource(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl OrchestrationError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            OrchestrationError::Reasoning(_)
            | OrchestrationError::MalformedPayload(_)
            | OrchestrationError::AgentInvocation(_)
            | OrchestrationError::DataSource(_) => true,
            OrchestrationError::HttpError(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().map(|s| s.is_server_error() || s.as_u16() == 429).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Stable machine-readable code, surfaced by the HTTP layer.
    pub fn error_code(&self) -> &'static str {
        match self {
            OrchestrationError::InvalidRequest(_) => "INVALID_REQUEST",
            OrchestrationError::Configuration(_) => "CONFIGURATION_ERROR",
            OrchestrationError::AgentTimeout(_) => "AGENT_TIMEOUT",
            OrchestrationError::AgentInvocation(_) => "AGENT_EXECUTION_ERROR",
            OrchestrationError::Reasoning(_) | OrchestrationError::MalformedPayload(_) => {
                "LLM_SERVICE_ERROR"
            }
            OrchestrationError::DataSource(_) => "DATA_SOURCE_ERROR",
            OrchestrationError::SerializationError(_) => "SERIALIZATION_ERROR",
            OrchestrationError::HttpError(_) => "NETWORK_ERROR",
        }
    }
}
