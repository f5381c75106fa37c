//! LLM gateway client
//!
//! Talks to an OpenAI-compatible chat completions endpoint.
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{extract_json_object, truncate, PromptContext, ReasoningClient};
use crate::config::GatewayConfig;
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

const JSON_ONLY_SUFFIX: &str = "\n\nReturn ONLY a JSON object. No explanation text.";

/// Reusable gateway client (connection-pooled)
pub struct LlmGatewayClient {
    client: Client,
    url: String,
    model: String,
}

impl LlmGatewayClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let url = config.url.clone().ok_or_else(|| {
            OrchestrationError::Configuration("LLM_GATEWAY_URL is not configured".to_string())
        })?;
        Self::new(url, config.model.clone(), config.request_timeout)
    }

    fn build_request(&self, prompt: &PromptContext) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("{}{}", prompt.user, JSON_ONLY_SUFFIX),
                },
            ],
            temperature: prompt.temperature,
        }
    }
}

#[async_trait]
impl ReasoningClient for LlmGatewayClient {
    async fn call(&self, prompt: &PromptContext) -> Result<Value> {
        let request = self.build_request(prompt);

        debug!(agent = %prompt.agent, model = %self.model, "Calling reasoning gateway");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(agent = %prompt.agent, "Gateway request failed: {}", e);
                OrchestrationError::Reasoning(format!("gateway request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(agent = %prompt.agent, %status, "Gateway error response");
            let message = format!("gateway returned {}: {}", status, truncate(&error_text, 200));
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                OrchestrationError::Reasoning(message)
            } else {
                OrchestrationError::Configuration(message)
            });
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            OrchestrationError::MalformedPayload(format!("gateway parse error: {}", e))
        })?;

        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| OrchestrationError::MalformedPayload("empty choices".to_string()))?;

        extract_json_object(content)
    }
}

/// Reasoner used when no gateway is configured. Every call fails permanently,
/// so agents fall back to their conservative defaults without retrying.
pub struct UnconfiguredReasoner;

#[async_trait]
impl ReasoningClient for UnconfiguredReasoner {
    async fn call(&self, _prompt: &PromptContext) -> Result<Value> {
        Err(OrchestrationError::Configuration(
            "no reasoning gateway configured".to_string(),
        ))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentRole;

    #[test]
    fn test_request_serialization() {
        let client = LlmGatewayClient::new(
            "http://localhost:8002/v1/chat/completions",
            "deepseek-v3",
            Duration::from_secs(5),
        )
        .unwrap();
        let prompt = PromptContext {
            agent: AgentRole::ContrarianSkeptic,
            system: "You are a short-seller".to_string(),
            user: "Event: earnings beat".to_string(),
            temperature: 0.1,
        };

        let json = serde_json::to_string(&client.build_request(&prompt)).unwrap();
        assert!(json.contains("earnings beat"));
        assert!(json.contains("Return ONLY a JSON object"));
        assert!(json.contains("\"model\":\"deepseek-v3\""));
    }

    #[test]
    fn test_response_parsing() {
        let body: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"stance\":\"hold\"}"}}]
        }))
        .unwrap();
        let value = extract_json_object(&body.choices[0].message.content).unwrap();
        assert_eq!(value["stance"], "hold");
    }

    #[tokio::test]
    async fn test_unconfigured_reasoner_fails_permanently() {
        let prompt = PromptContext {
            agent: AgentRole::MacroStrategist,
            system: String::new(),
            user: String::new(),
            temperature: 0.1,
        };
        let err = UnconfiguredReasoner.call(&prompt).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_from_config_requires_url() {
        assert!(LlmGatewayClient::from_config(&GatewayConfig::default()).is_err());
    }
}
