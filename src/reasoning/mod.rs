//! Reasoning capability
//!
//! Every agent invocation makes exactly one reasoning call. The call is
//! fallible and carries no ordering guarantee across calls.

use crate::error::OrchestrationError;
use crate::models::AgentRole;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod gateway;
pub use gateway::{LlmGatewayClient, UnconfiguredReasoner};

/// Prompt handed to the reasoning call for one agent attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContext {
    pub agent: AgentRole,
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

/// External reasoning call (LLM). Returns a structured JSON payload.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn call(&self, prompt: &PromptContext) -> Result<Value>;
}

/// Pull a JSON object out of a model response.
///
/// Accepts bare JSON, ```json fenced blocks, or prose wrapped around the
/// outermost `{ ... }` pair.
pub fn extract_json_object(content: &str) -> Result<Value> {
    let cleaned = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if let Ok(parsed) = serde_json::from_str::<Value>(cleaned) {
        if parsed.is_object() {
            return Ok(parsed);
        }
    }

    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if end > start {
            if let Ok(parsed) = serde_json::from_str::<Value>(&content[start..=end]) {
                if parsed.is_object() {
                    return Ok(parsed);
                }
            }
        }
    }

    Err(OrchestrationError::MalformedPayload(format!(
        "no JSON object in response: {}",
        truncate(content, 200)
    )))
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_json() {
        let value = extract_json_object(r#"{"stance": "buy", "confidence": 0.8}"#).unwrap();
        assert_eq!(value["stance"], "buy");
    }

    #[test]
    fn test_extract_fenced_json() {
        let value = extract_json_object("```json\n{\"meme_potential\": 0.6}\n```").unwrap();
        assert_eq!(value["meme_potential"], 0.6);
    }

    #[test]
    fn test_extract_json_inside_prose() {
        let value =
            extract_json_object("Here is my view: {\"stance\": \"sell\"} hope it helps").unwrap();
        assert_eq!(value["stance"], "sell");
    }

    #[test]
    fn test_extract_rejects_non_object() {
        let err = extract_json_object("no structured output").unwrap_err();
        assert!(matches!(err, OrchestrationError::MalformedPayload(_)));
        assert!(extract_json_object("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
        assert_eq!(truncate("short", 10), "short");
    }
}
