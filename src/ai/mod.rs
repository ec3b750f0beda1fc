//! Generative-AI clients used for chat replies, summaries and recommendation
//! reasons.
//!
//! Every call is best effort. A missing key, a transport error, a non-2xx
//! status or an unparseable body is logged and reported as `None`; callers
//! fall back to deterministic text. Nothing is retried.
//!
//! | Config `ai.provider` | Client |
//! |----------------------|--------|
//! | `"disabled"` | [`DisabledClient`] |
//! | `"gemini"` | [`GeminiClient`] |
//! | `"openai"` | [`OpenAIClient`] |

mod gemini;
mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAIClient;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::config::AiConfig;
use crate::models::ChatRole;

/// Speaker of a replayed conversation turn, in the provider's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

impl From<ChatRole> for TurnRole {
    fn from(role: ChatRole) -> Self {
        match role {
            ChatRole::User => TurnRole::User,
            ChatRole::Assistant => TurnRole::Model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

#[async_trait]
pub trait GenerativeClient: Send + Sync {
    fn name(&self) -> &str;

    /// Whether an API key is configured. A configured key with a `None`
    /// reply means the provider call failed.
    fn has_api_key(&self) -> bool;

    async fn generate_text(&self, prompt: &str) -> Option<String>;

    async fn generate_with_history(
        &self,
        system: &str,
        history: &[ChatTurn],
        current: &str,
    ) -> Option<String>;

    /// Ask for JSON shaped like `schema` and parse the reply.
    async fn generate_json(&self, prompt: &str, schema: &Value) -> Option<Value> {
        let pretty = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
        let full = format!(
            "{}\n\nPlease respond with valid JSON only, matching this structure: {}",
            prompt, pretty
        );
        let reply = self.generate_text(&full).await?;
        parse_json_reply(&reply)
    }

    async fn summarize(&self, text: &str, instruction: &str) -> Option<String> {
        let mut prompt = String::from(
            "Summarize the following learning resource in a clear, student-friendly way. Limit to about 2–3 sentences.",
        );
        if !instruction.is_empty() {
            prompt.push(' ');
            prompt.push_str(instruction);
        }
        prompt.push_str("\n\nTEXT:\n");
        prompt.push_str(text);
        self.generate_text(&prompt).await
    }
}

/// Strip Markdown code fences around a model reply and parse it as JSON.
pub fn parse_json_reply(reply: &str) -> Option<Value> {
    let mut text = reply.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }

    match serde_json::from_str(text.trim()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "AI reply is not valid JSON");
            None
        }
    }
}

/// Client used when `ai.provider = "disabled"`; every call yields `None`.
pub struct DisabledClient;

#[async_trait]
impl GenerativeClient for DisabledClient {
    fn name(&self) -> &str {
        "disabled"
    }

    fn has_api_key(&self) -> bool {
        false
    }

    async fn generate_text(&self, _prompt: &str) -> Option<String> {
        None
    }

    async fn generate_with_history(
        &self,
        _system: &str,
        _history: &[ChatTurn],
        _current: &str,
    ) -> Option<String> {
        None
    }
}

fn api_key_from_env(config: &AiConfig) -> Option<String> {
    let var = config.api_key_var()?;
    std::env::var(var).ok().filter(|k| !k.trim().is_empty())
}

/// Build the configured client. The provider key is read from the environment.
pub fn create_client(config: &AiConfig) -> Result<Arc<dyn GenerativeClient>> {
    let api_key = api_key_from_env(config);
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledClient)),
        "gemini" => Ok(Arc::new(GeminiClient::new(&config.gemini, api_key)?)),
        "openai" => Ok(Arc::new(OpenAIClient::new(&config.openai, api_key)?)),
        other => bail!("Unknown AI provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json_reply_strips_fences() {
        let reply = "```json\n[{\"id\": 3, \"reason\": \"fits\"}]\n```";
        assert_eq!(
            parse_json_reply(reply),
            Some(json!([{ "id": 3, "reason": "fits" }]))
        );
        assert_eq!(parse_json_reply("```\n{\"a\":1}\n```"), Some(json!({ "a": 1 })));
        assert_eq!(parse_json_reply("  {\"a\":1}  "), Some(json!({ "a": 1 })));
        assert_eq!(parse_json_reply("Sure! Here you go"), None);
    }

    #[test]
    fn test_turn_role_mapping() {
        assert_eq!(TurnRole::from(ChatRole::User), TurnRole::User);
        assert_eq!(TurnRole::from(ChatRole::Assistant), TurnRole::Model);
    }

    #[tokio::test]
    async fn test_disabled_client() {
        let client = DisabledClient;
        assert!(!client.has_api_key());
        assert_eq!(client.generate_text("hi").await, None);
        assert_eq!(client.generate_json("hi", &json!([])).await, None);
        assert_eq!(client.summarize("text", "").await, None);
    }

    #[test]
    fn test_create_client_rejects_unknown_provider() {
        let mut config = AiConfig::default();
        assert_eq!(create_client(&config).unwrap().name(), "disabled");
        config.provider = "claude".into();
        assert!(create_client(&config).is_err());
    }
}
