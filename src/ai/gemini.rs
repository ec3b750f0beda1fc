use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ChatTurn, GenerativeClient, TurnRole};
use crate::config::ProviderConfig;

/// Model acknowledgement inserted after the system turn, since the
/// `generateContent` API has no system role of its own.
const SYSTEM_ACK: &str = "Understood. I will assist you as EduNexus JPENHS AI assistant.";

/// Google Gemini `generateContent` client.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &ProviderConfig, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!(
                "{}/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
            api_key,
        })
    }

    async fn send(&self, contents: Value) -> Option<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!("Gemini API key is not configured");
            return None;
        };

        match self.post(api_key, contents).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "Gemini request failed");
                None
            }
        }
    }

    async fn post(&self, api_key: &str, contents: Value) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(&json!({ "contents": contents }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Gemini API error");
            bail!("Gemini API error {}", status);
        }

        let json: Value = response.json().await?;
        reply_text(&json)
    }
}

/// `candidates[0].content.parts[0].text`, trimmed. Blank text is an error.
fn reply_text(json: &Value) -> Result<String> {
    json.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing candidate text"))
}

fn turn(role: &str, text: &str) -> Value {
    json!({ "role": role, "parts": [{ "text": text }] })
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_text(&self, prompt: &str) -> Option<String> {
        self.send(json!([{ "parts": [{ "text": prompt }] }])).await
    }

    async fn generate_with_history(
        &self,
        system: &str,
        history: &[ChatTurn],
        current: &str,
    ) -> Option<String> {
        let mut contents = vec![turn("user", system), turn("model", SYSTEM_ACK)];
        for t in history {
            let role = match t.role {
                TurnRole::User => "user",
                TurnRole::Model => "model",
            };
            contents.push(turn(role, &t.text));
        }
        contents.push(turn("user", current));
        self.send(Value::Array(contents)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(server: &MockServer, key: Option<&str>) -> GeminiClient {
        let config = ProviderConfig {
            base_url: server.base_url(),
            model: "gemini-test".to_string(),
            timeout_secs: 5,
        };
        GeminiClient::new(&config, key.map(str::to_string)).unwrap()
    }

    fn candidate(text: &str) -> Value {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    #[tokio::test]
    async fn test_generate_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(Method::POST)
                    .path("/gemini-test:generateContent")
                    .header("x-goog-api-key", "test-key")
                    .body_includes("What is photosynthesis?");
                then.status(200).json_body(candidate("Plants make food from light."));
            })
            .await;

        let reply = client(&server, Some("test-key"))
            .generate_text("What is photosynthesis?")
            .await;
        mock.assert_async().await;
        assert_eq!(reply.as_deref(), Some("Plants make food from light."));
    }

    #[tokio::test]
    async fn test_history_sends_system_ack_first() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(Method::POST)
                    .path("/gemini-test:generateContent")
                    .body_includes(SYSTEM_ACK)
                    .body_includes("\"role\":\"model\"");
                then.status(200).json_body(candidate("Hi again"));
            })
            .await;

        let history = vec![
            ChatTurn { role: TurnRole::User, text: "hello".into() },
            ChatTurn { role: TurnRole::Model, text: "hi".into() },
        ];
        let reply = client(&server, Some("k"))
            .generate_with_history("You are a tutor.", &history, "again")
            .await;
        mock.assert_async().await;
        assert_eq!(reply.as_deref(), Some("Hi again"));
    }

    #[tokio::test]
    async fn test_error_status_yields_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::POST);
                then.status(500).body("boom");
            })
            .await;
        assert_eq!(client(&server, Some("k")).generate_text("x").await, None);
    }

    #[tokio::test]
    async fn test_missing_candidates_yields_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::POST);
                then.status(200).json_body(json!({ "candidates": [] }));
            })
            .await;
        assert_eq!(client(&server, Some("k")).generate_text("x").await, None);
    }

    #[tokio::test]
    async fn test_blank_candidate_yields_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::POST);
                then.status(200).json_body(candidate("  \n "));
            })
            .await;
        assert_eq!(client(&server, Some("k")).generate_text("x").await, None);
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(Method::POST);
                then.status(200).json_body(candidate("unused"));
            })
            .await;
        let c = client(&server, None);
        assert!(!c.has_api_key());
        assert_eq!(c.generate_text("x").await, None);
        mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_generate_json_parses_fenced_reply() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::POST).body_includes("Please respond with valid JSON only");
                then.status(200)
                    .json_body(candidate("```json\n[{\"id\": 1, \"reason\": \"ok\"}]\n```"));
            })
            .await;
        let value = client(&server, Some("k"))
            .generate_json("rank these", &json!([{ "id": 0, "reason": "string" }]))
            .await;
        assert_eq!(value, Some(json!([{ "id": 1, "reason": "ok" }])));
    }
}
