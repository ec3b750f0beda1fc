use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ChatTurn, GenerativeClient, TurnRole};
use crate::config::ProviderConfig;

/// OpenAI chat-completions client.
pub struct OpenAIClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAIClient {
    pub fn new(config: &ProviderConfig, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }

    async fn send(&self, messages: Vec<Value>) -> Option<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!("OpenAI API key is not configured");
            return None;
        };

        match self.post(api_key, messages).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "OpenAI request failed");
                None
            }
        }
    }

    async fn post(&self, api_key: &str, messages: Vec<Value>) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "temperature": 0.7,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();
            tracing::warn!(retry_after = %retry_after, "OpenAI API rate limit exceeded");
            bail!("OpenAI API rate limited");
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "OpenAI API error");
            bail!("OpenAI API error {}", status);
        }

        let json: Value = response.json().await?;
        json.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing message content"))
    }
}

fn message(role: &str, content: &str) -> Value {
    json!({ "role": role, "content": content })
}

#[async_trait]
impl GenerativeClient for OpenAIClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_text(&self, prompt: &str) -> Option<String> {
        self.send(vec![message("user", prompt)]).await
    }

    async fn generate_with_history(
        &self,
        system: &str,
        history: &[ChatTurn],
        current: &str,
    ) -> Option<String> {
        let mut messages = vec![message("system", system)];
        messages.extend(history.iter().filter(|t| !t.text.trim().is_empty()).map(|t| {
            let role = match t.role {
                TurnRole::User => "user",
                TurnRole::Model => "assistant",
            };
            message(role, &t.text)
        }));
        messages.push(message("user", current));
        self.send(messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> OpenAIClient {
        let config = ProviderConfig {
            base_url: server.base_url(),
            model: "gpt-test".to_string(),
            timeout_secs: 5,
        };
        OpenAIClient::new(&config, Some("sk-test".to_string())).unwrap()
    }

    fn completion(text: &str) -> Value {
        json!({ "choices": [{ "message": { "role": "assistant", "content": text } }] })
    }

    #[tokio::test]
    async fn test_generate_text_sends_bearer_and_model() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(Method::POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .body_includes("\"model\":\"gpt-test\"")
                    .body_includes("\"temperature\":0.7");
                then.status(200).json_body(completion("Forty-two."));
            })
            .await;

        let reply = client(&server).generate_text("What is six times seven?").await;
        mock.assert_async().await;
        assert_eq!(reply.as_deref(), Some("Forty-two."));
    }

    #[tokio::test]
    async fn test_history_maps_model_to_assistant() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(Method::POST)
                    .path("/chat/completions")
                    .body_includes("\"role\":\"system\"")
                    .body_includes("\"role\":\"assistant\"");
                then.status(200).json_body(completion("Sure."));
            })
            .await;

        let history = vec![
            ChatTurn { role: TurnRole::User, text: "hi".into() },
            ChatTurn { role: TurnRole::Model, text: "hello".into() },
            ChatTurn { role: TurnRole::User, text: "   ".into() },
        ];
        let reply = client(&server)
            .generate_with_history("system text", &history, "help me")
            .await;
        mock.assert_async().await;
        assert_eq!(reply.as_deref(), Some("Sure."));
    }

    #[tokio::test]
    async fn test_rate_limit_yields_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::POST).path("/chat/completions");
                then.status(429).header("retry-after", "20").body("slow down");
            })
            .await;
        assert_eq!(client(&server).generate_text("x").await, None);
    }

    #[tokio::test]
    async fn test_empty_content_yields_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::POST).path("/chat/completions");
                then.status(200).json_body(completion(""));
            })
            .await;
        assert_eq!(client(&server).generate_text("x").await, None);
    }

    #[tokio::test]
    async fn test_summarize_includes_instruction() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(Method::POST)
                    .body_includes("for a Grade 8 student")
                    .body_includes("TEXT:");
                then.status(200).json_body(completion("A short summary."));
            })
            .await;
        let summary = client(&server)
            .summarize("Title: Cells", "for a Grade 8 student")
            .await;
        mock.assert_async().await;
        assert_eq!(summary.as_deref(), Some("A short summary."));
    }
}
