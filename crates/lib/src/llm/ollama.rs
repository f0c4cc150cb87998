//! Ollama API client (http://127.0.0.1:11434 by default).
//! Non-streaming chat completion against `/api/chat`.

use crate::llm::{ChatMessage, LlmBackend, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_MODEL: &str = "llama3.2:latest";

/// Client for the Ollama HTTP API, bound to one model.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// `timeout` bounds each request end to end; a slow model surfaces as `LlmError::Request`.
    pub fn new(
        base_url: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = model.into();
        let model = if model.trim().is_empty() {
            log::warn!("ollama: configured model was empty, using fallback");
            DEFAULT_MODEL.to_string()
        } else {
            model.trim().to_string()
        };
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            model,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// POST /api/chat with `stream: false`.
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{} {}", status, body)));
        }
        Ok(res.json().await?)
    }
}

#[async_trait]
impl LlmBackend for OllamaClient {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        log::debug!(
            "ollama: chat with {} message(s) on {}",
            messages.len(),
            self.model
        );
        let res = self.chat_completion(messages).await?;
        let content = res.content().trim();
        if content.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
}

impl ChatResponse {
    fn content(&self) -> &str {
        self.message
            .as_ref()
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_and_empty_model() {
        let c = OllamaClient::new(
            Some("http://gpu-box:11434/".to_string()),
            "  ",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(c.base_url, "http://gpu-box:11434");
        assert_eq!(c.model(), DEFAULT_MODEL);
    }

    #[test]
    fn request_body_is_non_streaming() {
        let body = ChatRequest {
            model: "qwen3:8b",
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
            stream: false,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["model"], "qwen3:8b");
        assert_eq!(v["stream"], false);
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["content"], "hi");
    }

    #[test]
    fn response_content_is_read_from_message() {
        let res: ChatResponse = serde_json::from_str(
            r#"{"model":"llama3.2","message":{"role":"assistant","content":"hello"},"done":true}"#,
        )
        .unwrap();
        assert_eq!(res.content(), "hello");
        let empty: ChatResponse = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert_eq!(empty.content(), "");
    }
}
