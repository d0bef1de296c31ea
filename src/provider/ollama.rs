// src/provider/ollama.rs — Ollama local model provider

use async_trait::async_trait;

use super::{wire_messages, ChatRequest, ChatResponse, ModelProvider, TokenUsage};
use crate::infra::errors::SearchError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn error(message: impl Into<String>, retriable: bool) -> SearchError {
        SearchError::Provider {
            provider: "ollama".into(),
            message: message.into(),
            retriable,
        }
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Request body for `POST /api/chat` (non-streaming).
pub(crate) fn chat_body(request: &ChatRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": request.model,
        "messages": wire_messages(request),
        "stream": false,
    });

    let mut options = serde_json::Map::new();
    if let Some(temp) = request.temperature {
        options.insert("temperature".into(), serde_json::json!(temp));
    }
    if let Some(max_tokens) = request.max_tokens {
        options.insert("num_predict".into(), serde_json::json!(max_tokens));
    }
    if !options.is_empty() {
        body["options"] = serde_json::Value::Object(options);
    }
    body
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn id(&self) -> &str {
        "ollama"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, SearchError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&chat_body(&request))
            .send()
            .await
            .map_err(|e| Self::error(e.to_string(), e.is_timeout() || e.is_connect()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::error(
                format!("HTTP {}: {}", status, error_body),
                status.is_server_error(),
            ));
        }

        let resp: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Self::error(format!("Failed to parse response: {}", e), false))?;

        let content = resp["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let usage = TokenUsage {
            input_tokens: resp["prompt_eval_count"].as_u64().unwrap_or(0) as u32,
            output_tokens: resp["eval_count"].as_u64().unwrap_or(0) as u32,
        };

        Ok(ChatResponse { content, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;

    #[test]
    fn test_base_url_trailing_slash() {
        let p = OllamaProvider::new(Some("http://gpu-box:11434/".into()));
        assert_eq!(p.base_url(), "http://gpu-box:11434");
        assert_eq!(OllamaProvider::default().base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_chat_body_options() {
        let request = ChatRequest {
            model: "qwen2.5-coder".into(),
            messages: vec![Message::user("complete this")],
            temperature: Some(0.5),
            max_tokens: Some(256),
            system: None,
        };
        let body = chat_body(&request);
        assert_eq!(body["model"], "qwen2.5-coder");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.5);
        assert_eq!(body["options"]["num_predict"], 256);
    }

    #[test]
    fn test_chat_body_without_options() {
        let request = ChatRequest {
            model: "m".into(),
            ..Default::default()
        };
        assert!(chat_body(&request).get("options").is_none());
    }
}
