//! OpenAI-compatible chat completions client used for both Groq and OpenAI

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::clients::traits::{ModelBackend, ModelError};
use crate::config::ProviderConfig;

const ERROR_BODY_CAP: usize = 500;

#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    provider: ProviderConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl ChatCompletionsClient {
    pub fn new(provider: ProviderConfig) -> Result<Self, ModelError> {
        // No request timeout: a slow stage is cancelled by dropping the run.
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ModelError::Request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, provider })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.provider.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ModelBackend for ChatCompletionsClient {
    async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
        debug!(
            "Calling {} (model={}, prompt_chars={})",
            self.provider.kind.label(),
            self.provider.model,
            prompt.len()
        );

        let body = ChatRequest {
            model: &self.provider.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.provider.temperature,
        };

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.provider.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(ModelError::Http {
                status: status.as_u16(),
                body: truncate_snippet(body_text.trim(), ERROR_BODY_CAP),
            });
        }

        let val: Value = resp
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;
        completion_text(&val)
    }

    fn provider(&self) -> &str {
        self.provider.kind.label()
    }
}

/// Pull the first choice's content out of a chat completions response.
pub fn completion_text(val: &Value) -> Result<String, ModelError> {
    let content = val
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .ok_or(ModelError::EmptyResponse)?;

    match content {
        Value::String(s) => Ok(s.clone()),
        Value::Array(parts) => Ok(parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()).or_else(|| p.as_str()))
            .collect::<Vec<_>>()
            .join("")),
        Value::Null => Err(ModelError::EmptyResponse),
        other => Ok(other.to_string()),
    }
}

fn truncate_snippet(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    let cut: String = input.chars().take(max).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_content_is_returned_verbatim() {
        let v = json!({"choices": [{"message": {"role": "assistant", "content": " hi "}}]});
        assert_eq!(completion_text(&v).unwrap(), " hi ");
    }

    #[test]
    fn array_content_parts_are_joined() {
        let v = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "{\"severity\":"},
            {"type": "text", "text": "8}"}
        ]}}]});
        assert_eq!(completion_text(&v).unwrap(), "{\"severity\":8}");
    }

    #[test]
    fn missing_choices_is_empty_response() {
        let v = json!({"error": {"message": "quota"}});
        assert!(matches!(completion_text(&v), Err(ModelError::EmptyResponse)));
        let v = json!({"choices": []});
        assert!(matches!(completion_text(&v), Err(ModelError::EmptyResponse)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "é".repeat(10);
        assert_eq!(truncate_snippet(&s, 3), "ééé...");
        assert_eq!(truncate_snippet("short", 10), "short");
    }
}
