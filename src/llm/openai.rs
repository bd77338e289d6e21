//! OpenAI-compatible chat completions client.
//!
//! Works against any endpoint speaking the `/chat/completions` shape
//! (OpenAI, OpenRouter, local gateways). Connection parameters arrive as an
//! explicit [`LlmSettings`] value; the client never consults the process
//! environment itself.

use super::{AssistantReply, ChatMessage, LlmClient, LlmError, ToolInvocation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Base URL up to the version segment, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

pub struct OpenAiClient {
    settings: LlmSettings,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        Ok(Self {
            settings,
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [serde_json::Value],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolInvocation>>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> Result<AssistantReply, LlmError> {
        let url = self.endpoint();
        let request = ChatRequest {
            model: &self.settings.model,
            messages,
            tools,
            temperature: self.settings.temperature,
        };

        debug!(
            "Sending chat request with {} messages to {}",
            messages.len(),
            url
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        url: url.clone(),
                        seconds: self.settings.timeout_seconds,
                    }
                } else if e.is_connect() {
                    LlmError::Connect(url.clone())
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::MalformedResponse("response contained no choices".to_string()))?
            .message;

        Ok(AssistantReply {
            content: message.content,
            tool_calls: message.tool_calls.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> LlmSettings {
        LlmSettings {
            base_url: "https://api.openai.com/v1/".to_string(),
            api_key: "test-key".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            timeout_seconds: 30,
        }
    }

    #[test]
    fn test_endpoint_normalizes_trailing_slash() {
        let client = OpenAiClient::new(settings()).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_omits_empty_tool_list() {
        let messages = vec![ChatMessage::user("hello")];
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            tools: &[],
            temperature: 0.0,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("\"tools\""));
    }

    #[test]
    fn test_response_parsing_with_tool_calls() {
        let body = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "read_file", "arguments": "{\"file_path\":\"src/main.rs\"}"}
                    }]
                }
            }]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        let message = parsed.choices.into_iter().next().unwrap().message;
        assert!(message.content.is_none());
        assert_eq!(message.tool_calls.unwrap()[0].function.name, "read_file");
    }
}
