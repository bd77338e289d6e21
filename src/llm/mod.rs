//! Conversation memory types and the LLM client boundary.
//!
//! The agent treats the model as an opaque request/response service: the
//! full transcript plus the tool schemas go in, one assistant reply comes
//! out. Provider details (endpoint, key, model name) are configuration
//! handed to the concrete client at construction time; nothing here reads
//! the process environment.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One transcript message in chat-completions form. Assistant messages may
/// carry pending tool invocations; tool messages answer one invocation by
/// its correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolInvocation>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            tool_call_id: None,
        }
    }

    /// An observation answering the invocation with the given correlation id.
    pub fn tool(call_id: impl Into<String>, observation: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(observation.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A tool call requested by the model. `arguments` stays a JSON-encoded
/// string, exactly as the wire format carries it; parsing happens at
/// dispatch so malformed payloads become observations, not crashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Opaque correlation id pairing this invocation with its observation.
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolInvocation {
    #[allow(dead_code)] // Constructor for stub clients in tests
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

/// The model's reply for one step: text content, tool invocations, or both.
#[derive(Debug, Clone, Default)]
pub struct AssistantReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolInvocation>,
}

/// Transport and provider failures. All of these are fatal to a run; the
/// loop never retries. Retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("cannot connect to {0}")]
    Connect(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed API response: {0}")]
    MalformedResponse(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Stateless request/response boundary to the model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the transcript and tool schemas, receive one assistant reply.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> Result<AssistantReply, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_message_drops_empty_tool_calls() {
        let message = ChatMessage::assistant(Some("done".to_string()), vec![]);
        assert!(message.tool_calls.is_none());

        let call = ToolInvocation::new("call_1", "read_file", "{}");
        let message = ChatMessage::assistant(None, vec![call]);
        assert_eq!(message.tool_calls.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_tool_message_carries_correlation_id() {
        let message = ChatMessage::tool("call_7", r#"{"ok":true}"#);
        assert_eq!(message.role, "tool");
        assert_eq!(message.tool_call_id.as_deref(), Some("call_7"));
    }

    #[test]
    fn test_serialization_skips_absent_fields() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_call_id"));
    }

    #[test]
    fn test_invocation_round_trips_wire_format() {
        let wire = r#"{"id":"call_3","type":"function","function":{"name":"calculate","arguments":"{\"expression\":\"1+1\"}"}}"#;
        let invocation: ToolInvocation = serde_json::from_str(wire).unwrap();
        assert_eq!(invocation.id, "call_3");
        assert_eq!(invocation.function.name, "calculate");
        assert!(invocation.function.arguments.contains("expression"));
    }
}
