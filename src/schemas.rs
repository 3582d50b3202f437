//! Canonical request/response types plus the wire structures for the three
//! supported client protocols (Ollama chat/generate, OpenAI chat completions,
//! and the simplified single-field message form).

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Conversation roles recognized by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Other,
}

impl From<&str> for Role {
    fn from(role: &str) -> Self {
        match role {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Other,
        }
    }
}

/// A single conversation turn. The role stays a string on the wire so that
/// proxied requests round-trip unknown roles untouched.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Protocol-independent form every adapter parses into.
///
/// `options` carries scalar generation knobs (temperature, max_tokens, ...)
/// opaquely; the gateway forwards them without interpretation.
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: Option<Map<String, Value>>,
}

impl CanonicalRequest {
    /// The question presented to generation: the last `user`-role message.
    /// A request without one is malformed.
    pub fn question(&self) -> Result<&str, GatewayError> {
        self.messages
            .iter()
            .rev()
            .find(|msg| Role::from(msg.role.as_str()) == Role::User)
            .map(|msg| msg.content.as_str())
            .ok_or_else(|| GatewayError::BadRequest("No user message found".to_string()))
    }
}

// ================================
// Ollama wire protocol
// ================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OllamaGenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl From<OllamaChatRequest> for CanonicalRequest {
    fn from(req: OllamaChatRequest) -> Self {
        Self {
            model: req.model,
            messages: req.messages,
            stream: req.stream.unwrap_or(false),
            options: req.options,
        }
    }
}

impl From<OllamaGenerateRequest> for CanonicalRequest {
    fn from(req: OllamaGenerateRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = req.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.push(ChatMessage::user(req.prompt));
        Self {
            model: req.model,
            messages,
            stream: req.stream.unwrap_or(false),
            options: req.options,
        }
    }
}

// ================================
// OpenAI wire protocol
// ================================

/// Inbound body for `POST /api/chat/completions`. Accepts both the full
/// OpenAI shape (`messages`) and the simplified single-field form
/// (`message`); the simple adapter normalizes the latter.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatCompletionsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One chunk of an SSE stream (`object` is always "chat.completion.chunk").
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: StreamDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StreamDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreamingError {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}
