//! OpenAI chat-completions dialect: request canonicalization, the complete
//! response envelope, and the SSE chunk sequence.
//!
//! Stream framing follows the OpenAI contract exactly: every chunk is a
//! `data:` line with a `chat.completion.chunk` object, the last content-free
//! chunk carries `finish_reason: "stop"`, and the stream closes with the
//! literal `data: [DONE]` sentinel. Errors become one error event followed by
//! the sentinel, never a dropped connection.

use crate::{
    error::GatewayError,
    schemas::{
        CanonicalRequest, ChatCompletionChunk, ChatCompletionResponse, ChatCompletionsRequest,
        ChatMessage, Choice, ErrorDetails, StreamChoice, StreamDelta, StreamingError, Usage,
    },
};
use axum::response::sse::Event;
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

pub fn request_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4())
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Parse a chat-completions body into the canonical form. The body must carry
/// `messages`; the simplified single-field shape is normalized before this
/// point.
pub fn canonicalize(
    req: ChatCompletionsRequest,
    default_model: &str,
) -> Result<CanonicalRequest, GatewayError> {
    let messages = req
        .messages
        .ok_or_else(|| GatewayError::BadRequest("messages field is required".to_string()))?;
    if messages.is_empty() {
        return Err(GatewayError::BadRequest(
            "messages cannot be empty".to_string(),
        ));
    }

    let mut options = Map::new();
    if let Some(temperature) = req.temperature {
        options.insert("temperature".to_string(), Value::from(temperature));
    }
    if let Some(max_tokens) = req.max_tokens {
        options.insert("max_tokens".to_string(), Value::from(max_tokens));
    }
    if let Some(top_p) = req.top_p {
        options.insert("top_p".to_string(), Value::from(top_p));
    }

    Ok(CanonicalRequest {
        model: req.model.unwrap_or_else(|| default_model.to_string()),
        messages,
        stream: req.stream.unwrap_or(false),
        options: if options.is_empty() {
            None
        } else {
            Some(options)
        },
    })
}

/// Complete (non-streaming) chat-completions response.
pub fn completion_response(model: &str, question: &str, answer: &str) -> ChatCompletionResponse {
    let prompt_tokens = word_count(question) as u32;
    let completion_tokens = word_count(answer) as u32;
    ChatCompletionResponse {
        id: request_id(),
        object: "chat.completion".to_string(),
        created: Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChatMessage::assistant(answer),
            finish_reason: "stop".to_string(),
        }],
        usage: Some(Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }),
    }
}

fn chunk(id: &str, model: &str, delta: StreamDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created: Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![StreamChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    }
}

fn chunk_event(chunk: &ChatCompletionChunk) -> Result<Event, GatewayError> {
    Ok(Event::default().data(serde_json::to_string(chunk)?))
}

/// First stream chunk, announcing the assistant role with no content.
pub fn role_event(id: &str, model: &str) -> Result<Event, GatewayError> {
    chunk_event(&chunk(
        id,
        model,
        StreamDelta {
            role: Some("assistant".to_string()),
            content: None,
        },
        None,
    ))
}

/// One content fragment.
pub fn content_event(id: &str, model: &str, fragment: &str) -> Result<Event, GatewayError> {
    chunk_event(&chunk(
        id,
        model,
        StreamDelta {
            role: None,
            content: Some(fragment.to_string()),
        },
        None,
    ))
}

/// Terminal chunk with an empty delta and `finish_reason: "stop"`.
pub fn final_event(id: &str, model: &str) -> Result<Event, GatewayError> {
    chunk_event(&chunk(
        id,
        model,
        StreamDelta::default(),
        Some("stop".to_string()),
    ))
}

/// The `[DONE]` sentinel that closes every stream, error paths included.
pub fn done_event() -> Event {
    Event::default().data("[DONE]")
}

/// In-stream error envelope.
pub fn error_event(message: &str) -> Result<Event, GatewayError> {
    let envelope = StreamingError {
        error: ErrorDetails {
            message: message.to_string(),
            error_type: "internal_server_error".to_string(),
            code: Some("rag_error".to_string()),
        },
    };
    Ok(Event::default().data(serde_json::to_string(&envelope)?))
}
