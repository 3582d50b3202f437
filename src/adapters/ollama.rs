//! Ollama dialect rendering: `/api/chat` and `/api/generate` envelopes, both
//! the single-JSON and the NDJSON streaming forms.
//!
//! Timing counters are placeholders with plausible magnitudes; real duration
//! accounting is out of scope here. Token counts are word counts, which is
//! what Ollama-compatible dashboards end up charting anyway.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

const TOTAL_DURATION_NS: u64 = 1_000_000_000;
const LOAD_DURATION_NS: u64 = 100_000_000;
const PROMPT_EVAL_DURATION_NS: u64 = 200_000_000;
const EVAL_DURATION_NS: u64 = 500_000_000;

/// Fixed prompt "token" count used where the question is not available.
const DEFAULT_PROMPT_EVAL_COUNT: usize = 10;

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn counters(prompt_eval_count: usize, eval_count: usize) -> Value {
    json!({
        "total_duration": TOTAL_DURATION_NS,
        "load_duration": LOAD_DURATION_NS,
        "prompt_eval_count": prompt_eval_count,
        "prompt_eval_duration": PROMPT_EVAL_DURATION_NS,
        "eval_count": eval_count,
        "eval_duration": EVAL_DURATION_NS,
    })
}

fn merged(mut base: Value, extra: Value) -> Value {
    let obj = base.as_object_mut().expect("envelope is an object");
    for (k, v) in extra.as_object().expect("counters are an object") {
        obj.insert(k.clone(), v.clone());
    }
    base
}

/// Complete (non-streaming) `/api/chat` response.
pub fn chat_response(model: &str, answer: &str) -> Value {
    merged(
        json!({
            "model": model,
            "created_at": timestamp(),
            "message": {
                "role": "assistant",
                "content": answer,
            },
            "done": true,
        }),
        counters(DEFAULT_PROMPT_EVAL_COUNT, word_count(answer)),
    )
}

/// Complete (non-streaming) `/api/generate` response.
pub fn generate_response(model: &str, answer: &str) -> Value {
    merged(
        json!({
            "model": model,
            "created_at": timestamp(),
            "response": answer,
            "done": true,
            "context": [],
        }),
        counters(DEFAULT_PROMPT_EVAL_COUNT, word_count(answer)),
    )
}

/// One in-flight `/api/chat` stream fragment.
pub fn chat_stream_chunk(model: &str, fragment: &str) -> Value {
    json!({
        "model": model,
        "created_at": timestamp(),
        "message": {
            "role": "assistant",
            "content": fragment,
        },
        "done": false,
    })
}

/// Terminal `/api/chat` stream record. Carries the counters; its message
/// content is empty because every fragment already went out.
pub fn chat_stream_final(model: &str, question: &str, answer: &str) -> Value {
    merged(
        json!({
            "model": model,
            "created_at": timestamp(),
            "message": {
                "role": "assistant",
                "content": "",
            },
            "done": true,
        }),
        counters(word_count(question), word_count(answer)),
    )
}

/// One in-flight `/api/generate` stream fragment.
pub fn generate_stream_chunk(model: &str, fragment: &str) -> Value {
    json!({
        "model": model,
        "created_at": timestamp(),
        "response": fragment,
        "done": false,
    })
}

/// Terminal `/api/generate` stream record.
pub fn generate_stream_final(model: &str, question: &str, answer: &str) -> Value {
    merged(
        json!({
            "model": model,
            "created_at": timestamp(),
            "response": "",
            "done": true,
            "context": [],
        }),
        counters(word_count(question), word_count(answer)),
    )
}

/// Error rendered as a terminal `/api/chat` record so NDJSON consumers see a
/// well-formed, finished stream rather than a broken connection.
pub fn chat_error(model: &str, message: &str) -> Value {
    json!({
        "model": model,
        "created_at": timestamp(),
        "message": {
            "role": "assistant",
            "content": format!("Error: {}", message),
        },
        "done": true,
    })
}

/// Error rendered as a terminal `/api/generate` record.
pub fn generate_error(model: &str, message: &str) -> Value {
    json!({
        "model": model,
        "created_at": timestamp(),
        "response": format!("Error: {}", message),
        "done": true,
    })
}

/// Serialize one record as an NDJSON line.
pub fn ndjson_line(record: &Value) -> String {
    format!("{}\n", record)
}
