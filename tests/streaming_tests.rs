//! Streaming behavior over the full router: NDJSON framing for the Ollama
//! dialect, SSE framing for chat completions, and the in-stream error paths.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use rag_gateway::{
    pipeline::{FixedAnswerEngine, RagPipeline, SingleShotEngine},
    server::{create_router, AppState},
    Config, GatewayError, ModelRegistry, ProxyClient, RequestRouter,
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

const RAG_MODEL: &str = "rag-assistant:latest";
const ANSWER: &str = "the battery lasts about ten hours";
const QUESTION: &str = "how long does the battery last";

struct FailingEngine;

impl SingleShotEngine for FailingEngine {
    fn invoke(&self, _question: &str) -> Result<String, GatewayError> {
        Err(GatewayError::Pipeline("vector store offline".to_string()))
    }
}

fn test_app(engine: Arc<dyn SingleShotEngine>) -> Router {
    let mut config = Config::for_test();
    config.upstream_url = "http://127.0.0.1:1".to_string();
    let registry = Arc::new(ModelRegistry::from_config(&config));
    let proxy = Arc::new(ProxyClient::new(&config.upstream_url, Duration::from_secs(2)).unwrap());
    let pipeline = Arc::new(RagPipeline::single_shot(engine));
    let router = Arc::new(RequestRouter::new(&config, registry, pipeline, proxy, None));
    create_router(AppState::new(config, router))
}

async fn post_collect(app: Router, uri: &str, body: Value) -> (StatusCode, Option<String>, String) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
}

fn ndjson_records(body: &str) -> Vec<Value> {
    body.lines()
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn sse_data(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|event| event.strip_prefix("data: "))
        .map(|data| data.trim_end().to_string())
        .collect()
}

#[tokio::test]
async fn chat_stream_is_ndjson_and_lossless() {
    let app = test_app(Arc::new(FixedAnswerEngine::new(ANSWER)));
    let body = json!({
        "model": RAG_MODEL,
        "messages": [{"role": "user", "content": QUESTION}],
        "stream": true
    });
    let (status, content_type, text) = post_collect(app, "/api/chat", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/x-ndjson"));

    let records = ndjson_records(&text);
    // One record per word, plus the terminal record.
    assert_eq!(records.len(), 7);

    let (fragments, terminal) = records.split_at(records.len() - 1);
    for record in fragments {
        assert_eq!(record["done"], false);
        assert_eq!(record["model"], RAG_MODEL);
        assert_eq!(record["message"]["role"], "assistant");
    }
    let concatenated: String = fragments
        .iter()
        .map(|r| r["message"]["content"].as_str().unwrap())
        .collect();
    assert_eq!(concatenated, ANSWER);

    let last = &terminal[0];
    assert_eq!(last["done"], true);
    assert_eq!(last["message"]["content"], "");
    assert_eq!(last["prompt_eval_count"], 6);
    assert_eq!(last["eval_count"], 6);
    assert_eq!(last["total_duration"], 1_000_000_000u64);
}

#[tokio::test]
async fn generate_stream_uses_response_field() {
    let app = test_app(Arc::new(FixedAnswerEngine::new("ten hours")));
    let body = json!({
        "model": RAG_MODEL,
        "prompt": QUESTION,
        "stream": true
    });
    let (status, _, text) = post_collect(app, "/api/generate", body).await;
    assert_eq!(status, StatusCode::OK);

    let records = ndjson_records(&text);
    assert_eq!(records.len(), 3);
    let concatenated: String = records[..2]
        .iter()
        .map(|r| r["response"].as_str().unwrap())
        .collect();
    assert_eq!(concatenated, "ten hours");
    assert_eq!(records[2]["done"], true);
    assert!(records[2]["context"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn failed_pipeline_streams_one_terminal_error_record() {
    let app = test_app(Arc::new(FailingEngine));
    let body = json!({
        "model": RAG_MODEL,
        "messages": [{"role": "user", "content": QUESTION}],
        "stream": true
    });
    let (status, _, text) = post_collect(app, "/api/chat", body).await;
    assert_eq!(status, StatusCode::OK);

    let records = ndjson_records(&text);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["done"], true);
    assert_eq!(
        records[0]["message"]["content"],
        "Error: vector store offline"
    );
}

#[tokio::test]
async fn completions_stream_follows_sse_contract() {
    let app = test_app(Arc::new(FixedAnswerEngine::new(ANSWER)));
    let body = json!({
        "model": RAG_MODEL,
        "messages": [{"role": "user", "content": QUESTION}],
        "stream": true
    });
    let (status, content_type, text) = post_collect(app, "/api/chat/completions", body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/event-stream"));

    let events = sse_data(&text);
    // Role chunk, six content chunks, stop chunk, sentinel.
    assert_eq!(events.len(), 9);
    assert_eq!(events.last().unwrap(), "[DONE]");

    let chunks: Vec<Value> = events[..events.len() - 1]
        .iter()
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();
    assert!(chunks
        .iter()
        .all(|c| c["object"] == "chat.completion.chunk"));
    let ids: Vec<&str> = chunks.iter().map(|c| c["id"].as_str().unwrap()).collect();
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert!(ids[0].starts_with("chatcmpl-"));

    assert_eq!(chunks[0]["choices"][0]["delta"]["role"], "assistant");
    let concatenated: String = chunks
        .iter()
        .filter_map(|c| c["choices"][0]["delta"]["content"].as_str())
        .collect();
    assert_eq!(concatenated, ANSWER);

    let stop = chunks.last().unwrap();
    assert_eq!(stop["choices"][0]["finish_reason"], "stop");
    assert!(stop["choices"][0]["delta"]["content"].is_null());
}

#[tokio::test]
async fn simplified_shape_streams_identically() {
    let app = test_app(Arc::new(FixedAnswerEngine::new(ANSWER)));
    let (status, _, text) = post_collect(
        app,
        "/api/chat/completions",
        json!({"message": QUESTION, "stream": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let events = sse_data(&text);
    assert_eq!(events.last().unwrap(), "[DONE]");
    let concatenated: String = events[..events.len() - 1]
        .iter()
        .map(|data| serde_json::from_str::<Value>(data).unwrap())
        .filter_map(|c| {
            c["choices"][0]["delta"]["content"]
                .as_str()
                .map(str::to_owned)
        })
        .collect();
    assert_eq!(concatenated, ANSWER);
}

#[tokio::test]
async fn failed_pipeline_sse_emits_error_then_done() {
    let app = test_app(Arc::new(FailingEngine));
    let body = json!({
        "model": RAG_MODEL,
        "messages": [{"role": "user", "content": QUESTION}],
        "stream": true
    });
    let (status, _, text) = post_collect(app, "/api/chat/completions", body).await;
    assert_eq!(status, StatusCode::OK);

    let events = sse_data(&text);
    assert_eq!(events.len(), 2);
    let error: Value = serde_json::from_str(&events[0]).unwrap();
    assert_eq!(error["error"]["code"], "rag_error");
    assert_eq!(error["error"]["type"], "internal_server_error");
    assert_eq!(events[1], "[DONE]");
}

#[tokio::test]
async fn stream_flag_defaults_to_non_streaming() {
    let app = test_app(Arc::new(FixedAnswerEngine::new(ANSWER)));
    let body = json!({
        "model": RAG_MODEL,
        "messages": [{"role": "user", "content": QUESTION}]
    });
    let (status, content_type, text) = post_collect(app, "/api/chat", body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("application/json"));
    let record: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(record["message"]["content"], ANSWER);
}
