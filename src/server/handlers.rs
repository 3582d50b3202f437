//! HTTP handlers for every endpoint the gateway serves.
//!
//! Handlers parse the inbound dialect, ask the router to classify, and render
//! through the matching adapter. Ollama-dialect bodies destined for the proxy
//! are kept as raw JSON so unknown fields survive the round trip;
//! chat-completions bodies are normalized to the full shape first, since the
//! simplified single-field form is not a dialect the upstream speaks.
//!
//! Streaming responses share one production pattern: a bounded channel with a
//! spawned producer task. When the client disconnects the channel send fails
//! and the producer stops, so no chunk is ever produced for a dead connection.

use crate::{
    adapters::{ollama, openai, simple},
    error::GatewayError,
    proxy::{ByteStream, ProxyOutcome},
    registry::RoutingClass,
    router::RequestRouter,
    schemas::{CanonicalRequest, ChatCompletionsRequest, OllamaChatRequest, OllamaGenerateRequest},
    server::state::AppState,
};
use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{sse::Event, IntoResponse, Response, Sse},
    Json,
};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{convert::Infallible, sync::Arc};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

const NDJSON: &str = "application/x-ndjson";
const EVENT_STREAM: &str = "text/event-stream";

/// The two Ollama-dialect endpoints differ only in envelope shape; this keeps
/// one handler flow for both.
#[derive(Clone, Copy)]
enum OllamaMode {
    Chat,
    Generate,
}

impl OllamaMode {
    fn path(self) -> &'static str {
        match self {
            OllamaMode::Chat => "/api/chat",
            OllamaMode::Generate => "/api/generate",
        }
    }

    fn complete(self, model: &str, answer: &str) -> Value {
        match self {
            OllamaMode::Chat => ollama::chat_response(model, answer),
            OllamaMode::Generate => ollama::generate_response(model, answer),
        }
    }

    fn chunk(self, model: &str, fragment: &str) -> Value {
        match self {
            OllamaMode::Chat => ollama::chat_stream_chunk(model, fragment),
            OllamaMode::Generate => ollama::generate_stream_chunk(model, fragment),
        }
    }

    fn final_record(self, model: &str, question: &str, answer: &str) -> Value {
        match self {
            OllamaMode::Chat => ollama::chat_stream_final(model, question, answer),
            OllamaMode::Generate => ollama::generate_stream_final(model, question, answer),
        }
    }

    fn error_record(self, model: &str, message: &str) -> Value {
        match self {
            OllamaMode::Chat => ollama::chat_error(model, message),
            OllamaMode::Generate => ollama::generate_error(model, message),
        }
    }
}

// ================================
// Ollama endpoints
// ================================

pub async fn ollama_chat(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    handle_ollama(state, body, OllamaMode::Chat).await
}

pub async fn ollama_generate(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    handle_ollama(state, body, OllamaMode::Generate).await
}

async fn handle_ollama(state: AppState, body: Value, mode: OllamaMode) -> Response {
    let router = match state.router() {
        Ok(router) => router,
        Err(err) => return err.into_response(),
    };

    let canonical: CanonicalRequest = match mode {
        OllamaMode::Chat => match serde_json::from_value::<OllamaChatRequest>(body.clone()) {
            Ok(req) => req.into(),
            Err(err) => {
                return GatewayError::BadRequest(format!("invalid request body: {}", err))
                    .into_response()
            }
        },
        OllamaMode::Generate => {
            match serde_json::from_value::<OllamaGenerateRequest>(body.clone()) {
                Ok(req) => req.into(),
                Err(err) => {
                    return GatewayError::BadRequest(format!("invalid request body: {}", err))
                        .into_response()
                }
            }
        }
    };

    match router.classify(&canonical.model) {
        RoutingClass::Proxied => proxy_ollama(router, body, canonical.stream, mode).await,
        RoutingClass::Augmented => {
            let question = match canonical.question() {
                Ok(question) => question.to_owned(),
                Err(err) => return err.into_response(),
            };
            if canonical.stream {
                augmented_ollama_stream(router, canonical.model, question, mode).await
            } else {
                match router.augmented_answer(&question).await {
                    Ok(answer) => Json(mode.complete(&canonical.model, &answer)).into_response(),
                    Err(err) => {
                        error!("augmented generation failed: {}", err);
                        Json(mode.error_record(&canonical.model, &err.wire_message()))
                            .into_response()
                    }
                }
            }
        }
    }
}

async fn augmented_ollama_stream(
    router: Arc<RequestRouter>,
    model: String,
    question: String,
    mode: OllamaMode,
) -> Response {
    let stream = match router.augmented_stream(&question).await {
        Ok(stream) => stream,
        Err(err) => {
            error!("augmented stream setup failed: {}", err);
            return ndjson_once(mode.error_record(&model, &err.wire_message()));
        }
    };

    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(32);
    tokio::spawn(async move {
        let mut stream = stream;
        let mut answer = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    answer.push_str(&fragment);
                    let line = ollama::ndjson_line(&mode.chunk(&model, &fragment));
                    if tx.send(Ok(Bytes::from(line))).await.is_err() {
                        info!("client disconnected mid-stream");
                        return;
                    }
                }
                Err(err) => {
                    warn!("augmented stream failed mid-flight: {}", err);
                    let line = ollama::ndjson_line(&mode.error_record(&model, &err.wire_message()));
                    let _ = tx.send(Ok(Bytes::from(line))).await;
                    return;
                }
            }
        }
        let line = ollama::ndjson_line(&mode.final_record(&model, &question, &answer));
        let _ = tx.send(Ok(Bytes::from(line))).await;
    });

    ndjson_body(Body::from_stream(ReceiverStream::new(rx)))
}

async fn proxy_ollama(
    router: Arc<RequestRouter>,
    body: Value,
    stream: bool,
    mode: OllamaMode,
) -> Response {
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    if stream {
        match router.proxy().forward_stream(mode.path(), &body).await {
            Ok(upstream) => relay_ndjson(upstream, model, mode),
            Err(err) => {
                warn!("proxied stream setup failed: {}", err);
                ndjson_once(mode.error_record(&model, &err.wire_message()))
            }
        }
    } else {
        match router.proxy().forward_json(mode.path(), &body).await {
            ProxyOutcome::Ok(value) => Json(value).into_response(),
            outcome => {
                warn!("proxied request failed: {:?}", outcome);
                Json(mode.error_record(&model, "upstream generation service unavailable"))
                    .into_response()
            }
        }
    }
}

fn relay_ndjson(mut upstream: ByteStream, model: String, mode: OllamaMode) -> Response {
    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(32);
    tokio::spawn(async move {
        while let Some(item) = upstream.next().await {
            match item {
                Ok(bytes) => {
                    if tx.send(Ok(bytes)).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!("proxied stream failed mid-flight: {}", err);
                    let line = ollama::ndjson_line(&mode.error_record(&model, &err.wire_message()));
                    let _ = tx.send(Ok(Bytes::from(line))).await;
                    return;
                }
            }
        }
    });
    ndjson_body(Body::from_stream(ReceiverStream::new(rx)))
}

fn ndjson_body(body: Body) -> Response {
    ([(header::CONTENT_TYPE, NDJSON)], body).into_response()
}

fn ndjson_once(record: Value) -> Response {
    ndjson_body(Body::from(ollama::ndjson_line(&record)))
}

// ================================
// Chat-completions endpoint (full and simplified shapes)
// ================================

pub async fn chat_completions(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let router = match state.router() {
        Ok(router) => router,
        Err(err) => return err.into_response(),
    };

    let req: ChatCompletionsRequest = match serde_json::from_value(body) {
        Ok(req) => req,
        Err(err) => {
            return GatewayError::BadRequest(format!("invalid request body: {}", err))
                .into_response()
        }
    };
    let req = match simple::normalize(req) {
        Ok(req) => req,
        Err(err) => return err.into_response(),
    };
    // The upstream only speaks the full shape, so proxied bodies are
    // serialized from the normalized request, not the raw inbound JSON.
    let forward_body = match serde_json::to_value(&req) {
        Ok(value) => value,
        Err(err) => return GatewayError::from(err).into_response(),
    };
    let canonical = match openai::canonicalize(req, &state.config.rag_model_name) {
        Ok(canonical) => canonical,
        Err(err) => return err.into_response(),
    };

    match router.classify(&canonical.model) {
        RoutingClass::Proxied => proxy_completions(router, forward_body, canonical.stream).await,
        RoutingClass::Augmented => {
            let question = match canonical.question() {
                Ok(question) => question.to_owned(),
                Err(err) => return err.into_response(),
            };
            if canonical.stream {
                augmented_sse(router, canonical.model, question).await
            } else {
                match router.augmented_answer(&question).await {
                    Ok(answer) => Json(openai::completion_response(
                        &canonical.model,
                        &question,
                        &answer,
                    ))
                    .into_response(),
                    Err(err) => {
                        error!("augmented generation failed: {}", err);
                        Json(completions_error(&err.wire_message())).into_response()
                    }
                }
            }
        }
    }
}

async fn augmented_sse(router: Arc<RequestRouter>, model: String, question: String) -> Response {
    let stream = match router.augmented_stream(&question).await {
        Ok(stream) => stream,
        Err(err) => {
            error!("augmented stream setup failed: {}", err);
            return sse_error(&err.wire_message());
        }
    };

    let id = openai::request_id();
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(32);
    tokio::spawn(async move {
        let mut stream = stream;
        if let Ok(event) = openai::role_event(&id, &model) {
            if tx.send(Ok(event)).await.is_err() {
                return;
            }
        }
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => match openai::content_event(&id, &model, &fragment) {
                    Ok(event) => {
                        if tx.send(Ok(event)).await.is_err() {
                            info!("client disconnected mid-stream");
                            return;
                        }
                    }
                    Err(err) => {
                        error!("chunk serialization failed: {}", err);
                        break;
                    }
                },
                Err(err) => {
                    warn!("augmented stream failed mid-flight: {}", err);
                    if let Ok(event) = openai::error_event(&err.wire_message()) {
                        let _ = tx.send(Ok(event)).await;
                    }
                    let _ = tx.send(Ok(openai::done_event())).await;
                    return;
                }
            }
        }
        if let Ok(event) = openai::final_event(&id, &model) {
            let _ = tx.send(Ok(event)).await;
        }
        let _ = tx.send(Ok(openai::done_event())).await;
    });

    Sse::new(ReceiverStream::new(rx)).into_response()
}

async fn proxy_completions(router: Arc<RequestRouter>, body: Value, stream: bool) -> Response {
    let path = "/v1/chat/completions";
    if stream {
        match router.proxy().forward_stream(path, &body).await {
            Ok(upstream) => relay_sse(upstream),
            Err(err) => {
                warn!("proxied stream setup failed: {}", err);
                sse_error(&err.wire_message())
            }
        }
    } else {
        match router.proxy().forward_json(path, &body).await {
            ProxyOutcome::Ok(value) => Json(value).into_response(),
            outcome => {
                warn!("proxied request failed: {:?}", outcome);
                Json(completions_error("upstream generation service unavailable")).into_response()
            }
        }
    }
}

fn relay_sse(mut upstream: ByteStream) -> Response {
    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(32);
    tokio::spawn(async move {
        while let Some(item) = upstream.next().await {
            match item {
                Ok(bytes) => {
                    if tx.send(Ok(bytes)).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!("proxied stream failed mid-flight: {}", err);
                    let envelope = completions_error(&err.wire_message());
                    let _ = tx
                        .send(Ok(Bytes::from(format!("data: {}\n\n", envelope))))
                        .await;
                    let _ = tx.send(Ok(Bytes::from("data: [DONE]\n\n"))).await;
                    return;
                }
            }
        }
    });
    (
        [(header::CONTENT_TYPE, EVENT_STREAM)],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}

fn sse_error(message: &str) -> Response {
    let error = openai::error_event(message).unwrap_or_else(|_| Event::default().data("{}"));
    let events = vec![Ok::<_, Infallible>(error), Ok(openai::done_event())];
    Sse::new(futures_util::stream::iter(events)).into_response()
}

fn completions_error(message: &str) -> Value {
    json!({
        "error": {
            "message": message,
            "type": "internal_server_error",
            "code": "rag_error",
        }
    })
}

// ================================
// Model catalog and service endpoints
// ================================

pub async fn root() -> &'static str {
    "Ollama is running"
}

pub async fn version() -> Json<Value> {
    Json(json!({ "version": "0.1.16" }))
}

pub async fn tags(State(state): State<AppState>) -> Response {
    match state.router() {
        Ok(router) => Json(router.registry().tags_json()).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn ps(State(state): State<AppState>) -> Response {
    match state.router() {
        Ok(router) => Json(router.registry().ps_json()).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ShowParams {
    pub name: Option<String>,
}

pub async fn show(State(state): State<AppState>, Query(params): Query<ShowParams>) -> Response {
    match state.router() {
        Ok(router) => Json(router.registry().show_json(params.name.as_deref())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let router_ready = state.router_ready();
    let upstream_reachable = match state.router() {
        Ok(router) => router.proxy().check_reachable().await,
        Err(_) => false,
    };
    // Status reflects gateway initialization only; upstream reachability is
    // reported alongside it, never gating.
    let status = if router_ready { "healthy" } else { "degraded" };
    Json(json!({
        "status": status,
        "router_ready": router_ready,
        "upstream_reachable": upstream_reachable,
        "rag_model": state.config.rag_model_name,
        "upstream_model": state.config.upstream_model_name,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RetrievalProbe {
    pub question: String,
}

pub async fn test_retrieval(
    State(state): State<AppState>,
    Json(probe): Json<RetrievalProbe>,
) -> Response {
    let router = match state.router() {
        Ok(router) => router,
        Err(err) => return err.into_response(),
    };
    match router.test_retrieval(&probe.question).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => err.into_response(),
    }
}
