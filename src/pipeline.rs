//! Augmented generation pipeline collaborators.
//!
//! The pipeline itself (retrieval, prompting, inference) is an external
//! concern; this module defines the narrow contracts the gateway calls it
//! through and the capability tagging resolved once at startup. A pipeline is
//! either `Streaming` (produces fragments natively) or `SingleShot` (produces
//! one complete answer that the segmenter re-chunks for streaming clients).

use crate::{
    error::GatewayError,
    segmenter::{paced_stream, segment_words},
};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde_json::{json, Value};
use std::{pin::Pin, sync::Arc, time::Duration};

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, GatewayError>> + Send>>;

/// A pipeline that produces one complete answer per question.
///
/// `invoke` may block (model inference, vector search); the gateway always
/// calls it through `spawn_blocking` so the request-handling loop keeps
/// serving other clients' streams. If the caller goes away mid-invoke, the
/// worker runs to completion and its result is discarded.
pub trait SingleShotEngine: Send + Sync {
    fn invoke(&self, question: &str) -> Result<String, GatewayError>;
}

/// A pipeline that produces answer fragments incrementally.
#[async_trait]
pub trait StreamingEngine: Send + Sync {
    async fn stream(&self, question: &str) -> Result<TokenStream, GatewayError>;
}

/// Document retriever collaborator, exposed through `/debug/test-retrieval`.
pub trait Retriever: Send + Sync {
    fn search(&self, question: &str) -> Result<Vec<RetrievedDoc>, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct RetrievedDoc {
    pub content: String,
    pub score: f64,
    pub metadata: Value,
}

impl RetrievedDoc {
    /// Preview shape returned by the debug endpoint; long content is clipped.
    pub fn preview_json(&self) -> Value {
        let content = if self.content.chars().count() > 200 {
            let clipped: String = self.content.chars().take(200).collect();
            format!("{}...", clipped)
        } else {
            self.content.clone()
        };
        json!({
            "content": content,
            "metadata": self.metadata,
            "score": self.score,
        })
    }
}

/// Pipeline capability, tagged at construction rather than probed per
/// request.
#[derive(Clone)]
pub enum RagPipeline {
    SingleShot(Arc<dyn SingleShotEngine>),
    Streaming(Arc<dyn StreamingEngine>),
}

impl RagPipeline {
    pub fn single_shot(engine: Arc<dyn SingleShotEngine>) -> Self {
        Self::SingleShot(engine)
    }

    pub fn streaming(engine: Arc<dyn StreamingEngine>) -> Self {
        Self::Streaming(engine)
    }

    /// Produce the complete answer for a question.
    pub async fn answer(&self, question: &str) -> Result<String, GatewayError> {
        match self {
            Self::SingleShot(engine) => {
                let engine = Arc::clone(engine);
                let question = question.to_owned();
                tokio::task::spawn_blocking(move || engine.invoke(&question)).await?
            }
            Self::Streaming(engine) => {
                let mut stream = engine.stream(question).await?;
                let mut answer = String::new();
                while let Some(fragment) = stream.next().await {
                    answer.push_str(&fragment?);
                }
                Ok(answer)
            }
        }
    }

    /// Produce an incremental answer stream. Single-shot pipelines fall back
    /// to generating the full answer and re-segmenting it word by word.
    pub async fn answer_stream(
        &self,
        question: &str,
        chunk_words: usize,
        chunk_delay: Duration,
    ) -> Result<TokenStream, GatewayError> {
        match self {
            Self::Streaming(engine) => engine.stream(question).await,
            Self::SingleShot(_) => {
                let answer = self.answer(question).await?;
                let chunks = segment_words(&answer, chunk_words);
                Ok(Box::pin(paced_stream(chunks, chunk_delay).map(Ok)))
            }
        }
    }
}

/// Single-shot engine that answers by asking the upstream generation service
/// to complete the question. This is the default wiring when no in-process
/// pipeline is linked in; it uses a blocking HTTP client because the
/// `SingleShotEngine` contract is blocking by design.
///
/// Construct it off the async runtime (e.g. inside `spawn_blocking`).
pub struct UpstreamChatEngine {
    client: reqwest::blocking::Client,
    base: String,
    model: String,
}

impl UpstreamChatEngine {
    pub fn new(base: String, model: String, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            model,
        })
    }
}

impl SingleShotEngine for UpstreamChatEngine {
    fn invoke(&self, question: &str) -> Result<String, GatewayError> {
        let url = format!("{}/api/generate", self.base);
        let payload = json!({
            "model": self.model,
            "prompt": question,
            "stream": false,
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .map_err(|e| GatewayError::Pipeline(format!("generation request failed: {}", e)))?;

        let status = response.status();
        let body: Value = response
            .json()
            .map_err(|e| GatewayError::Pipeline(format!("invalid generation response: {}", e)))?;

        if !status.is_success() {
            return Err(GatewayError::Pipeline(format!(
                "generation service returned HTTP {}",
                status.as_u16()
            )));
        }

        Ok(body
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

/// Canned single-shot engine. Used in tests and demo wiring; counts its
/// invocations so routing tests can assert the pipeline was (not) touched.
pub struct FixedAnswerEngine {
    answer: String,
    calls: std::sync::atomic::AtomicUsize,
}

impl FixedAnswerEngine {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl SingleShotEngine for FixedAnswerEngine {
    fn invoke(&self, _question: &str) -> Result<String, GatewayError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}
