//! Request routing between the augmented pipeline and the upstream proxy.
//!
//! Classification happens once per request, on the model name alone. The
//! router also owns the end-to-end deadline for pipeline invocations; a
//! deadline miss renders the same as an unreachable upstream.

use crate::{
    config::Config,
    error::GatewayError,
    pipeline::{RagPipeline, Retriever, TokenStream},
    proxy::ProxyClient,
    registry::{ModelRegistry, RoutingClass},
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{info, warn};

pub struct RequestRouter {
    registry: Arc<ModelRegistry>,
    pipeline: Arc<RagPipeline>,
    proxy: Arc<ProxyClient>,
    retriever: Option<Arc<dyn Retriever>>,
    chunk_words: usize,
    chunk_delay: Duration,
    request_timeout: Duration,
}

impl RequestRouter {
    pub fn new(
        config: &Config,
        registry: Arc<ModelRegistry>,
        pipeline: Arc<RagPipeline>,
        proxy: Arc<ProxyClient>,
        retriever: Option<Arc<dyn Retriever>>,
    ) -> Self {
        Self {
            registry,
            pipeline,
            proxy,
            retriever,
            chunk_words: config.stream_chunk_words,
            chunk_delay: Duration::from_millis(config.stream_chunk_delay_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn proxy(&self) -> &ProxyClient {
        &self.proxy
    }

    pub fn classify(&self, model: &str) -> RoutingClass {
        let class = self.registry.classify(model);
        info!(
            "routing model '{}' to {}",
            model,
            match class {
                RoutingClass::Augmented => "augmented pipeline",
                RoutingClass::Proxied => "upstream proxy",
            }
        );
        class
    }

    /// Run the augmented pipeline to a complete answer, under the request
    /// deadline.
    pub async fn augmented_answer(&self, question: &str) -> Result<String, GatewayError> {
        match timeout(self.request_timeout, self.pipeline.answer(question)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "pipeline exceeded {}s deadline",
                    self.request_timeout.as_secs()
                );
                Err(GatewayError::Timeout(format!(
                    "pipeline exceeded {}s deadline",
                    self.request_timeout.as_secs()
                )))
            }
        }
    }

    /// Open an incremental answer stream from the augmented pipeline. The
    /// deadline covers stream establishment, which for single-shot pipelines
    /// includes the full answer generation.
    pub async fn augmented_stream(&self, question: &str) -> Result<TokenStream, GatewayError> {
        match timeout(
            self.request_timeout,
            self.pipeline
                .answer_stream(question, self.chunk_words, self.chunk_delay),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "pipeline stream setup exceeded {}s deadline",
                    self.request_timeout.as_secs()
                );
                Err(GatewayError::Timeout(format!(
                    "pipeline exceeded {}s deadline",
                    self.request_timeout.as_secs()
                )))
            }
        }
    }

    /// Diagnostic retrieval probe behind `/debug/test-retrieval`. Returns the
    /// documents the retriever would feed the pipeline, clipped for preview.
    pub async fn test_retrieval(&self, question: &str) -> Result<Value, GatewayError> {
        let Some(retriever) = self.retriever.clone() else {
            return Err(GatewayError::Pipeline(
                "no retriever configured".to_string(),
            ));
        };

        let question_owned = question.to_owned();
        let docs =
            tokio::task::spawn_blocking(move || retriever.search(&question_owned)).await??;

        let previews: Vec<Value> = docs.iter().map(|d| d.preview_json()).collect();
        Ok(json!({
            "question": question,
            "num_docs": docs.len(),
            "docs": previews,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{FixedAnswerEngine, RetrievedDoc};
    use futures_util::StreamExt;

    struct SlowEngine;

    impl crate::pipeline::SingleShotEngine for SlowEngine {
        fn invoke(&self, _question: &str) -> Result<String, GatewayError> {
            std::thread::sleep(Duration::from_secs(5));
            Ok("too late".to_string())
        }
    }

    struct TwoDocRetriever;

    impl Retriever for TwoDocRetriever {
        fn search(&self, _question: &str) -> Result<Vec<RetrievedDoc>, GatewayError> {
            Ok(vec![
                RetrievedDoc {
                    content: "battery lasts ten hours".to_string(),
                    score: 0.91,
                    metadata: json!({"source": "manual.md"}),
                },
                RetrievedDoc {
                    content: "x".repeat(300),
                    score: 0.42,
                    metadata: json!({"source": "faq.md"}),
                },
            ])
        }
    }

    fn router_with(
        pipeline: RagPipeline,
        retriever: Option<Arc<dyn Retriever>>,
        timeout_secs: u64,
    ) -> RequestRouter {
        let mut config = Config::for_test();
        config.request_timeout_secs = timeout_secs;
        let registry = Arc::new(ModelRegistry::from_config(&config));
        let proxy =
            Arc::new(ProxyClient::new(&config.upstream_url, Duration::from_secs(2)).unwrap());
        RequestRouter::new(&config, registry, Arc::new(pipeline), proxy, retriever)
    }

    #[tokio::test]
    async fn augmented_answer_returns_pipeline_output() {
        let router = router_with(
            RagPipeline::single_shot(Arc::new(FixedAnswerEngine::new("ten hours"))),
            None,
            120,
        );
        assert_eq!(router.augmented_answer("battery?").await.unwrap(), "ten hours");
    }

    #[tokio::test]
    async fn augmented_stream_concatenates_to_answer() {
        let router = router_with(
            RagPipeline::single_shot(Arc::new(FixedAnswerEngine::new("one two three"))),
            None,
            120,
        );
        let stream = router.augmented_stream("q").await.unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.concat(), "one two three");
    }

    #[tokio::test]
    async fn slow_pipeline_times_out() {
        let router = router_with(
            RagPipeline::single_shot(Arc::new(SlowEngine)),
            None,
            1,
        );
        assert!(matches!(
            router.augmented_answer("q").await,
            Err(GatewayError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn retrieval_probe_previews_docs() {
        let router = router_with(
            RagPipeline::single_shot(Arc::new(FixedAnswerEngine::new("a"))),
            Some(Arc::new(TwoDocRetriever)),
            120,
        );
        let result = router.test_retrieval("battery?").await.unwrap();
        assert_eq!(result["question"], "battery?");
        assert_eq!(result["num_docs"], 2);
        let docs = result["docs"].as_array().unwrap();
        assert_eq!(docs[0]["score"], 0.91);
        assert!(docs[1]["content"].as_str().unwrap().ends_with("..."));
    }

    #[tokio::test]
    async fn retrieval_probe_without_retriever_is_a_pipeline_error() {
        let router = router_with(
            RagPipeline::single_shot(Arc::new(FixedAnswerEngine::new("a"))),
            None,
            120,
        );
        assert!(matches!(
            router.test_retrieval("q").await,
            Err(GatewayError::Pipeline(_))
        ));
    }
}
