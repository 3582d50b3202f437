//! Streaming gateway that fronts a retrieval-augmented generation pipeline
//! with Ollama- and OpenAI-compatible HTTP APIs.
//!
//! Requests are classified by model name: the configured RAG model name runs
//! through the in-process pipeline, everything else is forwarded verbatim to
//! the upstream generation service. Single-shot pipeline answers are
//! re-segmented word by word so streaming clients see incremental output
//! either way.

pub mod adapters;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod proxy;
pub mod registry;
pub mod router;
pub mod schemas;
pub mod segmenter;
pub mod server;

pub use config::Config;
pub use error::GatewayError;
pub use pipeline::{RagPipeline, Retriever, SingleShotEngine, StreamingEngine};
pub use proxy::ProxyClient;
pub use registry::{ModelRegistry, RoutingClass};
pub use router::RequestRouter;
pub use server::{create_router, AppState};

pub type Result<T> = std::result::Result<T, GatewayError>;
