//! HTTP surface: route table, middleware stack, and shared state.

pub mod handlers;
pub mod state;

pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

/// Build the full route table over the given state. Both catalog aliases and
/// both chat-completions paths land on the same handlers.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/version", get(handlers::version))
        .route("/api/tags", get(handlers::tags))
        .route("/api/models", get(handlers::tags))
        .route("/api/ps", get(handlers::ps))
        .route("/api/show", get(handlers::show))
        .route("/api/chat", post(handlers::ollama_chat))
        .route("/api/generate", post(handlers::ollama_generate))
        .route("/api/chat/completions", post(handlers::chat_completions))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/debug/test-retrieval", post(handlers::test_retrieval))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .with_state(state)
}
