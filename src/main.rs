use rag_gateway::{
    config::Config,
    pipeline::{RagPipeline, UpstreamChatEngine},
    proxy::ProxyClient,
    registry::ModelRegistry,
    router::RequestRouter,
    server::{create_router, AppState},
};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();

    info!("Starting RAG gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("Upstream generation service: {}", config.upstream_url);
    info!(
        "Augmented model: {} | proxied model: {}",
        config.rag_model_name, config.upstream_model_name
    );

    let proxy = Arc::new(ProxyClient::new(
        &config.upstream_url,
        Duration::from_secs(config.proxy_timeout_secs),
    )?);

    // Best-effort probe; the gateway starts either way and /health reports
    // the current state.
    if proxy.check_reachable().await {
        info!("Upstream generation service is reachable");
    } else {
        warn!(
            "Upstream generation service at {} is not reachable; proxied requests will fail until it comes up",
            config.upstream_url
        );
    }

    let registry = Arc::new(ModelRegistry::from_config(&config));

    // The default pipeline answers through the upstream service with a
    // blocking client; build it off the async runtime.
    let engine = {
        let base = config.upstream_url.clone();
        let model = config.upstream_model_name.clone();
        let timeout = Duration::from_secs(config.request_timeout_secs);
        tokio::task::spawn_blocking(move || UpstreamChatEngine::new(base, model, timeout)).await??
    };
    let pipeline = Arc::new(RagPipeline::single_shot(Arc::new(engine)));

    let router = Arc::new(RequestRouter::new(
        &config,
        registry,
        pipeline,
        proxy,
        None,
    ));

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config, router);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
