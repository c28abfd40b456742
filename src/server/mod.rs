pub mod cache;
pub mod orchestrator;
pub mod protocol;
pub mod routes;

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::ZimuConfig;
use crate::error::{Result, ZimuError};
use crate::llm::{build_model, RetryPolicy, Transcriber};

pub use cache::SegmentCache;
pub use orchestrator::ChunkOrchestrator;
pub use protocol::ChunkRequest;

/// Wires the configured model, an in-memory segment cache and the
/// orchestrator together.
pub fn build_orchestrator(config: &ZimuConfig) -> Result<ChunkOrchestrator> {
    let model = build_model(&config.model)?;
    let transcriber = Transcriber::new(model, RetryPolicy::from(&config.model));
    Ok(ChunkOrchestrator::new(
        Arc::new(SegmentCache::in_memory()),
        transcriber,
    ))
}

pub async fn run_server(config: &ZimuConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let app = routes::router(orchestrator);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ZimuError::Server(e.to_string()))?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
