use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::{Result, ZimuError};
use crate::server::orchestrator::ChunkOrchestrator;
use crate::server::protocol::{CacheStatus, ChunkRequest, ChunkResponse, HealthBody, StatusQuery};

pub fn router(orchestrator: ChunkOrchestrator) -> Router {
    Router::new()
        .route("/api/chunk", get(chunk_status).post(chunk))
        .route("/health", get(health))
        .with_state(orchestrator)
}

async fn chunk(
    State(orchestrator): State<ChunkOrchestrator>,
    payload: std::result::Result<Json<ChunkRequest>, JsonRejection>,
) -> Result<Json<ChunkResponse>> {
    let Json(request) = payload.map_err(|e| ZimuError::Validation(e.body_text()))?;
    let response = orchestrator.handle(request).await?;
    Ok(Json(response))
}

async fn chunk_status(
    State(orchestrator): State<ChunkOrchestrator>,
    query: std::result::Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<CacheStatus>> {
    let Query(query) = query.map_err(|e| ZimuError::Validation(e.body_text()))?;
    let status = orchestrator.status(&query.into())?;
    Ok(Json(status))
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok".to_string(),
    })
}
