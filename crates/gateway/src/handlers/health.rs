//! Health check handlers

use crate::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: ReadyChecks,
}

#[derive(Serialize)]
pub struct ReadyChecks {
    pub corpus: CorpusCheck,
}

#[derive(Serialize)]
pub struct CorpusCheck {
    pub status: String,
    pub chunks: usize,
    pub documents: usize,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.observability.service_name.clone(),
        version: inocua_common::VERSION.to_string(),
    })
}

/// Readiness probe - reports what the corpus holds.
///
/// Triggers the corpus load if nothing has requested it yet (`eager_load =
/// false`) and waits for it. An empty store still counts as ready: the engine
/// answers from lexical cues and general guidance without retrieved context.
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let shared = state.arbitrator.corpus();
    if shared.loaded().is_none() {
        tracing::info!("Readiness check is loading the corpus");
    }
    let corpus = shared.get().await;

    Json(ReadyResponse {
        status: "ready".to_string(),
        checks: ReadyChecks {
            corpus: CorpusCheck {
                status: if corpus.store.is_empty() { "empty" } else { "up" }.to_string(),
                chunks: corpus.store.len(),
                documents: corpus.catalog.len(),
            },
        },
    })
}
