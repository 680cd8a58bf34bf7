use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub analysis: AnalysisHealth,
}

#[derive(Serialize)]
pub struct AnalysisHealth {
    pub enabled: bool,
    pub queue_depth: usize,
}

/// Overall status string: the server is `ok` when it can analyse uploads and
/// `degraded` when uploads will only be stored.
pub fn determine_overall_status(analysis_enabled: bool) -> &'static str {
    if analysis_enabled {
        "ok"
    } else {
        "degraded"
    }
}

pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let enabled = state.queue.is_enabled();
    Json(HealthResponse {
        status: determine_overall_status(enabled).to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        analysis: AnalysisHealth {
            enabled,
            queue_depth: state.queue.depth(),
        },
    })
}
