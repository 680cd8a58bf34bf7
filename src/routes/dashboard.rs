use axum::extract::State;
use axum::Json;

use crate::config::DASHBOARD_RECENT_LIMIT;
use crate::error::ServerError;
use crate::model::DashboardResponse;
use crate::state::SharedState;

/// GET /api/dashboard
///
/// Aggregate counts over all videos plus the most recent uploads.
pub async fn dashboard_data(
    State(state): State<SharedState>,
) -> Result<Json<DashboardResponse>, ServerError> {
    let stats = state.db.dashboard_stats()?;
    let recent = state.db.list_videos(DASHBOARD_RECENT_LIMIT)?;
    Ok(Json(DashboardResponse { stats, recent }))
}
