use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::{KEYFRAMES_DIR, STATIC_PREFIX, UPLOADS_DIR};
use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let keyframes = ServeDir::new(state.config.keyframes_dir());
    let uploads = ServeDir::new(state.config.uploads_dir());
    let max_upload = state.config.max_upload_bytes;

    Router::new()
        // Health
        .route("/health", get(crate::routes::health::health))
        // Dashboard
        .route(
            "/api/dashboard",
            get(crate::routes::dashboard::dashboard_data),
        )
        // Videos
        .route(
            "/api/videos",
            post(crate::routes::videos::upload_video).layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/api/videos/list", get(crate::routes::videos::list_videos))
        .route(
            "/api/videos/{id}",
            get(crate::routes::videos::video_detail).delete(crate::routes::videos::delete_video),
        )
        // Stored files
        .nest_service(&format!("{}/{}", STATIC_PREFIX, KEYFRAMES_DIR), keyframes)
        .nest_service(&format!("{}/{}", STATIC_PREFIX, UPLOADS_DIR), uploads)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(cors)
        .with_state(state)
}
