use axum::extract::{Multipart, Path, State};
use axum::Json;
use chrono::Utc;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::VIDEO_LIST_LIMIT;
use crate::db::NewVideo;
use crate::error::ServerError;
use crate::model::{UploadResponse, VideoListResponse, VideoRecord};
use crate::state::SharedState;
use crate::storage;

/// Upload written to disk while the multipart body is read, removed again
/// unless the request completes.
struct PendingUpload {
    path: PathBuf,
    original_filename: String,
    filename: String,
    committed: bool,
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to discard partial upload {:?}: {}", self.path, e);
                }
            }
        }
    }
}

/// POST /api/videos
///
/// Multipart form with a `video` file part and a `farm_id` text part. The file
/// is stored under a generated name, the record starts out `uploaded`, and the
/// video is queued for analysis.
pub async fn upload_video(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let video_id = uuid::Uuid::new_v4().to_string();
    let mut upload: Option<PendingUpload> = None;
    let mut saw_video_field = false;
    let mut farm_id: Option<String> = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "video" if !saw_video_field => {
                saw_video_field = true;
                let original_filename = field.file_name().unwrap_or("").trim().to_string();
                if original_filename.is_empty() {
                    continue;
                }

                let filename = storage::stored_filename(&video_id, &original_filename);
                let upload_dir = state.config.uploads_dir();
                tokio::fs::create_dir_all(&upload_dir).await?;
                let path = upload_dir.join(&filename);

                let pending = PendingUpload {
                    path: path.clone(),
                    original_filename,
                    filename,
                    committed: false,
                };
                let mut file = tokio::fs::File::create(&path).await?;
                while let Some(chunk) = field.chunk().await? {
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                upload = Some(pending);
            }
            "farm_id" => {
                farm_id = Some(field.text().await?);
            }
            _ => {} // ignore unknown fields
        }
    }

    if !saw_video_field {
        return Err(ServerError::BadRequest(
            "no file field 'video' in form".to_string(),
        ));
    }
    let Some(mut pending) = upload else {
        return Err(ServerError::BadRequest("empty filename".to_string()));
    };
    let farm_id = farm_id
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ServerError::BadRequest("farm_id is required".to_string()))?;

    let video = NewVideo {
        id: video_id.clone(),
        farm_id,
        filename: pending.filename.clone(),
        original_filename: pending.original_filename.clone(),
        path: pending.path.clone(),
        created_at: Utc::now(),
    };
    state.db.insert_video(&video)?;
    pending.committed = true;

    info!(
        "Stored upload {} ({}) for farm {} at {:?}",
        video.id, video.original_filename, video.farm_id, video.path
    );

    state.queue.submit(&video.id);

    Ok(Json(UploadResponse { video_id }))
}

/// GET /api/videos/list
pub async fn list_videos(
    State(state): State<SharedState>,
) -> Result<Json<VideoListResponse>, ServerError> {
    let items = state.db.list_videos(VIDEO_LIST_LIMIT)?;
    Ok(Json(VideoListResponse { items }))
}

/// GET /api/videos/{id}
pub async fn video_detail(
    State(state): State<SharedState>,
    Path(video_id): Path<String>,
) -> Result<Json<VideoRecord>, ServerError> {
    let stored = state
        .db
        .get_video(&video_id)?
        .ok_or(ServerError::NotFound)?;
    Ok(Json(stored.record))
}

/// DELETE /api/videos/{id}
///
/// Removes the stored upload and its keyframe images (best effort), then the
/// record itself.
pub async fn delete_video(
    State(state): State<SharedState>,
    Path(video_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let stored = state
        .db
        .get_video(&video_id)?
        .ok_or(ServerError::NotFound)?;

    storage::remove_video_files(
        &stored.path,
        &stored.record.keyframes,
        &state.config.keyframes_dir(),
    )
    .await;
    state.db.delete_video(&video_id)?;

    info!("Deleted video {}", video_id);
    Ok(Json(serde_json::json!({ "ok": true })))
}
