use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{DEFAULT_VIDEO_EXTENSION, KEYFRAMES_DIR, STATIC_PREFIX};
use crate::model::Keyframe;

/// Name an upload is stored under: the video id plus the original extension.
pub fn stored_filename(video_id: &str, original_filename: &str) -> String {
    let ext = Path::new(original_filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));
    match ext {
        Some(ext) => format!("{}.{}", video_id, ext),
        None => format!("{}{}", video_id, DEFAULT_VIDEO_EXTENSION),
    }
}

/// Map a `/static/keyframes/<name>` URL back to the file inside `keyframe_dir`.
pub fn keyframe_file(keyframe_dir: &Path, url: &str) -> Option<PathBuf> {
    let prefix = format!("{}/{}/", STATIC_PREFIX, KEYFRAMES_DIR);
    let name = url.strip_prefix(&prefix)?;
    let name = Path::new(name);
    // Only plain file names; never follow separators out of the directory.
    if name.components().count() != 1 || name.file_name().is_none() {
        return None;
    }
    Some(keyframe_dir.join(name))
}

/// Best-effort removal of an upload and its keyframe images. Missing files and
/// IO errors are logged and otherwise ignored.
pub async fn remove_video_files(upload: &Path, keyframes: &[Keyframe], keyframe_dir: &Path) {
    remove_quietly(upload).await;
    for keyframe in keyframes {
        if let Some(path) = keyframe
            .frame_image_url
            .as_deref()
            .and_then(|url| keyframe_file(keyframe_dir, url))
        {
            remove_quietly(&path).await;
        }
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", path, e),
    }
}
