//! Typed HTTP client for the video API.

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use url::Url;

use crate::config::CLIENT_CONNECT_TIMEOUT_SECS;
use crate::model::{DashboardResponse, ErrorBody, UploadResponse, VideoListResponse, VideoRecord};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server responded with HTTP {status}{}", .message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
    Status { status: u16, message: Option<String> },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The server-provided `error` message of a non-2xx response.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ClientError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CLIENT_CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve a possibly relative URL from a response against the server.
    /// Unresolvable values are returned unchanged.
    pub fn resolve(&self, url: &str) -> String {
        match self.base.join(url) {
            Ok(u) => u.to_string(),
            Err(_) => url.to_string(),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Decode(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn dashboard(&self) -> Result<DashboardResponse, ClientError> {
        let url = self.endpoint(&["api", "dashboard"])?;
        read_json(self.http.get(url).send().await?).await
    }

    pub async fn list_videos(&self) -> Result<VideoListResponse, ClientError> {
        let url = self.endpoint(&["api", "videos", "list"])?;
        read_json(self.http.get(url).send().await?).await
    }

    pub async fn video(&self, video_id: &str) -> Result<VideoRecord, ClientError> {
        let url = self.endpoint(&["api", "videos", video_id])?;
        read_json(self.http.get(url).send().await?).await
    }

    /// Multipart upload with a `video` file part and a `farm_id` text part.
    /// The file is streamed from disk, never held in memory whole.
    pub async fn upload(&self, file: &Path, farm_id: &str) -> Result<UploadResponse, ClientError> {
        let url = self.endpoint(&["api", "videos"])?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = mime_guess::from_path(file).first_or_octet_stream();
        let handle = tokio::fs::File::open(file).await?;
        let length = handle.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(handle));

        let part = Part::stream_with_length(body, length)
            .file_name(file_name)
            .mime_str(mime.essence_str())?;
        let form = Form::new()
            .part("video", part)
            .text("farm_id", farm_id.to_string());

        let resp = self.http.post(url).multipart(form).send().await?;
        let body: serde_json::Value = read_json(resp).await?;
        match body.get("video_id").and_then(|v| v.as_str()) {
            Some(id) if !id.trim().is_empty() => Ok(UploadResponse {
                video_id: id.to_string(),
            }),
            _ => Err(ClientError::Decode(
                "upload response has no video_id".to_string(),
            )),
        }
    }

    pub async fn delete_video(&self, video_id: &str) -> Result<(), ClientError> {
        let url = self.endpoint(&["api", "videos", video_id])?;
        let resp = self.http.delete(url).send().await?;
        check_status(resp).await.map(|_| ())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp
        .text()
        .await
        .ok()
        .and_then(|text| serde_json::from_str::<ErrorBody>(&text).ok())
        .and_then(|body| body.error)
        .filter(|m| !m.trim().is_empty());
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let text = check_status(resp).await?.text().await?;
    serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
}
