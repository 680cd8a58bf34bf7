//! Upload page: file selection, drop handling, validation and submission.

use std::path::PathBuf;
use tracing::{info, warn};

use super::api::{ApiClient, ClientError};
use super::ui::{Interaction, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("Please choose a video file to upload.")]
    MissingFile,
    #[error("Please enter a farm ID.")]
    BlankFarmId,
}

/// A form that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidUpload {
    pub file: PathBuf,
    pub farm_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    files: Vec<PathBuf>,
    pub farm_id: String,
    submitting: bool,
}

impl UploadForm {
    pub fn new(farm_id: impl Into<String>) -> Self {
        Self {
            farm_id: farm_id.into(),
            ..Default::default()
        }
    }

    /// Replace the selection, as a file dialog would. The first file is the
    /// one submitted.
    pub fn choose_files(&mut self, files: Vec<PathBuf>) {
        self.files = files;
    }

    pub fn file(&self) -> Option<&PathBuf> {
        self.files.first()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn validate(&self) -> Result<ValidUpload, UploadRejection> {
        let file = self.file().ok_or(UploadRejection::MissingFile)?;
        let farm_id = self.farm_id.trim();
        if farm_id.is_empty() {
            return Err(UploadRejection::BlankFarmId);
        }
        Ok(ValidUpload {
            file: file.clone(),
            farm_id: farm_id.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropEvent {
    Enter,
    Over,
    Leave,
    Drop(Vec<PathBuf>),
}

#[derive(Debug, Default)]
pub struct DropZone {
    highlighted: bool,
}

impl DropZone {
    pub fn is_highlighted(&self) -> bool {
        self.highlighted
    }

    /// A drop with files assigns them to the form; an empty drop only clears
    /// the highlight.
    pub fn handle(&mut self, event: DropEvent, form: &mut UploadForm) {
        match event {
            DropEvent::Enter | DropEvent::Over => self.highlighted = true,
            DropEvent::Leave => self.highlighted = false,
            DropEvent::Drop(files) => {
                self.highlighted = false;
                if !files.is_empty() {
                    form.choose_files(files);
                }
            }
        }
    }
}

/// Split a line of dropped or pasted paths. Terminals paste dragged files as
/// quoted or backslash-escaped paths, sometimes as `file://` URLs.
pub fn parse_dropped_paths(line: &str) -> Vec<PathBuf> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_token = true;
            }
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }

    tokens
        .into_iter()
        .filter(|t| !t.is_empty())
        .map(|t| {
            if t.starts_with("file://") {
                if let Ok(path) = url::Url::parse(&t).and_then(|u| {
                    u.to_file_path()
                        .map_err(|_| url::ParseError::RelativeUrlWithoutBase)
                }) {
                    return path;
                }
            }
            PathBuf::from(t)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Local validation failed; nothing was sent.
    Rejected(UploadRejection),
    /// A submission is already in flight.
    Ignored,
    Failed(String),
    Uploaded(String),
}

impl SubmitOutcome {
    pub fn next_page(&self) -> Option<Page> {
        match self {
            SubmitOutcome::Uploaded(id) => Some(Page::Analysis(id.clone())),
            _ => None,
        }
    }
}

fn failure_message(err: &ClientError) -> String {
    match err {
        ClientError::Status { status, message } => match message {
            Some(m) => format!("Upload failed (HTTP {}): {}", status, m),
            None => format!("Upload failed (HTTP {}).", status),
        },
        ClientError::Transport(_) => {
            "Upload failed: could not reach the server. Please try again.".to_string()
        }
        ClientError::Decode(_) => {
            "Upload failed: the server did not return a video id.".to_string()
        }
        ClientError::Io(e) => format!("Upload failed: could not read the file ({}).", e),
        ClientError::InvalidUrl(e) => format!("Upload failed: {}.", e),
    }
}

/// Validate and send the form. Every failure ends in an alert and leaves the
/// form ready to submit again.
pub async fn submit(
    form: &mut UploadForm,
    api: &ApiClient,
    ui: &mut dyn Interaction,
) -> SubmitOutcome {
    if form.submitting {
        return SubmitOutcome::Ignored;
    }
    let upload = match form.validate() {
        Ok(upload) => upload,
        Err(rejection) => {
            ui.alert(&rejection.to_string());
            return SubmitOutcome::Rejected(rejection);
        }
    };

    form.submitting = true;
    let result = api.upload(&upload.file, &upload.farm_id).await;
    form.submitting = false;

    match result {
        Ok(resp) => {
            info!(
                "Uploaded {:?} for farm {} as {}",
                upload.file, upload.farm_id, resp.video_id
            );
            SubmitOutcome::Uploaded(resp.video_id)
        }
        Err(e) => {
            warn!("Upload of {:?} failed: {}", upload.file, e);
            let message = failure_message(&e);
            ui.alert(&message);
            SubmitOutcome::Failed(message)
        }
    }
}
