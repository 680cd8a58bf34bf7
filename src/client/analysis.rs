//! Analysis detail page: one video's record, status and keyframe carousel.

use chrono::Local;
use tracing::{info, warn};

use super::api::{ApiClient, ClientError};
use super::ui::{History, Interaction, Page, Region, Screen};
use crate::config::PLACEHOLDER;
use crate::model::{CreatedAt, Keyframe, KeyframeStatus, Verdict, VideoRecord, VideoStatus};

pub const NO_KEYFRAMES_DONE: &str = "No keyframes were extracted from this video.";
pub const NO_KEYFRAMES_PENDING: &str = "Analysis is still running; keyframes will appear here.";
pub const DELETE_FAILED: &str = "Failed to delete the video.";
pub const DELETED: &str = "Video deleted.";

/// Colour class of a status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Normal,
    Abnormal,
    Complete,
    Queued,
    Analyzing,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPresentation {
    pub tone: Tone,
    pub label: String,
    pub description: String,
}

/// Map status and verdict to a badge. First matching row wins.
pub fn present_status(
    status: Option<&VideoStatus>,
    verdict: Option<Verdict>,
    analysis_error: Option<&str>,
) -> StatusPresentation {
    let (tone, label, description) = match (status, verdict) {
        (Some(VideoStatus::Done), Some(Verdict::Normal)) => (
            Tone::Normal,
            "normal".to_string(),
            "Analysis complete, no abnormality detected.".to_string(),
        ),
        (Some(VideoStatus::Done), Some(Verdict::Abnormal)) => (
            Tone::Abnormal,
            "abnormal".to_string(),
            "Analysis complete, abnormal larvae detected.".to_string(),
        ),
        (Some(VideoStatus::Done), None) => (
            Tone::Complete,
            "complete".to_string(),
            "Analysis complete, no verdict available.".to_string(),
        ),
        (Some(VideoStatus::Uploaded), _) => (
            Tone::Queued,
            "queued".to_string(),
            "Waiting for analysis.".to_string(),
        ),
        (Some(VideoStatus::Processing), _) => (
            Tone::Analyzing,
            "analyzing".to_string(),
            "Analysis in progress.".to_string(),
        ),
        (Some(other), _) => (
            Tone::Unknown,
            other.as_str().to_string(),
            format!("Status: {}", other),
        ),
        (None, _) => (
            Tone::Unknown,
            "unknown".to_string(),
            "Status unknown.".to_string(),
        ),
    };

    let description = match analysis_error.map(str::trim).filter(|e| !e.is_empty()) {
        Some(err) => format!("{} ({})", description, err),
        None => description,
    };
    StatusPresentation {
        tone,
        label,
        description,
    }
}

/// Three-way per-keyframe badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyframeBadge {
    Abnormal,
    Normal,
    Unknown,
}

impl KeyframeBadge {
    pub fn label(&self) -> &'static str {
        match self {
            KeyframeBadge::Abnormal => "abnormal",
            KeyframeBadge::Normal => "normal",
            KeyframeBadge::Unknown => "unknown",
        }
    }
}

pub fn keyframe_badge(status: Option<&KeyframeStatus>) -> KeyframeBadge {
    match status {
        Some(KeyframeStatus::Abnormal) => KeyframeBadge::Abnormal,
        Some(KeyframeStatus::Normal) => KeyframeBadge::Normal,
        _ => KeyframeBadge::Unknown,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn display_filename(original_filename: Option<&str>, filename: Option<&str>) -> String {
    non_blank(original_filename)
        .or_else(|| non_blank(filename))
        .unwrap_or(PLACEHOLDER)
        .to_string()
}

/// Local-time `YYYY-MM-DD HH:MM:SS`, or the placeholder.
pub fn format_created_at(created_at: Option<&CreatedAt>) -> String {
    created_at
        .and_then(CreatedAt::parse)
        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

pub fn format_duration(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) if s.is_finite() && s >= 0.0 => {
            if s.fract() == 0.0 {
                format!("{} s", s as u64)
            } else {
                format!("{:.1} s", s)
            }
        }
        _ => PLACEHOLDER.to_string(),
    }
}

/// Zero-based position over `len` items that never leaves `[0, len - 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedCursor {
    index: usize,
    len: usize,
}

impl BoundedCursor {
    /// `None` for an empty sequence.
    pub fn new(len: usize) -> Option<Self> {
        (len > 0).then_some(Self { index: 0, len })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn prev_enabled(&self) -> bool {
        self.index > 0
    }

    pub fn next_enabled(&self) -> bool {
        self.index + 1 < self.len
    }

    /// Returns whether the cursor moved.
    pub fn prev(&mut self) -> bool {
        if self.prev_enabled() {
            self.index -= 1;
            true
        } else {
            false
        }
    }

    pub fn next(&mut self) -> bool {
        if self.next_enabled() {
            self.index += 1;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone)]
pub enum Carousel {
    Empty { message: &'static str },
    Frames {
        keyframes: Vec<Keyframe>,
        cursor: BoundedCursor,
    },
}

impl Carousel {
    pub fn new(keyframes: Vec<Keyframe>, status: Option<&VideoStatus>) -> Self {
        match BoundedCursor::new(keyframes.len()) {
            Some(cursor) => Carousel::Frames { keyframes, cursor },
            None => Carousel::Empty {
                message: if status == Some(&VideoStatus::Done) {
                    NO_KEYFRAMES_DONE
                } else {
                    NO_KEYFRAMES_PENDING
                },
            },
        }
    }

    pub fn cursor(&self) -> Option<&BoundedCursor> {
        match self {
            Carousel::Frames { cursor, .. } => Some(cursor),
            Carousel::Empty { .. } => None,
        }
    }

    pub fn prev(&mut self) -> bool {
        match self {
            Carousel::Frames { cursor, .. } => cursor.prev(),
            Carousel::Empty { .. } => false,
        }
    }

    pub fn next(&mut self) -> bool {
        match self {
            Carousel::Frames { cursor, .. } => cursor.next(),
            Carousel::Empty { .. } => false,
        }
    }

    /// Current keyframe; `resolve` turns relative image URLs into absolute ones.
    pub fn render_frame(&self, resolve: impl Fn(&str) -> String) -> String {
        match self {
            Carousel::Empty { message } => message.to_string(),
            Carousel::Frames { keyframes, cursor } => {
                let kf = &keyframes[cursor.index()];
                let time = kf
                    .time
                    .map(|t| format!("{:.1} s", t))
                    .unwrap_or_else(|| PLACEHOLDER.to_string());
                let mut out = format!(
                    "{}/{}  t={}  [{}]",
                    cursor.index() + 1,
                    cursor.len(),
                    time,
                    keyframe_badge(kf.status.as_ref()).label()
                );
                if !kf.detections.is_empty() {
                    out.push_str(&format!("  {} detection(s)", kf.detections.len()));
                }
                if let Some(url) = non_blank(kf.frame_image_url.as_deref()) {
                    out.push('\n');
                    out.push_str(&resolve(url));
                }
                out
            }
        }
    }

    pub fn render_controls(&self) -> String {
        match self.cursor() {
            None => PLACEHOLDER.to_string(),
            Some(cursor) => format!(
                "{} | {}",
                if cursor.prev_enabled() { "[p] previous" } else { "(previous)" },
                if cursor.next_enabled() { "[n] next" } else { "(next)" }
            ),
        }
    }
}

/// What the user did on the detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailOutcome {
    Stay,
    Navigate(Page),
}

pub struct AnalysisPage {
    video_id: String,
    record: Option<VideoRecord>,
    carousel: Option<Carousel>,
}

impl AnalysisPage {
    /// Absent or blank ids stop here; nothing is requested.
    pub fn resolve(video_id: Option<&str>) -> Option<Self> {
        match video_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Some(Self {
                video_id: id.to_string(),
                record: None,
                carousel: None,
            }),
            None => {
                warn!("No video id given; not loading analysis details");
                None
            }
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn carousel_mut(&mut self) -> Option<&mut Carousel> {
        self.carousel.as_mut()
    }

    pub fn layout() -> Screen {
        Screen::with_regions(&[
            Region::Title,
            Region::Identifiers,
            Region::CreatedAt,
            Region::Duration,
            Region::StatusBadge,
            Region::StatusText,
            Region::Keyframe,
            Region::CarouselControls,
        ])
    }

    pub async fn load(&mut self, api: &ApiClient) -> Result<(), ClientError> {
        match api.video(&self.video_id).await {
            Ok(record) => {
                self.apply(record);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load video {}: {}", self.video_id, e);
                Err(e)
            }
        }
    }

    pub fn apply(&mut self, record: VideoRecord) {
        self.carousel = Some(Carousel::new(record.keyframes.clone(), record.status.as_ref()));
        self.record = Some(record);
    }

    /// Fill whichever regions `screen` has. A missing region only skips its own update.
    pub fn render_into(&self, screen: &mut Screen, api: &ApiClient) {
        let Some(record) = &self.record else {
            return;
        };

        screen.set(
            Region::Title,
            display_filename(
                record.original_filename.as_deref(),
                record.filename.as_deref(),
            ),
        );
        if screen.has(Region::Identifiers) {
            let id = non_blank(record.video_id.as_deref()).unwrap_or(&self.video_id);
            let farm = non_blank(record.farm_id.as_deref()).unwrap_or(PLACEHOLDER);
            screen.set(Region::Identifiers, format!("video {}  farm {}", id, farm));
        }
        screen.set(
            Region::CreatedAt,
            format_created_at(record.created_at.as_ref()),
        );
        screen.set(Region::Duration, format_duration(record.duration));

        let status = present_status(
            record.status.as_ref(),
            record.verdict,
            record.analysis_error.as_deref(),
        );
        screen.set(Region::StatusBadge, status.label);
        screen.set(Region::StatusText, status.description);

        if let Some(carousel) = &self.carousel {
            screen.set(Region::Keyframe, carousel.render_frame(|u| api.resolve(u)));
            screen.set(Region::CarouselControls, carousel.render_controls());
        }
    }

    pub fn render(&self, api: &ApiClient) -> Screen {
        let mut screen = Self::layout();
        self.render_into(&mut screen, api);
        screen
    }

    /// Confirm, then delete. Cancelling sends nothing.
    pub async fn delete(&self, api: &ApiClient, ui: &mut dyn Interaction) -> DetailOutcome {
        let question = format!("Delete video {}? This cannot be undone.", self.video_id);
        if !ui.confirm(&question).await {
            return DetailOutcome::Stay;
        }
        match api.delete_video(&self.video_id).await {
            Ok(()) => {
                info!("Deleted video {}", self.video_id);
                ui.alert(DELETED);
                DetailOutcome::Navigate(Page::Dashboard)
            }
            Err(e) => {
                warn!("Delete of {} failed: {}", self.video_id, e);
                ui.alert(e.server_message().unwrap_or(DELETE_FAILED));
                DetailOutcome::Stay
            }
        }
    }
}

/// Back: previous page if there is one, else the dashboard.
pub fn go_back(history: &mut History) -> Page {
    history.back()
}
