//! Dashboard page: aggregate statistics, analysis progress and the video list.

use tracing::warn;

use super::analysis::{display_filename, format_created_at, present_status};
use super::api::ApiClient;
use super::ui::{Page, Region, Screen};
use crate::config::{PLACEHOLDER, PROGRESS_BAR_WIDTH};
use crate::model::{DashboardStats, VideoListItem};

pub const EMPTY_LIST: &str = "No videos uploaded yet.";

/// Share of analysed videos, 0..=100. Values of 99 and up show as 100 so the
/// indicator closes.
pub fn progress_percent(stats: &DashboardStats) -> u8 {
    if stats.total == 0 {
        return 0;
    }
    let pct = (100.0 * stats.done as f64 / stats.total as f64).round();
    let pct = pct.clamp(0.0, 100.0) as u8;
    if pct >= 99 {
        100
    } else {
        pct
    }
}

pub fn progress_bar(percent: u8) -> String {
    let percent = percent.min(100) as usize;
    let filled = percent * PROGRESS_BAR_WIDTH / 100;
    format!(
        "[{}{}] {}%",
        "#".repeat(filled),
        ".".repeat(PROGRESS_BAR_WIDTH - filled),
        percent
    )
}

pub fn render_stats(stats: &DashboardStats) -> String {
    format!(
        "total {}  analysed {}  normal {}  abnormal {}",
        stats.total, stats.done, stats.normal, stats.abnormal
    )
}

pub fn display_name(item: &VideoListItem) -> String {
    display_filename(item.original_filename.as_deref(), item.filename.as_deref())
}

/// Page an item opens, if it has an id.
pub fn navigate_target(item: &VideoListItem) -> Option<Page> {
    item.video_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| Page::Analysis(id.to_string()))
}

pub fn render_item(number: usize, item: &VideoListItem) -> String {
    let status = present_status(item.status.as_ref(), item.verdict, None);
    let marker = if navigate_target(item).is_some() {
        format!("{:>3}.", number)
    } else {
        "   -".to_string()
    };
    format!(
        "{} {}  farm {}  {}  [{}]",
        marker,
        display_name(item),
        item.farm_id
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(PLACEHOLDER),
        format_created_at(item.created_at.as_ref()),
        status.label
    )
}

pub fn render_list(items: &[VideoListItem]) -> String {
    if items.is_empty() {
        return EMPTY_LIST.to_string();
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| render_item(i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Default)]
pub struct DashboardPage {
    stats: Option<DashboardStats>,
    items: Vec<VideoListItem>,
    screen: Screen,
}

impl DashboardPage {
    pub fn layout() -> Screen {
        Screen::with_regions(&[Region::Stats, Region::Progress, Region::VideoList])
    }

    /// Both requests run concurrently; either failing only affects its own
    /// region.
    pub async fn load(api: &ApiClient) -> Self {
        let (dashboard, list) = tokio::join!(api.dashboard(), api.list_videos());
        let mut page = DashboardPage {
            screen: Self::layout(),
            ..Default::default()
        };

        match dashboard {
            Ok(resp) => {
                page.screen.set(Region::Stats, render_stats(&resp.stats));
                page.screen
                    .set(Region::Progress, progress_bar(progress_percent(&resp.stats)));
                page.stats = Some(resp.stats);
            }
            Err(e) => {
                warn!("Failed to load dashboard statistics: {}", e);
                page.screen
                    .set(Region::Stats, format!("Could not load statistics: {}", e));
            }
        }

        match list {
            Ok(resp) => {
                page.screen.set(Region::VideoList, render_list(&resp.items));
                page.items = resp.items;
            }
            Err(e) => {
                warn!("Failed to load video list: {}", e);
                page.screen
                    .set(Region::VideoList, format!("Could not load videos: {}", e));
            }
        }

        page
    }

    pub fn stats(&self) -> Option<&DashboardStats> {
        self.stats.as_ref()
    }

    pub fn items(&self) -> &[VideoListItem] {
        &self.items
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// Page behind the 1-based row `number`.
    pub fn open(&self, number: usize) -> Option<Page> {
        number
            .checked_sub(1)
            .and_then(|i| self.items.get(i))
            .and_then(navigate_target)
    }
}
