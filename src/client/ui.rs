//! Seams between the page controllers and whoever is looking at them.

use futures::future::BoxFuture;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::config::PLACEHOLDER;

/// A navigable page of the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    Upload,
    Analysis(String),
}

/// Pages visited before the current one.
#[derive(Debug, Default)]
pub struct History {
    stack: Vec<Page>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Leave `current` for another page, remembering it for `back`.
    pub fn push(&mut self, current: Page) {
        self.stack.push(current);
    }

    /// The previous page, or the dashboard when there is no history.
    pub fn back(&mut self) -> Page {
        self.stack.pop().unwrap_or(Page::Dashboard)
    }
}

/// User-facing side effects a controller may trigger.
pub trait Interaction: Send {
    /// Blocking notice, like a browser `alert`.
    fn alert(&mut self, message: &str);

    /// Yes/no question; anything but an explicit yes is a no.
    fn confirm<'a>(&'a mut self, message: &'a str) -> BoxFuture<'a, bool>;

    /// Next line of input, `None` once input is exhausted.
    fn prompt_line<'a>(&'a mut self, prompt: &'a str) -> BoxFuture<'a, Option<String>>;

    /// Present a rendered page.
    fn show(&mut self, screen: &Screen);
}

/// Named output areas of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Stats,
    Progress,
    VideoList,
    Title,
    Identifiers,
    CreatedAt,
    Duration,
    StatusBadge,
    StatusText,
    Keyframe,
    CarouselControls,
}

impl Region {
    fn heading(&self) -> &'static str {
        match self {
            Region::Stats => "Statistics",
            Region::Progress => "Analysed",
            Region::VideoList => "Videos",
            Region::Title => "File",
            Region::Identifiers => "Ids",
            Region::CreatedAt => "Uploaded",
            Region::Duration => "Duration",
            Region::StatusBadge => "Status",
            Region::StatusText => "Details",
            Region::Keyframe => "Keyframe",
            Region::CarouselControls => "Controls",
        }
    }
}

/// A page layout: an ordered set of regions, each filled independently.
///
/// Writing to a region the layout does not contain is a no-op, so one missing
/// area never prevents the others from being updated.
#[derive(Debug, Clone, Default)]
pub struct Screen {
    regions: Vec<(Region, Option<String>)>,
}

impl Screen {
    pub fn with_regions(regions: &[Region]) -> Self {
        Self {
            regions: regions.iter().map(|r| (*r, None)).collect(),
        }
    }

    pub fn has(&self, region: Region) -> bool {
        self.regions.iter().any(|(r, _)| *r == region)
    }

    /// Returns false when the layout has no such region.
    pub fn set(&mut self, region: Region, content: impl Into<String>) -> bool {
        match self.regions.iter_mut().find(|(r, _)| *r == region) {
            Some((_, slot)) => {
                *slot = Some(content.into());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, region: Region) -> Option<&str> {
        self.regions
            .iter()
            .find(|(r, _)| *r == region)
            .and_then(|(_, c)| c.as_deref())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (region, content) in &self.regions {
            let content = content.as_deref().unwrap_or(PLACEHOLDER);
            if content.contains('\n') {
                out.push_str(&format!("{}:\n", region.heading()));
                for line in content.lines() {
                    out.push_str(&format!("  {}\n", line));
                }
            } else {
                out.push_str(&format!("{:<10} {}\n", format!("{}:", region.heading()), content));
            }
        }
        out
    }
}

/// Interaction over the process's stdin/stdout.
pub struct TerminalUi {
    lines: Lines<BufReader<Stdin>>,
}

impl TerminalUi {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    async fn next_line(&mut self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        let _ = std::io::stdout().flush();
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to read input: {}", e);
                None
            }
        }
    }
}

impl Default for TerminalUi {
    fn default() -> Self {
        Self::new()
    }
}

impl Interaction for TerminalUi {
    fn alert(&mut self, message: &str) {
        println!("\n! {}\n", message);
    }

    fn confirm<'a>(&'a mut self, message: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let answer = self.next_line(&format!("{} [y/N] ", message)).await;
            matches!(
                answer.as_deref().map(|a| a.trim().to_lowercase()).as_deref(),
                Some("y") | Some("yes")
            )
        })
    }

    fn prompt_line<'a>(&'a mut self, prompt: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(self.next_line(prompt))
    }

    fn show(&mut self, screen: &Screen) {
        println!("{}", screen.render());
    }
}
