//! Interactive page loop tying the controllers together.

use std::path::PathBuf;
use tracing::{debug, info};

use super::analysis::{go_back, AnalysisPage, DetailOutcome};
use super::api::ApiClient;
use super::dashboard::DashboardPage;
use super::ui::{History, Interaction, Page};
use super::upload::{parse_dropped_paths, submit, DropEvent, DropZone, SubmitOutcome, UploadForm};
use crate::settings::{save_settings, ClientSettings};

enum Transition {
    To(Page),
    Back,
    Quit,
}

pub struct Session<U: Interaction> {
    api: ApiClient,
    ui: U,
    history: History,
    settings: ClientSettings,
    settings_path: Option<PathBuf>,
    form: UploadForm,
    once: bool,
}

impl<U: Interaction> Session<U> {
    pub fn new(api: ApiClient, ui: U, settings: ClientSettings) -> Self {
        let form = UploadForm::new(settings.remembered_farm_id().unwrap_or_default());
        Self {
            api,
            ui,
            history: History::new(),
            settings,
            settings_path: None,
            form,
            once: false,
        }
    }

    /// Persist settings changes (the remembered farm id) to `path`.
    pub fn persist_to(mut self, path: PathBuf) -> Self {
        self.settings_path = Some(path);
        self
    }

    /// Render a single page and stop instead of prompting for commands.
    pub fn once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    /// Pre-fill the upload form, as if chosen on the page.
    pub fn with_upload(mut self, file: Option<PathBuf>, farm_id: Option<String>) -> Self {
        if let Some(file) = file {
            self.form.choose_files(vec![file]);
        }
        if let Some(farm_id) = farm_id {
            self.form.farm_id = farm_id;
        }
        self
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub async fn run(&mut self, start: Page) {
        let mut current = start;
        loop {
            debug!("Showing {:?}", current);
            let transition = match &current {
                Page::Dashboard => self.dashboard().await,
                Page::Upload => self.upload().await,
                Page::Analysis(id) => self.analysis(id.clone()).await,
            };
            match transition {
                Transition::To(next) => {
                    self.history.push(current);
                    current = next;
                }
                Transition::Back => current = go_back(&mut self.history),
                Transition::Quit => break,
            }
        }
    }

    async fn command(&mut self, prompt: &str) -> Option<String> {
        self.ui
            .prompt_line(prompt)
            .await
            .map(|line| line.trim().to_lowercase())
    }

    async fn dashboard(&mut self) -> Transition {
        let mut page = DashboardPage::load(&self.api).await;
        self.ui.show(page.screen());
        if self.once {
            return Transition::Quit;
        }

        loop {
            let Some(cmd) = self
                .command("Open [number], [u]pload, [r]efresh, [q]uit: ")
                .await
            else {
                return Transition::Quit;
            };
            match cmd.as_str() {
                "" => {}
                "q" => return Transition::Quit,
                "u" => return Transition::To(Page::Upload),
                "r" => {
                    page = DashboardPage::load(&self.api).await;
                    self.ui.show(page.screen());
                }
                other => match other.parse::<usize>() {
                    Ok(n) => match page.open(n) {
                        Some(target) => return Transition::To(target),
                        None => self.ui.alert(&format!("Video {} cannot be opened.", n)),
                    },
                    Err(_) => self.ui.alert(&format!("Unknown command: {}", other)),
                },
            }
        }
    }

    async fn upload(&mut self) -> Transition {
        let mut zone = DropZone::default();
        loop {
            if self.form.file().is_none() && !self.once {
                zone.handle(DropEvent::Enter, &mut self.form);
                let Some(line) = self
                    .ui
                    .prompt_line("Drop a video here or type its path (empty to go back): ")
                    .await
                else {
                    return Transition::Quit;
                };
                if line.trim().is_empty() {
                    zone.handle(DropEvent::Leave, &mut self.form);
                    return Transition::Back;
                }
                zone.handle(DropEvent::Drop(parse_dropped_paths(&line)), &mut self.form);
            }

            if self.form.farm_id.trim().is_empty() && !self.once {
                let Some(line) = self.ui.prompt_line("Farm ID: ").await else {
                    return Transition::Quit;
                };
                self.form.farm_id = line;
            }

            let outcome = submit(&mut self.form, &self.api, &mut self.ui).await;
            if let SubmitOutcome::Uploaded(_) = &outcome {
                self.remember_farm_id();
            }
            match outcome.next_page() {
                Some(page) => {
                    self.form.choose_files(vec![]);
                    return Transition::To(page);
                }
                None if self.once => return Transition::Quit,
                None => {
                    // Let the user pick a different file after a failure.
                    self.form.choose_files(vec![]);
                }
            }
        }
    }

    fn remember_farm_id(&mut self) {
        let farm_id = self.form.farm_id.trim().to_string();
        if self.settings.last_farm_id.as_deref() == Some(farm_id.as_str()) {
            return;
        }
        self.settings.last_farm_id = Some(farm_id);
        if let Some(path) = &self.settings_path {
            save_settings(path, &self.settings);
        }
    }

    async fn analysis(&mut self, video_id: String) -> Transition {
        let Some(mut page) = AnalysisPage::resolve(Some(&video_id)) else {
            return if self.once {
                Transition::Quit
            } else {
                Transition::Back
            };
        };
        if let Err(e) = page.load(&self.api).await {
            self.ui.alert(&format!("Could not load video {}: {}", video_id, e));
            return if self.once {
                Transition::Quit
            } else {
                Transition::Back
            };
        }
        self.ui.show(&page.render(&self.api));
        if self.once {
            return Transition::Quit;
        }

        loop {
            let Some(cmd) = self
                .command("[p]revious, [n]ext, [d]elete, [b]ack, [r]efresh, [q]uit: ")
                .await
            else {
                return Transition::Quit;
            };
            let moved = match cmd.as_str() {
                "" => false,
                "q" => return Transition::Quit,
                "b" => return Transition::Back,
                "p" => page.carousel_mut().map(|c| c.prev()).unwrap_or(false),
                "n" => page.carousel_mut().map(|c| c.next()).unwrap_or(false),
                "r" => match page.load(&self.api).await {
                    Ok(()) => true,
                    Err(e) => {
                        self.ui.alert(&format!("Could not refresh: {}", e));
                        false
                    }
                },
                "d" => match page.delete(&self.api, &mut self.ui).await {
                    DetailOutcome::Navigate(target) => return Transition::To(target),
                    DetailOutcome::Stay => false,
                },
                other => {
                    self.ui.alert(&format!("Unknown command: {}", other));
                    false
                }
            };
            if moved {
                self.ui.show(&page.render(&self.api));
            }
        }
    }
}

/// Non-interactive delete. `assume_yes` skips the confirmation.
pub async fn delete_video(
    api: &ApiClient,
    ui: &mut dyn Interaction,
    video_id: &str,
    assume_yes: bool,
) -> bool {
    let Some(page) = AnalysisPage::resolve(Some(video_id)) else {
        return false;
    };
    if !assume_yes {
        return page.delete(api, ui).await == DetailOutcome::Navigate(Page::Dashboard);
    }
    match api.delete_video(page.video_id()).await {
        Ok(()) => {
            info!("Deleted video {}", page.video_id());
            ui.alert(super::analysis::DELETED);
            true
        }
        Err(e) => {
            ui.alert(e.server_message().unwrap_or(super::analysis::DELETE_FAILED));
            false
        }
    }
}
