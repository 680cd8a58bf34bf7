use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::DEFAULT_SERVER_URL;

/// Client preferences kept between runs.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: Option<String>,
    /// Farm id of the last successful upload.
    pub last_farm_id: Option<String>,
}

impl ClientSettings {
    pub fn remembered_farm_id(&self) -> Option<&str> {
        self.last_farm_id
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }

    /// `--server` flag, then the saved URL, then the default.
    pub fn server_url(&self, flag: Option<&str>) -> String {
        flag.or(self.server_url.as_deref())
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_SERVER_URL)
            .to_string()
    }
}

/// `<config dir>/mealworm-monitor/settings.json`, falling back to the working
/// directory when the platform has no config dir.
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(env!("CARGO_PKG_NAME")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("settings.json")
}

pub fn load_settings(path: &Path) -> ClientSettings {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => ClientSettings::default(),
    }
}

pub fn save_settings(path: &Path, settings: &ClientSettings) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("Failed to create settings directory {:?}: {}", parent, e);
            return;
        }
    }
    match serde_json::to_string_pretty(settings) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                warn!("Failed to save settings to {:?}: {}", path, e);
            }
        }
        Err(e) => {
            warn!("Failed to serialize settings: {}", e);
        }
    }
}
