// Flat user settings persisted as JSON in the app data directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::downloader::models::AudioFormat;
use crate::tools;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub save_path: String,
    pub audio_format: AudioFormat,
    pub playlist_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let downloads = dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            save_path: downloads.to_string_lossy().to_string(),
            audio_format: AudioFormat::Best,
            playlist_mode: false,
        }
    }
}

impl Settings {
    fn default_file() -> PathBuf {
        tools::app_data_dir().join("settings.json")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::default_file())
    }

    /// Unreadable or malformed files fall back to defaults; settings are not
    /// worth failing a startup over.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::default_file())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let data = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, data).map_err(|e| e.to_string())
    }
}
