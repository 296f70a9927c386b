//! Settings service
//!
//! Manages application settings persistence using JSON file storage.

use crate::config::{MAX_FONT_SIZE, MAX_MUSIC_VOLUME, MIN_FONT_SIZE, SETTINGS_FILE};
use crate::error::{AppError, Result};
use crate::storage::PrefsFile;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Background music playback order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    #[default]
    ListLoop,
    SingleLoop,
    Shuffle,
}

/// Background music configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 0..=100
    #[serde(default = "default_volume")]
    pub volume: u32,
    #[serde(default)]
    pub play_mode: PlayMode,
}

fn default_true() -> bool {
    true
}

fn default_volume() -> u32 {
    50
}

impl Default for MusicSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: default_volume(),
            play_mode: PlayMode::default(),
        }
    }
}

/// Look and feel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppearanceSettings {
    #[serde(default)]
    pub dark_theme: bool,
    /// Editor font size in points
    #[serde(default = "default_font_size")]
    pub font_size: u32,
}

fn default_font_size() -> u32 {
    14
}

impl Default for AppearanceSettings {
    fn default() -> Self {
        Self {
            dark_theme: false,
            font_size: default_font_size(),
        }
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppSettings {
    #[serde(default)]
    pub music: MusicSettings,
    #[serde(default)]
    pub appearance: AppearanceSettings,
}

impl AppSettings {
    pub fn validate(&self) -> Result<()> {
        if self.music.volume > MAX_MUSIC_VOLUME {
            return Err(AppError::InvalidInput(format!(
                "Music volume must be at most {}, got {}",
                MAX_MUSIC_VOLUME, self.music.volume
            )));
        }
        if !(MIN_FONT_SIZE..=MAX_FONT_SIZE).contains(&self.appearance.font_size) {
            return Err(AppError::InvalidInput(format!(
                "Font size must be between {} and {}, got {}",
                MIN_FONT_SIZE, MAX_FONT_SIZE, self.appearance.font_size
            )));
        }
        Ok(())
    }
}

/// Service for managing application settings
#[derive(Clone)]
pub struct SettingsService {
    prefs: PrefsFile<AppSettings>,
}

impl SettingsService {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            prefs: PrefsFile::new(data_dir.join(SETTINGS_FILE)),
        }
    }

    /// Load settings from disk or create default if not exists
    pub async fn load(&self) -> Result<AppSettings> {
        if !self.prefs.exists() {
            tracing::info!("Settings file not found, creating default settings");
            let default = AppSettings::default();
            self.prefs.save(&default).await?;
            return Ok(default);
        }

        self.prefs.load().await
    }

    /// Validate and save settings to disk
    pub async fn save(&self, settings: &AppSettings) -> Result<()> {
        settings.validate()?;
        self.prefs.save(settings).await?;
        tracing::info!("Settings saved to {:?}", self.prefs.path());
        Ok(())
    }

    pub async fn get_music(&self) -> Result<MusicSettings> {
        Ok(self.load().await?.music)
    }

    /// Update music settings
    pub async fn update_music(&self, music: MusicSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.music = music;
        self.save(&settings).await
    }

    pub async fn get_appearance(&self) -> Result<AppearanceSettings> {
        Ok(self.load().await?.appearance)
    }

    /// Update appearance settings
    pub async fn update_appearance(&self, appearance: AppearanceSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.appearance = appearance;
        self.save(&settings).await
    }

    /// Restore defaults
    pub async fn reset(&self) -> Result<AppSettings> {
        let default = AppSettings::default();
        self.save(&default).await?;
        Ok(default)
    }
}
