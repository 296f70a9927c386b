//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::config::{AppConfig, DIARY_DIR, MUSIC_CACHE_FILE, REMINDER_DIR};
use crate::error::Result;
use crate::services::{
    DiaryService, MediaSource, MusicCache, MusicLibrary, NoMediaSource, ReminderNotifier,
    ReminderScanner, RemindersService, ScannerHandle, SettingsService,
};
use crate::storage::{AttachmentStore, RecordStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub diary: DiaryService,
    pub reminders: RemindersService,
    pub music: MusicLibrary,
    pub settings: SettingsService,
}

impl AppState {
    /// Wire services over `data_dir` without touching the disk
    pub fn new(data_dir: PathBuf, media: Arc<dyn MediaSource>) -> Self {
        let diary_root = data_dir.join(DIARY_DIR);

        let diary = DiaryService::new(
            RecordStore::new(diary_root.clone(), "diary"),
            AttachmentStore::new(diary_root),
        );
        let reminders =
            RemindersService::new(RecordStore::new(data_dir.join(REMINDER_DIR), "reminder"));
        let music = MusicLibrary::new(MusicCache::new(data_dir.join(MUSIC_CACHE_FILE)), media);
        let settings = SettingsService::new(data_dir.clone());

        Self {
            data_dir,
            diary,
            reminders,
            music,
            settings,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Start the reminder scanner on the tokio runtime
    pub fn spawn_scanner(
        &self,
        config: &AppConfig,
        notifier: Arc<dyn ReminderNotifier>,
    ) -> ScannerHandle {
        ReminderScanner::new(self.reminders.clone(), notifier, config.scan_interval).spawn()
    }
}

/// Application setup - called once on startup
pub async fn setup(config: &AppConfig) -> Result<AppState> {
    setup_with_media(config, Arc::new(NoMediaSource)).await
}

/// Setup with a platform media source for music discovery
pub async fn setup_with_media(
    config: &AppConfig,
    media: Arc<dyn MediaSource>,
) -> Result<AppState> {
    tracing::info!("Initializing application");
    tracing::info!("Data directory: {:?}", config.data_dir);

    tokio::fs::create_dir_all(&config.data_dir).await?;

    let state = AppState::new(config.data_dir.clone(), media);
    state.diary.initialize().await?;
    state.reminders.initialize().await?;

    // Make sure a settings file exists
    state.settings.load().await?;

    tracing::info!("Application initialized successfully");

    Ok(state)
}
