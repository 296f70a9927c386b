//! Application configuration constants
//!
//! Central location for all configuration constants, resource limits,
//! and validation boundaries used throughout the application.

use std::path::PathBuf;
use std::time::Duration;

// ===== On-disk Layout =====

/// Directory (under the data dir) holding diary documents
pub const DIARY_DIR: &str = "diary";
/// Directory (under the data dir) holding reminder documents
pub const REMINDER_DIR: &str = "reminders";
/// Attachment subdirectory for handwriting images
pub const HANDWRITING_DIR: &str = "handwriting";
/// Attachment subdirectory for background music files
pub const MUSIC_DIR: &str = "music";
/// Persistent tier of the music discovery cache
pub const MUSIC_CACHE_FILE: &str = "music_cache.json";
/// User preferences file
pub const SETTINGS_FILE: &str = "settings.json";
/// Extension of record documents
pub const RECORD_EXTENSION: &str = "json";

// ===== Music Cache =====

/// Validity window of the music discovery cache (24 hours)
pub const MUSIC_CACHE_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// File extensions recognised as audio when scanning custom directories
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aac", "flac", "m4a", "ogg"];

// ===== Reminders =====

/// Default window for "upcoming" queries, in minutes
pub const DEFAULT_UPCOMING_WINDOW_MINUTES: i64 = 60;

/// Window the background scanner uses to pick reminders to announce
pub const SCANNER_UPCOMING_WINDOW_MINUTES: i64 = 5;

/// Default delay between two reminder scans
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

// ===== Diary List =====

/// Number of characters kept in a diary list preview
pub const PREVIEW_CHARS: usize = 50;

/// Title shown for diary entries saved without one
pub const UNTITLED: &str = "Untitled";

// ===== Settings Limits =====

/// Maximum music volume (percent)
pub const MAX_MUSIC_VOLUME: u32 = 100;

/// Smallest editor font size in points
pub const MIN_FONT_SIZE: u32 = 10;

/// Largest editor font size in points
pub const MAX_FONT_SIZE: u32 = 30;

// ===== Environment =====

const DATA_DIR_ENV: &str = "CHERRY_DATA_DIR";
const SCAN_INTERVAL_ENV: &str = "CHERRY_SCAN_INTERVAL_SECS";
const DEFAULT_DATA_DIR: &str = "cherry-data";

/// Runtime configuration resolved at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub scan_interval: Duration,
}

impl AppConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }

    /// Read configuration from `CHERRY_DATA_DIR` and `CHERRY_SCAN_INTERVAL_SECS`
    pub fn from_env() -> Self {
        let data_dir = std::env::var_os(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let scan_interval = std::env::var(SCAN_INTERVAL_ENV)
            .ok()
            .and_then(|raw| parse_interval_secs(&raw))
            .unwrap_or(DEFAULT_SCAN_INTERVAL);

        Self {
            data_dir,
            scan_interval,
        }
    }
}

fn parse_interval_secs(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => {
            tracing::warn!("Ignoring invalid {}: {:?}", SCAN_INTERVAL_ENV, raw);
            None
        }
        Ok(secs) => Some(Duration::from_secs(secs)),
    }
}
