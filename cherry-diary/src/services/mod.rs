//! Services module
//!
//! Business logic services that sit on top of the storage layer.

pub mod diary;
pub mod music_cache;
pub mod music_library;
pub mod queries;
pub mod reminders;
pub mod scheduler;
pub mod settings;

pub use diary::DiaryService;
pub use music_cache::{CacheInfo, CacheState, MusicCache};
pub use music_library::{MediaSource, MusicLibrary, NoMediaSource};
pub use queries::ReminderStats;
pub use reminders::RemindersService;
pub use scheduler::{LogNotifier, ReminderNotifier, ReminderScanner, ScannerHandle};
pub use settings::{AppSettings, SettingsService};
