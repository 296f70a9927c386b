//! Cherry Diary library
//!
//! Local storage for diary entries and reminders: atomic JSON records,
//! attachment files, reminder queries and a cached music index.

pub mod app;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;

pub use app::{setup, AppState};
pub use config::AppConfig;
pub use error::{AppError, Result};
