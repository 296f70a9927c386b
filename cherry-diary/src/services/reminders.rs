//! Reminders service
//!
//! Typed reminder operations and list queries. Every query reads a fresh
//! snapshot from disk and returns it latest due time first.

use crate::config::DEFAULT_UPCOMING_WINDOW_MINUTES;
use crate::error::{AppError, Result};
use crate::models::{decode, now_millis, ReminderDraft, ReminderRecord};
use crate::services::queries::{self, ReminderStats};
use crate::storage::record_store::Document;
use crate::storage::{FieldUpdate, RecordStore};
use serde_json::Value;

/// Service for managing reminders
#[derive(Clone)]
pub struct RemindersService {
    store: RecordStore,
}

impl RemindersService {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub async fn initialize(&self) -> Result<()> {
        self.store.initialize().await
    }

    /// Create a new reminder
    pub async fn create(&self, draft: ReminderDraft) -> Result<ReminderRecord> {
        validate_title(&draft.title)?;
        tracing::info!("Creating reminder at {}", draft.reminder_time);

        let handle = self.store.create(draft.into_document()).await?;
        self.load_strict(&handle.id).await
    }

    /// Save every editable field of `reminder`, creating it if needed
    pub async fn save(&self, reminder: &ReminderRecord) -> Result<ReminderRecord> {
        if reminder.id.trim().is_empty() {
            return Err(AppError::InvalidInput("Reminder id is empty".to_string()));
        }
        validate_title(&reminder.title)?;

        self.store
            .merge_checked(&reminder.id, reminder.to_updates(), is_reminder(&reminder.id))
            .await?;
        tracing::debug!("Reminder saved: {}", reminder.id);
        self.load_strict(&reminder.id).await
    }

    /// Load a reminder
    ///
    /// A document that exists but cannot be parsed comes back as an empty
    /// reminder with the requested id.
    pub async fn load(&self, id: &str) -> Result<ReminderRecord> {
        match self.load_strict(id).await {
            Err(AppError::Parse { path, source }) => {
                tracing::warn!("Reminder {:?} is unreadable, using empty reminder: {}", path, source);
                Ok(ReminderRecord::minimal(id, now_millis()))
            }
            other => other,
        }
    }

    /// Delete a reminder; returns false when it did not exist
    pub async fn delete(&self, id: &str) -> Result<bool> {
        tracing::info!("Deleting reminder: {}", id);
        self.store.delete(id).await
    }

    pub async fn mark_completed(&self, id: &str) -> Result<ReminderRecord> {
        self.set_completed(id, true).await
    }

    pub async fn mark_incomplete(&self, id: &str) -> Result<ReminderRecord> {
        self.set_completed(id, false).await
    }

    /// Flip the completion flag, returns the new state
    pub async fn toggle_completed(&self, id: &str) -> Result<bool> {
        let current = self.load(id).await?;
        let updated = self.set_completed(id, !current.is_completed).await?;
        Ok(updated.is_completed)
    }

    /// All readable reminders, latest due time first
    pub async fn list_all(&self) -> Result<Vec<ReminderRecord>> {
        let documents = self.store.list_all().await?;

        let mut reminders: Vec<ReminderRecord> = documents
            .into_iter()
            .filter_map(|stored| match decode(&stored.id, stored.document) {
                Ok(reminder) => Some(reminder),
                Err(e) => {
                    tracing::warn!("Skipping invalid reminder {:?}: {}", stored.path, e);
                    None
                }
            })
            .collect();

        queries::sort_for_display(&mut reminders);
        Ok(reminders)
    }

    /// Open reminders due in the future
    pub async fn query_pending(&self) -> Result<Vec<ReminderRecord>> {
        Ok(queries::pending(&self.list_all().await?, now_millis()))
    }

    /// Open reminders whose due time has passed
    pub async fn query_overdue(&self) -> Result<Vec<ReminderRecord>> {
        Ok(queries::overdue(&self.list_all().await?, now_millis()))
    }

    /// Open reminders due within `window_minutes` (60 when `None`)
    pub async fn query_upcoming(&self, window_minutes: Option<i64>) -> Result<Vec<ReminderRecord>> {
        let window = window_minutes.unwrap_or(DEFAULT_UPCOMING_WINDOW_MINUTES);
        Ok(queries::upcoming(&self.list_all().await?, now_millis(), window))
    }

    pub async fn query_completed(&self) -> Result<Vec<ReminderRecord>> {
        Ok(queries::completed(&self.list_all().await?))
    }

    /// Counts for the list screen header
    pub async fn stats(&self) -> Result<ReminderStats> {
        Ok(ReminderStats::compute(
            &self.list_all().await?,
            now_millis(),
            DEFAULT_UPCOMING_WINDOW_MINUTES,
        ))
    }

    async fn set_completed(&self, id: &str, completed: bool) -> Result<ReminderRecord> {
        // Merge creates missing records, so make sure it exists first
        self.load(id).await?;

        self.store
            .merge_checked(
                id,
                vec![(
                    "isCompleted".to_string(),
                    FieldUpdate::Set(Value::from(completed)),
                )],
                is_reminder(id),
            )
            .await?;

        tracing::info!("Reminder {} marked completed={}", id, completed);
        self.load_strict(id).await
    }

    async fn load_strict(&self, id: &str) -> Result<ReminderRecord> {
        let document = self.store.load_document(id).await?;
        decode(id, document).map_err(|source| AppError::Parse {
            path: self.store.path_of(id),
            source,
        })
    }
}

/// Shape check for stored and merged reminder documents
fn is_reminder(id: &str) -> impl Fn(&Document) -> bool + '_ {
    move |document: &Document| decode::<ReminderRecord>(id, document.clone()).is_ok()
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "Reminder title must not be empty".to_string(),
        ));
    }
    Ok(())
}
