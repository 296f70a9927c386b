//! Domain models
//!
//! Rust structs for the documents kept by the record stores.
//! Field names on disk are camelCase; every field is optional when reading
//! so older documents with missing fields still load.

use crate::config::{PREVIEW_CHARS, UNTITLED};
use crate::storage::record_store::{Document, FieldUpdate, FieldUpdates};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Decode a stored document into a typed record
///
/// Documents written without an `id` take the one derived from their file name.
pub(crate) fn decode<T: DeserializeOwned>(id: &str, mut document: Document) -> serde_json::Result<T> {
    if !document.get("id").map_or(false, Value::is_string) {
        document.insert("id".to_string(), Value::from(id));
    }
    serde_json::from_value(Value::Object(document))
}

/// A diary entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiaryRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updated_at: i64,
    #[serde(default, with = "emoji_map", skip_serializing_if = "Vec::is_empty")]
    pub emojis: Vec<String>,
    #[serde(default, with = "path_map", skip_serializing_if = "Vec::is_empty")]
    pub handwriting_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_path: Option<String>,
}

impl DiaryRecord {
    /// Placeholder returned when a stored document cannot be parsed
    pub fn minimal(id: &str, now: i64) -> Self {
        Self {
            id: id.to_string(),
            title: None,
            content: String::new(),
            created_at: now,
            updated_at: now,
            emojis: Vec::new(),
            handwriting_paths: Vec::new(),
            music_path: None,
        }
    }

    /// Every attachment path referenced by this entry
    pub fn attachment_paths(&self) -> Vec<String> {
        let mut paths = self.handwriting_paths.clone();
        paths.extend(self.music_path.iter().cloned());
        paths
    }
}

/// Caller-supplied values for a diary save
///
/// `title`, `content` and `music_path` are always written (a `None` clears
/// the field). `emojis` and `handwriting_paths` are only replaced when
/// `Some`, so an editor that does not show them leaves them untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiaryFields {
    pub title: Option<String>,
    pub content: String,
    pub emojis: Option<Vec<String>>,
    pub handwriting_paths: Option<Vec<String>>,
    pub music_path: Option<String>,
}

impl DiaryFields {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Document for a brand new entry; absent values stay absent
    pub fn into_document(self) -> Document {
        let mut document = Document::new();
        for (key, update) in self.into_updates() {
            if let FieldUpdate::Set(value) = update {
                document.insert(key, value);
            }
        }
        document
    }

    pub fn into_updates(self) -> FieldUpdates {
        let mut updates = vec![
            ("title".to_string(), optional(self.title)),
            ("content".to_string(), FieldUpdate::Set(Value::from(self.content))),
            ("musicPath".to_string(), optional(self.music_path)),
        ];
        if let Some(emojis) = self.emojis {
            updates.push((
                "emojis".to_string(),
                FieldUpdate::Set(indexed_object(EMOJI_PREFIX, &emojis)),
            ));
        }
        if let Some(paths) = self.handwriting_paths {
            updates.push((
                "handwritingPaths".to_string(),
                FieldUpdate::Set(indexed_object(PATH_PREFIX, &paths)),
            ));
        }
        updates
    }
}

fn optional(value: Option<String>) -> FieldUpdate {
    match value {
        Some(value) => FieldUpdate::Set(Value::from(value)),
        None => FieldUpdate::Clear,
    }
}

/// Diary row for list screens
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiarySummary {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub created_at: i64,
}

impl DiarySummary {
    /// `fallback_created_at` is used for documents saved without `createdAt`
    pub fn from_record(record: &DiaryRecord, fallback_created_at: i64) -> Self {
        let title = match record.title.as_deref() {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => UNTITLED.to_string(),
        };
        let created_at = if record.created_at > 0 {
            record.created_at
        } else {
            fallback_created_at
        };

        Self {
            id: record.id.clone(),
            title,
            preview: preview_of(&record.content),
            created_at,
        }
    }
}

fn preview_of(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let mut preview: String = content.chars().take(PREVIEW_CHARS).collect();
        preview.push_str("...");
        preview
    } else {
        content.to_string()
    }
}

/// A reminder with a due time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    /// Due time, epoch milliseconds
    #[serde(default, deserialize_with = "null_as_default")]
    pub reminder_time: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_completed: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updated_at: i64,
}

impl ReminderRecord {
    /// Placeholder returned when a stored document cannot be parsed
    pub fn minimal(id: &str, now: i64) -> Self {
        Self {
            id: id.to_string(),
            title: String::new(),
            content: String::new(),
            reminder_time: 0,
            is_completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Due before `now` and still open
    pub fn is_overdue_at(&self, now: i64) -> bool {
        self.reminder_time < now && !self.is_completed
    }

    pub fn is_overdue(&self) -> bool {
        self.is_overdue_at(now_millis())
    }

    /// Due within `[now, now + window_minutes]` and still open
    pub fn is_upcoming_at(&self, now: i64, window_minutes: i64) -> bool {
        let threshold = now.saturating_add(window_minutes.saturating_mul(60 * 1000));
        (now..=threshold).contains(&self.reminder_time) && !self.is_completed
    }

    pub fn is_upcoming(&self, window_minutes: i64) -> bool {
        self.is_upcoming_at(now_millis(), window_minutes)
    }

    /// Field updates that rewrite every user-editable field
    pub(crate) fn to_updates(&self) -> FieldUpdates {
        vec![
            ("title".to_string(), FieldUpdate::Set(Value::from(self.title.clone()))),
            ("content".to_string(), FieldUpdate::Set(Value::from(self.content.clone()))),
            ("reminderTime".to_string(), FieldUpdate::Set(Value::from(self.reminder_time))),
            ("isCompleted".to_string(), FieldUpdate::Set(Value::from(self.is_completed))),
        ]
    }
}

/// Values for a new reminder
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderDraft {
    pub title: String,
    pub content: String,
    pub reminder_time: i64,
}

impl ReminderDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>, reminder_time: i64) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            reminder_time,
        }
    }

    pub(crate) fn into_document(self) -> Document {
        let mut document = Document::new();
        document.insert("title".to_string(), Value::from(self.title));
        document.insert("content".to_string(), Value::from(self.content));
        document.insert("reminderTime".to_string(), Value::from(self.reminder_time));
        document.insert("isCompleted".to_string(), Value::from(false));
        document
    }
}

// ===== Indexed string lists =====
//
// Lists are stored as objects keyed `<prefix><index>`, e.g.
// `{"emoji_0": "...", "emoji_1": "..."}`. Reading orders entries by the
// numeric suffix and also accepts a plain array.

const EMOJI_PREFIX: &str = "emoji_";
const PATH_PREFIX: &str = "path_";

pub(crate) fn indexed_object(prefix: &str, items: &[String]) -> Value {
    let map = items
        .iter()
        .enumerate()
        .map(|(index, item)| (format!("{}{}", prefix, index), Value::from(item.clone())))
        .collect();
    Value::Object(map)
}

fn read_indexed<E: serde::de::Error>(prefix: &str, value: Option<Value>) -> Result<Vec<String>, E> {
    let entries: Vec<(usize, Value)> = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items.into_iter().enumerate().collect(),
        Some(Value::Object(map)) => {
            let mut entries: Vec<(usize, Value)> = map
                .into_iter()
                .map(|(key, value)| {
                    let index = key
                        .strip_prefix(prefix)
                        .and_then(|suffix| suffix.parse().ok())
                        .unwrap_or(usize::MAX);
                    (index, value)
                })
                .collect();
            entries.sort_by_key(|(index, _)| *index);
            entries
        }
        Some(other) => {
            return Err(E::custom(format!(
                "expected an object or array of strings, found {}",
                other
            )))
        }
    };

    entries
        .into_iter()
        .map(|(_, value)| match value {
            Value::String(s) => Ok(s),
            other => Err(E::custom(format!("expected a string, found {}", other))),
        })
        .collect()
}

mod emoji_map {
    use super::*;

    pub fn serialize<S: Serializer>(items: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        indexed_object(EMOJI_PREFIX, items).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        read_indexed(EMOJI_PREFIX, Option::<Value>::deserialize(deserializer)?)
    }
}

mod path_map {
    use super::*;

    pub fn serialize<S: Serializer>(items: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        indexed_object(PATH_PREFIX, items).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        read_indexed(PATH_PREFIX, Option::<Value>::deserialize(deserializer)?)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
