//! JSON record store
//!
//! Keeps one JSON document per record id in a single directory:
//! `<dir>/<id>.json`. The path is derived from the id, so no index is needed.
//!
//! The store works on raw JSON objects and merges updates field by field,
//! which keeps fields it does not know about intact across rewrites. Typed
//! access lives in the services layer.

use crate::config::RECORD_EXTENSION;
use crate::error::{AppError, Result};
use crate::models::now_millis;
use crate::storage::atomic::write_atomic;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

pub const FIELD_ID: &str = "id";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";

const RESERVED_FIELDS: &[&str] = &[FIELD_ID, FIELD_CREATED_AT, FIELD_UPDATED_AT];

/// A raw JSON document
pub type Document = Map<String, Value>;

/// One change to a named field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(Value),
    Clear,
}

/// Ordered list of field changes applied by [`RecordStore::merge`]
pub type FieldUpdates = Vec<(String, FieldUpdate)>;

/// Where a record lives after a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHandle {
    pub id: String,
    pub path: PathBuf,
}

/// A successfully parsed document found by [`RecordStore::list_all`]
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub path: PathBuf,
    pub modified: SystemTime,
    pub document: Document,
}

/// Directory-backed store of JSON documents
#[derive(Clone)]
pub struct RecordStore {
    dir: PathBuf,
    kind: &'static str,
}

impl RecordStore {
    /// Create a store for `kind` records (used in logs and errors) rooted at `dir`
    pub fn new(dir: PathBuf, kind: &'static str) -> Self {
        Self { dir, kind }
    }

    /// Create the record directory if needed
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        tracing::info!("{} store initialized at: {:?}", self.kind, self.dir);
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Path of the document for `id`; the id is not checked
    pub fn path_of(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    /// Path of the document for `id`, refusing ids that leave the record directory
    fn checked_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.path_of(id))
    }

    /// Create a new record with a fresh id
    pub async fn create(&self, fields: Document) -> Result<RecordHandle> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_millis();

        let mut document = Document::new();
        for (key, value) in fields {
            if is_reserved(&key) {
                tracing::warn!("Ignoring reserved field {} on new {}", key, self.kind);
                continue;
            }
            document.insert(key, value);
        }
        document.insert(FIELD_ID.to_string(), Value::from(id.clone()));
        document.insert(FIELD_CREATED_AT.to_string(), Value::from(now));
        document.insert(FIELD_UPDATED_AT.to_string(), Value::from(now));

        let handle = self.write_document(&id, &document).await?;
        tracing::info!("Created {}: {}", self.kind, id);
        Ok(handle)
    }

    /// Read the full document text, unparsed
    pub async fn load_raw(&self, id: &str) -> Result<String> {
        let path = self.checked_path(id)?;
        match fs::read_to_string(&path).await {
            Ok(content) => {
                tracing::debug!("Read {} {} ({} bytes)", self.kind, id, content.len());
                Ok(content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::not_found(self.kind, id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read and parse the document as a JSON object
    pub async fn load_document(&self, id: &str) -> Result<Document> {
        let content = self.load_raw(id).await?;
        parse_document(&self.path_of(id), &content)
    }

    /// Apply `updates` on top of the stored document and write it back
    ///
    /// A missing record is created. A record that fails to parse is replaced
    /// by a fresh document holding only its id, so an update never fails on
    /// corrupt content. `createdAt` is only filled in when absent.
    pub async fn merge(&self, id: &str, updates: FieldUpdates) -> Result<RecordHandle> {
        self.merge_checked(id, updates, |_| true).await
    }

    /// [`merge`](Self::merge) with a shape check for typed records
    ///
    /// A stored document rejected by `is_valid` is replaced by a fresh one,
    /// like a syntax error. A merged result rejected by `is_valid` is not
    /// written and fails with `InvalidInput`.
    pub async fn merge_checked<F>(
        &self,
        id: &str,
        updates: FieldUpdates,
        is_valid: F,
    ) -> Result<RecordHandle>
    where
        F: Fn(&Document) -> bool,
    {
        let now = now_millis();

        let mut document = match self.load_document(id).await {
            Ok(document) if is_valid(&document) => document,
            Ok(_) => {
                tracing::warn!(
                    "Discarding malformed {} {} during update",
                    self.kind,
                    id
                );
                Document::new()
            }
            Err(AppError::NotFound { .. }) => Document::new(),
            Err(AppError::Parse { path, source }) => {
                tracing::warn!(
                    "Discarding unparseable {} {:?} during update: {}",
                    self.kind,
                    path,
                    source
                );
                Document::new()
            }
            Err(e) => return Err(e),
        };

        for (key, update) in updates {
            if is_reserved(&key) {
                tracing::warn!("Ignoring update to reserved field {} on {}", key, id);
                continue;
            }
            match update {
                FieldUpdate::Set(value) => {
                    document.insert(key, value);
                }
                FieldUpdate::Clear => {
                    document.remove(&key);
                }
            }
        }

        document.insert(FIELD_ID.to_string(), Value::from(id));
        document
            .entry(FIELD_CREATED_AT.to_string())
            .or_insert_with(|| Value::from(now));
        document.insert(FIELD_UPDATED_AT.to_string(), Value::from(now));

        if !is_valid(&document) {
            return Err(AppError::InvalidInput(format!(
                "Update would leave {} {} unreadable",
                self.kind, id
            )));
        }

        let handle = self.write_document(id, &document).await?;
        tracing::debug!("Updated {}: {}", self.kind, id);
        Ok(handle)
    }

    /// Remove the document; returns false when it did not exist
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let path = self.checked_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!("Deleted {}: {}", self.kind, id);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Every parseable document, most recently modified first
    ///
    /// Files that cannot be read or parsed are logged and skipped; they stay
    /// on disk.
    pub async fn list_all(&self) -> Result<Vec<StoredDocument>> {
        let mut documents = Vec::new();

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(documents),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(id) = record_id_of(&path) else {
                continue;
            };

            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Skipping {} {:?}: {}", self.kind, path, e);
                    continue;
                }
            };

            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Skipping unreadable {} {:?}: {}", self.kind, path, e);
                    continue;
                }
            };

            match parse_document(&path, &content) {
                Ok(document) => documents.push(StoredDocument {
                    id,
                    modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                    path,
                    document,
                }),
                Err(e) => tracing::warn!("Skipping corrupt {}: {}", self.kind, e),
            }
        }

        documents.sort_by(|a, b| b.modified.cmp(&a.modified));

        tracing::debug!("Listed {} {} records", documents.len(), self.kind);
        Ok(documents)
    }

    /// Remove every file in the record directory, returns how many were removed
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = 0;

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove {:?}: {}", entry.path(), e),
            }
        }

        tracing::info!("Cleared {} {} files", removed, self.kind);
        Ok(removed)
    }

    async fn write_document(&self, id: &str, document: &Document) -> Result<RecordHandle> {
        let path = self.checked_path(id)?;
        let content = serde_json::to_vec(document)?;
        write_atomic(&path, &content).await?;
        Ok(RecordHandle {
            id: id.to_string(),
            path,
        })
    }
}

/// An id names exactly one file inside the record directory
fn validate_id(id: &str) -> Result<()> {
    let escapes = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0']);
    if escapes {
        return Err(AppError::InvalidInput(format!("Invalid record id: {:?}", id)));
    }
    Ok(())
}

fn is_reserved(key: &str) -> bool {
    RESERVED_FIELDS.contains(&key)
}

/// Id of a record file, `None` for anything that is not `<id>.json`
fn record_id_of(path: &Path) -> Option<String> {
    if path.extension()? != RECORD_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() {
        return None;
    }
    Some(stem.to_string())
}

fn parse_document(path: &Path, content: &str) -> Result<Document> {
    let parse_err = |source| AppError::Parse {
        path: path.to_path_buf(),
        source,
    };

    match serde_json::from_str::<Value>(content).map_err(parse_err)? {
        Value::Object(document) => Ok(document),
        other => Err(parse_err(<serde_json::Error as serde::de::Error>::custom(
            format!("expected a JSON object, found {}", json_kind(&other)),
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn create_test_store() -> (RecordStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::new(temp_dir.path().join("records"), "record");
        store.initialize().await.unwrap();
        (store, temp_dir)
    }

    fn fields(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("fields must be an object"),
        }
    }

    #[tokio::test]
    async fn test_create_sets_generated_fields() {
        let (store, _temp) = create_test_store().await;

        let handle = store
            .create(fields(json!({ "content": "Hello" })))
            .await
            .unwrap();

        assert_eq!(handle.path, store.dir().join(format!("{}.json", handle.id)));
        let document = store.load_document(&handle.id).await.unwrap();
        assert_eq!(document["id"], json!(handle.id));
        assert_eq!(document["content"], json!("Hello"));
        assert_eq!(document["createdAt"], document["updatedAt"]);
        assert!(!document.contains_key("title"));
    }

    #[tokio::test]
    async fn test_create_ignores_reserved_fields() {
        let (store, _temp) = create_test_store().await;

        let handle = store
            .create(fields(json!({ "id": "forged", "createdAt": 1 })))
            .await
            .unwrap();

        assert_ne!(handle.id, "forged");
        let document = store.load_document(&handle.id).await.unwrap();
        assert_ne!(document["createdAt"], json!(1));
    }

    #[tokio::test]
    async fn test_load_raw_missing_is_not_found() {
        let (store, _temp) = create_test_store().await;

        let err = store.load_raw("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_merge_preserves_untouched_fields() {
        let (store, _temp) = create_test_store().await;
        let handle = store
            .create(fields(json!({ "title": "T", "content": "C", "extra": [1, 2] })))
            .await
            .unwrap();

        store
            .merge(
                &handle.id,
                vec![
                    ("content".to_string(), FieldUpdate::Set(json!("C2"))),
                    ("title".to_string(), FieldUpdate::Clear),
                ],
            )
            .await
            .unwrap();

        let document = store.load_document(&handle.id).await.unwrap();
        assert_eq!(document["content"], json!("C2"));
        assert_eq!(document["extra"], json!([1, 2]));
        assert!(!document.contains_key("title"));
    }

    #[tokio::test]
    async fn test_empty_merge_only_touches_updated_at() {
        let (store, _temp) = create_test_store().await;
        let handle = store
            .create(fields(json!({ "content": "same", "n": 3 })))
            .await
            .unwrap();
        let before = store.load_document(&handle.id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        store.merge(&handle.id, Vec::new()).await.unwrap();
        let after = store.load_document(&handle.id).await.unwrap();

        assert!(after["updatedAt"].as_i64() > before["updatedAt"].as_i64());
        for (key, value) in &before {
            if key != FIELD_UPDATED_AT {
                assert_eq!(
                    serde_json::to_string(value).unwrap(),
                    serde_json::to_string(&after[key]).unwrap()
                );
            }
        }
        assert_eq!(before.len(), after.len());
    }

    #[tokio::test]
    async fn test_merge_never_overwrites_created_at() {
        let (store, _temp) = create_test_store().await;
        let handle = store.create(Document::new()).await.unwrap();
        let created_at = store.load_document(&handle.id).await.unwrap()["createdAt"].clone();

        store
            .merge(
                &handle.id,
                vec![("createdAt".to_string(), FieldUpdate::Set(json!(0)))],
            )
            .await
            .unwrap();

        let document = store.load_document(&handle.id).await.unwrap();
        assert_eq!(document["createdAt"], created_at);
    }

    #[tokio::test]
    async fn test_merge_creates_missing_record() {
        let (store, _temp) = create_test_store().await;

        store
            .merge("fixed-id", vec![("content".to_string(), FieldUpdate::Set(json!("x")))])
            .await
            .unwrap();

        let document = store.load_document("fixed-id").await.unwrap();
        assert_eq!(document["id"], json!("fixed-id"));
        assert!(document.contains_key("createdAt"));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_listed_out_but_kept() {
        let (store, _temp) = create_test_store().await;
        let good = store.create(fields(json!({ "content": "ok" }))).await.unwrap();
        fs::write(store.path_of("broken"), b"{ not json").await.unwrap();

        let listed = store.list_all().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, good.id);

        assert_eq!(store.load_raw("broken").await.unwrap(), "{ not json");
        assert!(matches!(
            store.load_document("broken").await,
            Err(AppError::Parse { .. })
        ));

        store
            .merge("broken", vec![("content".to_string(), FieldUpdate::Set(json!("fixed")))])
            .await
            .unwrap();
        let repaired = store.load_document("broken").await.unwrap();
        assert_eq!(repaired["content"], json!("fixed"));
    }

    #[tokio::test]
    async fn test_non_object_json_is_a_parse_failure() {
        let (store, _temp) = create_test_store().await;
        fs::write(store.path_of("array"), b"[1,2,3]").await.unwrap();

        assert!(store.list_all().await.unwrap().is_empty());
        assert!(matches!(
            store.load_document("array").await,
            Err(AppError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_all_ignores_other_files() {
        let (store, _temp) = create_test_store().await;
        store.create(Document::new()).await.unwrap();
        fs::write(store.dir().join("notes.txt"), b"{}").await.unwrap();
        fs::write(store.dir().join("x.json.1234abcd.tmp"), b"{}").await.unwrap();
        fs::create_dir(store.dir().join("handwriting")).await.unwrap();

        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_all_most_recent_first() {
        let (store, _temp) = create_test_store().await;
        let first = store.create(Document::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let second = store.create(Document::new()).await.unwrap();

        let listed = store.list_all().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    }

    #[tokio::test]
    async fn test_list_all_on_missing_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::new(temp_dir.path().join("absent"), "record");

        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _temp) = create_test_store().await;
        let handle = store.create(Document::new()).await.unwrap();

        assert!(store.delete(&handle.id).await.unwrap());
        assert!(!store.delete(&handle.id).await.unwrap());
        assert!(store.load_raw(&handle.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_clear() {
        let (store, _temp) = create_test_store().await;
        store.create(Document::new()).await.unwrap();
        store.create(Document::new()).await.unwrap();
        fs::create_dir(store.dir().join("music")).await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.list_all().await.unwrap().is_empty());
        assert!(store.dir().join("music").exists());
    }

    #[tokio::test]
    async fn test_ids_cannot_leave_the_record_directory() {
        let (store, temp) = create_test_store().await;
        let outside = temp.path().join("settings.json");
        fs::write(&outside, b"{}").await.unwrap();

        for id in ["", ".", "..", "../settings", "a/b", "a\\b", "nul\0id"] {
            assert!(
                matches!(store.delete(id).await, Err(AppError::InvalidInput(_))),
                "delete accepted {:?}",
                id
            );
            assert!(matches!(store.load_raw(id).await, Err(AppError::InvalidInput(_))));
            assert!(matches!(
                store.merge(id, Vec::new()).await,
                Err(AppError::InvalidInput(_))
            ));
        }

        assert!(outside.exists());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_checked_replaces_malformed_document() {
        let (store, _temp) = create_test_store().await;
        fs::write(
            store.path_of("odd"),
            br#"{"id":"odd","content":"x","createdAt":"yesterday","mood":"calm"}"#,
        )
        .await
        .unwrap();
        let has_numeric_created_at = |document: &Document| {
            document.get("createdAt").map_or(false, Value::is_i64)
        };

        store
            .merge_checked(
                "odd",
                vec![("content".to_string(), FieldUpdate::Set(json!("new body")))],
                has_numeric_created_at,
            )
            .await
            .unwrap();

        let document = store.load_document("odd").await.unwrap();
        assert_eq!(document["content"], json!("new body"));
        assert!(document["createdAt"].is_i64());
        assert!(!document.contains_key("mood"));
    }

    #[tokio::test]
    async fn test_merge_checked_refuses_invalid_result() {
        let (store, _temp) = create_test_store().await;
        let handle = store
            .create(fields(json!({ "content": "keep" })))
            .await
            .unwrap();
        let content_is_string = |document: &Document| {
            document.get("content").map_or(false, Value::is_string)
        };

        let err = store
            .merge_checked(
                &handle.id,
                vec![("content".to_string(), FieldUpdate::Set(json!(3)))],
                content_is_string,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        let document = store.load_document(&handle.id).await.unwrap();
        assert_eq!(document["content"], json!("keep"));
    }
}
