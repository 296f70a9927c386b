//! Diary service
//!
//! Typed diary operations on top of the record store and the attachment
//! store. Deleting an entry also deletes the attachment files it references.

use crate::error::{AppError, Result};
use crate::models::{decode, now_millis, DiaryFields, DiaryRecord, DiarySummary};
use crate::storage::{AttachmentKind, AttachmentStore, FieldUpdates, RecordStore, StoredDocument};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Service for managing diary entries
#[derive(Clone)]
pub struct DiaryService {
    store: RecordStore,
    attachments: AttachmentStore,
}

impl DiaryService {
    pub fn new(store: RecordStore, attachments: AttachmentStore) -> Self {
        Self { store, attachments }
    }

    /// Create the diary and attachment directories
    pub async fn initialize(&self) -> Result<()> {
        self.store.initialize().await?;
        self.attachments.initialize().await
    }

    /// Create a new entry
    pub async fn create(&self, fields: DiaryFields) -> Result<DiaryRecord> {
        tracing::info!("Creating diary entry");

        let handle = self.store.create(fields.into_document()).await?;
        let record = self.load_strict(&handle.id).await?;

        tracing::info!("Diary entry created successfully: {}", record.id);

        Ok(record)
    }

    /// Save an entry under a known id, creating it if needed
    pub async fn save_or_update(&self, id: &str, fields: DiaryFields) -> Result<DiaryRecord> {
        self.merge(id, fields.into_updates()).await
    }

    /// Apply raw field updates to an entry
    pub async fn merge(&self, id: &str, updates: FieldUpdates) -> Result<DiaryRecord> {
        tracing::debug!("Updating diary entry: {}", id);

        self.store
            .merge_checked(id, updates, |document| {
                decode::<DiaryRecord>(id, document.clone()).is_ok()
            })
            .await?;
        self.load_strict(id).await
    }

    /// Stored document text, unparsed
    pub async fn load_raw(&self, id: &str) -> Result<String> {
        self.store.load_raw(id).await
    }

    /// Load an entry
    ///
    /// A document that exists but cannot be parsed comes back as an empty
    /// entry with the requested id instead of an error.
    pub async fn load(&self, id: &str) -> Result<DiaryRecord> {
        match self.load_strict(id).await {
            Err(AppError::Parse { path, source }) => {
                tracing::warn!("Diary entry {:?} is unreadable, using empty entry: {}", path, source);
                Ok(DiaryRecord::minimal(id, now_millis()))
            }
            other => other,
        }
    }

    /// Content of an entry, `None` if missing or unreadable
    pub async fn content(&self, id: &str) -> Option<String> {
        self.load_lenient(id).await.map(|record| record.content)
    }

    /// Emojis of an entry, empty if missing or unreadable
    pub async fn emojis(&self, id: &str) -> Vec<String> {
        self.load_lenient(id)
            .await
            .map(|record| record.emojis)
            .unwrap_or_default()
    }

    /// Handwriting image paths of an entry, empty if missing or unreadable
    pub async fn handwriting_paths(&self, id: &str) -> Vec<String> {
        self.load_lenient(id)
            .await
            .map(|record| record.handwriting_paths)
            .unwrap_or_default()
    }

    /// Background music path of an entry
    pub async fn music_path(&self, id: &str) -> Option<String> {
        self.load_lenient(id).await.and_then(|record| record.music_path)
    }

    /// Delete an entry and the attachment files it references
    ///
    /// Attachment failures are logged and never stop the entry itself from
    /// being removed. Returns false when the entry did not exist.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        tracing::info!("Deleting diary entry: {}", id);

        let paths = match self.load_strict(id).await {
            Ok(record) => record.attachment_paths(),
            Err(AppError::NotFound { .. }) => Vec::new(),
            Err(AppError::Parse { path, source }) => {
                tracing::warn!(
                    "Cannot resolve attachments of corrupt entry {:?}: {}",
                    path,
                    source
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        for path in &paths {
            if !self.attachments.delete(Path::new(path)).await {
                tracing::warn!("Attachment not removed for {}: {}", id, path);
            }
        }

        let deleted = self.store.delete(id).await?;
        if deleted {
            tracing::info!(
                "Diary entry deleted successfully: {} ({} attachments)",
                id,
                paths.len()
            );
        }
        Ok(deleted)
    }

    /// All readable entries, most recently modified first
    pub async fn list_all(&self) -> Result<Vec<DiaryRecord>> {
        let documents = self.store.list_all().await?;
        Ok(documents
            .into_iter()
            .filter_map(|stored| decode_stored(stored).map(|(record, _)| record))
            .collect())
    }

    /// List-screen rows, newest entry first
    pub async fn list_summaries(&self) -> Result<Vec<DiarySummary>> {
        let documents = self.store.list_all().await?;
        let mut summaries: Vec<DiarySummary> = documents
            .into_iter()
            .filter_map(decode_stored)
            .map(|(record, modified)| DiarySummary::from_record(&record, modified))
            .collect();

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    /// Store a handwriting image for an entry, returns its absolute path
    pub async fn store_handwriting(&self, data: &[u8], diary_id: &str) -> Result<PathBuf> {
        self.store_attachment(data, diary_id, AttachmentKind::Handwriting, None)
            .await
    }

    /// Store a background music file for an entry, returns its absolute path
    pub async fn store_music(
        &self,
        data: &[u8],
        diary_id: &str,
        original_name: &str,
    ) -> Result<PathBuf> {
        self.store_attachment(data, diary_id, AttachmentKind::Music, Some(original_name))
            .await
    }

    pub async fn store_attachment(
        &self,
        data: &[u8],
        owner_id: &str,
        kind: AttachmentKind,
        original_name: Option<&str>,
    ) -> Result<PathBuf> {
        tracing::info!(
            "Storing {:?} attachment for {} (size: {} bytes)",
            kind,
            owner_id,
            data.len()
        );
        self.attachments
            .store(data, owner_id, kind, original_name)
            .await
    }

    /// Remove every entry and attachment, returns the number of entry files removed
    pub async fn clear_all(&self) -> Result<usize> {
        let removed = self.store.clear().await?;
        let attachments = self.attachments.clear().await?;
        tracing::info!(
            "Cleared diary: {} entries, {} attachments",
            removed,
            attachments
        );
        Ok(removed)
    }

    /// Directory holding the diary documents
    pub fn storage_dir(&self) -> &Path {
        self.store.dir()
    }

    async fn load_strict(&self, id: &str) -> Result<DiaryRecord> {
        let document = self.store.load_document(id).await?;
        decode(id, document).map_err(|source| AppError::Parse {
            path: self.store.path_of(id),
            source,
        })
    }

    async fn load_lenient(&self, id: &str) -> Option<DiaryRecord> {
        match self.load_strict(id).await {
            Ok(record) => Some(record),
            Err(e) => {
                if !e.is_not_found() {
                    tracing::warn!("Failed to read diary entry {}: {}", id, e);
                }
                None
            }
        }
    }
}

/// Typed entry plus its file modification time in millis
fn decode_stored(stored: StoredDocument) -> Option<(DiaryRecord, i64)> {
    let modified = stored
        .modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();

    match decode(&stored.id, stored.document) {
        Ok(record) => Some((record, modified)),
        Err(e) => {
            tracing::warn!("Skipping invalid diary entry {:?}: {}", stored.path, e);
            None
        }
    }
}
