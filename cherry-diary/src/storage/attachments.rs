//! Attachment storage
//!
//! Stores binary data (handwriting images, background music) next to the
//! diary documents. Files are named after their kind, owner record id and a
//! millisecond timestamp, e.g. `handwriting/handwriting_<id>_<ts>.png`.
//!
//! Attachments are write-once, so they are written directly rather than
//! through the atomic writer. The store keeps no index: the owning record
//! holds the paths.

use crate::config::{HANDWRITING_DIR, MUSIC_DIR};
use crate::error::{AppError, Result};
use crate::models::now_millis;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Kind of attachment, decides the subdirectory and file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Handwriting,
    Music,
}

impl AttachmentKind {
    fn dir_name(self) -> &'static str {
        match self {
            AttachmentKind::Handwriting => HANDWRITING_DIR,
            AttachmentKind::Music => MUSIC_DIR,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            AttachmentKind::Handwriting => "handwriting",
            AttachmentKind::Music => "music",
        }
    }
}

/// File-backed attachment store
#[derive(Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    /// Create a store whose kind directories live under `root`
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the attachment directories if needed
    pub async fn initialize(&self) -> Result<()> {
        for kind in [AttachmentKind::Handwriting, AttachmentKind::Music] {
            fs::create_dir_all(self.dir_of(kind)).await?;
        }
        tracing::info!("Attachment store initialized at: {:?}", self.root);
        Ok(())
    }

    /// Directory holding attachments of `kind`
    pub fn dir_of(&self, kind: AttachmentKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Write `data` for `owner_id`, returns the absolute path of the new file
    ///
    /// `original_name` is kept (sanitized) at the end of music file names.
    pub async fn store(
        &self,
        data: &[u8],
        owner_id: &str,
        kind: AttachmentKind,
        original_name: Option<&str>,
    ) -> Result<PathBuf> {
        let dir = self.dir_of(kind);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Attachment(format!("Failed to create {:?}: {}", dir, e)))?;

        let file_name = attachment_file_name(kind, owner_id, now_millis(), original_name);
        let path = absolute(dir.join(file_name))?;

        fs::write(&path, data)
            .await
            .map_err(|e| AppError::Attachment(format!("Failed to write {:?}: {}", path, e)))?;

        tracing::debug!(
            "Stored {:?} attachment for {}: {:?} ({} bytes)",
            kind,
            owner_id,
            path,
            data.len()
        );

        Ok(path)
    }

    /// Read an attachment back
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        if !self.owns(path) {
            return Err(AppError::Attachment(format!(
                "Path outside attachment store: {:?}",
                path
            )));
        }

        fs::read(path)
            .await
            .map_err(|e| AppError::Attachment(format!("Failed to read {:?}: {}", path, e)))
    }

    /// Delete an attachment, best-effort
    ///
    /// Never fails: missing files and errors are reported as `false`. Paths
    /// outside the store are refused.
    pub async fn delete(&self, path: &Path) -> bool {
        if !self.owns(path) {
            tracing::warn!("Refusing to delete path outside attachment store: {:?}", path);
            return false;
        }

        match fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!("Deleted attachment: {:?}", path);
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!("Failed to delete attachment {:?}: {}", path, e);
                false
            }
        }
    }

    /// Remove every attachment of every kind, returns how many were removed
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = 0;

        for kind in [AttachmentKind::Handwriting, AttachmentKind::Music] {
            let mut entries = match fs::read_dir(self.dir_of(kind)).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() && self.delete(&entry.path()).await {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }

    /// Get attachment store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn owns(&self, path: &Path) -> bool {
        let Ok(root) = absolute(self.root.clone()) else {
            return false;
        };
        path.is_absolute()
            && path.starts_with(&root)
            && !path.components().any(|c| c == std::path::Component::ParentDir)
    }
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn attachment_file_name(
    kind: AttachmentKind,
    owner_id: &str,
    timestamp: i64,
    original_name: Option<&str>,
) -> String {
    let owner = sanitize_filename(owner_id);
    match kind {
        AttachmentKind::Handwriting => format!("{}_{}_{}.png", kind.prefix(), owner, timestamp),
        AttachmentKind::Music => match original_name.map(sanitize_filename) {
            Some(name) if !name.is_empty() => {
                format!("{}_{}_{}_{}", kind.prefix(), owner, timestamp, name)
            }
            _ => format!("{}_{}_{}", kind.prefix(), owner, timestamp),
        },
    }
}

/// Sanitize filename to prevent path traversal attacks
fn sanitize_filename(filename: &str) -> String {
    // Remove path separators and null bytes
    filename
        .chars()
        .filter(|c| *c != '/' && *c != '\\' && *c != '\0')
        .take(200) // Limit length
        .collect()
}
