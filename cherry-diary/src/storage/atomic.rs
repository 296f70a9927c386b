//! Atomic file writes
//!
//! Content is written to a temporary sibling file, flushed to disk and then
//! renamed over the target. A reader of the target sees either the previous
//! complete content or the new complete content, never a mix.

use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Write `content` to `target` through a temp file and a rename
pub async fn write_atomic(target: &Path, content: &[u8]) -> Result<()> {
    let temp_path = temp_path_for(target)?;

    if let Err(e) = write_and_rename(&temp_path, target, content).await {
        tracing::error!("Atomic write failed: {:?}: {}", target, e);
        if let Err(cleanup) = fs::remove_file(&temp_path).await {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove temp file {:?}: {}", temp_path, cleanup);
            }
        }
        return Err(e);
    }

    tracing::debug!("Wrote {:?} ({} bytes)", target, content.len());
    Ok(())
}

async fn write_and_rename(temp_path: &Path, target: &Path, content: &[u8]) -> Result<()> {
    let write_err = |source| AppError::Write {
        path: temp_path.to_path_buf(),
        source,
    };

    let mut file = fs::File::create(temp_path).await.map_err(write_err)?;
    file.write_all(content).await.map_err(write_err)?;
    file.sync_all().await.map_err(write_err)?;
    drop(file);

    fs::rename(temp_path, target)
        .await
        .map_err(|source| AppError::Rename {
            from: temp_path.to_path_buf(),
            to: target.to_path_buf(),
            source,
        })
}

/// Temp sibling named `<name>.<nonce>.tmp`
///
/// The nonce keeps two writers of the same target from sharing (and
/// truncating) one temp file.
fn temp_path_for(target: &Path) -> Result<PathBuf> {
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::Generic(format!("Invalid write target: {:?}", target)))?;

    let nonce = uuid::Uuid::new_v4().simple().to_string();
    Ok(target.with_file_name(format!("{}.{}.tmp", name, &nonce[..8])))
}

/// True for leftover temp files produced by [`write_atomic`]
pub fn is_temp_file(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "tmp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn temp_files(dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut entries = fs::read_dir(dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            if is_temp_file(&entry.path()) {
                found.push(entry.path());
            }
        }
        found
    }

    #[tokio::test]
    async fn test_write_creates_file() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("record.json");

        write_atomic(&target, b"{\"a\":1}").await.unwrap();

        let content = fs::read_to_string(&target).await.unwrap();
        assert_eq!(content, "{\"a\":1}");
        assert!(temp_files(temp.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_write_replaces_existing_content() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("record.json");

        write_atomic(&target, b"a much longer first version").await.unwrap();
        write_atomic(&target, b"short").await.unwrap();

        let content = fs::read_to_string(&target).await.unwrap();
        assert_eq!(content, "short");
    }

    #[tokio::test]
    async fn test_rename_failure_reports_paths_and_cleans_up() {
        let temp = TempDir::new().unwrap();
        // Renaming a file onto a non-empty directory fails on every platform
        let target = temp.path().join("occupied");
        fs::create_dir(&target).await.unwrap();
        fs::write(target.join("inner"), b"x").await.unwrap();

        let err = write_atomic(&target, b"data").await.unwrap_err();

        match err {
            AppError::Rename { from, to, .. } => {
                assert_eq!(to, target);
                assert!(is_temp_file(&from));
            }
            other => panic!("expected rename error, got {other:?}"),
        }
        assert!(temp_files(temp.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_write_into_missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("missing").join("record.json");

        let err = write_atomic(&target, b"data").await.unwrap_err();
        assert!(matches!(err, AppError::Write { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_leave_partial_content() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("record.json");
        let first = "a".repeat(64 * 1024);
        let second = "b".repeat(32 * 1024);

        let mut tasks = Vec::new();
        for i in 0..16 {
            let target = target.clone();
            let body = if i % 2 == 0 { first.clone() } else { second.clone() };
            tasks.push(tokio::spawn(async move {
                write_atomic(&target, body.as_bytes()).await.unwrap();
                let seen = fs::read_to_string(&target).await.unwrap();
                assert!(
                    seen.chars().all(|c| c == 'a') && seen.len() == 64 * 1024
                        || seen.chars().all(|c| c == 'b') && seen.len() == 32 * 1024
                );
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let content = fs::read_to_string(&target).await.unwrap();
        assert!(content == first || content == second);
        assert!(temp_files(temp.path()).await.is_empty());
    }
}
