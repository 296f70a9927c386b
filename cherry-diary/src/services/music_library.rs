//! Music library
//!
//! Discovers playable audio from the platform media source and from
//! user-chosen directories, and keeps the result in the music cache.

use crate::config::AUDIO_EXTENSIONS;
use crate::error::{AppError, Result};
use crate::services::music_cache::MusicCache;
use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::fs;

/// Platform enumeration of audio items (a media store, a library index...)
pub trait MediaSource: Send + Sync {
    fn enumerate(&self) -> Result<Vec<String>>;
}

/// Media source for hosts without a system library
pub struct NoMediaSource;

impl MediaSource for NoMediaSource {
    fn enumerate(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Service for discovering music
#[derive(Clone)]
pub struct MusicLibrary {
    cache: MusicCache,
    media: Arc<dyn MediaSource>,
}

impl MusicLibrary {
    pub fn new(cache: MusicCache, media: Arc<dyn MediaSource>) -> Self {
        Self { cache, media }
    }

    pub fn cache(&self) -> &MusicCache {
        &self.cache
    }

    /// Known music, served from the cache unless it is stale or `force_refresh` is set
    pub async fn query(&self, force_refresh: bool) -> Result<BTreeSet<String>> {
        if !force_refresh {
            if let Some(cached) = self.cache.get().await {
                tracing::debug!("Serving {} music entries from cache", cached.len());
                return Ok(cached);
            }
        }

        self.refresh().await
    }

    /// Re-run the full enumeration and replace the cache
    pub async fn refresh(&self) -> Result<BTreeSet<String>> {
        let mut found: BTreeSet<String> = self.media.enumerate()?.into_iter().collect();

        for dir in self.cache.custom_dirs().await {
            let mut files = Vec::new();
            scan_audio_files(Path::new(&dir), &mut files).await;
            found.extend(files);
        }

        tracing::info!("Music scan found {} entries", found.len());
        self.cache.save(found.clone()).await?;
        Ok(found)
    }

    /// Add one item to a valid cache
    ///
    /// Returns false when it was already known or the cache is stale; a
    /// stale cache is rebuilt by the next query instead of being revived
    /// with a single entry.
    pub async fn add_file(&self, uri: &str) -> Result<bool> {
        let Some(mut uris) = self.cache.get().await else {
            return Ok(false);
        };

        if !uris.insert(uri.to_string()) {
            return Ok(false);
        }
        self.cache.save(uris).await?;
        Ok(true)
    }

    /// Remove one item from a valid cache
    pub async fn remove_file(&self, uri: &str) -> Result<bool> {
        let Some(mut uris) = self.cache.get().await else {
            return Ok(false);
        };

        if !uris.remove(uri) {
            return Ok(false);
        }
        self.cache.save(uris).await?;
        Ok(true)
    }

    /// Register a directory to scan; returns false if it was already registered
    pub async fn add_custom_dir(&self, dir: &Path) -> Result<bool> {
        if !dir.is_dir() {
            return Err(AppError::InvalidInput(format!(
                "Not a directory: {}",
                dir.display()
            )));
        }

        let mut dirs = self.cache.custom_dirs().await;
        if !dirs.insert(dir.display().to_string()) {
            return Ok(false);
        }

        self.cache.save_custom_dirs(dirs).await?;
        tracing::info!("Added music directory {:?}", dir);
        Ok(true)
    }

    pub async fn remove_custom_dir(&self, dir: &Path) -> Result<bool> {
        let mut dirs = self.cache.custom_dirs().await;
        if !dirs.remove(&dir.display().to_string()) {
            return Ok(false);
        }

        self.cache.save_custom_dirs(dirs).await?;
        tracing::info!("Removed music directory {:?}", dir);
        Ok(true)
    }
}

/// True when the extension is a supported audio format
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Collect audio files under `dir`; unreadable entries are skipped
fn scan_audio_files<'a>(
    dir: &'a Path,
    found: &'a mut Vec<String>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cannot scan music directory {:?}: {}", dir, e);
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Error reading {:?}: {}", dir, e);
                    break;
                }
            };

            let path: PathBuf = entry.path();
            if path.is_dir() {
                scan_audio_files(&path, found).await;
            } else if path.is_file() && is_audio_file(&path) {
                found.push(path.display().to_string());
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedSource(Vec<&'static str>);

    impl MediaSource for FixedSource {
        fn enumerate(&self) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    fn create_test_library(media: Arc<dyn MediaSource>) -> (MusicLibrary, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = MusicCache::new(temp_dir.path().join("music_cache.json"));
        (MusicLibrary::new(cache, media), temp_dir)
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("a/song.mp3")));
        assert!(is_audio_file(Path::new("SONG.FLAC")));
        assert!(is_audio_file(Path::new("x.m4a")));
        assert!(!is_audio_file(Path::new("cover.jpg")));
        assert!(!is_audio_file(Path::new("noext")));
    }

    #[tokio::test]
    async fn test_query_uses_cache_until_forced() {
        let (library, _temp) = create_test_library(Arc::new(FixedSource(vec!["content://1"])));

        let first = library.query(false).await.unwrap();
        assert_eq!(first.len(), 1);

        library
            .cache()
            .save(["cached".to_string()].into_iter().collect())
            .await
            .unwrap();

        let cached = library.query(false).await.unwrap();
        assert!(cached.contains("cached"));

        let refreshed = library.query(true).await.unwrap();
        assert!(refreshed.contains("content://1"));
        assert!(!refreshed.contains("cached"));
    }

    #[tokio::test]
    async fn test_custom_dirs_are_scanned_recursively() {
        let (library, temp) = create_test_library(Arc::new(NoMediaSource));
        let music = temp.path().join("music");
        fs::create_dir_all(music.join("album")).await.unwrap();
        fs::write(music.join("a.mp3"), b"x").await.unwrap();
        fs::write(music.join("album").join("b.ogg"), b"x").await.unwrap();
        fs::write(music.join("notes.txt"), b"x").await.unwrap();

        assert!(library.add_custom_dir(&music).await.unwrap());
        assert!(!library.add_custom_dir(&music).await.unwrap());

        let found = library.query(true).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|p| p.ends_with("b.ogg")));

        assert!(library.remove_custom_dir(&music).await.unwrap());
        assert!(library.query(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_custom_dir_rejects_missing() {
        let (library, temp) = create_test_library(Arc::new(NoMediaSource));

        let err = library
            .add_custom_dir(&temp.path().join("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_add_and_remove_file() {
        let (library, _temp) = create_test_library(Arc::new(FixedSource(vec!["content://1"])));

        // Stale cache is left alone
        assert!(!library.add_file("content://2").await.unwrap());

        library.query(false).await.unwrap();
        assert!(library.add_file("content://2").await.unwrap());
        assert!(!library.add_file("content://2").await.unwrap());
        assert_eq!(library.query(false).await.unwrap().len(), 2);

        assert!(library.remove_file("content://1").await.unwrap());
        assert!(!library.remove_file("content://1").await.unwrap());
        assert_eq!(library.query(false).await.unwrap().len(), 1);
    }
}
