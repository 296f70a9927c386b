//! Music discovery cache
//!
//! Two tiers: an in-memory copy for the life of the process and a JSON
//! preferences file that survives restarts. Both share one refresh
//! timestamp and expire together after 24 hours.
//!
//! The cache is a convenience index over an enumeration that can always be
//! re-run, so concurrent saves simply race (last writer wins).

use crate::config::MUSIC_CACHE_TTL_MS;
use crate::error::Result;
use crate::models::now_millis;
use crate::storage::PrefsFile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Persistent tier layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedMusicCache {
    /// Last full refresh, epoch millis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uris: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_dir: Option<BTreeSet<String>>,
}

#[derive(Debug, Default)]
struct MemoryTier {
    uris: Option<BTreeSet<String>>,
    custom_dirs: Option<BTreeSet<String>>,
    refreshed_at: i64,
}

impl MemoryTier {
    fn is_fresh(&self, now: i64) -> bool {
        self.uris.is_some() && is_fresh(self.refreshed_at, now)
    }
}

fn is_fresh(timestamp: i64, now: i64) -> bool {
    timestamp > 0 && now - timestamp < MUSIC_CACHE_TTL_MS
}

/// Freshness of the cached identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheState {
    Empty,
    Fresh,
    Stale,
}

/// Sizes and freshness of both tiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub memory_uri_count: usize,
    pub persistent_uri_count: usize,
    pub memory_custom_dir_count: usize,
    pub persistent_custom_dir_count: usize,
    pub last_updated: i64,
    pub is_valid: bool,
}

/// Two-level cache of discovered music identifiers
#[derive(Clone)]
pub struct MusicCache {
    prefs: PrefsFile<PersistedMusicCache>,
    memory: Arc<Mutex<MemoryTier>>,
}

impl MusicCache {
    pub fn new(path: PathBuf) -> Self {
        Self {
            prefs: PrefsFile::new(path),
            memory: Arc::new(Mutex::new(MemoryTier::default())),
        }
    }

    pub async fn is_valid(&self) -> bool {
        self.is_valid_at(now_millis()).await
    }

    /// Memory tier first; a fresh persistent tier is promoted into memory
    pub async fn is_valid_at(&self, now: i64) -> bool {
        let mut memory = self.memory.lock().await;
        memory.is_fresh(now) || self.warm_up(&mut memory, now).await
    }

    /// Cached identifiers, `None` when the cache is empty or expired
    pub async fn get(&self) -> Option<BTreeSet<String>> {
        self.get_at(now_millis()).await
    }

    pub async fn get_at(&self, now: i64) -> Option<BTreeSet<String>> {
        let mut memory = self.memory.lock().await;
        if memory.is_fresh(now) || self.warm_up(&mut memory, now).await {
            memory.uris.clone()
        } else {
            None
        }
    }

    /// Replace the cached identifiers in both tiers
    pub async fn save(&self, uris: BTreeSet<String>) -> Result<()> {
        self.save_at(uris, now_millis()).await
    }

    pub async fn save_at(&self, uris: BTreeSet<String>, now: i64) -> Result<()> {
        let mut memory = self.memory.lock().await;

        let count = uris.len();
        let persisted_uris = uris.clone();
        self.prefs
            .update(|persisted| {
                persisted.timestamp = Some(now);
                persisted.uris = Some(persisted_uris);
            })
            .await?;

        // Memory follows only once the disk write succeeded
        memory.uris = Some(uris);
        memory.refreshed_at = now;

        tracing::debug!("Music cache saved ({} entries)", count);
        Ok(())
    }

    /// Custom directories to scan; these do not expire with the TTL
    pub async fn custom_dirs(&self) -> BTreeSet<String> {
        let mut memory = self.memory.lock().await;
        if let Some(dirs) = &memory.custom_dirs {
            return dirs.clone();
        }

        let dirs = self
            .prefs
            .load_or_default()
            .await
            .custom_dir
            .unwrap_or_default();
        memory.custom_dirs = Some(dirs.clone());
        dirs
    }

    /// Persist the custom directory set without touching the refresh time
    pub async fn save_custom_dirs(&self, dirs: BTreeSet<String>) -> Result<()> {
        let mut memory = self.memory.lock().await;

        let persisted_dirs = dirs.clone();
        self.prefs
            .update(|persisted| persisted.custom_dir = Some(persisted_dirs))
            .await?;

        memory.custom_dirs = Some(dirs);
        Ok(())
    }

    /// Drop both tiers
    pub async fn clear(&self) -> Result<()> {
        let mut memory = self.memory.lock().await;
        *memory = MemoryTier::default();
        self.prefs.clear().await?;
        tracing::info!("Music cache cleared");
        Ok(())
    }

    pub async fn state(&self) -> CacheState {
        self.state_at(now_millis()).await
    }

    /// State of the freshest tier, without promoting anything
    pub async fn state_at(&self, now: i64) -> CacheState {
        let memory = self.memory.lock().await;
        let persisted = self.prefs.load_or_default().await;

        let memory_time = memory.uris.as_ref().map(|_| memory.refreshed_at);
        let persisted_time = persisted
            .uris
            .as_ref()
            .and(persisted.timestamp)
            .filter(|ts| *ts > 0);

        match memory_time.into_iter().chain(persisted_time).max() {
            None => CacheState::Empty,
            Some(ts) if is_fresh(ts, now) => CacheState::Fresh,
            Some(_) => CacheState::Stale,
        }
    }

    pub async fn info(&self) -> CacheInfo {
        self.info_at(now_millis()).await
    }

    pub async fn info_at(&self, now: i64) -> CacheInfo {
        let persisted = self.prefs.load_or_default().await;
        let is_valid = self.is_valid_at(now).await;
        let memory = self.memory.lock().await;

        let persisted_time = persisted.timestamp.unwrap_or_default();
        CacheInfo {
            memory_uri_count: memory.uris.as_ref().map_or(0, BTreeSet::len),
            persistent_uri_count: persisted.uris.as_ref().map_or(0, BTreeSet::len),
            memory_custom_dir_count: memory.custom_dirs.as_ref().map_or(0, BTreeSet::len),
            persistent_custom_dir_count: persisted.custom_dir.as_ref().map_or(0, BTreeSet::len),
            last_updated: if persisted_time > 0 {
                persisted_time
            } else {
                memory.refreshed_at
            },
            is_valid,
        }
    }

    /// Load a fresh persistent tier into memory, keeping its original timestamp
    async fn warm_up(&self, memory: &mut MemoryTier, now: i64) -> bool {
        let persisted = self.prefs.load_or_default().await;

        match (persisted.timestamp, persisted.uris) {
            (Some(timestamp), Some(uris)) if is_fresh(timestamp, now) => {
                tracing::debug!("Music cache warmed up from disk ({} entries)", uris.len());
                memory.uris = Some(uris);
                memory.refreshed_at = timestamp;
                if persisted.custom_dir.is_some() {
                    memory.custom_dirs = persisted.custom_dir;
                }
                true
            }
            _ => false,
        }
    }
}
