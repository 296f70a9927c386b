//! Typed JSON preference files
//!
//! A small key-value file: one serde struct serialized as a JSON object.
//! Missing files load as `T::default()`; writes go through the atomic writer.

use crate::error::{AppError, Result};
use crate::storage::atomic::write_atomic;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct PrefsFile<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for PrefsFile<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PrefsFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once the file has been written
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the preferences, or defaults if the file does not exist yet
    pub async fn load(&self) -> Result<T> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|source| AppError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Load, falling back to defaults when the file is corrupt
    pub async fn load_or_default(&self) -> T {
        match self.load().await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Using default preferences for {:?}: {}", self.path, e);
                T::default()
            }
        }
    }

    pub async fn save(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_vec_pretty(value)?;
        write_atomic(&self.path, &content).await?;
        tracing::debug!("Preferences saved to {:?}", self.path);
        Ok(())
    }

    /// Load (or default), apply `edit`, save
    pub async fn update<F>(&self, edit: F) -> Result<T>
    where
        F: FnOnce(&mut T),
    {
        let mut value = self.load_or_default().await;
        edit(&mut value);
        self.save(&value).await?;
        Ok(value)
    }

    /// Remove the file; a missing file is not an error
    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
