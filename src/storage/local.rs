//! Local filesystem storage for monitor state.
//!
//! One JSON document per monitor, replaced atomically:
//!
//! ```text
//! {root}/
//! ├── {name}.json       # MonitorState
//! ├── {name}.json.tmp   # only while a save is in flight
//! └── {name}.lock       # held by the running monitor
//! ```

use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::MonitorState;
use crate::storage::SnapshotStore;

/// JSON state file for one monitor.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    name: String,
}

impl LocalStorage {
    /// Create a store for `{root_dir}/{name}.json`.
    pub fn new(root_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            name: name.into(),
        }
    }

    /// Full path of the state file.
    pub fn path(&self) -> PathBuf {
        self.root_dir.join(format!("{}.json", self.name))
    }

    fn tmp_path(&self) -> PathBuf {
        self.root_dir.join(format!("{}.json.tmp", self.name))
    }

    fn lock_path(&self) -> PathBuf {
        self.root_dir.join(format!("{}.lock", self.name))
    }

    /// Claim this state for the current process.
    ///
    /// Fails with a configuration error while another instance holds it.
    pub fn lock(&self) -> Result<InstanceLock> {
        std::fs::create_dir_all(&self.root_dir)?;
        let path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        match file.try_lock() {
            Ok(()) => {
                log::debug!("Locked {}", path.display());
                Ok(InstanceLock { _file: file, path })
            }
            Err(TryLockError::WouldBlock) => Err(AppError::config(format!(
                "{} appears to already be running (lock held on {})",
                self.name,
                path.display()
            ))),
            Err(TryLockError::Error(e)) => Err(AppError::Io(e)),
        }
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        let path = self.path();
        self.ensure_dir(&path).await?;

        let tmp = self.tmp_path();
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(&bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path()).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self.read_bytes().await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// Exclusive lock on a monitor's state; released on drop.
#[derive(Debug)]
pub struct InstanceLock {
    _file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for LocalStorage {
    async fn load(&self) -> Result<MonitorState> {
        match self.read_json::<MonitorState>().await? {
            Some(state) => {
                log::debug!(
                    "Loaded state from {} (updated {})",
                    self.path().display(),
                    state.updated_at
                );
                Ok(state)
            }
            None => {
                log::info!(
                    "No previous state at {}; everything fetched counts as new",
                    self.path().display()
                );
                Ok(MonitorState::default())
            }
        }
    }

    async fn save(&self, state: &MonitorState) -> Result<()> {
        self.write_json(state).await?;
        log::debug!("Saved state to {}", self.path().display());
        Ok(())
    }
}
