//! Persistence.
//!
//! Monitors keep one JSON state file each:
//!
//! ```text
//! {state_dir}/
//! ├── check.json        # message checker snapshots
//! ├── sent-notes.json   # unread sent notes
//! └── *.lock            # one per running monitor
//! ```
//!
//! Downloaders mirror into SQLite (`database`, `gallery`, `notes`).

pub mod database;
pub mod gallery;
pub mod local;
pub mod notes;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::MonitorState;

// Re-export for convenience
pub use database::connect;
pub use gallery::{GalleryRepository, GallerySyncSummary};
pub use local::{InstanceLock, LocalStorage};
pub use notes::{NotesPlan, NotesRepository, NotesSyncSummary};

/// Last persisted monitor state.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Stored state, or an empty state on first run.
    async fn load(&self) -> Result<MonitorState>;

    /// Atomically replace the stored state.
    async fn save(&self, state: &MonitorState) -> Result<()>;
}
