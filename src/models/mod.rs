// src/models/mod.rs

//! Domain models for the devart tools.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod archive;
mod config;
mod event;
mod snapshot;

// Re-export all public types
pub use archive::{
    Deviation, GalleryFolder, GalleryPage, NO_FOLDER_ID, NO_FOLDER_TITLE, Note, NoteFolder,
};
pub use config::{
    APP_DIR, ClientConfig, Config, Credentials, DeviationsConfig, MIN_POLL_INTERVAL_SECS,
    MonitorConfig, NotesConfig, StateConfig, Whitelist, default_config_dir, expand_home,
};
pub use event::{EventKind, EventRecord};
pub use snapshot::{MonitorState, Snapshot, SnapshotEntry};
