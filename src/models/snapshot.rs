//! Snapshots of previously observed records.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{EventKind, EventRecord};

/// Minimal per-record state kept between cycles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread: Option<bool>,
}

impl From<&EventRecord> for SnapshotEntry {
    fn from(record: &EventRecord) -> Self {
        Self {
            id: record.id.clone(),
            unread: record.unread,
        }
    }
}

/// Identifiers observed at the end of the previous cycle, in fetch order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    /// Build a snapshot from fetched records, keeping the first occurrence of each id.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a EventRecord>) -> Self {
        let mut seen = HashSet::new();
        let entries = records
            .into_iter()
            .filter(|&record| seen.insert(record.id.as_str()))
            .map(SnapshotEntry::from)
            .collect();
        Self { entries }
    }

    /// Entries keyed by id, for repeated lookups.
    pub fn index(&self) -> HashMap<&str, &SnapshotEntry> {
        self.entries.iter().map(|e| (e.id.as_str(), e)).collect()
    }

    pub fn get(&self, id: &str) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Persisted state of a monitor: one snapshot per event kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitorState {
    /// Time of the last successful cycle
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub snapshots: BTreeMap<EventKind, Snapshot>,
}

impl MonitorState {
    pub fn new() -> Self {
        Self {
            updated_at: Utc::now(),
            snapshots: BTreeMap::new(),
        }
    }

    /// Snapshot for a kind, empty if never recorded.
    pub fn snapshot(&self, kind: EventKind) -> Snapshot {
        self.snapshots.get(&kind).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.values().all(Snapshot::is_empty)
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}
