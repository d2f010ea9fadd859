//! Diff calculation between a stored snapshot and a fresh fetch.
//!
//! Classifies fetched records as added, changed (unread → read) or removed
//! so the notifier only hears about what actually moved.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::{EventRecord, Snapshot};

/// Result of comparing a snapshot with the current fetch.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Diff {
    /// Records absent from the snapshot, in fetch order
    pub added: Vec<EventRecord>,
    /// Records that went from unread to read, in fetch order
    pub changed: Vec<EventRecord>,
    /// Snapshot ids missing from the fetch, in snapshot order
    pub removed: Vec<String>,
}

impl Diff {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.changed.is_empty() || !self.removed.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }
}

/// Calculator for computing diffs between snapshots.
#[derive(Debug, Clone)]
pub struct DiffCalculator {
    /// Whether to detect unread → read transitions
    detect_transitions: bool,
}

impl DiffCalculator {
    /// Create a new diff calculator.
    pub fn new() -> Self {
        Self {
            detect_transitions: true,
        }
    }

    /// Create a diff calculator that only detects additions/removals.
    pub fn additions_only() -> Self {
        Self {
            detect_transitions: false,
        }
    }

    /// Calculate the diff between the previous snapshot and the current fetch.
    pub fn calculate(&self, previous: &Snapshot, current: &[EventRecord]) -> Diff {
        let previous_index = previous.index();
        let mut seen: HashSet<&str> = HashSet::with_capacity(current.len());
        let mut added = Vec::new();
        let mut changed = Vec::new();

        for record in current {
            if !seen.insert(record.id.as_str()) {
                continue;
            }

            match previous_index.get(record.id.as_str()) {
                None => added.push(record.clone()),
                Some(entry) => {
                    if self.detect_transitions && entry.unread == Some(true) && record.is_read() {
                        changed.push(record.clone());
                    }
                }
            }
        }

        let removed = previous
            .ids()
            .filter(|id| !seen.contains(id))
            .map(str::to_string)
            .collect();

        Diff {
            added,
            changed,
            removed,
        }
    }
}

impl Default for DiffCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to calculate diff.
pub fn calculate_diff(previous: &Snapshot, current: &[EventRecord]) -> Diff {
    DiffCalculator::new().calculate(previous, current)
}
