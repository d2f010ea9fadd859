//! Notes mirror: notes, note folders and their junction rows.

use std::collections::{BTreeMap, BTreeSet};

use sqlx::sqlite::SqlitePool;

use crate::error::Result;
use crate::models::{Note, NoteFolder};

/// Changes computed from a completed fetch, applied in one transaction.
#[derive(Debug, Default, Clone)]
pub struct NotesPlan {
    /// Folders present upstream (after ignores); inserted or renamed
    pub folders: Vec<NoteFolder>,
    /// Notes to store, each linked to its `folder_id`
    pub new_notes: Vec<Note>,
    /// Folder ids gone upstream
    pub removed_folders: Vec<String>,
    /// `(folder_id, note_id)` links no longer present upstream
    pub removed_links: Vec<(String, i64)>,
}

impl NotesPlan {
    pub fn is_empty(&self) -> bool {
        self.new_notes.is_empty() && self.removed_folders.is_empty() && self.removed_links.is_empty()
    }
}

/// What applying a plan changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NotesSyncSummary {
    pub folders_added: usize,
    pub folders_renamed: usize,
    pub folders_removed: usize,
    pub notes_added: u64,
    pub links_added: u64,
    pub links_removed: u64,
    pub notes_removed: u64,
}

#[derive(Debug, Clone)]
pub struct NotesRepository {
    pool: SqlitePool,
}

impl NotesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stored folders, id → title.
    pub async fn folder_titles(&self) -> Result<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT id, title FROM tbl_note_folder")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    /// Note ids stored for a folder.
    pub async fn note_ids(&self, folder_id: &str) -> Result<BTreeSet<i64>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT fk_note_id FROM tbl_note_folders WHERE fk_folder_id = ?")
                .bind(folder_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().collect())
    }

    pub async fn note(&self, id: i64) -> Result<Option<Note>> {
        let row: Option<(i64, String, String, i64, String)> = sqlx::query_as(
            "SELECT id, title, sender, timestamp, text FROM tbl_note WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, title, sender, timestamp, text)) = row else {
            return Ok(None);
        };
        let folder_id: Option<String> = sqlx::query_scalar(
            "SELECT fk_folder_id FROM tbl_note_folders WHERE fk_note_id = ? ORDER BY fk_folder_id LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(Some(Note {
            id,
            title,
            sender,
            timestamp,
            text,
            folder_id: folder_id.unwrap_or_default(),
        }))
    }

    /// Notes stored across all folders.
    pub async fn note_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(1) FROM tbl_note")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Apply a plan in one transaction, then drop notes left in no folder.
    pub async fn apply(&self, plan: &NotesPlan) -> Result<NotesSyncSummary> {
        let mut summary = NotesSyncSummary::default();
        let mut tx = self.pool.begin().await?;

        for folder in &plan.folders {
            let current: Option<String> =
                sqlx::query_scalar("SELECT title FROM tbl_note_folder WHERE id = ?")
                    .bind(&folder.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            match current {
                None => {
                    sqlx::query("INSERT INTO tbl_note_folder (id, title) VALUES (?, ?)")
                        .bind(&folder.id)
                        .bind(&folder.title)
                        .execute(&mut *tx)
                        .await?;
                    summary.folders_added += 1;
                    log::info!("Note folder '{}' recorded", folder.title);
                }
                Some(title) if title != folder.title => {
                    sqlx::query("UPDATE tbl_note_folder SET title = ? WHERE id = ?")
                        .bind(&folder.title)
                        .bind(&folder.id)
                        .execute(&mut *tx)
                        .await?;
                    summary.folders_renamed += 1;
                    log::info!(
                        "Note folder {} renamed from '{}' to '{}'",
                        folder.id,
                        title,
                        folder.title
                    );
                }
                Some(_) => {}
            }
        }

        for folder_id in &plan.removed_folders {
            summary.links_removed += sqlx::query("DELETE FROM tbl_note_folders WHERE fk_folder_id = ?")
                .bind(folder_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            sqlx::query("DELETE FROM tbl_note_folder WHERE id = ?")
                .bind(folder_id)
                .execute(&mut *tx)
                .await?;
            summary.folders_removed += 1;
            log::info!("Note folder {} deleted", folder_id);
        }

        for (folder_id, note_id) in &plan.removed_links {
            summary.links_removed += sqlx::query(
                "DELETE FROM tbl_note_folders WHERE fk_note_id = ? AND fk_folder_id = ?",
            )
            .bind(note_id)
            .bind(folder_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        for note in &plan.new_notes {
            summary.notes_added += sqlx::query(
                "INSERT OR IGNORE INTO tbl_note (id, title, sender, timestamp, text)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(note.id)
            .bind(&note.title)
            .bind(&note.sender)
            .bind(note.timestamp)
            .bind(&note.text)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            summary.links_added += sqlx::query(
                "INSERT OR IGNORE INTO tbl_note_folders (fk_note_id, fk_folder_id) VALUES (?, ?)",
            )
            .bind(note.id)
            .bind(&note.folder_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            log::debug!(
                "Note {} '{}' from {} recorded in folder {}",
                note.id,
                note.title,
                note.sender,
                note.folder_id
            );
        }

        summary.notes_removed = sqlx::query(
            "DELETE FROM tbl_note WHERE id NOT IN (SELECT fk_note_id FROM tbl_note_folders)",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        log::debug!("Notes reconciled: {:?}", summary);
        Ok(summary)
    }
}
