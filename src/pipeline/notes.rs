// src/pipeline/notes.rs

//! Notes downloader: mirrors note folders and their notes into SQLite.
//!
//! Everything is fetched and planned first; the database is only written
//! once, in a single transaction.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::services::{NOTES_PAGE_SIZE, NoteArchive, Session};
use crate::storage::{NotesPlan, NotesRepository, NotesSyncSummary};

#[derive(Debug, Clone, Default)]
pub struct NotesOptions {
    /// Audit every folder's full id set instead of trusting counts
    pub fsck: bool,
    /// Folders to skip, by id or title
    pub ignored_folders: Vec<String>,
}

/// Fetch what changed upstream and work out the writes.
pub async fn plan_notes<A>(
    archive: &mut A,
    repository: &NotesRepository,
    options: &NotesOptions,
) -> Result<NotesPlan>
where
    A: NoteArchive + ?Sized,
{
    let mut plan = NotesPlan::default();

    let folders: Vec<_> = archive
        .note_folders()
        .await?
        .into_iter()
        .filter(|f| {
            let ignored = f.is_ignored(&options.ignored_folders);
            if ignored {
                log::debug!("Ignoring note folder '{}'", f.title);
            }
            !ignored
        })
        .collect();

    let stored_folders = repository.folder_titles().await?;
    let mut local: BTreeMap<String, BTreeSet<i64>> = BTreeMap::new();
    for folder in &folders {
        local.insert(folder.id.clone(), repository.note_ids(&folder.id).await?);
    }

    if !options.fsck {
        for folder in &folders {
            let known = local.entry(folder.id.clone()).or_default();
            let last = known.last().copied().unwrap_or(0);
            let fresh = newer_note_ids(archive, &folder.id, last).await?;
            if !fresh.is_empty() {
                log::info!("{} new notes in '{}'", fresh.len(), folder.title);
            }
            for id in fresh {
                if known.insert(id) {
                    plan.new_notes.push(archive.note(&folder.id, id).await?);
                }
            }
        }
    }

    plan.removed_folders = stored_folders
        .keys()
        .filter(|id| !folders.iter().any(|f| &f.id == *id))
        .cloned()
        .collect();

    for folder in &folders {
        let known = local.entry(folder.id.clone()).or_default();
        let expected = known.len() as i64;
        if !options.fsck && folder.site_note_count == expected {
            continue;
        }
        if !options.fsck {
            log::info!(
                "Folder '{}' reports {} notes but {} are known; auditing",
                folder.title,
                folder.site_note_count,
                expected
            );
        }

        let remote = archive.note_ids(&folder.id).await?;
        for id in known.difference(&remote) {
            log::info!("Note {} no longer in '{}'", id, folder.title);
            plan.removed_links.push((folder.id.clone(), *id));
        }
        for id in remote.difference(known) {
            plan.new_notes.push(archive.note(&folder.id, *id).await?);
        }
    }

    // Audited notes fetched earlier in this run may be gone again
    plan.new_notes.retain(|note| {
        !plan
            .removed_links
            .iter()
            .any(|(folder, id)| *id == note.id && *folder == note.folder_id)
    });
    plan.folders = folders;
    Ok(plan)
}

/// Ids newer than `last`, newest first; stops at the first known id or a short page.
async fn newer_note_ids<A>(archive: &mut A, folder_id: &str, last: i64) -> Result<Vec<i64>>
where
    A: NoteArchive + ?Sized,
{
    let mut ids = Vec::new();
    let mut offset = 0;
    loop {
        let page = archive.notes_page(folder_id, offset).await?;
        let count = page.len();
        for note in page {
            if note.id <= last {
                return Ok(ids);
            }
            ids.push(note.id);
        }
        if count < NOTES_PAGE_SIZE {
            return Ok(ids);
        }
        offset += NOTES_PAGE_SIZE;
    }
}

/// Fetch, plan and apply.
pub async fn run_notes<A>(
    client: &mut A,
    repository: &NotesRepository,
    options: &NotesOptions,
) -> Result<NotesSyncSummary>
where
    A: Session + NoteArchive,
{
    client.ensure_logged_in().await?;

    let plan = plan_notes(client, repository, options).await?;
    if plan.is_empty() {
        log::info!("Notes already up to date");
    }
    let summary = repository.apply(&plan).await?;
    log::info!(
        "Notes: {} added, {} removed, {} folders removed, {} stored",
        summary.notes_added,
        summary.notes_removed,
        summary.folders_removed,
        repository.note_count().await?
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::models::{Note, NoteFolder};
    use crate::storage::connect;
    use tempfile::TempDir;

    /// Folder id → note ids, newest first.
    #[derive(Default)]
    struct FakeNotes {
        folders: Vec<(NoteFolder, Vec<i64>)>,
        full_fetches: Vec<i64>,
        logged_in: bool,
    }

    impl FakeNotes {
        fn with_folder(mut self, id: &str, title: &str, ids: Vec<i64>) -> Self {
            self.folders.push((
                NoteFolder {
                    id: id.to_string(),
                    title: title.to_string(),
                    site_note_count: ids.len() as i64,
                },
                ids,
            ));
            self
        }

        fn ids(&self, folder_id: &str) -> Vec<i64> {
            self.folders
                .iter()
                .find(|(f, _)| f.id == folder_id)
                .map(|(_, ids)| ids.clone())
                .unwrap_or_default()
        }
    }

    fn note(id: i64, folder_id: &str, text: &str) -> Note {
        Note {
            id,
            title: format!("Subject {id}"),
            sender: "Bob".to_string(),
            timestamp: 1_700_000_000 + id,
            text: text.to_string(),
            folder_id: folder_id.to_string(),
        }
    }

    #[async_trait]
    impl Session for FakeNotes {
        async fn login(&mut self) -> Result<()> {
            self.logged_in = true;
            Ok(())
        }

        fn is_logged_in(&self) -> bool {
            self.logged_in
        }

        fn invalidate(&mut self) {
            self.logged_in = false;
        }
    }

    #[async_trait]
    impl NoteArchive for FakeNotes {
        async fn note_folders(&mut self) -> Result<Vec<NoteFolder>> {
            Ok(self.folders.iter().map(|(f, _)| f.clone()).collect())
        }

        async fn notes_page(&mut self, folder_id: &str, offset: usize) -> Result<Vec<Note>> {
            Ok(self
                .ids(folder_id)
                .into_iter()
                .skip(offset)
                .take(NOTES_PAGE_SIZE)
                .map(|id| note(id, folder_id, ""))
                .collect())
        }

        async fn note(&mut self, folder_id: &str, note_id: i64) -> Result<Note> {
            self.full_fetches.push(note_id);
            Ok(note(note_id, folder_id, "Full text"))
        }
    }

    async fn repository(tmp: &TempDir) -> NotesRepository {
        NotesRepository::new(connect(&tmp.path().join("notes.sqlite")).await.unwrap())
    }

    #[tokio::test]
    async fn test_first_run_downloads_everything() {
        let tmp = TempDir::new().unwrap();
        let repo = repository(&tmp).await;
        let mut site = FakeNotes::default()
            .with_folder("1", "Inbox", (1..=30).rev().collect())
            .with_folder("3", "Starred", vec![12]);

        let summary = run_notes(&mut site, &repo, &NotesOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.notes_added, 30);
        assert_eq!(summary.links_added, 31);
        assert_eq!(summary.folders_added, 2);
        assert_eq!(repo.note(12).await.unwrap().unwrap().text, "Full text");
    }

    #[tokio::test]
    async fn test_incremental_fetch_stops_at_last_known() {
        let tmp = TempDir::new().unwrap();
        let repo = repository(&tmp).await;
        let mut site = FakeNotes::default().with_folder("1", "Inbox", vec![5, 4, 3]);
        run_notes(&mut site, &repo, &NotesOptions::default())
            .await
            .unwrap();

        let mut site = FakeNotes::default().with_folder("1", "Inbox", vec![7, 6, 5, 4, 3]);
        let summary = run_notes(&mut site, &repo, &NotesOptions::default())
            .await
            .unwrap();
        assert_eq!(site.full_fetches, vec![7, 6]);
        assert_eq!(summary.notes_added, 2);
    }

    #[tokio::test]
    async fn test_count_mismatch_triggers_audit() {
        let tmp = TempDir::new().unwrap();
        let repo = repository(&tmp).await;
        let mut site = FakeNotes::default().with_folder("1", "Inbox", vec![5, 4, 3]);
        run_notes(&mut site, &repo, &NotesOptions::default())
            .await
            .unwrap();

        // Note 4 deleted upstream; nothing newer arrived
        let mut site = FakeNotes::default().with_folder("1", "Inbox", vec![5, 3]);
        let summary = run_notes(&mut site, &repo, &NotesOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.links_removed, 1);
        assert_eq!(summary.notes_removed, 1);
        assert!(repo.note(4).await.unwrap().is_none());
        assert!(site.full_fetches.is_empty());
    }

    #[tokio::test]
    async fn test_fsck_recovers_missing_older_notes() {
        let tmp = TempDir::new().unwrap();
        let repo = repository(&tmp).await;
        let mut site = FakeNotes::default().with_folder("1", "Inbox", vec![5]);
        run_notes(&mut site, &repo, &NotesOptions::default())
            .await
            .unwrap();

        // Upstream count still matches, so only an audit finds note 2
        let mut site = FakeNotes::default().with_folder("1", "Inbox", vec![5, 2]);
        site.folders[0].0.site_note_count = 1;
        let options = NotesOptions {
            fsck: true,
            ..NotesOptions::default()
        };
        let summary = run_notes(&mut site, &repo, &options).await.unwrap();
        assert_eq!(summary.notes_added, 1);
        assert_eq!(site.full_fetches, vec![2]);
    }

    #[tokio::test]
    async fn test_ignored_and_vanished_folders_are_removed() {
        let tmp = TempDir::new().unwrap();
        let repo = repository(&tmp).await;
        let mut site = FakeNotes::default()
            .with_folder("1", "Inbox", vec![5])
            .with_folder("2", "Sent", vec![6])
            .with_folder("f9", "Old", vec![7]);
        run_notes(&mut site, &repo, &NotesOptions::default())
            .await
            .unwrap();

        let mut site = FakeNotes::default()
            .with_folder("1", "Inbox", vec![5])
            .with_folder("2", "Sent", vec![6]);
        let options = NotesOptions {
            ignored_folders: vec!["Sent".to_string()],
            ..NotesOptions::default()
        };
        let summary = run_notes(&mut site, &repo, &options).await.unwrap();
        assert_eq!(summary.folders_removed, 2);
        assert_eq!(summary.notes_removed, 2);
        let titles = repo.folder_titles().await.unwrap();
        assert_eq!(titles.keys().collect::<Vec<_>>(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_unchanged_run_plans_nothing() {
        let tmp = TempDir::new().unwrap();
        let repo = repository(&tmp).await;
        let mut site = FakeNotes::default().with_folder("1", "Inbox", vec![3, 2, 1]);
        run_notes(&mut site, &repo, &NotesOptions::default())
            .await
            .unwrap();

        let plan = plan_notes(&mut site, &repo, &NotesOptions::default())
            .await
            .unwrap();
        assert!(plan.is_empty());
    }
}
