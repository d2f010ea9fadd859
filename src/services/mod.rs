//! Service layer: access to the site.
//!
//! Each command depends only on the capabilities it needs:
//! - `Session`: login state
//! - `FeedbackSource`: comments and replies from the message center
//! - `NoteSource`: unread received notes and the state of sent notes
//! - `DeviationSource`: deviations from watched users
//! - `MessageSource`: all of the above, fetched together for the message checker
//! - `GalleryArchive`: the account's gallery for the deviations downloader
//! - `NoteArchive`: note folders and notes for the notes downloader
//!
//! `DevArtClient` implements all of them.

mod client;
pub mod difi;
mod gallery;
mod messages;
mod notes;
pub mod selectors;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{EventKind, EventRecord, GalleryPage, Note, NoteFolder};

pub use client::DevArtClient;
pub use gallery::{parse_deviation_description, parse_gallery_page};
pub use messages::{parse_hits, parse_inbox_id};
pub use notes::{ListedNote, parse_note_detail, parse_note_folders, parse_notes_page};

/// Deviations returned per `Gallections;get_deviations` call.
pub const GALLERY_PAGE_SIZE: usize = 120;

/// Notes returned per `Notes;display_folder` call.
pub const NOTES_PAGE_SIZE: usize = 25;

/// Folder id of the Sent notes folder.
pub const SENT_FOLDER_ID: &str = "2";

#[async_trait]
pub trait Session: Send {
    /// Establish a fresh session.
    async fn login(&mut self) -> Result<()>;

    fn is_logged_in(&self) -> bool;

    /// Forget the session so the next call logs in again.
    fn invalidate(&mut self);

    async fn ensure_logged_in(&mut self) -> Result<()> {
        if !self.is_logged_in() {
            self.login().await?;
        }
        Ok(())
    }
}

#[async_trait]
pub trait FeedbackSource: Send {
    async fn fetch_comments(&mut self) -> Result<Vec<EventRecord>>;
    async fn fetch_replies(&mut self) -> Result<Vec<EventRecord>>;
}

#[async_trait]
pub trait NoteSource: Send {
    /// Unread notes waiting in the inbox.
    async fn fetch_unread_notes(&mut self) -> Result<Vec<EventRecord>>;

    /// Recent sent notes with their read state; `author` is the recipient.
    async fn fetch_sent_notes(&mut self) -> Result<Vec<EventRecord>>;
}

#[async_trait]
pub trait DeviationSource: Send {
    async fn fetch_watched_deviations(&mut self) -> Result<Vec<EventRecord>>;
}

/// Everything the message checker reads from the site.
#[async_trait]
pub trait MessageSource: Session + FeedbackSource + NoteSource + DeviationSource {
    /// Every message center kind, keyed by kind.
    async fn fetch_messages(&mut self) -> Result<BTreeMap<EventKind, Vec<EventRecord>>> {
        let mut fetched = BTreeMap::new();
        for kind in EventKind::MESSAGES {
            let records = match kind {
                EventKind::Comments => self.fetch_comments().await?,
                EventKind::Replies => self.fetch_replies().await?,
                EventKind::UnreadNotes => self.fetch_unread_notes().await?,
                EventKind::Deviations => self.fetch_watched_deviations().await?,
                EventKind::SentNotes => self.fetch_sent_notes().await?,
            };
            fetched.insert(kind, records);
        }
        Ok(fetched)
    }
}

#[async_trait]
pub trait GalleryArchive: Send {
    /// One page of the account's gallery, newest first.
    async fn gallery_page(&mut self, offset: usize) -> Result<GalleryPage>;

    /// Description text from a deviation's page.
    async fn deviation_description(&mut self, url: &str) -> Result<String>;
}

#[async_trait]
pub trait NoteArchive: Send {
    async fn note_folders(&mut self) -> Result<Vec<NoteFolder>>;

    /// One page of a folder's notes, newest first; text is not filled in.
    async fn notes_page(&mut self, folder_id: &str, offset: usize) -> Result<Vec<Note>>;

    /// A single note including its text.
    async fn note(&mut self, folder_id: &str, note_id: i64) -> Result<Note>;

    /// Every note id currently in a folder.
    async fn note_ids(&mut self, folder_id: &str) -> Result<BTreeSet<i64>> {
        let mut ids = BTreeSet::new();
        let mut offset = 0;
        loop {
            let page = self.notes_page(folder_id, offset).await?;
            let count = page.len();
            ids.extend(page.into_iter().map(|n| n.id));
            if count < NOTES_PAGE_SIZE {
                return Ok(ids);
            }
            offset += NOTES_PAGE_SIZE;
        }
    }
}
