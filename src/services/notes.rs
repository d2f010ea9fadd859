// src/services/notes.rs

//! Notes folders: listings, single notes and the Sent folder's read state.

use async_trait::async_trait;
use scraper::{ElementRef, Html};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{EventKind, EventRecord, Note, NoteFolder};
use crate::services::difi::{value_to_i64, value_to_string, value_to_text};
use crate::services::selectors::{self, parse_selector};
use crate::services::{DevArtClient, NOTES_PAGE_SIZE, NoteArchive, SENT_FOLDER_ID};
use crate::utils::extract_text;

/// Sent notes pages checked per cycle for read state.
const SENT_NOTES_PAGES: usize = 4;

/// A note row from a folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedNote {
    pub note: Note,
    pub unread: bool,
}

/// Parse a `Notes;get_folders` result.
pub fn parse_note_folders(content: &Value) -> Result<Vec<NoteFolder>> {
    const CONTEXT: &str = "Notes;get_folders";
    let folders = content
        .as_array()
        .ok_or_else(|| AppError::parse(CONTEXT, "folder list is not an array"))?;

    folders
        .iter()
        .map(|f| {
            let id = f
                .get("folderid")
                .and_then(value_to_string)
                .ok_or_else(|| AppError::parse(CONTEXT, "folder without folderid"))?;
            Ok(NoteFolder {
                title: extract_text(&value_to_text(&f["title"]), true),
                site_note_count: f.get("count").and_then(value_to_i64).unwrap_or(0),
                id,
            })
        })
        .collect()
}

/// HTML carried by a notes call, sent either bare or as `{"body": ...}`.
fn content_html<'a>(content: &'a Value, context: &str) -> Result<&'a str> {
    content
        .as_str()
        .or_else(|| content.get("body").and_then(Value::as_str))
        .ok_or_else(|| AppError::parse(context, "response carries no HTML"))
}

struct NoteSelectors {
    title: scraper::Selector,
    sender: scraper::Selector,
    timestamp: scraper::Selector,
}

impl NoteSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            title: parse_selector(selectors::NOTE_TITLE)?,
            sender: parse_selector(selectors::NOTE_SENDER)?,
            timestamp: parse_selector(selectors::NOTE_TIMESTAMP)?,
        })
    }

    fn note(&self, element: ElementRef<'_>, folder_id: &str, context: &str) -> Result<Note> {
        let id = element
            .value()
            .attr(selectors::NOTE_ID_ATTR)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or_else(|| AppError::parse(context, "note without a numeric id"))?;

        let text_of = |sel: &scraper::Selector| {
            element
                .select(sel)
                .next()
                .map(|e| extract_text(&e.inner_html(), true))
                .unwrap_or_default()
        };

        let timestamp = element
            .select(&self.timestamp)
            .next()
            .and_then(|e| e.value().attr(selectors::TIMESTAMP_ATTR))
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or_else(|| AppError::parse(context, format!("note {id} has no timestamp")))?;

        Ok(Note {
            id,
            title: text_of(&self.title),
            sender: text_of(&self.sender),
            timestamp,
            text: String::new(),
            folder_id: folder_id.to_string(),
        })
    }
}

/// Parse a `Notes;display_folder` listing.
pub fn parse_notes_page(html: &str, folder_id: &str) -> Result<Vec<ListedNote>> {
    let context = format!("Notes;display_folder ({folder_id})");
    let document = Html::parse_fragment(html);
    let item_sel = parse_selector(selectors::NOTE_ITEM)?;
    let note_selectors = NoteSelectors::new()?;

    document
        .select(&item_sel)
        .map(|item| {
            let unread = item.value().classes().any(|c| c == selectors::UNREAD_CLASS);
            Ok(ListedNote {
                note: note_selectors.note(item, folder_id, &context)?,
                unread,
            })
        })
        .collect()
}

/// Parse a `Notes;display_note` page, including the note text.
pub fn parse_note_detail(html: &str, folder_id: &str) -> Result<Note> {
    let context = format!("Notes;display_note ({folder_id})");
    let document = Html::parse_fragment(html);
    let detail_sel = parse_selector(selectors::NOTE_DETAIL)?;
    let text_sel = parse_selector(selectors::NOTE_TEXT)?;

    let detail = document
        .select(&detail_sel)
        .next()
        .ok_or_else(|| AppError::parse(&context, "no note on the page"))?;

    let mut note = NoteSelectors::new()?.note(detail, folder_id, &context)?;
    note.text = detail
        .select(&text_sel)
        .next()
        .map(|e| extract_text(&e.inner_html(), false))
        .unwrap_or_default();
    Ok(note)
}

impl ListedNote {
    /// Sent folder row as a record; the listed name is the recipient.
    fn into_sent_record(self) -> EventRecord {
        EventRecord {
            id: self.note.id.to_string(),
            kind: EventKind::SentNotes,
            timestamp: self.note.timestamp,
            author: self.note.sender,
            context: self.note.title,
            url: None,
            body: None,
            unread: Some(self.unread),
        }
    }
}

impl DevArtClient {
    async fn listed_notes(&self, folder_id: &str, offset: usize) -> Result<Vec<ListedNote>> {
        let call = format!("Notes;display_folder;{folder_id},{offset},false");
        let content = self.difi_one(call).await?;
        let html = content_html(&content, "Notes;display_folder")?;
        parse_notes_page(html, folder_id)
    }

    /// Newest sent notes with their read state.
    pub(crate) async fn sent_notes(&self) -> Result<Vec<EventRecord>> {
        let mut records = Vec::new();
        for page in 0..SENT_NOTES_PAGES {
            let listed = self
                .listed_notes(SENT_FOLDER_ID, page * NOTES_PAGE_SIZE)
                .await?;
            let count = listed.len();
            records.extend(listed.into_iter().map(ListedNote::into_sent_record));
            if count < NOTES_PAGE_SIZE {
                break;
            }
        }
        log::debug!("Fetched {} sent notes", records.len());
        Ok(records)
    }
}

#[async_trait]
impl NoteArchive for DevArtClient {
    async fn note_folders(&mut self) -> Result<Vec<NoteFolder>> {
        let content = self.difi_one("Notes;get_folders".to_string()).await?;
        parse_note_folders(&content)
    }

    async fn notes_page(&mut self, folder_id: &str, offset: usize) -> Result<Vec<Note>> {
        let listed = self.listed_notes(folder_id, offset).await?;
        Ok(listed.into_iter().map(|l| l.note).collect())
    }

    async fn note(&mut self, folder_id: &str, note_id: i64) -> Result<Note> {
        let call = format!("Notes;display_note;{folder_id},{note_id}");
        let content = self.difi_one(call).await?;
        let html = content_html(&content, "Notes;display_note")?;
        let note = parse_note_detail(html, folder_id)?;
        if note.id != note_id {
            return Err(AppError::parse(
                "Notes;display_note",
                format!("asked for note {note_id}, got {}", note.id),
            ));
        }
        Ok(note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FOLDER_PAGE: &str = r##"
        <ul class="notes">
          <li class="note unread" data-noteid="302">
            <span class="note-title"><a href="#">Commission
              question</a></span>
            <span class="note-sender"><a class="username">Bob</a></span>
            <abbr class="ts" data-ts="1700000300" title="Nov 14, 2023">2h ago</abbr>
          </li>
          <li class="note" data-noteid="301">
            <span class="note-title">Thanks!</span>
            <span class="note-sender">Alice</span>
            <abbr class="ts" data-ts="1700000200">3h ago</abbr>
          </li>
        </ul>
    "##;

    const NOTE_PAGE: &str = r#"
        <div class="note-detail" data-noteid="301">
          <h2 class="note-title">Thanks!</h2>
          <span class="note-sender">Alice</span>
          <abbr class="ts" data-ts="1700000200">3h ago</abbr>
          <div class="note-text">Hi,<br/>thanks for the llama.</div>
        </div>
    "#;

    #[test]
    fn test_parse_note_folders() {
        let content = json!([
            {"folderid": "1", "title": "Inbox", "count": "12"},
            {"folderid": 2, "title": "Sent", "count": 40},
            {"folderid": "f7a", "title": "Commissions"}
        ]);
        let folders = parse_note_folders(&content).unwrap();
        assert_eq!(folders.len(), 3);
        assert_eq!(folders[0].site_note_count, 12);
        assert_eq!(folders[1].id, "2");
        assert_eq!(folders[2].site_note_count, 0);
    }

    #[test]
    fn test_parse_notes_page() {
        let notes = parse_notes_page(FOLDER_PAGE, "1").unwrap();
        assert_eq!(notes.len(), 2);

        assert_eq!(notes[0].note.id, 302);
        assert_eq!(notes[0].note.title, "Commission question");
        assert_eq!(notes[0].note.sender, "Bob");
        assert_eq!(notes[0].note.timestamp, 1_700_000_300);
        assert_eq!(notes[0].note.folder_id, "1");
        assert!(notes[0].unread);

        assert_eq!(notes[1].note.id, 301);
        assert!(!notes[1].unread);
    }

    #[test]
    fn test_empty_listing() {
        assert!(parse_notes_page("<ul class=\"notes\"></ul>", "1").unwrap().is_empty());
    }

    #[test]
    fn test_note_without_id_is_parse_error() {
        let html = r#"<li class="note"><abbr class="ts" data-ts="1"></abbr></li>"#;
        assert!(parse_notes_page(html, "1").unwrap_err().is_parse());
    }

    #[test]
    fn test_note_without_timestamp_is_parse_error() {
        let html = r#"<li class="note" data-noteid="7"><span class="note-title">Hi</span></li>"#;
        let err = parse_notes_page(html, "1").unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("note 7"));
    }

    #[test]
    fn test_parse_note_detail() {
        let note = parse_note_detail(NOTE_PAGE, "1").unwrap();
        assert_eq!(note.id, 301);
        assert_eq!(note.title, "Thanks!");
        assert_eq!(note.sender, "Alice");
        assert_eq!(note.text, "Hi,\nthanks for the llama.");
    }

    #[test]
    fn test_content_html_accepts_both_shapes() {
        assert_eq!(content_html(&json!("<ul></ul>"), "x").unwrap(), "<ul></ul>");
        assert_eq!(
            content_html(&json!({"body": "<ul></ul>"}), "x").unwrap(),
            "<ul></ul>"
        );
        assert!(content_html(&json!(5), "x").is_err());
    }

    #[test]
    fn test_sent_record_uses_recipient_and_read_state() {
        let listed = parse_notes_page(FOLDER_PAGE, SENT_FOLDER_ID).unwrap();
        let record = listed[0].clone().into_sent_record();
        assert_eq!(record.kind, EventKind::SentNotes);
        assert_eq!(record.id, "302");
        assert_eq!(record.author, "Bob");
        assert_eq!(record.unread, Some(true));
        assert_eq!(record.context, "Commission question");

        let read = listed[1].clone().into_sent_record();
        assert_eq!(read.author, "Alice");
        assert_eq!(read.unread, Some(false));
    }
}
