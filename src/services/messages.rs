// src/services/messages.rs

//! Message center views: comments, replies, unread notes, watched deviations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{EventKind, EventRecord};
use crate::services::difi::{value_to_i64, value_to_string, value_to_text};
use crate::services::{
    DevArtClient, DeviationSource, FeedbackSource, MessageSource, NoteSource,
};
use crate::utils::extract_text;

/// Upstream caps a view at somewhere between 101 and 150 items.
const VIEW_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
struct Hit {
    msgid: Value,
    #[serde(default)]
    title: Value,
    #[serde(default)]
    who: Value,
    #[serde(default)]
    username: Value,
    #[serde(default)]
    ts: Value,
    #[serde(default)]
    url: Value,
    #[serde(default)]
    body: Value,
}

/// Message center query for a kind.
fn view_query(kind: EventKind) -> Option<String> {
    let stack = match kind {
        EventKind::Comments => "fb_comments",
        EventKind::Replies => "fb_replies",
        EventKind::UnreadNotes => "notes_unread",
        EventKind::Deviations => "devwatch",
        EventKind::SentNotes => return None,
    };
    let mut query = format!("oq:{stack}:0:{VIEW_LIMIT}:f");
    if kind == EventKind::Deviations {
        query.push_str(":tg=deviations");
    }
    Some(query)
}

/// Find the inbox in a `MessageCenter;get_folders` result.
pub fn parse_inbox_id(content: &Value) -> Result<String> {
    const CONTEXT: &str = "MessageCenter;get_folders";
    let folders = content
        .as_array()
        .ok_or_else(|| AppError::parse(CONTEXT, "folder list is not an array"))?;

    folders
        .iter()
        .find(|f| f.get("is_inbox").and_then(Value::as_bool).unwrap_or(false))
        .and_then(|f| f.get("folderid"))
        .and_then(value_to_string)
        .ok_or_else(|| AppError::parse(CONTEXT, "no inbox folder in the message center"))
}

/// Convert a `MessageCenter;get_views` result into records.
pub fn parse_hits(kind: EventKind, content: &Value) -> Result<Vec<EventRecord>> {
    let context = format!("MessageCenter;get_views ({kind})");
    let hits = content
        .pointer("/0/result/hits")
        .ok_or_else(|| AppError::parse(&context, "missing result.hits"))?;
    let hits: Vec<Hit> =
        serde_json::from_value(hits.clone()).map_err(|e| AppError::parse(&context, e))?;

    hits.into_iter()
        .map(|hit| {
            let id = value_to_string(&hit.msgid)
                .ok_or_else(|| AppError::parse(&context, "hit without msgid"))?;
            let timestamp = value_to_i64(&hit.ts)
                .ok_or_else(|| AppError::parse(&context, format!("hit {id} without ts")))?;

            let author_field = match kind {
                EventKind::Deviations if !hit.username.is_null() => &hit.username,
                _ => &hit.who,
            };
            let body = match kind {
                EventKind::Comments | EventKind::Replies => {
                    Some(extract_text(&value_to_text(&hit.body), false))
                }
                _ => None,
            };
            let url = value_to_string(&hit.url);

            Ok(EventRecord {
                id,
                kind,
                timestamp,
                author: extract_text(&value_to_text(author_field), true),
                context: extract_text(&value_to_text(&hit.title), true),
                url,
                body,
                unread: (kind == EventKind::UnreadNotes).then_some(true),
            })
        })
        .collect()
}

/// `MessageCenter;get_views` call strings for the given kinds, in order.
fn view_calls(inbox: &str, kinds: &[EventKind]) -> Result<Vec<String>> {
    kinds
        .iter()
        .map(|&kind| {
            view_query(kind)
                .map(|query| format!("MessageCenter;get_views;{inbox},{query}"))
                .ok_or_else(|| {
                    AppError::validation(format!("{kind} is not a message center view"))
                })
        })
        .collect()
}

impl DevArtClient {
    /// Fetch several message center views in one DiFi request.
    async fn fetch_views(
        &mut self,
        kinds: &[EventKind],
    ) -> Result<BTreeMap<EventKind, Vec<EventRecord>>> {
        let inbox = self.inbox_id().await?;
        let calls = view_calls(&inbox, kinds)?;
        let contents = self.difi(&calls).await?;

        let mut fetched = BTreeMap::new();
        for (&kind, content) in kinds.iter().zip(&contents) {
            let records = parse_hits(kind, content)?;
            log::debug!("Fetched {} {}", records.len(), kind);
            fetched.insert(kind, records);
        }
        Ok(fetched)
    }

    async fn fetch_view(&mut self, kind: EventKind) -> Result<Vec<EventRecord>> {
        let mut fetched = self.fetch_views(&[kind]).await?;
        Ok(fetched.remove(&kind).unwrap_or_default())
    }
}

#[async_trait]
impl MessageSource for DevArtClient {
    async fn fetch_messages(&mut self) -> Result<BTreeMap<EventKind, Vec<EventRecord>>> {
        self.fetch_views(&EventKind::MESSAGES).await
    }
}

#[async_trait]
impl FeedbackSource for DevArtClient {
    async fn fetch_comments(&mut self) -> Result<Vec<EventRecord>> {
        self.fetch_view(EventKind::Comments).await
    }

    async fn fetch_replies(&mut self) -> Result<Vec<EventRecord>> {
        self.fetch_view(EventKind::Replies).await
    }
}

#[async_trait]
impl DeviationSource for DevArtClient {
    async fn fetch_watched_deviations(&mut self) -> Result<Vec<EventRecord>> {
        self.fetch_view(EventKind::Deviations).await
    }
}

#[async_trait]
impl NoteSource for DevArtClient {
    async fn fetch_unread_notes(&mut self) -> Result<Vec<EventRecord>> {
        self.fetch_view(EventKind::UnreadNotes).await
    }

    async fn fetch_sent_notes(&mut self) -> Result<Vec<EventRecord>> {
        self.sent_notes().await
    }
}
