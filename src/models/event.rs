//! Event records fetched from the message center and notes folders.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Category of a fetched event. The serialized names double as
/// configuration keys (`[check.whitelist] comments = [...]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Comments,
    Replies,
    UnreadNotes,
    Deviations,
    SentNotes,
}

impl EventKind {
    /// Kinds tracked by the message checker, in notification order.
    pub const MESSAGES: [EventKind; 4] = [
        EventKind::Deviations,
        EventKind::UnreadNotes,
        EventKind::Replies,
        EventKind::Comments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Comments => "comments",
            EventKind::Replies => "replies",
            EventKind::UnreadNotes => "unread_notes",
            EventKind::Deviations => "deviations",
            EventKind::SentNotes => "sent_notes",
        }
    }

    /// Human-readable notification subject for new items of this kind.
    pub fn subject(&self) -> &'static str {
        match self {
            EventKind::Comments => "New Comments",
            EventKind::Replies => "New Replies",
            EventKind::UnreadNotes => "New Unread Notes",
            EventKind::Deviations => "New Deviations",
            EventKind::SentNotes => "Freshly-Read Notes",
        }
    }
}

impl FromStr for EventKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comments" => Ok(EventKind::Comments),
            "replies" => Ok(EventKind::Replies),
            "unread_notes" => Ok(EventKind::UnreadNotes),
            "deviations" => Ok(EventKind::Deviations),
            "sent_notes" => Ok(EventKind::SentNotes),
            other => Err(AppError::config(format!(
                "'{other}' is not an event kind; use comments/replies/unread_notes/deviations/sent_notes"
            ))),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single fetched item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    /// Upstream identifier, unique within its kind
    pub id: String,

    pub kind: EventKind,

    /// Unix timestamp (seconds)
    pub timestamp: i64,

    /// Commenter, note sender, deviation owner, or recipient of a sent note
    pub author: String,

    /// Deviation title a comment was left on, note subject, or deviation title
    pub context: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Read state, only known for notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread: Option<bool>,
}

impl EventRecord {
    /// Timestamp rendered in local time.
    pub fn local_time(&self) -> String {
        chrono::DateTime::from_timestamp(self.timestamp, 0)
            .map(|t| {
                t.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| self.timestamp.to_string())
    }

    pub fn is_read(&self) -> bool {
        self.unread == Some(false)
    }
}
