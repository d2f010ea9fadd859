//! CSS selectors for the pages and HTML fragments the site returns.
//!
//! Kept in one place so a markup change upstream is a one-file fix.

use scraper::Selector;

use crate::error::{AppError, Result};

/// Login form on `/users/login`; its presence after posting means rejection.
pub const LOGIN_FORM: &str = "form#form-login";
pub const LOGIN_TOKEN: &str = "input[name=\"validate_token\"]";
pub const LOGIN_KEY: &str = "input[name=\"validate_key\"]";

/// One row of a `Notes;display_folder` listing. Carries `data-noteid`
/// and the `unread` class.
pub const NOTE_ITEM: &str = "li.note";
/// Wrapper of a `Notes;display_note` page.
pub const NOTE_DETAIL: &str = "div.note-detail";
pub const NOTE_TITLE: &str = ".note-title";
/// Sender in received folders, recipient in the Sent folder.
pub const NOTE_SENDER: &str = ".note-sender";
/// Carries the unix timestamp in `data-ts`.
pub const NOTE_TIMESTAMP: &str = "abbr.ts";
pub const NOTE_TEXT: &str = ".note-text";

pub const DEVIATION_DESCRIPTION: &str = ".dev-description";

/// Attribute names read from the elements above.
pub const NOTE_ID_ATTR: &str = "data-noteid";
pub const TIMESTAMP_ATTR: &str = "data-ts";
pub const UNREAD_CLASS: &str = "unread";

pub fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
