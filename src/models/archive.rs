//! Entities mirrored by the downloaders.

use serde::{Deserialize, Serialize};

/// Folder id of the synthetic row holding deviations that are in no gallery folder.
pub const NO_FOLDER_ID: &str = "none";

/// Title of the synthetic folder row.
pub const NO_FOLDER_TITLE: &str = "No folder";

/// A gallery folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GalleryFolder {
    pub id: String,
    pub title: String,
    /// Blank when the folder has no description
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
}

impl GalleryFolder {
    /// The synthetic "no folder" parent.
    pub fn unfiled() -> Self {
        Self {
            id: NO_FOLDER_ID.to_string(),
            title: NO_FOLDER_TITLE.to_string(),
            description: String::new(),
            url: String::new(),
        }
    }
}

/// A deviation owned by the account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deviation {
    /// Numeric deviation id, increases over time
    pub id: i64,
    pub title: String,
    pub url: String,
    pub username: String,
    pub timestamp: i64,
    /// Only known once the deviation page has been fetched
    #[serde(default)]
    pub description: Option<String>,
    /// Gallery folders the deviation appears in
    #[serde(default)]
    pub folder_ids: Vec<String>,
}

impl Deviation {
    /// Folder ids to record, falling back to the synthetic folder.
    pub fn effective_folder_ids(&self) -> Vec<String> {
        if self.folder_ids.is_empty() {
            vec![NO_FOLDER_ID.to_string()]
        } else {
            let mut ids = Vec::with_capacity(self.folder_ids.len());
            for id in &self.folder_ids {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
            ids
        }
    }
}

/// One page of the gallery listing.
#[derive(Debug, Clone, Default)]
pub struct GalleryPage {
    pub deviations: Vec<Deviation>,
    pub folders: Vec<GalleryFolder>,
}

/// A notes folder (Inbox, Sent, Starred, user folders).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteFolder {
    pub id: String,
    pub title: String,
    /// Number of notes upstream reports for the folder
    pub site_note_count: i64,
}

impl NoteFolder {
    /// Whether the folder is named in an ignore list (by id or title).
    pub fn is_ignored(&self, ignored: &[String]) -> bool {
        ignored.iter().any(|i| i == &self.id || i == &self.title)
    }
}

/// A note as listed in a folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub sender: String,
    pub timestamp: i64,
    /// Note body, empty until the note itself has been fetched
    #[serde(default)]
    pub text: String,
    pub folder_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfiled_deviation_maps_to_synthetic_folder() {
        let deviation = Deviation {
            id: 42,
            title: "Sketch".into(),
            url: "https://www.deviantart.com/art/Sketch-42".into(),
            username: "me".into(),
            timestamp: 0,
            description: None,
            folder_ids: vec![],
        };
        assert_eq!(deviation.effective_folder_ids(), vec![NO_FOLDER_ID]);
    }

    #[test]
    fn test_folder_ids_deduplicated() {
        let deviation = Deviation {
            id: 42,
            title: "Sketch".into(),
            url: String::new(),
            username: "me".into(),
            timestamp: 0,
            description: None,
            folder_ids: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(deviation.effective_folder_ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_note_folder_ignored_by_id_or_title() {
        let folder = NoteFolder {
            id: "2".into(),
            title: "Sent".into(),
            site_note_count: 3,
        };
        assert!(folder.is_ignored(&["Sent".into()]));
        assert!(folder.is_ignored(&["2".into()]));
        assert!(!folder.is_ignored(&["Inbox".into()]));
    }
}
