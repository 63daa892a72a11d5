//! Note model for gitnotes.
//!
//! A note is the unit of synchronization. Its first non-empty line is the
//! heading used to name its file; everything after that is the body.

use serde::{Deserialize, Serialize};

/// Lifecycle state derived from the two nullable timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteState {
    Active,
    Archived,
    Deleted,
}

impl NoteState {
    /// Lowercase label used in CLI output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for NoteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A note owned by the note store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Client-generated identifier, immutable for the note's life.
    pub id: String,

    /// Full text. Opaque except for heading extraction.
    pub content: String,

    /// Creation timestamp (Unix seconds)
    pub created_at: i64,

    /// Last update timestamp (Unix seconds)
    pub updated_at: i64,

    /// Set when the note is archived (Unix seconds)
    pub archived_at: Option<i64>,

    /// Set when the note is soft-deleted (Unix seconds)
    pub deleted_at: Option<i64>,
}

impl Note {
    /// Create a new active note stamped with the current second.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self::with_timestamps(new_note_id(), content, now_secs(), now_secs())
    }

    /// Create an active note with explicit identity and timestamps.
    #[must_use]
    pub fn with_timestamps(
        id: impl Into<String>,
        content: impl Into<String>,
        created_at: i64,
        updated_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            created_at,
            updated_at,
            archived_at: None,
            deleted_at: None,
        }
    }

    /// Lifecycle state. A tombstone wins over the archive flag.
    #[must_use]
    pub fn state(&self) -> NoteState {
        if self.deleted_at.is_some() {
            NoteState::Deleted
        } else if self.archived_at.is_some() {
            NoteState::Archived
        } else {
            NoteState::Active
        }
    }

    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.state() == NoteState::Archived
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the note should appear in normal listings.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// First non-empty line of the content, trimmed.
    #[must_use]
    pub fn heading(&self) -> &str {
        self.content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("")
    }

    /// Everything after the heading line.
    #[must_use]
    pub fn body(&self) -> &str {
        let mut offset = 0;
        for line in self.content.split_inclusive('\n') {
            offset += line.len();
            if !line.trim().is_empty() {
                return &self.content[offset..];
            }
        }
        ""
    }
}

/// Generate a new note identifier.
#[must_use]
pub fn new_note_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time truncated to whole seconds.
///
/// Git commit timestamps carry second precision, so every stored timestamp
/// does too.
#[must_use]
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_skips_blank_lines() {
        let note = Note::new("\n\n  # Groceries  \nmilk\neggs\n");
        assert_eq!(note.heading(), "# Groceries");
        assert_eq!(note.body(), "milk\neggs\n");
    }

    #[test]
    fn test_heading_of_empty_note() {
        let note = Note::new("   \n\n");
        assert_eq!(note.heading(), "");
        assert_eq!(note.body(), "");
    }

    #[test]
    fn test_state_derivation() {
        let mut note = Note::new("# a");
        assert_eq!(note.state(), NoteState::Active);

        note.archived_at = Some(10);
        assert_eq!(note.state(), NoteState::Archived);
        assert!(note.is_visible());

        note.deleted_at = Some(20);
        assert_eq!(note.state(), NoteState::Deleted);
        assert!(!note.is_archived());
        assert!(!note.is_visible());
    }

    #[test]
    fn test_new_note_timestamps_are_whole_seconds() {
        let before = chrono::Utc::now().timestamp();
        let note = Note::new("# a");
        assert!(note.created_at >= before);
        assert_eq!(note.created_at, note.updated_at);
    }
}
