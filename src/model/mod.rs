//! Data models for gitnotes.
//!
//! This module contains the domain models:
//! - Note
//! - SyncCheckpoint

pub mod checkpoint;
pub mod note;

pub use checkpoint::SyncCheckpoint;
pub use note::{new_note_id, now_secs, Note, NoteState};
