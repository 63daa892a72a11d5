//! SQLite storage layer for gitnotes.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - Pending-write tracking for export to the working tree
//!
//! # Submodules
//!
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod schema;
pub mod sqlite;

pub use sqlite::{MutationContext, NoteCounts, SqliteStorage};

use std::collections::HashSet;

use crate::error::Result;
use crate::model::{Note, SyncCheckpoint};

/// The structured note store consumed by the sync engine.
///
/// Local mutations (`insert_note`, `update_note`, `soft_delete_note`) mark
/// the note as a pending write. `apply_synced_note` records state that
/// arrived from the repository and never marks anything pending.
pub trait NoteStore {
    /// All notes, tombstones included, oldest first.
    fn list_notes(&self) -> Result<Vec<Note>>;

    fn get_note(&self, id: &str) -> Result<Option<Note>>;

    fn insert_note(&mut self, note: &Note) -> Result<()>;

    fn update_note(&mut self, note: &Note) -> Result<()>;

    /// Set `deleted_at` on a note. Returns `false` if no such note exists.
    fn soft_delete_note(&mut self, id: &str, deleted_at: i64) -> Result<bool>;

    /// Upsert a note reconciled from the repository.
    fn apply_synced_note(&mut self, note: &Note) -> Result<()>;

    /// IDs of notes with local writes not yet exported.
    fn pending_note_ids(&self) -> Result<HashSet<String>>;

    fn clear_pending(&mut self, ids: &[String]) -> Result<()>;

    fn sync_checkpoint(&self) -> Result<SyncCheckpoint>;

    fn set_sync_checkpoint(&mut self, checkpoint: &SyncCheckpoint) -> Result<()>;
}
