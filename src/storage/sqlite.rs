//! SQLite storage implementation.
//!
//! This module provides the note store backend for gitnotes using SQLite.
//! It follows the MutationContext pattern for transaction discipline and
//! pending-write tracking.

use crate::error::{Error, Result};
use crate::model::{now_secs, Note, NoteState, SyncCheckpoint};
use crate::storage::schema::apply_schema;
use crate::storage::NoteStore;
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

const NOTE_COLUMNS: &str = "id, content, created_at, updated_at, archived_at, deleted_at";

const CHECKPOINT_HEAD_KEY: &str = "last_head";
const CHECKPOINT_TIME_KEY: &str = "last_synced_at";

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures so they can record which notes were written
/// locally. Marked notes become pending writes for the next sync cycle.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// IDs of notes with local writes.
    pub dirty_notes: HashSet<String>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            dirty_notes: HashSet::new(),
        }
    }

    /// Mark a note as a pending write.
    pub fn mark_note_dirty(&mut self, note_id: &str) {
        self.dirty_notes.insert(note_id.to_string());
    }
}

/// Counts of notes by lifecycle state.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct NoteCounts {
    pub active: usize,
    pub archived: usize,
    pub deleted: usize,
}

impl NoteCounts {
    /// Returns total number of notes, tombstones included.
    #[must_use]
    pub fn total(&self) -> usize {
        self.active + self.archived + self.deleted
    }
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Records pending-write markers for every note the closure marked
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op);

        let result = f(&tx, &mut ctx)?;

        let now = now_secs();
        for note_id in &ctx.dirty_notes {
            tx.execute(
                "INSERT INTO dirty_notes (note_id, marked_at) VALUES (?1, ?2)
                 ON CONFLICT(note_id) DO UPDATE SET marked_at = excluded.marked_at",
                rusqlite::params![note_id, now],
            )?;
        }

        tx.commit()?;

        tracing::trace!(op = %ctx.op_name, dirty = ctx.dirty_notes.len(), "mutation committed");
        Ok(result)
    }

    // ===============
    // Note Operations
    // ===============

    /// Create a new note from raw content.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn create_note(&mut self, content: &str) -> Result<Note> {
        let note = Note::new(content);
        self.insert_note(&note)?;
        Ok(note)
    }

    /// Replace a note's content.
    ///
    /// # Errors
    ///
    /// Returns an error if the note does not exist or is deleted.
    pub fn edit_note(&mut self, id: &str, content: &str) -> Result<Note> {
        let mut note = self.require_live_note(id)?;
        note.content = content.to_string();
        note.updated_at = now_secs();
        self.update_note(&note)?;
        Ok(note)
    }

    /// Move a note into the archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the note does not exist or is not active.
    pub fn archive_note(&mut self, id: &str) -> Result<Note> {
        let mut note = self.require_live_note(id)?;
        if note.state() != NoteState::Active {
            let actual = note.state().to_string();
            return Err(Error::InvalidNoteState {
                id: note.id,
                expected: NoteState::Active.to_string(),
                actual,
            });
        }
        let now = now_secs();
        note.archived_at = Some(now);
        note.updated_at = now;
        self.update_note(&note)?;
        Ok(note)
    }

    /// Bring a note back from the archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the note does not exist or is not archived.
    pub fn unarchive_note(&mut self, id: &str) -> Result<Note> {
        let mut note = self.require_live_note(id)?;
        if note.state() != NoteState::Archived {
            let actual = note.state().to_string();
            return Err(Error::InvalidNoteState {
                id: note.id,
                expected: NoteState::Archived.to_string(),
                actual,
            });
        }
        note.archived_at = None;
        note.updated_at = now_secs();
        self.update_note(&note)?;
        Ok(note)
    }

    /// Soft-delete a note, leaving a tombstone for the next sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the note does not exist or is already deleted.
    pub fn delete_note(&mut self, id: &str) -> Result<Note> {
        let mut note = self.require_live_note(id)?;
        let now = now_secs();
        self.soft_delete_note(&note.id, now)?;
        note.deleted_at = Some(now);
        note.updated_at = now;
        Ok(note)
    }

    /// Resolve a full note ID from a unique prefix.
    ///
    /// # Errors
    ///
    /// Returns `NoteNotFound` when nothing matches and `AmbiguousId` when
    /// more than one note matches.
    pub fn resolve_note_id(&self, prefix: &str) -> Result<String> {
        if prefix.trim().is_empty() {
            return Err(Error::InvalidArgument("note id must not be empty".to_string()));
        }
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM notes WHERE id LIKE ?1 || '%' ORDER BY id LIMIT 6")?;
        let matches = stmt
            .query_map([prefix], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if let Some(exact) = matches.iter().find(|id| id.as_str() == prefix) {
            return Ok(exact.clone());
        }
        match matches.len() {
            0 => Err(Error::NoteNotFound {
                id: prefix.to_string(),
            }),
            1 => Ok(matches.into_iter().next().unwrap_or_default()),
            _ => Err(Error::AmbiguousId {
                prefix: prefix.to_string(),
                matches,
            }),
        }
    }

    /// Count notes by lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_notes(&self) -> Result<NoteCounts> {
        let (active, archived, deleted): (i64, i64, i64) = self.conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN deleted_at IS NULL AND archived_at IS NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN deleted_at IS NULL AND archived_at IS NOT NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN deleted_at IS NOT NULL THEN 1 ELSE 0 END), 0)
             FROM notes",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(NoteCounts {
            active: usize::try_from(active).unwrap_or_default(),
            archived: usize::try_from(archived).unwrap_or_default(),
            deleted: usize::try_from(deleted).unwrap_or_default(),
        })
    }

    fn require_live_note(&self, id: &str) -> Result<Note> {
        let note = self.get_note(id)?.ok_or_else(|| Error::NoteNotFound {
            id: id.to_string(),
        })?;
        if note.is_deleted() {
            return Err(Error::InvalidNoteState {
                id: note.id,
                expected: "active or archived".to_string(),
                actual: NoteState::Deleted.to_string(),
            });
        }
        Ok(note)
    }
}

impl NoteStore for SqliteStorage {
    fn list_notes(&self) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], map_note_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn get_note(&self, id: &str) -> Result<Option<Note>> {
        let note = self
            .conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
                [id],
                map_note_row,
            )
            .optional()?;
        Ok(note)
    }

    fn insert_note(&mut self, note: &Note) -> Result<()> {
        self.mutate("insert_note", |tx, ctx| {
            tx.execute(
                &format!("INSERT INTO notes ({NOTE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                rusqlite::params![
                    note.id,
                    note.content,
                    note.created_at,
                    note.updated_at,
                    note.archived_at,
                    note.deleted_at,
                ],
            )?;
            ctx.mark_note_dirty(&note.id);
            Ok(())
        })
    }

    fn update_note(&mut self, note: &Note) -> Result<()> {
        self.mutate("update_note", |tx, ctx| {
            let rows = tx.execute(
                "UPDATE notes SET content = ?2, updated_at = ?3, archived_at = ?4, deleted_at = ?5
                 WHERE id = ?1",
                rusqlite::params![
                    note.id,
                    note.content,
                    note.updated_at,
                    note.archived_at,
                    note.deleted_at,
                ],
            )?;
            if rows == 0 {
                return Err(Error::NoteNotFound {
                    id: note.id.clone(),
                });
            }
            ctx.mark_note_dirty(&note.id);
            Ok(())
        })
    }

    fn soft_delete_note(&mut self, id: &str, deleted_at: i64) -> Result<bool> {
        self.mutate("soft_delete_note", |tx, ctx| {
            let rows = tx.execute(
                "UPDATE notes SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                rusqlite::params![id, deleted_at],
            )?;
            if rows > 0 {
                ctx.mark_note_dirty(id);
            }
            Ok(rows > 0)
        })
    }

    fn apply_synced_note(&mut self, note: &Note) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO notes ({NOTE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                   content = excluded.content,
                   created_at = excluded.created_at,
                   updated_at = excluded.updated_at,
                   archived_at = excluded.archived_at,
                   deleted_at = excluded.deleted_at"
            ),
            rusqlite::params![
                note.id,
                note.content,
                note.created_at,
                note.updated_at,
                note.archived_at,
                note.deleted_at,
            ],
        )?;
        Ok(())
    }

    fn pending_note_ids(&self) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT note_id FROM dirty_notes ORDER BY marked_at ASC")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<std::result::Result<HashSet<_>, _>>()
            .map_err(Error::from)
    }

    fn clear_pending(&mut self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("DELETE FROM dirty_notes WHERE note_id IN ({placeholders})");
        let params: Vec<&dyn rusqlite::ToSql> =
            ids.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
        self.conn.execute(&sql, params.as_slice())?;
        Ok(())
    }

    fn sync_checkpoint(&self) -> Result<SyncCheckpoint> {
        let head = get_state(&self.conn, CHECKPOINT_HEAD_KEY)?;
        let synced_at = get_state(&self.conn, CHECKPOINT_TIME_KEY)?
            .and_then(|value| value.parse::<i64>().ok());
        Ok(SyncCheckpoint { head, synced_at })
    }

    fn set_sync_checkpoint(&mut self, checkpoint: &SyncCheckpoint) -> Result<()> {
        let tx = self.conn.transaction()?;
        set_state(&tx, CHECKPOINT_HEAD_KEY, checkpoint.head.as_deref())?;
        set_state(
            &tx,
            CHECKPOINT_TIME_KEY,
            checkpoint.synced_at.map(|t| t.to_string()).as_deref(),
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn get_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM sync_state WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

fn set_state(conn: &Connection, key: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(value) => conn.execute(
            "INSERT INTO sync_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )?,
        None => conn.execute("DELETE FROM sync_state WHERE key = ?1", [key])?,
    };
    Ok(())
}

fn map_note_row(row: &rusqlite::Row) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        content: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
        archived_at: row.get(4)?,
        deleted_at: row.get(5)?,
    })
}
