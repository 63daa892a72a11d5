//! Sync status display.
//!
//! Answers "what would the next sync do?" without touching the remote:
//! pending notes, the last checkpoint, working tree state and the lock.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::git::{Git2Repository, GitRepository};
use crate::storage::{NoteCounts, NoteStore, SqliteStorage};
use crate::sync::lock::{read_lock_meta, SyncLockMeta};
use crate::sync::register::FileNameRegister;
use crate::sync::syncer::pending_notes;

/// Snapshot of local sync state.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub repo_path: String,
    pub remote: String,
    pub remote_url: Option<String>,
    pub branch: String,
    pub head: Option<String>,
    /// Head recorded by the last completed cycle.
    pub last_synced_head: Option<String>,
    /// Start of the last completed cycle (Unix seconds).
    pub last_synced_at: Option<i64>,
    /// IDs of notes the next sync would write.
    pub pending: Vec<String>,
    pub notes: NoteCounts,
    pub registered_files: usize,
    /// Uncommitted changes left by an interrupted cycle.
    pub working_tree_dirty: bool,
    pub lock: Option<SyncLockMeta>,
}

/// Collect the current sync status.
///
/// # Errors
///
/// Returns an error if the database or repository cannot be read.
pub fn get_sync_status(
    storage: &SqliteStorage,
    repo: &Git2Repository,
    register: &FileNameRegister,
    lock_path: &Path,
) -> Result<SyncStatus> {
    let checkpoint = storage.sync_checkpoint()?;
    let pending = pending_notes(storage)?
        .into_iter()
        .map(|n| n.id)
        .collect();

    Ok(SyncStatus {
        repo_path: repo.workdir().display().to_string(),
        remote: repo.remote_name().to_string(),
        remote_url: repo.remote_url(),
        branch: repo.branch().to_string(),
        head: repo.head_commit()?.map(|c| c.to_string()),
        last_synced_head: checkpoint.head,
        last_synced_at: checkpoint.synced_at,
        pending,
        notes: storage.count_notes()?,
        registered_files: register.len(),
        working_tree_dirty: repo.has_changes()?,
        lock: read_lock_meta(lock_path),
    })
}

/// Print sync status to stdout in a human-readable format.
pub fn print_status(status: &SyncStatus) {
    println!("{}", "Sync Status".bold().underline());
    println!();

    println!("{}", "Repository:".blue().bold());
    println!("  Path:    {}", status.repo_path);
    match &status.remote_url {
        Some(url) => println!("  Remote:  {} ({url})", status.remote),
        None => println!("  Remote:  {}", "none configured".dimmed()),
    }
    println!("  Branch:  {}", status.branch);
    println!(
        "  Head:    {}",
        status.head.as_deref().map_or("(no commits)", short_id)
    );
    println!();

    println!("{}", "Notes:".blue().bold());
    println!("  Active:   {}", status.notes.active);
    println!("  Archived: {}", status.notes.archived);
    println!("  Deleted:  {}", status.notes.deleted);
    println!("  Files:    {}", status.registered_files);
    println!();

    match status.last_synced_at {
        Some(at) => println!(
            "Last sync: {} at {}",
            format_time(at),
            status.last_synced_head.as_deref().map_or("-", short_id)
        ),
        None => println!("{}", "Never synced.".yellow()),
    }

    if status.pending.is_empty() {
        println!("{}", "No pending changes to sync.".green());
    } else {
        println!(
            "{} {}",
            "Pending:".yellow().bold(),
            status.pending.len()
        );
        println!("{}", "Run 'gitnotes sync' to push pending changes.".dimmed());
    }

    if status.working_tree_dirty {
        println!(
            "{}",
            "Working tree has uncommitted changes; the next sync will commit them first."
                .yellow()
        );
    }

    if let Some(lock) = &status.lock {
        println!(
            "{}",
            format!(
                "Sync in progress (pid {}, started {}).",
                lock.pid,
                format_time(lock.started_at)
            )
            .yellow()
        );
    }
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(8)]
}

fn format_time(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map_or_else(|| secs.to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::Author;
    use crate::sync::file::WorkingTree;
    use tempfile::TempDir;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "1970-01-01 00:00:00 UTC");
    }

    #[test]
    fn test_get_sync_status_fresh_repo() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Git2Repository::init(&temp_dir.path().join("repo"), Author::default()).unwrap();
        let mut storage = SqliteStorage::open(&temp_dir.path().join("notes.db")).unwrap();
        storage.create_note("# First").unwrap();
        let register = FileNameRegister::in_memory(WorkingTree::new(repo.workdir()));

        let status =
            get_sync_status(&storage, &repo, &register, &temp_dir.path().join("sync.lock"))
                .unwrap();

        assert_eq!(status.branch, "main");
        assert!(status.head.is_none());
        assert!(status.remote_url.is_none());
        assert_eq!(status.pending.len(), 1);
        assert_eq!(status.notes.active, 1);
        assert!(!status.working_tree_dirty);
        assert!(status.lock.is_none());
    }
}
