//! Sync types shared by the git layer, the registry and the syncer.

use std::path::PathBuf;

use serde::Serialize;

/// What a sync cycle did, for reporting to the caller.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Head commit after the cycle.
    pub head: Option<String>,
    /// How the pull integrated the remote.
    pub pull: String,
    /// Notes reconciled from the repository into the store.
    pub imported: ImportStats,
    /// Notes written from the store into the working tree.
    pub exported: ExportStats,
    /// Notes created to preserve conflicting local content.
    pub forked: usize,
    /// Whether a commit was created this cycle.
    pub committed: bool,
    /// Whether an interrupted cycle's leftovers were committed first.
    pub recovered: bool,
    /// Push result.
    pub push: PushStatus,
    /// Registry records dropped by the final prune.
    pub pruned: usize,
}

impl SyncReport {
    /// True when the cycle neither imported nor exported anything.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.imported.total() == 0 && self.exported.total() == 0 && self.forked == 0
    }
}

/// Counts of notes reconciled from the repository.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Remote deletions ignored because the note had unsynced local writes.
    pub kept: usize,
}

impl ImportStats {
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Counts of notes written to the working tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Files moved because the heading or archive state changed.
    pub renamed: usize,
}

impl ExportStats {
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// Commit message summarizing this export.
    #[must_use]
    pub fn commit_message(&self) -> String {
        format!(
            "notes: +{} created, ~{} updated, -{} deleted",
            self.created, self.updated, self.deleted
        )
    }
}

/// Push result as reported to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PushStatus {
    #[default]
    Skipped,
    Pushed,
    NoRemote,
    Failed {
        reason: String,
    },
}

/// Sync-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Git operation failed.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// Fetching or integrating the remote failed. Nothing was changed.
    #[error("pull failed: {message}")]
    Pull { message: String },

    /// Local and remote history diverged and rebase was not requested.
    #[error("local branch '{branch}' has diverged from the remote")]
    Diverged { branch: String },

    /// Another sync cycle holds the lock.
    #[error("sync already running (lock held at {})", path.display())]
    Locked { path: PathBuf, holder: String },

    /// No git repository at the expected location.
    #[error("no notes repository at {}", path.display())]
    NoRepository { path: PathBuf },
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_message_counts() {
        let stats = ExportStats {
            created: 2,
            updated: 1,
            deleted: 0,
            renamed: 1,
        };
        assert_eq!(stats.total(), 3);
        assert_eq!(
            stats.commit_message(),
            "notes: +2 created, ~1 updated, -0 deleted"
        );
    }

    #[test]
    fn test_empty_report_is_noop() {
        let report = SyncReport::default();
        assert!(report.is_noop());
        assert_eq!(report.push, PushStatus::Skipped);
    }

    #[test]
    fn test_push_status_serializes_tagged() {
        let json = serde_json::to_value(PushStatus::Failed {
            reason: "rejected".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "rejected");
    }
}
