//! Git transport for the notes repository.
//!
//! The syncer talks to git only through [`GitRepository`]; the production
//! implementation is [`Git2Repository`], backed by libgit2.

mod repo;

pub use repo::Git2Repository;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::sync::SyncResult;

/// Default branch used for the notes repository.
pub const DEFAULT_BRANCH: &str = "main";

/// Default remote name.
pub const DEFAULT_REMOTE: &str = "origin";

/// A commit, identified by its hex object id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CommitRef(String);

impl CommitRef {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated id for display.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<git2::Oid> for CommitRef {
    fn from(oid: git2::Oid) -> Self {
        Self(oid.to_string())
    }
}

/// One path-level change between two trees. Only `.md` files are reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffEntry {
    Add(String),
    Modify(String),
    Delete(String),
    Rename { from: String, to: String },
}

impl DiffEntry {
    /// Path the entry leaves behind in the newer tree, if any.
    #[must_use]
    pub fn current_path(&self) -> Option<&str> {
        match self {
            Self::Add(path) | Self::Modify(path) => Some(path),
            Self::Rename { to, .. } => Some(to),
            Self::Delete(_) => None,
        }
    }
}

/// How a pull integrated the remote branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PullKind {
    /// No remote is configured.
    NoRemote,
    /// The remote has no commits on the branch yet.
    RemoteEmpty,
    /// Local already contains the remote head.
    UpToDate,
    /// Local branch was unborn and now points at the remote head.
    Initialized,
    FastForward,
    /// Local commits were replayed on top of the remote head.
    Rebased,
}

impl PullKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoRemote => "no_remote",
            Self::RemoteEmpty => "remote_empty",
            Self::UpToDate => "up_to_date",
            Self::Initialized => "initialized",
            Self::FastForward => "fast_forward",
            Self::Rebased => "rebased",
        }
    }
}

/// Local file content displaced while resolving a rebase conflict.
///
/// The remote version of the path wins; the local version is handed back so
/// the caller can keep it as a separate note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkedContent {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullReport {
    pub kind: PullKind,
    pub forks: Vec<ForkedContent>,
}

impl PullReport {
    #[must_use]
    pub fn new(kind: PullKind) -> Self {
        Self {
            kind,
            forks: Vec::new(),
        }
    }
}

/// Result of a push. Failures are values, not errors: the local commit
/// stands and the next cycle retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    NoRemote,
    NothingToPush,
    Failed { reason: String },
}

impl PushOutcome {
    /// True when the push was rejected because the remote moved.
    #[must_use]
    pub fn is_non_fast_forward(&self) -> bool {
        matches!(self, Self::Failed { reason }
            if reason.contains("non-fast-forward") || reason.contains("fetch first"))
    }
}

/// Commit times for a path, in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTimes {
    /// Earliest commit that added the path.
    pub first_added: i64,
    /// Latest commit that added or modified the path.
    pub last_touched: i64,
}

/// Commit identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Default for Author {
    fn default() -> Self {
        Self {
            name: "gitnotes".to_string(),
            email: "gitnotes@localhost".to_string(),
        }
    }
}

/// Operations the syncer needs from a git repository.
pub trait GitRepository {
    /// Root of the working tree.
    fn workdir(&self) -> &Path;

    /// Fetch the remote branch and integrate it into the local branch.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Pull` when the fetch fails. Nothing local has
    /// changed in that case.
    fn pull(&mut self, rebase: bool) -> SyncResult<PullReport>;

    /// Push the local branch. Never fails; see [`PushOutcome`].
    fn push(&mut self, force: bool) -> PushOutcome;

    /// Stage every change in the working tree, deletions included.
    fn add_all(&mut self) -> SyncResult<()>;

    /// Whether the working tree or index differs from `HEAD`.
    fn has_changes(&self) -> SyncResult<bool>;

    /// Commit the index at `timestamp`.
    ///
    /// Returns `None` without committing when the tree is unchanged and
    /// `allow_empty` is false.
    fn commit(
        &mut self,
        message: &str,
        timestamp: i64,
        allow_empty: bool,
    ) -> SyncResult<Option<CommitRef>>;

    fn head_commit(&self) -> SyncResult<Option<CommitRef>>;

    /// Whether the object database still holds this commit.
    fn contains_commit(&self, commit: &CommitRef) -> bool;

    /// Author time of a commit.
    fn commit_time(&self, commit: &CommitRef) -> SyncResult<i64>;

    /// Tree diff from `from` (or the empty tree) to `to`, with rename detection.
    fn diff_between(&self, from: Option<&CommitRef>, to: &CommitRef)
    -> SyncResult<Vec<DiffEntry>>;

    /// Commit times for every `.md` path reachable from `to`.
    fn file_times(&self, to: &CommitRef) -> SyncResult<HashMap<String, FileTimes>>;

    /// Add a remote, or repoint it if it already exists.
    fn add_remote(&mut self, name: &str, url: &str) -> SyncResult<()>;
}

/// Whether a repository path names a note file.
#[must_use]
pub fn is_note_path(path: &str) -> bool {
    Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_note_path() {
        assert!(is_note_path("abc.md"));
        assert!(is_note_path("archived/abc.MD"));
        assert!(!is_note_path("README"));
        assert!(!is_note_path(".gitattributes"));
    }

    #[test]
    fn test_non_fast_forward_detection() {
        let rejected = PushOutcome::Failed {
            reason: "cannot push non-fast-forward reference".into(),
        };
        assert!(rejected.is_non_fast_forward());
        assert!(!PushOutcome::Pushed.is_non_fast_forward());
    }

    #[test]
    fn test_diff_entry_current_path() {
        let rename = DiffEntry::Rename {
            from: "a.md".into(),
            to: "b.md".into(),
        };
        assert_eq!(rename.current_path(), Some("b.md"));
        assert_eq!(DiffEntry::Delete("a.md".into()).current_path(), None);
    }
}
