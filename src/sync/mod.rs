//! Git-backed note synchronization.
//!
//! This module keeps the note store and a git working tree consistent:
//!
//! - **Register**: durable, collision-free `note <-> file name` mapping
//! - **Syncer**: pull, reconcile both ways, commit, push, prune
//! - **File**: atomic writes and working-tree file handles
//! - **Status**: what the next sync would do
//!
//! # Architecture
//!
//! Local writes mark notes as pending in SQLite. A sync cycle pulls the
//! remote, applies the tree diff since the last checkpoint to the store,
//! then writes pending notes to files named by the [`FileNameRegister`].
//!
//! # File Layout
//!
//! ```text
//! repo/
//! ├── .gitignore
//! ├── groceries.md
//! ├── groceries_2.md
//! └── archived/
//!     └── old_plan.md
//! ```
//!
//! # Example
//!
//! ```ignore
//! use gitnotes::sync::{FileNameRegister, GitSyncer, WorkingTree};
//!
//! let register = FileNameRegister::open(&registry_path, WorkingTree::new(repo.workdir()))?;
//! let mut syncer = GitSyncer::new(storage, repo, register).with_lock(lock_path);
//! let report = syncer.sync()?;
//! ```

mod file;
mod lock;
mod register;
mod slug;
mod status;
mod syncer;
mod types;

// Re-export main types and functions
pub use file::{atomic_write, ensure_gitignore, gitignore_content, NoteFile, WorkingTree};
pub use lock::{read_lock_meta, SyncLock, SyncLockMeta};
pub use register::{FileAssignment, FileNameRegister, FileRecord, ARCHIVE_DIR};
pub use slug::{slugify, DEFAULT_SLUG};
pub use status::{get_sync_status, print_status, SyncStatus};
pub use syncer::{is_pending, pending_notes, GitSyncer};
pub use types::{
    ExportStats, ImportStats, PushStatus, SyncError, SyncReport, SyncResult,
};
