//! The sync cycle.
//!
//! One call to [`GitSyncer::sync`] runs, in order:
//! 1. commit leftovers of an interrupted cycle
//! 2. pull with rebase
//! 3. diff the previous checkpoint against the new head and reconcile the
//!    changed files into the note store
//! 4. write locally pending notes into the working tree
//! 5. commit
//! 6. save the checkpoint
//! 7. push
//! 8. prune the file registry against the store
//!
//! Conflicting edits are never merged. The repository version keeps the
//! path and the local version becomes a new note with its own file.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use crate::error::Result;
use crate::git::{CommitRef, DiffEntry, FileTimes, ForkedContent, GitRepository, PushOutcome};
use crate::model::{new_note_id, now_secs, Note, SyncCheckpoint};
use crate::storage::NoteStore;
use crate::sync::file::ensure_gitignore;
use crate::sync::lock::SyncLock;
use crate::sync::register::{FileNameRegister, ARCHIVE_DIR};
use crate::sync::types::{PushStatus, SyncError, SyncReport};

const RECOVERY_MESSAGE: &str = "recover interrupted sync";

/// Whether a note has local state the repository has not seen.
///
/// A note is pending when a local write marked it, or when it changed after
/// the checkpoint time of the last completed cycle. Before the first sync
/// every note is pending.
#[must_use]
pub fn is_pending(note: &Note, marked: &HashSet<String>, checkpoint: &SyncCheckpoint) -> bool {
    marked.contains(&note.id) || checkpoint.synced_at.is_none_or(|t| note.updated_at > t)
}

/// Notes [`GitSyncer::sync`] would export next, oldest first.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn pending_notes<S: NoteStore>(store: &S) -> Result<Vec<Note>> {
    let marked = store.pending_note_ids()?;
    let checkpoint = store.sync_checkpoint()?;
    let mut notes: Vec<Note> = store
        .list_notes()?
        .into_iter()
        .filter(|n| is_pending(n, &marked, &checkpoint))
        .collect();
    notes.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
    Ok(notes)
}

/// State carried through one cycle.
struct Cycle {
    started_at: i64,
    checkpoint: SyncCheckpoint,
    marked: HashSet<String>,
    notes: HashMap<String, Note>,
    imported: HashSet<String>,
    report: SyncReport,
}

impl Cycle {
    fn is_pending(&self, note: &Note) -> bool {
        is_pending(note, &self.marked, &self.checkpoint)
    }

    /// Checkpoint time for this cycle.
    ///
    /// Imported notes carry commit times from other clocks. The checkpoint
    /// must not be earlier than any of them, or they would look locally
    /// edited on the next cycle.
    fn synced_at(&self) -> i64 {
        self.imported
            .iter()
            .filter_map(|id| self.notes.get(id))
            .map(|n| n.updated_at)
            .fold(self.started_at, i64::max)
    }
}

/// Runs sync cycles between a note store and a git repository.
pub struct GitSyncer<S, G> {
    store: S,
    repo: G,
    register: FileNameRegister,
    lock_path: Option<PathBuf>,
    force_push: bool,
}

impl<S: NoteStore, G: GitRepository> GitSyncer<S, G> {
    #[must_use]
    pub fn new(store: S, repo: G, register: FileNameRegister) -> Self {
        Self {
            store,
            repo,
            register,
            lock_path: None,
            force_push: false,
        }
    }

    /// Hold an exclusive lock file at `path` for the length of each cycle.
    #[must_use]
    pub fn with_lock(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    /// Force-push instead of letting a rejected push wait for the next cycle.
    ///
    /// Only meant for bootstrapping a remote.
    #[must_use]
    pub fn force_push(mut self, force: bool) -> Self {
        self.force_push = force;
        self
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    #[must_use]
    pub fn repo(&self) -> &G {
        &self.repo
    }

    pub fn repo_mut(&mut self) -> &mut G {
        &mut self.repo
    }

    #[must_use]
    pub fn register(&self) -> &FileNameRegister {
        &self.register
    }

    #[must_use]
    pub fn into_parts(self) -> (S, G, FileNameRegister) {
        (self.store, self.repo, self.register)
    }

    /// Run one full cycle.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Pull` if the pull fails, before anything local has
    /// changed. A failed push is not an error; it is reported in
    /// [`SyncReport::push`].
    pub fn sync(&mut self) -> Result<SyncReport> {
        let _lock = match &self.lock_path {
            Some(path) => Some(SyncLock::acquire(path)?),
            None => None,
        };

        let started_at = now_secs();
        let mut report = SyncReport::default();

        if self.repo.has_changes()? {
            tracing::warn!("uncommitted changes in the working tree, committing them before pull");
            self.repo.add_all()?;
            report.recovered = self
                .repo
                .commit(RECOVERY_MESSAGE, started_at, false)?
                .is_some();
        }

        let pull = self.repo.pull(true).map_err(|e| match e {
            SyncError::Pull { .. } => e,
            other => SyncError::Pull {
                message: other.to_string(),
            },
        })?;
        report.pull = pull.kind.as_str().to_string();
        tracing::info!(kind = %report.pull, forks = pull.forks.len(), "pulled");

        let mut cycle = Cycle {
            started_at,
            checkpoint: self.store.sync_checkpoint()?,
            marked: self.store.pending_note_ids()?,
            notes: self
                .store
                .list_notes()?
                .into_iter()
                .map(|n| (n.id.clone(), n))
                .collect(),
            imported: HashSet::new(),
            report,
        };

        self.reconcile_into_store(&mut cycle)?;
        self.keep_forks(&mut cycle, pull.forks)?;
        let exported = self.reconcile_into_tree(&mut cycle)?;

        ensure_gitignore(self.repo.workdir())?;
        if self.repo.has_changes()? {
            self.repo.add_all()?;
            let message = cycle.report.exported.commit_message();
            cycle.report.committed = self
                .repo
                .commit(&message, cycle.started_at, false)?
                .is_some();
        }

        let head = self.repo.head_commit()?;
        self.store.set_sync_checkpoint(&SyncCheckpoint {
            head: head.as_ref().map(ToString::to_string),
            synced_at: Some(cycle.synced_at()),
        })?;
        let mut cleared: Vec<String> = exported;
        cleared.extend(cycle.imported.iter().cloned());
        self.store.clear_pending(&cleared)?;
        cycle.report.head = head.map(|h| h.to_string());

        cycle.report.push = match self.repo.push(self.force_push) {
            PushOutcome::Pushed => PushStatus::Pushed,
            PushOutcome::NoRemote => PushStatus::NoRemote,
            PushOutcome::NothingToPush => PushStatus::Skipped,
            PushOutcome::Failed { reason } => {
                tracing::warn!(reason = %reason, "push failed, will retry next sync");
                PushStatus::Failed { reason }
            }
        };

        let latest = self.store.list_notes()?;
        cycle.report.pruned = self.register.prune_stale_records(&latest)?;

        tracing::info!(
            imported = cycle.report.imported.total(),
            exported = cycle.report.exported.total(),
            forked = cycle.report.forked,
            "sync complete"
        );
        Ok(cycle.report)
    }

    /// Apply the tree diff since the checkpoint to the note store.
    fn reconcile_into_store(&mut self, cycle: &mut Cycle) -> Result<()> {
        let Some(head) = self.repo.head_commit()? else {
            return Ok(());
        };

        let base = match &cycle.checkpoint.head {
            Some(id) => {
                let commit = CommitRef::new(id.clone());
                if self.repo.contains_commit(&commit) {
                    Some(commit)
                } else {
                    tracing::warn!(commit = %id, "checkpoint commit is gone, diffing from empty tree");
                    None
                }
            }
            None => None,
        };
        if base.as_ref() == Some(&head) {
            return Ok(());
        }

        let entries = self.repo.diff_between(base.as_ref(), &head)?;
        if entries.is_empty() {
            return Ok(());
        }
        tracing::debug!(entries = entries.len(), from = ?base, to = %head, "reconciling diff");

        let times = self.repo.file_times(&head)?;
        let head_time = self.repo.commit_time(&head)?;
        let fallback = FileTimes {
            first_added: head_time,
            last_touched: head_time,
        };

        for entry in entries {
            match entry {
                DiffEntry::Add(path) | DiffEntry::Modify(path) => {
                    let t = times.get(&path).copied().unwrap_or(fallback);
                    self.import_file(cycle, &path, t)?;
                }
                DiffEntry::Rename { from, to } => {
                    self.register.rename_record(&from, &to)?;
                    let t = times.get(&to).copied().unwrap_or(fallback);
                    self.import_file(cycle, &to, t)?;
                }
                DiffEntry::Delete(path) => self.import_delete(cycle, &path, head_time)?,
            }
        }
        Ok(())
    }

    fn import_file(&mut self, cycle: &mut Cycle, path: &str, times: FileTimes) -> Result<()> {
        let content = self.register.tree().file(path).read()?;
        let archived = path.starts_with(ARCHIVE_DIR);

        let existing = self
            .register
            .note_id_for(path)
            .and_then(|id| cycle.notes.get(id))
            .cloned();

        let note = match existing {
            Some(existing) => {
                if !existing.is_deleted()
                    && existing.content != content
                    && cycle.is_pending(&existing)
                {
                    self.fork(cycle, &existing.content, existing.archived_at)?;
                    tracing::info!(
                        note = %existing.id,
                        path,
                        "remote change conflicts with unsynced local edit, forked local copy"
                    );
                }

                let mut note = existing.clone();
                note.content = content;
                note.updated_at = times.last_touched;
                note.archived_at = if archived {
                    existing.archived_at.or(Some(times.last_touched))
                } else {
                    None
                };
                note.deleted_at = None;

                self.register.record_heading(&note)?;
                cycle.imported.insert(note.id.clone());
                if note == existing {
                    return Ok(());
                }
                cycle.report.imported.updated += 1;
                note
            }
            None => {
                let id = new_note_id();
                self.register.register(path, &id)?;
                cycle.report.imported.created += 1;
                cycle.imported.insert(id.clone());
                let note = Note {
                    id,
                    content,
                    created_at: times.first_added,
                    updated_at: times.last_touched,
                    archived_at: archived.then_some(times.last_touched),
                    deleted_at: None,
                };
                self.register.record_heading(&note)?;
                note
            }
        };

        self.store.apply_synced_note(&note)?;
        cycle.notes.insert(note.id.clone(), note);
        Ok(())
    }

    fn import_delete(&mut self, cycle: &mut Cycle, path: &str, deleted_at: i64) -> Result<()> {
        let Some(note) = self
            .register
            .note_id_for(path)
            .and_then(|id| cycle.notes.get(id))
            .cloned()
        else {
            return Ok(());
        };
        if note.is_deleted() {
            return Ok(());
        }

        if cycle.is_pending(&note) {
            tracing::info!(note = %note.id, path, "remote deleted a note with local changes, keeping it");
            cycle.report.imported.kept += 1;
            return Ok(());
        }

        self.store.soft_delete_note(&note.id, deleted_at)?;
        self.register.forget_note(&note.id)?;
        cycle.imported.insert(note.id.clone());
        cycle.report.imported.deleted += 1;

        let mut tombstone = note;
        tombstone.deleted_at = Some(deleted_at);
        tombstone.updated_at = deleted_at;
        cycle.notes.insert(tombstone.id.clone(), tombstone);
        Ok(())
    }

    /// Keep local file versions displaced by rebase conflicts as new notes.
    fn keep_forks(&mut self, cycle: &mut Cycle, forks: Vec<ForkedContent>) -> Result<()> {
        // Later replayed commits supersede earlier ones for the same path.
        let latest: BTreeMap<String, String> =
            forks.into_iter().map(|f| (f.path, f.content)).collect();

        for (path, content) in latest {
            let duplicate = cycle
                .notes
                .values()
                .any(|n| n.is_visible() && n.content == content);
            if duplicate {
                continue;
            }
            let archived_at = path.starts_with(ARCHIVE_DIR).then_some(cycle.started_at);
            self.fork(cycle, &content, archived_at)?;
        }
        Ok(())
    }

    fn fork(&mut self, cycle: &mut Cycle, content: &str, archived_at: Option<i64>) -> Result<()> {
        let mut note = Note::with_timestamps(new_note_id(), content, cycle.started_at, cycle.started_at);
        note.archived_at = archived_at;
        self.store.insert_note(&note)?;
        cycle.marked.insert(note.id.clone());
        cycle.notes.insert(note.id.clone(), note);
        cycle.report.forked += 1;
        Ok(())
    }

    /// Write every pending note that was not just imported. Returns the
    /// exported ids.
    fn reconcile_into_tree(&mut self, cycle: &mut Cycle) -> Result<Vec<String>> {
        let mut pending: Vec<&Note> = cycle
            .notes
            .values()
            .filter(|n| !cycle.imported.contains(&n.id) && cycle.is_pending(n))
            .collect();
        pending.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        let pending: Vec<Note> = pending.into_iter().cloned().collect();

        let stats = &mut cycle.report.exported;
        let mut exported = Vec::with_capacity(pending.len());
        for note in pending {
            if note.is_deleted() {
                if let Some(name) = self.register.forget_note(&note.id)? {
                    let file = self.register.tree().file(&name);
                    if file.exists() {
                        file.delete(false)?;
                        stats.deleted += 1;
                    }
                }
                exported.push(note.id);
                continue;
            }

            let assignment = self.register.file_for(&note)?;
            let renamed = match &assignment.previous {
                Some(previous) => {
                    previous.delete(false)?;
                    stats.renamed += 1;
                    true
                }
                None => false,
            };

            let file = assignment.file;
            let existed = file.exists();
            if existed && file.read()? == note.content {
                if renamed {
                    stats.updated += 1;
                }
            } else {
                file.write(&note.content)?;
                if existed || renamed {
                    stats.updated += 1;
                } else {
                    stats.created += 1;
                }
            }
            exported.push(note.id);
        }
        Ok(exported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_everything_is_pending_before_first_sync() {
        let note = Note::with_timestamps("n1", "# a", 10, 10);
        assert!(is_pending(&note, &HashSet::new(), &SyncCheckpoint::default()));
    }

    #[test]
    fn test_pending_after_checkpoint() {
        let checkpoint = SyncCheckpoint {
            head: Some("abc".into()),
            synced_at: Some(100),
        };
        let old = Note::with_timestamps("n1", "# a", 10, 100);
        let newer = Note::with_timestamps("n2", "# b", 10, 101);
        let marked: HashSet<String> = ["n1".to_string()].into_iter().collect();

        assert!(!is_pending(&old, &HashSet::new(), &checkpoint));
        assert!(is_pending(&old, &marked, &checkpoint));
        assert!(is_pending(&newer, &HashSet::new(), &checkpoint));
    }
}
