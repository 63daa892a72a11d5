//! Durable mapping between notes and the files that hold them.
//!
//! The registry is a bijection `file name <-> note id` over live notes. It is
//! stored as JSON next to (not inside) the working tree so it survives a
//! re-clone, and it is a cache: a lost or corrupt registry is rebuilt from a
//! directory scan plus the note store.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::Note;
use crate::sync::file::{atomic_write, NoteFile, WorkingTree};
use crate::sync::slug::{slugify, split_suffix};
use crate::sync::types::SyncResult;

/// Directory holding archived notes, relative to the working tree root.
pub const ARCHIVE_DIR: &str = "archived/";

const NOTE_EXT: &str = ".md";
const REGISTRY_VERSION: u32 = 1;

/// One `file name -> note id` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_name: String,
    pub note_id: String,
    /// Heading slug the name was chosen for. A different slug means a rename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    version: u32,
    records: Vec<FileRecord>,
}

/// Where a note should be written, and where it used to live if that moved.
///
/// Nothing is written or deleted on disk; callers do the I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAssignment {
    pub file: NoteFile,
    /// Previous location after a rename. The caller must delete it.
    pub previous: Option<NoteFile>,
}

/// Names notes as files.
#[derive(Debug)]
pub struct FileNameRegister {
    store_path: Option<PathBuf>,
    tree: WorkingTree,
    by_name: BTreeMap<String, String>,
    by_id: HashMap<String, String>,
    slugs: HashMap<String, String>,
}

impl FileNameRegister {
    /// Load the registry stored at `store_path`.
    ///
    /// A missing file gives an empty registry. So does a corrupt one, with a
    /// warning; run [`rebuild_from_scan`](Self::rebuild_from_scan) to recover.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but cannot be read.
    pub fn open(store_path: &Path, tree: WorkingTree) -> SyncResult<Self> {
        let mut register = Self {
            store_path: Some(store_path.to_path_buf()),
            tree,
            by_name: BTreeMap::new(),
            by_id: HashMap::new(),
            slugs: HashMap::new(),
        };

        if !store_path.exists() {
            return Ok(register);
        }

        let raw = std::fs::read_to_string(store_path)?;
        match serde_json::from_str::<RegistryDocument>(&raw) {
            Ok(doc) => {
                for record in doc.records {
                    register.insert(record.file_name, record.note_id.clone());
                    if let Some(slug) = record.slug {
                        register.slugs.insert(record.note_id, slug);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %store_path.display(),
                    error = %e,
                    "file registry is corrupt, starting empty"
                );
            }
        }
        Ok(register)
    }

    /// A registry that is never written to disk.
    #[must_use]
    pub fn in_memory(tree: WorkingTree) -> Self {
        Self {
            store_path: None,
            tree,
            by_name: BTreeMap::new(),
            by_id: HashMap::new(),
            slugs: HashMap::new(),
        }
    }

    #[must_use]
    pub fn tree(&self) -> &WorkingTree {
        &self.tree
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// All records, ordered by file name.
    #[must_use]
    pub fn records(&self) -> Vec<FileRecord> {
        self.by_name
            .iter()
            .map(|(file_name, note_id)| FileRecord {
                file_name: file_name.clone(),
                note_id: note_id.clone(),
                slug: self.slugs.get(note_id).cloned(),
            })
            .collect()
    }

    /// Reverse lookup. `None` means unregistered.
    #[must_use]
    pub fn note_id_for(&self, file_name: &str) -> Option<&str> {
        self.by_name.get(file_name).map(String::as_str)
    }

    #[must_use]
    pub fn file_name_for(&self, note_id: &str) -> Option<&str> {
        self.by_id.get(note_id).map(String::as_str)
    }

    /// The file a note should be written to.
    ///
    /// Keeps the current name while the heading still yields the slug the name
    /// was chosen for and the archive state is unchanged. Otherwise moves the
    /// record to `[archived/]<slug>.md`, suffixing on collision, and reports
    /// the old location in [`FileAssignment::previous`].
    ///
    /// # Errors
    ///
    /// Returns an error if the directory scan or persisting the registry fails.
    pub fn file_for(&mut self, note: &Note) -> SyncResult<FileAssignment> {
        let slug = slugify(note.heading());
        let dir = if note.archived_at.is_some() {
            ARCHIVE_DIR
        } else {
            ""
        };

        let desired = self.tree.file(&format!("{dir}{slug}{NOTE_EXT}"));

        let current = self.by_id.get(&note.id).cloned();
        if let Some(name) = &current {
            let file = self.tree.file(name);
            if file.dir() == dir && self.keeps_name(&file, &slug, &desired, note)? {
                if self.slugs.get(&note.id) != Some(&slug) {
                    self.slugs.insert(note.id.clone(), slug);
                    self.persist()?;
                }
                return Ok(FileAssignment {
                    file,
                    previous: None,
                });
            }
        }

        let target = if self.is_taken(&desired, note)? {
            self.find_new_name_on_conflict(&desired)?
        } else {
            desired
        };

        self.insert(target.relative_path().to_string(), note.id.clone());
        self.slugs.insert(note.id.clone(), slug);
        self.persist()?;

        let previous = current
            .filter(|name| name != target.relative_path())
            .map(|name| self.tree.file(&name));
        if let Some(prev) = &previous {
            tracing::debug!(
                note = %note.id,
                from = %prev.relative_path(),
                to = %target.relative_path(),
                "renamed note file"
            );
        }

        Ok(FileAssignment {
            file: target,
            previous,
        })
    }

    /// Next free `stem_N.md` next to `file`.
    ///
    /// Scans both the directory on disk and the registered names every call,
    /// so consecutive assignments in one batch never collide.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn find_new_name_on_conflict(&self, file: &NoteFile) -> SyncResult<NoteFile> {
        let dir = file.dir();
        let base = stem_of(file.name());

        let on_disk = self.tree.list_markdown(dir)?;
        let registered = self
            .by_name
            .keys()
            .filter(|name| self.tree.file(name).dir() == dir);

        let mut used = BTreeSet::new();
        for name in on_disk.iter().chain(registered) {
            let stem = stem_of(name.strip_prefix(dir).unwrap_or(name));
            match split_suffix(stem) {
                (b, Some(n)) if b == base => {
                    used.insert(n);
                }
                _ => {}
            }
        }

        // Past the largest suffix, or the lowest gap once that overflows.
        let next = match used.last().copied() {
            None => 2,
            Some(max) => max
                .checked_add(1)
                .unwrap_or_else(|| (2..).find(|n| !used.contains(n)).unwrap_or(2)),
        };
        Ok(self.tree.file(&format!("{dir}{base}_{next}{NOTE_EXT}")))
    }

    /// Map `file_name` to `note_id`, replacing any record either side had.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn register(&mut self, file_name: &str, note_id: &str) -> SyncResult<()> {
        self.insert(file_name.to_string(), note_id.to_string());
        self.persist()
    }

    /// Move a record to a new file name, keeping its note.
    ///
    /// Returns the note id, or `None` if `from` was not registered.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn rename_record(&mut self, from: &str, to: &str) -> SyncResult<Option<String>> {
        let Some(note_id) = self.by_name.get(from).cloned() else {
            return Ok(None);
        };
        let slug = self.slugs.remove(&note_id);
        self.insert(to.to_string(), note_id.clone());
        if let Some(slug) = slug {
            self.slugs.insert(note_id.clone(), slug);
        }
        self.persist()?;
        Ok(Some(note_id))
    }

    /// Record that the file registered to `note` now holds its content, so
    /// the current heading's slug is the one its name stands for.
    ///
    /// Does nothing for unregistered notes.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn record_heading(&mut self, note: &Note) -> SyncResult<()> {
        if !self.by_id.contains_key(&note.id) {
            return Ok(());
        }
        let slug = slugify(note.heading());
        if self.slugs.get(&note.id) == Some(&slug) {
            return Ok(());
        }
        self.slugs.insert(note.id.clone(), slug);
        self.persist()
    }

    /// Drop the record for a note, returning the name it held.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn forget_note(&mut self, note_id: &str) -> SyncResult<Option<String>> {
        let Some(name) = self.by_id.remove(note_id) else {
            return Ok(None);
        };
        self.by_name.remove(&name);
        self.slugs.remove(note_id);
        self.persist()?;
        Ok(Some(name))
    }

    /// Remove every record whose note is absent from `latest`.
    ///
    /// Idempotent. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn prune_stale_records(&mut self, latest: &[Note]) -> SyncResult<usize> {
        let live: HashSet<&str> = latest.iter().map(|n| n.id.as_str()).collect();
        let before = self.by_name.len();
        self.by_name.retain(|_, id| live.contains(id.as_str()));
        self.by_id.retain(|id, _| live.contains(id.as_str()));
        self.slugs.retain(|id, _| live.contains(id.as_str()));

        let removed = before - self.by_name.len();
        if removed > 0 {
            tracing::debug!(removed, "pruned stale file records");
            self.persist()?;
        }
        Ok(removed)
    }

    /// Rebuild the registry by matching files on disk to note contents.
    ///
    /// Each non-deleted note claims the first unclaimed file with identical
    /// content, preferring its own directory. Returns the number of records.
    ///
    /// # Errors
    ///
    /// Returns an error if the working tree cannot be read or persisting fails.
    pub fn rebuild_from_scan(&mut self, notes: &[Note]) -> SyncResult<usize> {
        let mut by_content: HashMap<String, Vec<String>> = HashMap::new();
        for dir in ["", ARCHIVE_DIR] {
            for name in self.tree.list_markdown(dir)? {
                let content = self.tree.file(&name).read()?;
                by_content.entry(content).or_default().push(name);
            }
        }

        self.by_name.clear();
        self.by_id.clear();
        self.slugs.clear();

        let mut ordered: Vec<&Note> = notes.iter().filter(|n| n.is_visible()).collect();
        ordered.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        for note in ordered {
            let Some(candidates) = by_content.get_mut(&note.content) else {
                continue;
            };
            let in_archive = note.archived_at.is_some();
            let pos = candidates
                .iter()
                .position(|name| name.starts_with(ARCHIVE_DIR) == in_archive)
                .unwrap_or(0);
            if pos < candidates.len() {
                let name = candidates.remove(pos);
                self.insert(name, note.id.clone());
                self.slugs.insert(note.id.clone(), slugify(note.heading()));
            }
        }

        self.persist()?;
        Ok(self.by_name.len())
    }

    /// Whether `note` may stay at `file` under `slug`.
    ///
    /// A record carrying the slug it was named for stays exactly while that
    /// slug is unchanged. A record without one stays at `<slug>.md`, or at a
    /// `<slug>_N.md` collision name while `desired` is still taken.
    fn keeps_name(
        &self,
        file: &NoteFile,
        slug: &str,
        desired: &NoteFile,
        note: &Note,
    ) -> SyncResult<bool> {
        if let Some(recorded) = self.slugs.get(&note.id) {
            return Ok(recorded == slug);
        }
        let stem = stem_of(file.name());
        if stem == slug {
            return Ok(true);
        }
        match split_suffix(stem) {
            (base, Some(_)) if base == slug => self.is_taken(desired, note),
            _ => Ok(false),
        }
    }

    /// Whether `desired` is unavailable to `note`.
    fn is_taken(&self, desired: &NoteFile, note: &Note) -> SyncResult<bool> {
        match self.by_name.get(desired.relative_path()) {
            Some(owner) => Ok(owner != &note.id),
            None => Ok(desired.exists() && desired.read()? != note.content),
        }
    }

    fn insert(&mut self, file_name: String, note_id: String) {
        if let Some(old_name) = self.by_id.remove(&note_id) {
            self.by_name.remove(&old_name);
        }
        self.slugs.remove(&note_id);
        if let Some(old_id) = self.by_name.remove(&file_name) {
            self.by_id.remove(&old_id);
            self.slugs.remove(&old_id);
        }
        self.by_id.insert(note_id.clone(), file_name.clone());
        self.by_name.insert(file_name, note_id);
    }

    fn persist(&self) -> SyncResult<()> {
        let Some(path) = &self.store_path else {
            return Ok(());
        };
        let doc = RegistryDocument {
            version: REGISTRY_VERSION,
            records: self.records(),
        };
        atomic_write(path, &serde_json::to_string_pretty(&doc)?)
    }
}

fn stem_of(name: &str) -> &str {
    name.strip_suffix(NOTE_EXT).unwrap_or(name)
}
