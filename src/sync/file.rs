//! Working-tree file operations.
//!
//! This module provides safe file operations that prevent data corruption:
//! - Atomic writes: write to temp file, sync to disk, then rename
//! - A [`WorkingTree`] view that hands out [`NoteFile`] handles by relative path

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::git::is_note_path;
use crate::sync::types::SyncResult;

/// Write content to a file atomically.
///
/// This function:
/// 1. Writes content to a temporary file (same path with `.tmp` appended)
/// 2. Calls `fsync` to ensure data is on disk
/// 3. Atomically renames the temp file to the target path
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &str) -> SyncResult<()> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Write to temp file
    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        // Sync to disk before rename
        writer.get_ref().sync_all()?;
    }

    // Atomic rename
    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Generate .gitignore content for the notes repository.
///
/// Uses a whitelist pattern: ignore everything by default, then explicitly
/// include only note files and directories that may hold them.
#[must_use]
pub fn gitignore_content() -> &'static str {
    r"# gitnotes repository
# Whitelist pattern: ignore everything except note files

# Ignore everything by default
*

# Descend into directories (archived/)
!*/

# Allow .gitignore itself
!.gitignore

# Allow note files
!*.md
"
}

/// Ensure .gitignore exists at the repository root.
///
/// If the file already exists, it is not modified (user may have customized it).
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn ensure_gitignore(root: &Path) -> SyncResult<bool> {
    let gitignore_path = root.join(".gitignore");

    if gitignore_path.exists() {
        return Ok(false);
    }

    atomic_write(&gitignore_path, gitignore_content())?;
    Ok(true)
}

/// The checked-out directory backing the notes repository.
#[derive(Debug, Clone)]
pub struct WorkingTree {
    root: PathBuf,
}

impl WorkingTree {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle for a path relative to the root. Forward slashes only.
    #[must_use]
    pub fn file(&self, relative: &str) -> NoteFile {
        NoteFile {
            root: self.root.clone(),
            relative: relative.trim_start_matches('/').to_string(),
        }
    }

    /// Relative paths of every note file in `dir` (non-recursive).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn list_markdown(&self, dir: &str) -> SyncResult<Vec<String>> {
        let abs = self.root.join(dir);
        if !abs.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&abs)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_note_path(&name) {
                names.push(format!("{dir}{name}"));
            }
        }
        names.sort();
        Ok(names)
    }
}

/// A file inside the working tree, addressed by its relative path.
///
/// Creating a handle never touches the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteFile {
    root: PathBuf,
    relative: String,
}

impl NoteFile {
    /// Path relative to the working tree root, `/`-separated.
    #[must_use]
    pub fn relative_path(&self) -> &str {
        &self.relative
    }

    /// Path relative to another root, if the file lies under it.
    #[must_use]
    pub fn relative_path_in(&self, root: &Path) -> Option<String> {
        self.path()
            .strip_prefix(root)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }

    /// Absolute path on disk.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.root.join(&self.relative)
    }

    /// File name without directory.
    #[must_use]
    pub fn name(&self) -> &str {
        self.relative.rsplit('/').next().unwrap_or(&self.relative)
    }

    /// Directory prefix including the trailing slash, or `""` at the root.
    #[must_use]
    pub fn dir(&self) -> &str {
        match self.relative.rfind('/') {
            Some(idx) => &self.relative[..=idx],
            None => "",
        }
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Write text atomically, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn write(&self, text: &str) -> SyncResult<()> {
        atomic_write(&self.path(), text)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read as UTF-8.
    pub fn read(&self) -> SyncResult<String> {
        Ok(fs::read_to_string(self.path())?)
    }

    /// Remove the file, or a directory when `recursively` is set.
    ///
    /// Removing something that does not exist is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    pub fn delete(&self, recursively: bool) -> SyncResult<()> {
        let path = self.path();
        let result = if path.is_dir() {
            if recursively {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_dir(&path)
            }
        } else {
            fs::remove_file(&path)
        };
        match result {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Create this path as a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn make_directory(&self) -> SyncResult<()> {
        fs::create_dir_all(self.path())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.md");

        atomic_write(&path, "# title\nbody\n").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "# title\nbody\n");
        assert!(!temp_dir.path().join("test.md.tmp").exists());
    }

    #[test]
    fn test_note_file_in_subdirectory() {
        let temp_dir = TempDir::new().unwrap();
        let tree = WorkingTree::new(temp_dir.path());
        let file = tree.file("archived/old.md");

        assert_eq!(file.name(), "old.md");
        assert_eq!(file.dir(), "archived/");
        assert!(!file.exists());

        file.write("# old").unwrap();
        assert!(file.exists());
        assert_eq!(file.read().unwrap(), "# old");
        assert_eq!(
            file.relative_path_in(temp_dir.path()).as_deref(),
            Some("archived/old.md")
        );

        file.delete(false).unwrap();
        assert!(!file.exists());
        file.delete(false).unwrap();
    }

    #[test]
    fn test_list_markdown_skips_other_files() {
        let temp_dir = TempDir::new().unwrap();
        let tree = WorkingTree::new(temp_dir.path());
        tree.file("b.md").write("# b").unwrap();
        tree.file("a.md").write("# a").unwrap();
        tree.file("readme.txt").write("x").unwrap();
        tree.file("archived/c.md").write("# c").unwrap();

        assert_eq!(tree.list_markdown("").unwrap(), vec!["a.md", "b.md"]);
        assert_eq!(tree.list_markdown("archived/").unwrap(), vec!["archived/c.md"]);
        assert!(tree.list_markdown("missing/").unwrap().is_empty());
    }

    #[test]
    fn test_delete_directory_recursively() {
        let temp_dir = TempDir::new().unwrap();
        let tree = WorkingTree::new(temp_dir.path());
        tree.file("archived/c.md").write("# c").unwrap();

        let dir = tree.file("archived");
        assert!(dir.delete(false).is_err());
        dir.delete(true).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_ensure_gitignore_does_not_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let gitignore_path = temp_dir.path().join(".gitignore");

        assert!(ensure_gitignore(temp_dir.path()).unwrap());
        assert!(fs::read_to_string(&gitignore_path).unwrap().contains("!*.md"));

        fs::write(&gitignore_path, "# Custom content\n").unwrap();
        assert!(!ensure_gitignore(temp_dir.path()).unwrap());
        let content = fs::read_to_string(&gitignore_path).unwrap();
        assert!(content.contains("Custom content"));
    }
}
