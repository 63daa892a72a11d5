//! Command implementations.

pub mod completions;
pub mod init;
pub mod note;
pub mod registry;
pub mod remote;
pub mod sync;
pub mod version;

use crate::config::{apply_env_overrides, load_config, resolve_author, GitnotesPaths, SyncSettings};
use crate::error::{Error, Result};
use crate::git::Git2Repository;
use crate::storage::{NoteStore, SqliteStorage};
use crate::sync::{FileNameRegister, WorkingTree, ARCHIVE_DIR};

/// Open the note store, failing if `gitnotes init` has not run.
pub(crate) fn open_storage(paths: &GitnotesPaths) -> Result<SqliteStorage> {
    if !paths.db.exists() {
        return Err(Error::NotInitialized);
    }
    SqliteStorage::open(&paths.db)
}

/// Settings from `config.json` with environment overrides applied.
pub(crate) fn load_settings(paths: &GitnotesPaths) -> Result<SyncSettings> {
    Ok(apply_env_overrides(load_config(&paths.config)?.sync))
}

/// Open the working tree repository with this device's remote, branch and author.
pub(crate) fn open_repository(paths: &GitnotesPaths, settings: &SyncSettings) -> Result<Git2Repository> {
    let repo = Git2Repository::open(&paths.repo, resolve_author(settings))?
        .with_remote(settings.remote_name.clone())
        .with_branch(settings.branch.clone());
    Ok(repo)
}

/// Load the file registry.
///
/// An empty registry next to a working tree that already holds notes means
/// the registry store was lost; it is rebuilt from a scan.
pub(crate) fn open_register(
    paths: &GitnotesPaths,
    storage: &SqliteStorage,
) -> Result<FileNameRegister> {
    let tree = WorkingTree::new(paths.repo.clone());
    let mut register = FileNameRegister::open(&paths.registry, tree)?;

    if register.is_empty() {
        let has_files = !register.tree().list_markdown("")?.is_empty()
            || !register.tree().list_markdown(ARCHIVE_DIR)?.is_empty();
        if has_files {
            let rebuilt = register.rebuild_from_scan(&storage.list_notes()?)?;
            tracing::warn!(records = rebuilt, "file registry was empty, rebuilt from working tree");
        }
    }
    Ok(register)
}
