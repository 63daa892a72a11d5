//! Initialize a gitnotes home.
//!
//! Creates the note store, the git working tree and `config.json`. With
//! `--remote`, the remote is recorded and the first `gitnotes sync` pulls
//! whatever the repository already holds.

use crate::config::{load_config, resolve_author, save_config, GitnotesPaths};
use crate::error::{Error, Result};
use crate::git::{Git2Repository, GitRepository};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Serialize)]
struct InitOutput {
    home: PathBuf,
    database: PathBuf,
    repo: PathBuf,
    branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote: Option<String>,
}

/// Execute the init command.
///
/// Running it again with `--force` keeps existing notes and history and only
/// updates the remote and branch settings.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if a note store exists and `force` is not set,
/// or an error if the directories, database or repository cannot be created.
pub fn execute(
    paths: &GitnotesPaths,
    remote: Option<&str>,
    branch: Option<&str>,
    force: bool,
    json: bool,
) -> Result<()> {
    if paths.db.exists() && !force {
        return Err(Error::AlreadyInitialized {
            path: paths.db.clone(),
        });
    }

    if let Some(parent) = paths.db.parent() {
        fs::create_dir_all(parent)?;
    }
    if let Some(parent) = paths.registry.parent() {
        fs::create_dir_all(parent)?;
    }
    // Opening applies the schema.
    SqliteStorage::open(&paths.db)?;

    let mut config = load_config(&paths.config)?;
    if let Some(url) = remote {
        config.sync.remote_url = Some(url.to_string());
    }
    if let Some(branch) = branch {
        config.sync.branch = branch.to_string();
    }
    save_config(&paths.config, &config)?;

    let author = resolve_author(&config.sync);
    let repo = if paths.repo.join(".git").exists() {
        Git2Repository::open(&paths.repo, author)?
    } else {
        Git2Repository::init(&paths.repo, author)?
    };
    let mut repo = repo.with_branch(config.sync.branch.clone());
    if let Some(url) = &config.sync.remote_url {
        repo.add_remote(&config.sync.remote_name, url)?;
    }
    tracing::info!(repo = %paths.repo.display(), branch = %repo.branch(), "initialized");

    if crate::is_silent() {
        println!("{}", paths.home.display());
        return Ok(());
    }

    if json {
        let output = InitOutput {
            home: paths.home.clone(),
            database: paths.db.clone(),
            repo: paths.repo.clone(),
            branch: repo.branch().to_string(),
            remote: repo.remote_url(),
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
    } else {
        println!("Initialized gitnotes in {}", paths.home.display());
        println!("  Database: {}", paths.db.display());
        println!("  Notes:    {}", paths.repo.display());
        println!("  Branch:   {}", repo.branch());
        match repo.remote_url() {
            Some(url) => {
                println!("  Remote:   {url}");
                println!();
                println!("Next: Run 'gitnotes sync' to pull existing notes.");
            }
            None => {
                println!();
                println!("Next: Run 'gitnotes remote add <url>' to sync with other devices.");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_store_repo_and_config() {
        let temp_dir = TempDir::new().unwrap();
        let paths = GitnotesPaths::under(temp_dir.path());

        execute(&paths, None, None, false, true).unwrap();

        assert!(paths.db.exists());
        assert!(paths.repo.join(".git").exists());
        assert!(paths.config.exists());
    }

    #[test]
    fn test_init_fails_if_already_initialized() {
        let temp_dir = TempDir::new().unwrap();
        let paths = GitnotesPaths::under(temp_dir.path());

        execute(&paths, None, None, false, true).unwrap();
        let result = execute(&paths, None, None, false, true);
        assert!(matches!(result, Err(Error::AlreadyInitialized { .. })));
    }

    #[test]
    fn test_force_keeps_notes_and_records_remote() {
        let temp_dir = TempDir::new().unwrap();
        let paths = GitnotesPaths::under(temp_dir.path());
        execute(&paths, None, None, false, true).unwrap();
        SqliteStorage::open(&paths.db)
            .unwrap()
            .create_note("# Keep me")
            .unwrap();

        execute(&paths, Some("/tmp/elsewhere.git"), None, true, true).unwrap();

        let config = load_config(&paths.config).unwrap();
        assert_eq!(config.sync.remote_url.as_deref(), Some("/tmp/elsewhere.git"));
        let storage = SqliteStorage::open(&paths.db).unwrap();
        assert_eq!(storage.count_notes().unwrap().active, 1);
    }
}
