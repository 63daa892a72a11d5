//! Configuration management.
//!
//! This module provides functions for locating the gitnotes home directory,
//! resolving the database and repository paths, and loading settings.
//!
//! # Layout
//!
//! ```text
//! ~/.gitnotes/
//! ├── config.json             sync settings (remote, branch, author)
//! ├── data/
//! │   ├── notes.db            note store
//! │   ├── file_records.json   file name registry
//! │   └── sync.lock           held while a sync runs
//! └── repo/                   git working tree
//! ```
//!
//! The registry lives outside `repo/` so it survives a full re-clone.

mod settings;

pub use settings::{load_config, save_config, GitnotesConfig, SyncSettings};

use std::path::{Path, PathBuf};

use crate::git::Author;

/// Resolved locations of everything gitnotes keeps on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitnotesPaths {
    pub home: PathBuf,
    pub db: PathBuf,
    pub repo: PathBuf,
    pub registry: PathBuf,
    pub lock: PathBuf,
    pub config: PathBuf,
}

impl GitnotesPaths {
    /// Standard layout under `home`.
    #[must_use]
    pub fn under(home: &Path) -> Self {
        let data = home.join("data");
        Self {
            home: home.to_path_buf(),
            db: data.join("notes.db"),
            repo: home.join("repo"),
            registry: data.join("file_records.json"),
            lock: data.join("sync.lock"),
            config: home.join("config.json"),
        }
    }

    /// Standard layout with an overridden database path.
    #[must_use]
    pub fn with_db(mut self, db: PathBuf) -> Self {
        self.db = db;
        self
    }

    /// Standard layout with an overridden working tree.
    #[must_use]
    pub fn with_repo(mut self, repo: PathBuf) -> Self {
        self.repo = repo;
        self
    }
}

/// Get the global gitnotes directory location (`~/.gitnotes/`).
#[must_use]
pub fn global_gitnotes_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".gitnotes"))
}

/// Resolve the gitnotes home directory.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `GITNOTES_HOME` environment variable
/// 3. Global location: `~/.gitnotes`
#[must_use]
pub fn resolve_home(explicit_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Explicit path from CLI flag
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: GITNOTES_HOME environment variable
    if let Ok(home) = std::env::var("GITNOTES_HOME")
        && !home.trim().is_empty()
    {
        return Some(PathBuf::from(home));
    }

    // Priority 3: Global location
    global_gitnotes_dir()
}

/// Resolve every path gitnotes uses.
///
/// `explicit_db` (from `--db` or `GITNOTES_DB`) overrides only the database,
/// `explicit_repo` (from `--repo` or `GITNOTES_REPO`) only the working tree.
#[must_use]
pub fn resolve_paths(
    explicit_home: Option<&Path>,
    explicit_db: Option<&Path>,
    explicit_repo: Option<&Path>,
) -> Option<GitnotesPaths> {
    let home = resolve_home(explicit_home)?;
    let mut paths = GitnotesPaths::under(&home);

    if let Some(db) = explicit_db.map(Path::to_path_buf).or_else(|| env_path("GITNOTES_DB")) {
        paths = paths.with_db(db);
    }
    if let Some(repo) = explicit_repo
        .map(Path::to_path_buf)
        .or_else(|| env_path("GITNOTES_REPO"))
    {
        paths = paths.with_repo(repo);
    }
    Some(paths)
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_value(key).map(PathBuf::from)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Apply environment overrides on top of the settings from `config.json`.
///
/// `GITNOTES_REMOTE_NAME`, `GITNOTES_REMOTE_URL`, `GITNOTES_BRANCH`,
/// `GITNOTES_AUTHOR_NAME` and `GITNOTES_AUTHOR_EMAIL` each win over the file.
#[must_use]
pub fn apply_env_overrides(mut settings: SyncSettings) -> SyncSettings {
    if let Some(name) = env_value("GITNOTES_REMOTE_NAME") {
        settings.remote_name = name;
    }
    if let Some(url) = env_value("GITNOTES_REMOTE_URL") {
        settings.remote_url = Some(url);
    }
    if let Some(branch) = env_value("GITNOTES_BRANCH") {
        settings.branch = branch;
    }
    if let Some(name) = env_value("GITNOTES_AUTHOR_NAME") {
        settings.author_name = Some(name);
    }
    if let Some(email) = env_value("GITNOTES_AUTHOR_EMAIL") {
        settings.author_email = Some(email);
    }
    settings
}

/// Commit identity for this device.
///
/// Priority for each field:
/// 1. Value from `settings` (environment, then `config.json`)
/// 2. Git `user.name` / `user.email` from the global git config
/// 3. System username / a placeholder address
#[must_use]
pub fn resolve_author(settings: &SyncSettings) -> Author {
    let git_config = git2::Config::open_default().ok();
    let from_git = |key: &str| {
        git_config
            .as_ref()
            .and_then(|cfg| cfg.get_string(key).ok())
            .filter(|v| !v.trim().is_empty())
    };

    let fallback = Author::default();
    let name = settings
        .author_name
        .clone()
        .or_else(|| from_git("user.name"))
        .or_else(|| env_value("USER"))
        .unwrap_or(fallback.name);
    let email = settings
        .author_email
        .clone()
        .or_else(|| from_git("user.email"))
        .unwrap_or(fallback.email);

    Author { name, email }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_home_with_explicit() {
        let explicit = PathBuf::from("/custom/notes");
        assert_eq!(resolve_home(Some(&explicit)), Some(explicit));
    }

    #[test]
    fn test_layout_keeps_registry_outside_repo() {
        let paths = GitnotesPaths::under(Path::new("/h"));
        assert_eq!(paths.db, PathBuf::from("/h/data/notes.db"));
        assert_eq!(paths.repo, PathBuf::from("/h/repo"));
        assert!(!paths.registry.starts_with(&paths.repo));
        assert!(!paths.lock.starts_with(&paths.repo));
    }

    #[test]
    fn test_explicit_db_overrides_only_db() {
        let paths =
            resolve_paths(Some(Path::new("/h")), Some(Path::new("/tmp/x.db")), None).unwrap();
        assert_eq!(paths.db, PathBuf::from("/tmp/x.db"));
        assert_eq!(paths.registry, PathBuf::from("/h/data/file_records.json"));
    }

    #[test]
    fn test_explicit_repo_overrides_only_repo() {
        let paths =
            resolve_paths(Some(Path::new("/h")), None, Some(Path::new("/work/notes"))).unwrap();
        assert_eq!(paths.repo, PathBuf::from("/work/notes"));
        assert!(paths.registry.starts_with("/h"));
    }

    #[test]
    fn test_author_prefers_configured_values() {
        let settings = SyncSettings {
            author_name: Some("Ada".into()),
            author_email: Some("ada@example.com".into()),
            ..SyncSettings::default()
        };
        let author = resolve_author(&settings);
        assert_eq!(author.name, "Ada");
        assert_eq!(author.email, "ada@example.com");
    }

    #[test]
    fn test_author_is_never_empty() {
        let author = resolve_author(&SyncSettings::default());
        assert!(!author.name.is_empty());
        assert!(!author.email.is_empty());
    }
}
