//! Sync settings stored in `config.json`.

use crate::error::{Error, Result};
use crate::git::{DEFAULT_BRANCH, DEFAULT_REMOTE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// The full gitnotes configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitnotesConfig {
    #[serde(default)]
    pub sync: SyncSettings,
}

/// How this device talks to the shared repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub remote_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote_name: DEFAULT_REMOTE.to_string(),
            remote_url: None,
            branch: DEFAULT_BRANCH.to_string(),
            author_name: None,
            author_email: None,
        }
    }
}

/// Load the configuration. A missing file yields defaults.
///
/// # Errors
///
/// Returns `Error::Config` if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<GitnotesConfig> {
    if !path.exists() {
        return Ok(GitnotesConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Save the configuration.
///
/// # Errors
///
/// Returns `Error::Config` if the file cannot be written.
pub fn save_config(path: &Path, config: &GitnotesConfig) -> Result<()> {
    // Ensure directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    fs::write(path, content)
        .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = load_config(&temp.path().join("config.json")).unwrap();
        assert_eq!(config.sync.remote_name, "origin");
        assert_eq!(config.sync.branch, "main");
        assert!(config.sync.remote_url.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/config.json");
        let mut config = GitnotesConfig::default();
        config.sync.remote_url = Some("git@example.com:me/notes.git".into());

        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"sync":{"branch":"notes"}}"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.sync.branch, "notes");
        assert_eq!(config.sync.remote_name, "origin");
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(load_config(&path), Err(Error::Config(_))));
    }
}
