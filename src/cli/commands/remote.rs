//! Remote command implementations.

use crate::cli::RemoteCommands;
use crate::cli::commands::{load_settings, open_repository};
use crate::config::{load_config, save_config, GitnotesPaths};
use crate::error::{Error, Result};
use crate::git::GitRepository;
use serde::Serialize;

#[derive(Serialize)]
struct RemoteOutput {
    name: String,
    url: Option<String>,
    branch: String,
}

/// Execute remote commands.
pub fn execute(command: &RemoteCommands, paths: &GitnotesPaths, json: bool) -> Result<()> {
    if !paths.db.exists() {
        return Err(Error::NotInitialized);
    }

    match command {
        RemoteCommands::Add { url, name } => add(name, url, paths, json),
        RemoteCommands::Show => show(paths, json),
    }
}

fn add(name: &str, url: &str, paths: &GitnotesPaths, json: bool) -> Result<()> {
    if url.trim().is_empty() {
        return Err(Error::InvalidArgument("remote URL must not be empty".to_string()));
    }

    let mut config = load_config(&paths.config)?;
    config.sync.remote_name = name.to_string();
    config.sync.remote_url = Some(url.to_string());
    save_config(&paths.config, &config)?;

    let settings = load_settings(paths)?;
    let mut repo = open_repository(paths, &settings)?;
    repo.add_remote(name, url)?;
    tracing::info!(name, url, "remote configured");

    if crate::is_silent() {
        println!("{name}");
        return Ok(());
    }

    if json {
        let output = RemoteOutput {
            name: name.to_string(),
            url: Some(url.to_string()),
            branch: repo.branch().to_string(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Remote {name} set to {url}");
        println!("Run 'gitnotes sync' to pull and push notes.");
    }
    Ok(())
}

fn show(paths: &GitnotesPaths, json: bool) -> Result<()> {
    let settings = load_settings(paths)?;
    let repo = open_repository(paths, &settings)?;
    let output = RemoteOutput {
        name: repo.remote_name().to_string(),
        url: repo.remote_url(),
        branch: repo.branch().to_string(),
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        match &output.url {
            Some(url) => println!("{} {url} (branch {})", output.name, output.branch),
            None => println!("No remote configured."),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::init;
    use tempfile::TempDir;

    #[test]
    fn test_add_remote_updates_config_and_repo() {
        let temp_dir = TempDir::new().unwrap();
        let paths = GitnotesPaths::under(temp_dir.path());
        init::execute(&paths, None, None, false, true).unwrap();

        add("origin", "/srv/notes.git", &paths, true).unwrap();

        let config = load_config(&paths.config).unwrap();
        assert_eq!(config.sync.remote_url.as_deref(), Some("/srv/notes.git"));
        let repo = open_repository(&paths, &config.sync).unwrap();
        assert_eq!(repo.remote_url().as_deref(), Some("/srv/notes.git"));
    }

    #[test]
    fn test_remote_requires_init() {
        let temp_dir = TempDir::new().unwrap();
        let paths = GitnotesPaths::under(temp_dir.path());
        let result = execute(&RemoteCommands::Show, &paths, true);
        assert!(matches!(result, Err(Error::NotInitialized)));
    }
}
