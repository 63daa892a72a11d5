//! CLI definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for list/query commands.
#[derive(ValueEnum, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table (default)
    #[default]
    Table,
    /// JSON (same as --json)
    Json,
}

pub mod commands;

/// gitnotes - keep notes in sync across devices through a git remote
#[derive(Parser, Debug)]
#[command(name = "gitnotes", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Home directory (default: ~/.gitnotes)
    #[arg(long, global = true, env = "GITNOTES_HOME")]
    pub home: Option<PathBuf>,

    /// Database path (default: <home>/data/notes.db)
    #[arg(long, global = true, env = "GITNOTES_DB")]
    pub db: Option<PathBuf>,

    /// Working tree path (default: <home>/repo)
    #[arg(long, global = true, env = "GITNOTES_REPO")]
    pub repo: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Output format (table, json)
    #[arg(long, value_enum, global = true, default_value_t)]
    pub format: OutputFormat,

    /// Output only the note ID (for scripting)
    #[arg(long, global = true)]
    pub silent: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the note store and the git working tree
    Init {
        /// Remote URL to sync with
        #[arg(long)]
        remote: Option<String>,

        /// Branch to sync (default: main)
        #[arg(long)]
        branch: Option<String>,

        /// Reinitialize even if a note store already exists
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Note management
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },

    /// Run a sync cycle with the remote
    Sync {
        /// Force-push the local branch (bootstrapping a remote only)
        #[arg(long)]
        force_push: bool,

        #[command(subcommand)]
        command: Option<SyncCommands>,
    },

    /// Remote management
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },

    /// Inspect or repair the file name registry
    Registry {
        #[command(subcommand)]
        command: RegistryCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Note Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum NoteCommands {
    /// Create a note
    Add {
        /// Note content; the first line is the heading. Reads stdin if omitted.
        content: Option<String>,
    },

    /// Replace a note's content
    Edit {
        /// Note ID or unique prefix
        id: String,

        /// New content. Reads stdin if omitted.
        content: Option<String>,
    },

    /// Show a note
    Show {
        /// Note ID or unique prefix
        id: String,
    },

    /// List notes
    List {
        /// Include archived notes
        #[arg(long)]
        archived: bool,

        /// Include archived and deleted notes
        #[arg(long)]
        all: bool,
    },

    /// Archive a note
    Archive {
        /// Note ID or unique prefix
        id: String,
    },

    /// Restore an archived note
    Unarchive {
        /// Note ID or unique prefix
        id: String,
    },

    /// Delete a note (kept as a tombstone until synced)
    Delete {
        /// Note ID or unique prefix
        id: String,
    },
}

// ============================================================================
// Sync Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Show what the next sync would do
    Status,
}

// ============================================================================
// Remote Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum RemoteCommands {
    /// Add or update the remote
    Add {
        /// Remote URL
        url: String,

        /// Remote name
        #[arg(long, default_value = "origin")]
        name: String,
    },

    /// Show the configured remote
    Show,
}

// ============================================================================
// Registry Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum RegistryCommands {
    /// List file name records
    List,

    /// Rebuild records by matching working tree files to note contents
    Rebuild,

    /// Drop records of notes that no longer exist or are deleted
    Prune,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sync_with_status() {
        let cli = Cli::parse_from(["gitnotes", "sync", "status"]);
        assert!(matches!(
            cli.command,
            Commands::Sync {
                command: Some(SyncCommands::Status),
                force_push: false
            }
        ));
    }

    #[test]
    fn test_parse_note_add() {
        let cli = Cli::parse_from(["gitnotes", "--json", "note", "add", "# Groceries"]);
        assert!(cli.json);
        match cli.command {
            Commands::Note {
                command: NoteCommands::Add { content },
            } => assert_eq!(content.as_deref(), Some("# Groceries")),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
