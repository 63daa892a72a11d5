//! Note command implementations.

use crate::cli::NoteCommands;
use crate::cli::commands::open_storage;
use crate::config::GitnotesPaths;
use crate::error::{Error, Result};
use crate::model::{Note, NoteState};
use crate::storage::{NoteStore, SqliteStorage};
use colored::Colorize;
use serde::Serialize;
use std::io::{IsTerminal, Read};

/// A note as printed by `--json`.
#[derive(Serialize)]
struct NoteOutput<'a> {
    #[serde(flatten)]
    note: &'a Note,
    state: NoteState,
    heading: &'a str,
}

impl<'a> From<&'a Note> for NoteOutput<'a> {
    fn from(note: &'a Note) -> Self {
        Self {
            note,
            state: note.state(),
            heading: note.heading(),
        }
    }
}

#[derive(Serialize)]
struct NoteListOutput<'a> {
    notes: Vec<NoteOutput<'a>>,
    count: usize,
}

/// Execute note commands.
pub fn execute(command: &NoteCommands, paths: &GitnotesPaths, json: bool) -> Result<()> {
    let mut storage = open_storage(paths)?;

    match command {
        NoteCommands::Add { content } => {
            let content = read_content(content.as_deref())?;
            let note = storage.create_note(&content)?;
            print_mutation("Created", &note, json)
        }
        NoteCommands::Edit { id, content } => {
            let id = storage.resolve_note_id(id)?;
            let content = read_content(content.as_deref())?;
            let note = storage.edit_note(&id, &content)?;
            print_mutation("Updated", &note, json)
        }
        NoteCommands::Show { id } => show(&storage, id, json),
        NoteCommands::List { archived, all } => list(&storage, *archived, *all, json),
        NoteCommands::Archive { id } => {
            let id = storage.resolve_note_id(id)?;
            let note = storage.archive_note(&id)?;
            print_mutation("Archived", &note, json)
        }
        NoteCommands::Unarchive { id } => {
            let id = storage.resolve_note_id(id)?;
            let note = storage.unarchive_note(&id)?;
            print_mutation("Restored", &note, json)
        }
        NoteCommands::Delete { id } => {
            let id = storage.resolve_note_id(id)?;
            let note = storage.delete_note(&id)?;
            print_mutation("Deleted", &note, json)
        }
    }
}

/// Content from the argument, or from stdin when it is piped.
fn read_content(arg: Option<&str>) -> Result<String> {
    let content = match arg {
        Some(text) => text.to_string(),
        None => {
            let mut stdin = std::io::stdin();
            if stdin.is_terminal() {
                return Err(Error::InvalidArgument(
                    "note content is required (pass it as an argument or pipe it on stdin)"
                        .to_string(),
                ));
            }
            let mut buf = String::new();
            stdin.read_to_string(&mut buf)?;
            buf
        }
    };

    if content.trim().is_empty() {
        return Err(Error::InvalidArgument("note content must not be empty".to_string()));
    }
    Ok(content)
}

fn print_mutation(verb: &str, note: &Note, json: bool) -> Result<()> {
    if crate::is_silent() {
        println!("{}", note.id);
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string(&NoteOutput::from(note))?);
    } else {
        println!("{verb} note {}: {}", short_id(&note.id).cyan(), display_heading(note));
    }
    Ok(())
}

fn show(storage: &SqliteStorage, id: &str, json: bool) -> Result<()> {
    let id = storage.resolve_note_id(id)?;
    let note = storage
        .get_note(&id)?
        .ok_or_else(|| Error::NoteNotFound { id: id.clone() })?;

    if json {
        println!("{}", serde_json::to_string(&NoteOutput::from(&note))?);
        return Ok(());
    }

    println!(
        "{} {} {}",
        note.id.cyan(),
        format!("[{}]", note.state()).dimmed(),
        format!("updated {}", format_time(note.updated_at)).dimmed()
    );
    println!();
    println!("{}", note.content.trim_end());
    Ok(())
}

fn list(storage: &SqliteStorage, archived: bool, all: bool, json: bool) -> Result<()> {
    let notes: Vec<Note> = storage
        .list_notes()?
        .into_iter()
        .filter(|n| match n.state() {
            NoteState::Active => true,
            NoteState::Archived => archived || all,
            NoteState::Deleted => all,
        })
        .collect();

    if json {
        let output = NoteListOutput {
            count: notes.len(),
            notes: notes.iter().map(NoteOutput::from).collect(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if notes.is_empty() {
        println!("No notes found.");
        return Ok(());
    }

    for note in &notes {
        let state = match note.state() {
            NoteState::Active => String::new(),
            NoteState::Archived => " [archived]".yellow().to_string(),
            NoteState::Deleted => " [deleted]".red().to_string(),
        };
        println!(
            "{}  {}{}  {}",
            short_id(&note.id).cyan(),
            display_heading(note),
            state,
            format_time(note.updated_at).dimmed()
        );
    }
    println!();
    println!("{} note(s)", notes.len());
    Ok(())
}

fn display_heading(note: &Note) -> &str {
    match note.heading() {
        "" => "(empty)",
        heading => heading,
    }
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(8)]
}

fn format_time(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map_or_else(|| secs.to_string(), |dt| dt.format("%Y-%m-%d %H:%M").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_content_rejects_blank() {
        assert!(matches!(
            read_content(Some("  \n")),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(read_content(Some("# Hi")).unwrap(), "# Hi");
    }

    #[test]
    fn test_note_output_includes_state_and_heading() {
        let mut note = Note::with_timestamps("n1", "\n# Plans\nbody", 1, 2);
        note.archived_at = Some(3);
        let value = serde_json::to_value(NoteOutput::from(&note)).unwrap();
        assert_eq!(value["id"], "n1");
        assert_eq!(value["state"], "archived");
        assert_eq!(value["heading"], "# Plans");
    }

    #[test]
    fn test_display_heading_for_empty_note() {
        let note = Note::with_timestamps("n1", "", 1, 1);
        assert_eq!(display_heading(&note), "(empty)");
    }
}
