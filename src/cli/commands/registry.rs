//! Registry command implementations.
//!
//! The registry is a cache of which file holds which note. These commands
//! inspect it and repair it after it was lost or edited by hand.

use crate::cli::RegistryCommands;
use crate::cli::commands::{open_register, open_storage};
use crate::config::GitnotesPaths;
use crate::error::Result;
use crate::storage::NoteStore;
use crate::sync::{FileNameRegister, FileRecord, SyncLock};
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct RegistryListOutput {
    records: Vec<FileRecord>,
    count: usize,
}

#[derive(Serialize)]
struct RegistryRepairOutput {
    action: &'static str,
    records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pruned: Option<usize>,
}

/// Execute registry commands.
pub fn execute(command: &RegistryCommands, paths: &GitnotesPaths, json: bool) -> Result<()> {
    let storage = open_storage(paths)?;

    match command {
        RegistryCommands::List => {
            let register = open_register(paths, &storage)?;
            list(&register, json)
        }
        RegistryCommands::Rebuild => {
            let _lock = SyncLock::acquire(&paths.lock)?;
            let mut register = open_register(paths, &storage)?;
            let records = register.rebuild_from_scan(&storage.list_notes()?)?;
            print_repair(
                &RegistryRepairOutput {
                    action: "rebuild",
                    records,
                    pruned: None,
                },
                json,
            )
        }
        RegistryCommands::Prune => {
            let _lock = SyncLock::acquire(&paths.lock)?;
            let mut register = open_register(paths, &storage)?;
            let live: Vec<_> = storage
                .list_notes()?
                .into_iter()
                .filter(|n| n.is_visible())
                .collect();
            let pruned = register.prune_stale_records(&live)?;
            print_repair(
                &RegistryRepairOutput {
                    action: "prune",
                    records: register.len(),
                    pruned: Some(pruned),
                },
                json,
            )
        }
    }
}

fn list(register: &FileNameRegister, json: bool) -> Result<()> {
    let records = register.records();

    if json {
        let output = RegistryListOutput {
            count: records.len(),
            records,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No file records.");
        return Ok(());
    }
    for record in &records {
        println!("{}  {}", record.file_name, record.note_id.dimmed());
    }
    println!();
    println!("{} record(s)", records.len());
    Ok(())
}

fn print_repair(output: &RegistryRepairOutput, json: bool) -> Result<()> {
    if crate::is_silent() {
        println!("{}", output.records);
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string(output)?);
        return Ok(());
    }

    match output.pruned {
        Some(pruned) => println!(
            "Pruned {pruned} stale record(s); {} remain.",
            output.records
        ),
        None => println!("Rebuilt registry with {} record(s).", output.records),
    }
    Ok(())
}
