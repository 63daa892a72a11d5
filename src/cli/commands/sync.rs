//! Sync command implementations.
//!
//! `gitnotes sync` runs one full cycle against the configured remote.
//! `gitnotes sync status` reports what the next cycle would do without
//! contacting the remote.

use crate::cli::SyncCommands;
use crate::cli::commands::{load_settings, open_register, open_repository, open_storage};
use crate::config::GitnotesPaths;
use crate::error::Result;
use crate::sync::{get_sync_status, print_status, GitSyncer, PushStatus, SyncReport};
use colored::Colorize;

/// Execute sync commands.
pub fn execute(
    command: Option<&SyncCommands>,
    force_push: bool,
    paths: &GitnotesPaths,
    json: bool,
) -> Result<()> {
    match command {
        Some(SyncCommands::Status) => status(paths, json),
        None => run(force_push, paths, json),
    }
}

fn run(force_push: bool, paths: &GitnotesPaths, json: bool) -> Result<()> {
    let storage = open_storage(paths)?;
    let settings = load_settings(paths)?;
    let repo = open_repository(paths, &settings)?;
    let register = open_register(paths, &storage)?;

    let mut syncer = GitSyncer::new(storage, repo, register)
        .with_lock(paths.lock.clone())
        .force_push(force_push);
    let report = syncer.sync()?;

    if crate::is_silent() {
        if let Some(head) = &report.head {
            println!("{head}");
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.recovered {
        println!("{}", "Committed changes left by an interrupted sync.".yellow());
    }
    println!("Pull: {}", report.pull);

    if report.is_noop() {
        println!("{}", "Already in sync.".green());
    } else {
        let imported = &report.imported;
        println!(
            "Received: {} created, {} updated, {} deleted",
            imported.created, imported.updated, imported.deleted
        );
        let exported = &report.exported;
        println!(
            "Sent:     {} created, {} updated, {} deleted, {} renamed",
            exported.created, exported.updated, exported.deleted, exported.renamed
        );
    }

    if report.imported.kept > 0 {
        println!(
            "{}",
            format!(
                "Kept {} locally edited note(s) that were deleted elsewhere.",
                report.imported.kept
            )
            .yellow()
        );
    }
    if report.forked > 0 {
        println!(
            "{}",
            format!(
                "{} conflicting edit(s) were saved as new notes.",
                report.forked
            )
            .yellow()
        );
    }

    match &report.push {
        PushStatus::Pushed => println!("Push: {}", "ok".green()),
        PushStatus::Skipped => println!("Push: nothing to push"),
        PushStatus::NoRemote => println!(
            "Push: {}",
            "no remote configured (run 'gitnotes remote add <url>')".dimmed()
        ),
        PushStatus::Failed { reason } => {
            println!("Push: {} ({reason})", "failed".red());
            println!("{}", "Local changes are committed and will be pushed next sync.".dimmed());
        }
    }

    if let Some(head) = &report.head {
        println!("Head: {}", &head[..head.len().min(8)]);
    }
}

fn status(paths: &GitnotesPaths, json: bool) -> Result<()> {
    let storage = open_storage(paths)?;
    let settings = load_settings(paths)?;
    let repo = open_repository(paths, &settings)?;
    let register = open_register(paths, &storage)?;

    let sync_status = get_sync_status(&storage, &repo, &register, &paths.lock)?;

    if json {
        println!("{}", serde_json::to_string(&sync_status)?);
    } else {
        print_status(&sync_status);
    }
    Ok(())
}
