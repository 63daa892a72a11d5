//! gitnotes CLI entry point.

use clap::Parser;
use gitnotes::cli::commands;
use gitnotes::cli::{Cli, Commands, OutputFormat};
use gitnotes::config::resolve_paths;
use gitnotes::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.silent {
        gitnotes::SILENT.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR --format json OR non-TTY stdout
    let json = cli.json
        || cli.format == OutputFormat::Json
        || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    // Run the command and handle errors
    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    // Commands that need no home directory
    match &cli.command {
        Commands::Version => return commands::version::execute(json),
        Commands::Completions { shell } => return commands::completions::execute(shell),
        _ => {}
    }

    let paths = resolve_paths(cli.home.as_deref(), cli.db.as_deref(), cli.repo.as_deref())
        .ok_or_else(|| Error::Config("Could not determine the gitnotes home directory".to_string()))?;

    match &cli.command {
        Commands::Init {
            remote,
            branch,
            force,
        } => commands::init::execute(&paths, remote.as_deref(), branch.as_deref(), *force, json),

        // Notes
        Commands::Note { command } => commands::note::execute(command, &paths, json),

        // Sync
        Commands::Sync {
            force_push,
            command,
        } => commands::sync::execute(command.as_ref(), *force_push, &paths, json),

        // Remote
        Commands::Remote { command } => commands::remote::execute(command, &paths, json),

        // Registry
        Commands::Registry { command } => commands::registry::execute(command, &paths, json),

        Commands::Version | Commands::Completions { .. } => Ok(()),
    }
}
