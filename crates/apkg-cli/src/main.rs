//! apkg-export CLI
//!
//! Reads Anki deck archives (`.apkg`) and exports their cards as tables,
//! one per note type, as JSON or an `.xlsx` workbook.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use apkg_core::Config;

mod commands;
mod logging;
mod output;
mod server;
mod xlsx;

use commands::export::ExportArgs;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "apkg-export")]
#[command(about = "Export Anki deck archives to spreadsheets")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export cards as one table per note type
    Export {
        /// Deck archive (.apkg)
        archive: PathBuf,
        /// Write an .xlsx workbook here
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Template position to export (repeatable, scanned in order)
        #[arg(long = "ord", value_name = "N")]
        ords: Vec<i64>,
        /// Leave out the header row
        #[arg(long)]
        no_header: bool,
        /// Leave out the deck column
        #[arg(long)]
        no_deck: bool,
        /// Keep note types that have no rows
        #[arg(long)]
        keep_empty: bool,
        /// Extract into this directory instead of a temporary one
        #[arg(long, value_name = "DIR")]
        extract_to: Option<PathBuf>,
        /// Move the collection database here before reading it
        #[arg(long, value_name = "PATH")]
        database: Option<PathBuf>,
    },
    /// List note types and their fields
    Models {
        archive: PathBuf,
    },
    /// List decks
    Decks {
        archive: PathBuf,
    },
    /// List notes
    Notes {
        archive: PathBuf,
    },
    /// Show a note
    Note {
        archive: PathBuf,
        /// Note ID
        id: i64,
    },
    /// List cards
    Cards {
        archive: PathBuf,
        /// Only cards at this template position
        #[arg(long, value_name = "N")]
        ord: Option<i64>,
    },
    /// Show a card and its note
    Card {
        archive: PathBuf,
        /// Card ID
        id: i64,
    },
    /// Accept uploads over HTTP and serve their exports
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (extract_dir, bind, template_positions, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands work on the file itself
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), config_path, &output);
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    let default_level = match &cli.command {
        Commands::Serve { .. } => Some("info"),
        _ => None,
    };
    logging::init(&config, default_level);

    match cli.command {
        Commands::Export {
            archive,
            output: destination,
            ords,
            no_header,
            no_deck,
            keep_empty,
            extract_to,
            database,
        } => {
            let args = ExportArgs {
                archive,
                output: destination,
                ords,
                no_header,
                no_deck,
                keep_empty,
                extract_to,
                database,
            };
            commands::export::run(args, &config, &output)
        }
        Commands::Models { archive } => commands::inspect::models(&archive, &config, &output),
        Commands::Decks { archive } => commands::inspect::decks(&archive, &config, &output),
        Commands::Notes { archive } => commands::inspect::notes(&archive, &config, &output),
        Commands::Note { archive, id } => commands::inspect::note(&archive, id, &config, &output),
        Commands::Cards { archive, ord } => {
            commands::inspect::cards(&archive, ord, &config, &output)
        }
        Commands::Card { archive, id } => commands::inspect::card(&archive, id, &config, &output),
        Commands::Serve { bind } => commands::serve::run(bind, &config).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}
