// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! courier - fleet scheduler for browser-profile message delivery.
//!
//! This is the binary entry point: import work, start the fleet, inspect
//! progress. Shutdown is signal-driven; `courier start` exits 0 on a clean
//! drain, 1 on transient failure, 2 on configuration errors, and 3 when a
//! profile was terminally rejected.

mod import;
mod start;
mod status;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use courier_config::{load_config, load_config_from_path, validate_config, CourierConfig};
use courier_core::CourierError;

/// courier - fleet scheduler for browser-profile message delivery.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Path to a courier.toml (default: XDG hierarchy).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start workers for a campaign group.
    Start {
        /// Campaign group to process.
        #[arg(long)]
        group: String,
        /// Worker cap; 0 means one worker per eligible profile.
        #[arg(long, default_value_t = 0)]
        workers: usize,
    },
    /// Show task and profile counts for a group.
    Status {
        #[arg(long)]
        group: String,
    },
    /// How to stop a running fleet.
    Stop,
    /// Import chat destinations (one per line; `#` comments skipped).
    ImportChats {
        file: PathBuf,
        #[arg(long)]
        group: String,
    },
    /// Import message templates from a JSON array file.
    ImportMessages {
        file: PathBuf,
        #[arg(long)]
        group: String,
    },
    /// Import proxies (one credential string per line).
    ImportProxies { file: PathBuf },
    /// Register a profile for delivery work.
    AddProfile {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
    },
}

fn load(config_path: Option<&PathBuf>) -> Result<CourierConfig, CourierError> {
    let config = match config_path {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    }
    .map_err(|e| CourierError::Config(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let result = match cli.command {
        Commands::Start { group, workers } => {
            return match start::run_start(config, &group, workers).await {
                Ok(code) => ExitCode::from(code),
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::from(exit_for(&e))
                }
            };
        }
        Commands::Status { group } => status::run_status(config, &group).await,
        Commands::Stop => {
            println!("Workers stop on their own once the group is drained.");
            println!("To stop a running fleet, send SIGINT (Ctrl+C) or SIGTERM to the `courier start` process;");
            println!("it drains gracefully within the configured shutdown grace.");
            Ok(())
        }
        Commands::ImportChats { file, group } => import::chats(config, &file, &group).await,
        Commands::ImportMessages { file, group } => import::messages(config, &file, &group).await,
        Commands::ImportProxies { file } => import::proxies(config, &file).await,
        Commands::AddProfile { id, name } => import::profile(config, &id, &name).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(exit_for(&e))
        }
    }
}

fn exit_for(error: &CourierError) -> u8 {
    match error {
        CourierError::Config(_)
        | CourierError::ProxyExhausted { .. }
        | CourierError::NoMessages { .. } => 2,
        _ => 1,
    }
}
