// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parlo - a customer-support chat relay.
//!
//! This is the binary entry point for the Parlo daemon.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};

mod doctor;
mod serve;

/// Parlo - a customer-support chat relay.
#[derive(Parser, Debug)]
#[command(name = "parlo", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Parlo relay server.
    Serve,
    /// Run diagnostic checks against the Parlo environment.
    Doctor {
        /// Run additional intensive checks.
        #[arg(long)]
        deep: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match parlo_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            parlo_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Doctor { deep }) => {
            if let Err(e) = doctor::run_doctor(&config, deep).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        None => {
            println!("parlo: use --help for available commands");
        }
    }
}
