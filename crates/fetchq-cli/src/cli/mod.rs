//! CLI for the fetchq scheduler.

mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fetchq_core::config;
use std::path::PathBuf;

use commands::{run_completions, run_config, run_get, run_man, GetOptions};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "fetchq")]
#[command(about = "fetchq: fetch URLs through a bounded, newest-first admission scheduler", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch URLs and save each body to a file.
    Get {
        /// http, https or file URLs. Repeated URLs are fetched once per occurrence.
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,
        /// Directory for fetched files (default: current directory).
        #[arg(long, short = 'o', value_name = "DIR")]
        output_dir: Option<PathBuf>,
        /// Maximum concurrent transfers (overrides config).
        #[arg(long, value_name = "N")]
        budget: Option<usize>,
        /// Admit the oldest queued URL first instead of the newest.
        #[arg(long)]
        fifo: bool,
        /// Run one transfer at a time; each is saved and released before the next starts.
        #[arg(long)]
        serialized: bool,
        /// Print the SHA-256 of every fetched body.
        #[arg(long)]
        sha256: bool,
        /// Print one JSON object per request instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Show the config file location and the effective configuration.
    Config,

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Print the man page (roff) to stdout.
    Man,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Get {
                urls,
                output_dir,
                budget,
                fifo,
                serialized,
                sha256,
                json,
            } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                let output_dir = match output_dir {
                    Some(dir) => dir,
                    None => std::env::current_dir()?,
                };
                let opts = GetOptions {
                    urls,
                    output_dir,
                    budget,
                    fifo,
                    serialized,
                    sha256,
                    json,
                };
                run_get(&cfg, opts).await?;
            }
            CliCommand::Config => {
                let cfg = config::load_or_init()?;
                run_config(&cfg)?;
            }
            CliCommand::Completions { shell } => run_completions(shell, Cli::command()),
            CliCommand::Man => run_man(Cli::command())?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
