// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `diligence`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "diligence",
    version,
    about = "Run fan-out research pipelines and structured founder interviews.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Diligence.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Diligence.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DILIGENCE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the stage layout, but don't call any collaborator.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Identify competitors, research them in parallel and print a combined report.
    Research {
        /// File containing the startup description.
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Competitor to research ahead of discovered ones (repeatable).
        #[arg(long = "competitor", value_name = "NAME")]
        competitors: Vec<String>,
    },

    /// Generate investor questions, then interview the founder on stdin/stdout.
    Interview {
        /// File containing the startup context.
        #[arg(long, value_name = "FILE")]
        startup: PathBuf,

        /// Optional file describing the investor's profile and criteria.
        #[arg(long, value_name = "FILE")]
        investor: Option<PathBuf>,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
