// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `docagent`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "docagent",
    version,
    about = "Run document steps through plugin handlers and manage long-running plugins.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the agent config file (TOML). Defaults apply when it is
    /// missing.
    #[arg(long, global = true, value_name = "PATH", default_value = "Agent.toml")]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DOCAGENT_LOG` or `info` is used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run one pass of a persisted document and write its state back.
    Run(RunArgs),
    /// List the plugins this agent can resolve.
    Plugins,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Document state file (JSON).
    #[arg(long, value_name = "FILE")]
    pub document: PathBuf,

    /// Print each step's disposition without executing anything.
    #[arg(long)]
    pub dry_run: bool,
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
