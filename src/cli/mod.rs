//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand, WatchCommand};
use std::ffi::OsString;

/// Build-and-verify workflow runner
#[derive(Debug, Parser, Clone)]
#[command(name = "workflow")]
#[command(author = "Workflow Runner Contributors")]
#[command(version)]
#[command(about = "Run declarative CI workflows on the local host", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print each step's output as it completes
    #[arg(short, long, global = true)]
    pub stream: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Evaluate an event and run the workflow if it triggers
    Run(RunCommand),

    /// Validate a workflow file
    Validate(ValidateCommand),

    /// Run the workflow every time one of its schedules fires
    Watch(WatchCommand),

    /// List workflows in the run history
    List(ListCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
