//! CLI definition and command handling

pub mod commands;
pub mod output;
mod project;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::{CacheCommand, CompletionsCommand, ListCommand, RunCommand};

pub use project::Project;

/// Brisk - Incremental build orchestrator
#[derive(Debug, Parser)]
#[command(name = "brisk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Task to run, shorthand for `brisk run <TASK>`
    pub task: Option<String>,

    /// Ignore cached results
    #[arg(long)]
    pub no_cache: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a task by its fully-qualified name
    Run(RunCommand),

    /// List declared tasks
    List(ListCommand),

    /// Inspect or clear the task cache
    Cache(CacheCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(&self) -> anyhow::Result<()> {
        match &self.command {
            Some(Commands::Run(cmd)) => cmd.execute(self),
            Some(Commands::List(cmd)) => cmd.execute(self),
            Some(Commands::Cache(cmd)) => cmd.execute(self),
            Some(Commands::Completions(cmd)) => cmd.execute(self),
            None => match &self.task {
                Some(task) => RunCommand::new(task, self.no_cache).execute(self),
                None => anyhow::bail!("no task given; `brisk list` shows the declared tasks"),
            },
        }
    }

    /// Directory the command was invoked for
    pub fn working_dir(&self) -> anyhow::Result<PathBuf> {
        let cwd = std::env::current_dir()?;
        Ok(match &self.directory {
            Some(dir) => cwd.join(dir),
            None => cwd,
        })
    }
}
