//! Cache management command

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};
use console::style;
use tracing::info;

use brisk_tasks::TracingReporter;

use crate::cli::{output, Cli, Project};

/// Task cache management
#[derive(Debug, Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Print the cached record of a task
    Dump(CacheDumpCommand),
    /// Delete the cache document of a directory
    Clear(CacheClearCommand),
}

/// Print the cached record of a task
#[derive(Debug, Args)]
pub struct CacheDumpCommand {
    /// Task whose record to print
    #[arg(env = "TASK")]
    pub task: Option<String>,
}

/// Delete the cache document of a task's directory
#[derive(Debug, Args)]
pub struct CacheClearCommand {
    /// Task whose directory to clear; the build root when omitted
    pub task: Option<String>,

    /// Skip confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl CacheCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.action {
            CacheAction::Dump(cmd) => cmd.execute(cli),
            CacheAction::Clear(cmd) => cmd.execute(cli),
        }
    }
}

impl CacheDumpCommand {
    fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let Some(name) = &self.task else {
            anyhow::bail!("no task given; pass TASK or set the TASK environment variable");
        };
        info!(task = %name, "executing cache dump command");

        let project = Project::load(&cli.working_dir()?, Arc::new(TracingReporter))?;
        let task = project.task(name)?;
        println!("{}", task.dump_cache(&project.engine));
        Ok(())
    }
}

impl CacheClearCommand {
    fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let project = Project::load(&cli.working_dir()?, Arc::new(TracingReporter))?;
        let workdir: PathBuf = match &self.task {
            Some(name) => project.task(name)?.workdir().to_path_buf(),
            None => project.root().to_path_buf(),
        };
        let cache = project.engine.cache();
        let document = cache.document_path(&workdir);
        info!(workdir = %workdir.display(), "executing cache clear command");

        if !document.exists() {
            if !cli.quiet {
                output::info(&format!(
                    "Nothing cached for {}",
                    output::path_style().apply_to(workdir.display())
                ));
            }
            return Ok(());
        }

        if !self.yes {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt(format!("Remove cached records at {}?", document.display()))
                .default(false)
                .interact()?;

            if !confirmed {
                println!("{}", style("Aborted.").yellow());
                return Ok(());
            }
        }

        cache.clear(&workdir)?;

        if !cli.quiet {
            output::success(&format!(
                "Cache cleared for {}",
                output::path_style().apply_to(workdir.display())
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_clear_arguments() {
        let cli = Cli::try_parse_from(["brisk", "cache", "clear", "lib/build", "-y"]).unwrap();
        match cli.command {
            Some(crate::cli::Commands::Cache(CacheCommand {
                action: CacheAction::Clear(cmd),
            })) => {
                assert_eq!(cmd.task.as_deref(), Some("lib/build"));
                assert!(cmd.yes);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_dump_takes_task_argument() {
        let cli = Cli::try_parse_from(["brisk", "cache", "dump", "app/build"]).unwrap();
        match cli.command {
            Some(crate::cli::Commands::Cache(CacheCommand {
                action: CacheAction::Dump(cmd),
            })) => assert_eq!(cmd.task.as_deref(), Some("app/build")),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
