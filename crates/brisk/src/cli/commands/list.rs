//! List command

use std::sync::Arc;

use clap::Args;
use console::style;
use tracing::info;

use brisk_tasks::{Task, TracingReporter};

use crate::cli::{output, Cli, OutputFormat, Project};

/// List declared tasks
#[derive(Debug, Args)]
pub struct ListCommand;

impl ListCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!("executing list command");
        let project = Project::load(&cli.working_dir()?, Arc::new(TracingReporter))?;
        let tasks = project.engine.registry().tasks();

        if cli.format == OutputFormat::Json {
            let entries: Vec<_> = tasks.iter().map(|t| entry(t)).collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }

        if tasks.is_empty() {
            if !cli.quiet {
                output::warning(&format!(
                    "No tasks declared under {}",
                    output::path_style().apply_to(project.root().display())
                ));
            }
            return Ok(());
        }

        if !cli.quiet {
            println!("{}", output::header("Tasks"));
            println!();
        }
        let width = tasks.iter().map(|t| t.fqn().len()).max().unwrap_or(0);
        for task in &tasks {
            match task.description() {
                Some(description) => println!(
                    "  {:<width$}  {}",
                    task.fqn(),
                    style(description).dim(),
                    width = width
                ),
                None => println!("  {}", task.fqn()),
            }
        }

        Ok(())
    }
}

fn entry(task: &Task) -> serde_json::Value {
    serde_json::json!({
        "task": task.fqn(),
        "description": task.description(),
        "workdir": task.workdir(),
    })
}
