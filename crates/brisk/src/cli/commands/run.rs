//! Run command: execute one task and whatever it depends on

use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::info;

use brisk_tasks::{TaskEvent, TaskReporter, TaskReporterRegistry, TaskResult};

use crate::cli::{output, Cli, OutputFormat, Project};

/// Run a task by its fully-qualified name
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Task to run, e.g. `app/build`
    pub task: String,

    /// Ignore cached results
    #[arg(long)]
    pub no_cache: bool,
}

impl RunCommand {
    pub fn new(task: &str, no_cache: bool) -> Self {
        Self {
            task: task.to_string(),
            no_cache,
        }
    }

    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(task = %self.task, no_cache = self.no_cache, "executing run command");
        let mut reporters = TaskReporterRegistry::new();
        if !cli.quiet && cli.format == OutputFormat::Text {
            reporters.register(ConsoleReporter::new(cli.verbose));
        }

        let no_cache = self.no_cache;
        let project = Project::load_with(&cli.working_dir()?, Arc::new(reporters), |options| {
            if no_cache {
                options.use_cache = false;
            }
        })?;
        let task = project.task(&self.task)?;

        let started = Instant::now();
        let result = project.engine.run_task(&task).await?;

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&summary(task.fqn(), &result))?);
        } else if !cli.quiet {
            println!();
            output::success(&format!(
                "{} {}{}",
                output::task_style().apply_to(task.fqn()),
                style(output::seconds(started.elapsed())).dim(),
                if result.cached { " (cached)" } else { "" }
            ));
            if cli.verbose {
                for file in result.outputs.iter().flat_map(|a| &a.files) {
                    println!("  {}", output::path_style().apply_to(file.display()));
                }
            }
        }

        Ok(())
    }
}

fn summary(fqn: &str, result: &TaskResult) -> serde_json::Value {
    serde_json::json!({
        "task": fqn,
        "cached": result.cached,
        "inputs": result.inputs,
        "outputs": result.outputs.as_ref().map(|a| &a.files),
    })
}

/// Console reporter with live command output
struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { fqn } => {
                if self.verbose {
                    println!("  {} {}", style("▸").dim(), style(fqn).bold());
                }
            }
            TaskEvent::CacheHit { fqn } => {
                println!(
                    "  {} {} {}",
                    style("✓").green(),
                    style(fqn).green(),
                    style("(cached)").cyan()
                );
            }
            TaskEvent::CacheMiss { fqn, reason } => {
                if self.verbose {
                    println!("  {} {} {}", style("○").yellow(), fqn, style(reason).dim());
                }
            }
            TaskEvent::Command { fqn, command } => {
                println!("  {} {} {}", style(format!("[{}]", fqn)).dim(), style("$").dim(), command);
            }
            TaskEvent::Output { fqn, line, is_stderr } => {
                if *is_stderr {
                    eprintln!("    {} {}", style(format!("[{}]", fqn)).red().dim(), line);
                } else {
                    println!("    {} {}", style(format!("[{}]", fqn)).dim(), line);
                }
            }
            TaskEvent::Completed { fqn, duration } => {
                println!(
                    "  {} {} {}",
                    style("✓").green(),
                    style(fqn).green(),
                    style(output::seconds(*duration)).dim()
                );
            }
            TaskEvent::Failed { fqn, error } => {
                println!("  {} {} {}", style("✗").red(), style(fqn).red(), style(error).red().dim());
            }
            TaskEvent::Joined { .. } => {}
        }
    }
}
