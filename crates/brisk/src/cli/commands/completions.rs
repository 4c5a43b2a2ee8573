//! Shell completions

use std::io::Write;
use std::path::PathBuf;

use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};
use tracing::info;

use crate::cli::{output, Cli};

/// Generate shell completions
#[derive(Debug, Args)]
pub struct CompletionsCommand {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl CompletionsCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(shell = %self.shell, "generating completions");
        match &self.output {
            Some(path) => {
                let mut file = std::fs::File::create(path)?;
                self.write_to(&mut file);
                if !cli.quiet {
                    output::success(&format!(
                        "Completions written to {}",
                        output::path_style().apply_to(path.display())
                    ));
                }
            }
            None => self.write_to(&mut std::io::stdout()),
        }
        Ok(())
    }

    fn write_to(&self, out: &mut dyn Write) {
        let mut command = Cli::command();
        let name = command.get_name().to_string();
        generate(self.shell, &mut command, name, out);
    }
}
