//! CLI commands

mod cache;
mod completions;
mod list;
mod run;

pub use cache::CacheCommand;
pub use completions::CompletionsCommand;
pub use list::ListCommand;
pub use run::RunCommand;
