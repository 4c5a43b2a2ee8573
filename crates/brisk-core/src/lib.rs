//! Brisk Core - Core library for the Brisk build orchestrator
//!
//! This crate provides the foundational types, error handling, configuration
//! and build-declaration (`make.toml`) loading used by the task engine and
//! the CLI.

pub mod config;
pub mod declaration;
pub mod error;
pub mod paths;

pub use declaration::{discover_declarations, DeclarationFile, DependencyRef, TaskDeclaration};
pub use error::{BriskError, Result};
pub use paths::{normalize_path, task_fqn};
