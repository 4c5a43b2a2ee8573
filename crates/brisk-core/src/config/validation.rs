//! Configuration validation

use globset::Glob;
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_shell(config)?;
    validate_discovery(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_shell(config: &Config) -> Result<()> {
    if config.shell.program.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "shell.program".to_string(),
            message: "program cannot be empty".to_string(),
        }
        .into());
    }

    Ok(())
}

fn validate_discovery(config: &Config) -> Result<()> {
    for (i, pattern) in config.discovery.ignore.iter().enumerate() {
        if let Err(e) = Glob::new(pattern) {
            return Err(ConfigError::InvalidValue {
                field: format!("discovery.ignore[{}]", i),
                message: e.to_string(),
            }
            .into());
        }
    }

    Ok(())
}
