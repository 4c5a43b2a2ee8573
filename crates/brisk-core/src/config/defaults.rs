//! Default configuration values

use std::path::PathBuf;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "brisk.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "brisk.yaml";

/// Alternative configuration file name
pub const ALT_CONFIG_FILE: &str = ".brisk.toml";

/// Name of the per-directory build declaration file
pub const DECLARATION_FILE_NAME: &str = "make.toml";

/// Shell used when none is configured
pub const DEFAULT_SHELL: &str = "sh";

/// Directory names skipped during discovery
pub const DEFAULT_IGNORED_DIRS: &[&str] = &["node_modules", "target", ".*"];

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ALT_CONFIG_FILE,
        ".brisk.yaml",
    ]
}

/// Cache root used when `cache.dir` is unset
pub fn default_cache_root() -> PathBuf {
    std::env::temp_dir().join("brisk")
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Brisk configuration

[cache]
enabled = true
# dir = "/tmp/brisk"

[discovery]
ignore = ["node_modules", "target", ".*"]

[shell]
program = "sh"
"#;
