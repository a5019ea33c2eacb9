//! Configuration management for mergetail.
//!
//! This module defines the structure of the `mergetail.toml` configuration file
//! and provides functionality to load and parse it.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::process::CommandSpec;

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "mergetail.toml";

/// Top-level configuration structure corresponding to `mergetail.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Token replaced by the input line in `template`.
    pub placeholder: Option<String>,
    /// Argument template; each entry is split with shell rules.
    pub template: Option<Vec<String>>,
    /// Whether to colorize prefixes (default: true).
    pub color: Option<bool>,
    /// Longest accepted output line in bytes.
    pub max_line_bytes: Option<usize>,
    /// Commands to run instead of reading them from stdin.
    #[serde(default, rename = "command")]
    pub commands: Vec<CommandConfig>,
}

/// Configuration for a single command.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    /// Label shown in front of every output line.
    pub prefix: String,
    /// Command line in shell syntax.
    pub cmd: String,
}

impl CommandConfig {
    pub fn to_spec(&self) -> Result<CommandSpec> {
        let mut parts = shell_words::split(&self.cmd)
            .with_context(|| format!("failed to parse cmd for {}", self.prefix))?;
        if parts.is_empty() {
            return Err(anyhow!("empty cmd for {}", self.prefix));
        }
        let program = parts.remove(0);
        Ok(CommandSpec::new(program, parts, self.prefix.clone()))
    }
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_optional_fields() {
        let raw = r#"
placeholder = "HOST"
template = ["ssh HOST", "tail -f /var/log/app.log"]
color = false
max_line_bytes = 1024

[[command]]
prefix = "api"
cmd = "tail -f 'api log.txt'"

[[command]]
prefix = "web"
cmd = "pnpm dev"
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.placeholder.as_deref(), Some("HOST"));
        assert_eq!(config.template.as_ref().map(Vec::len), Some(2));
        assert_eq!(config.color, Some(false));
        assert_eq!(config.max_line_bytes, Some(1024));
        assert_eq!(config.commands.len(), 2);

        let spec = config.commands[0].to_spec().unwrap();
        assert_eq!(spec.prefix, "api");
        assert_eq!(spec.program, "tail");
        assert_eq!(spec.args, vec!["-f", "api log.txt"]);
    }

    #[test]
    fn empty_file_is_valid() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.commands.is_empty());
        assert!(config.color.is_none());
    }

    #[test]
    fn empty_cmd_is_rejected() {
        let command = CommandConfig {
            prefix: "x".to_string(),
            cmd: "   ".to_string(),
        };
        assert!(command.to_spec().is_err());
    }
}
