//! Runtime configuration loaded from TOML
//!
//! Every field has a default, so an empty file (or no file) is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vm: VmConfig,
    pub repl: ReplConfig,
}

/// Execution limits and tracing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Instructions run per `step` before yielding regardless of spans
    pub batch_limit: usize,
    /// Frames allowed before a call fails with `stack overflow`
    pub max_call_depth: usize,
    /// Log every executed instruction at trace level
    pub trace_instructions: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            batch_limit: 1000,
            max_call_depth: 1024,
            trace_instructions: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    pub prompt: String,
    /// Relative paths resolve against the home directory
    pub history_file: String,
}

impl Default for ReplConfig {
    fn default() -> Self {
        ReplConfig {
            prompt: "> ".to_string(),
            history_file: ".cinder_history".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Render back to TOML
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.vm.batch_limit, 1000);
        assert_eq!(config.repl.prompt, "> ");
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml_str("[vm]\nmax_call_depth = 64\n").unwrap();
        assert_eq!(config.vm.max_call_depth, 64);
        assert_eq!(config.vm.batch_limit, 1000);
        assert!(!config.vm.trace_instructions);
    }

    #[test]
    fn test_invalid_config() {
        let err = Config::from_toml_str("[vm]\nbatch_limit = \"lots\"\n").unwrap_err();
        assert!(err.to_string().starts_with("invalid config"));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = Config::default();
        config.repl.prompt = "cinder> ".to_string();
        let text = config.to_toml_string();
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/cinder.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
