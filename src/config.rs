use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Interpreter limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum depth of user function calls ('maxfuncdepth').
    pub max_func_depth: usize,
    /// Maximum recursion of the statement dispatcher.
    pub max_cmdline_depth: usize,
    /// Capacity of each conditional stack.
    pub cstack_len: usize,
    /// Exception and call tracing is echoed as messages from 13 upward.
    pub verbose: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_func_depth: 100,
            max_cmdline_depth: 200,
            cstack_len: 50,
            verbose: 0,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let cfg = EngineConfig::from_json_str(r#"{ "max_func_depth": 7 }"#).unwrap();
        assert_eq!(cfg.max_func_depth, 7);
        assert_eq!(cfg.cstack_len, 50);
        assert_eq!(cfg.max_cmdline_depth, 200);
    }

    #[test]
    fn test_bad_config_is_parse_error() {
        let err = EngineConfig::from_json_str("{ max_func_depth: }").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::from_json_file("/nonexistent/exscript.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/exscript.json"));
    }
}
