//! Engine configuration.
//!
//! Loaded from TOML; every field has a default, so an empty document is a
//! valid configuration.
//!
//! ```toml
//! max_generations = 64
//! max_concurrent_actions = 32
//! ```

use std::{fs, path::Path};

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Limits applied to every drain.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Rounds of sync-fired invocations a single flow may run before the
    /// drain is aborted.
    ///
    /// The trigger and the final evaluation that finds nothing to fire do not
    /// count, so a flow in which one sync fires needs a limit of 1.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,

    /// Actions of one generation that may run at the same time.
    #[serde(default = "default_max_concurrent_actions")]
    pub max_concurrent_actions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_generations: default_max_generations(),
            max_concurrent_actions: default_max_concurrent_actions(),
        }
    }
}

const fn default_max_generations() -> usize {
    64
}

const fn default_max_concurrent_actions() -> usize {
    32
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::info!(path = %path.display(), "loading engine configuration");
        let config = Self::from_toml_str(&fs::read_to_string(path)?)?;
        tracing::debug!(
            max_generations = config.max_generations,
            max_concurrent_actions = config.max_concurrent_actions,
            "engine configuration loaded"
        );
        Ok(config)
    }

    #[must_use]
    pub const fn with_max_generations(mut self, max_generations: usize) -> Self {
        self.max_generations = max_generations;
        self
    }

    #[must_use]
    pub const fn with_max_concurrent_actions(mut self, max_concurrent_actions: usize) -> Self {
        self.max_concurrent_actions = max_concurrent_actions;
        self
    }

    /// Reject limits that would stop the engine from making progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_generations == 0 {
            return Err(ConfigError::Invalid("max_generations must be at least 1".to_string()));
        }
        if self.max_concurrent_actions == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_actions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_generations, 64);
        assert_eq!(config.max_concurrent_actions, 32);
    }

    #[test]
    fn fields_override_defaults() {
        let config = EngineConfig::from_toml_str("max_generations = 8").unwrap();
        assert_eq!(config.max_generations, 8);
        assert_eq!(config.max_concurrent_actions, 32);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let err = EngineConfig::from_toml_str("max_concurrent_actions = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("max_concurrent_actions"));
        assert!(EngineConfig::default().with_max_generations(0).validate().is_err());
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = EngineConfig::from_toml_str("max_generation = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = EngineConfig::from_path("/nonexistent/concord.toml").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("concord-config-{}.toml", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "max_generations = 5\nmax_concurrent_actions = 2").unwrap();
        drop(file);

        let config = EngineConfig::from_path(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config, EngineConfig::default().with_max_generations(5).with_max_concurrent_actions(2));
    }

    #[test]
    fn error_display_read() {
        let err = ConfigError::Read(std::io::Error::other("boom"));
        assert!(err.to_string().contains("failed to read config file"));
    }
}
