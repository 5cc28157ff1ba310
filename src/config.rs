//! Configuration of check scopes
//!
//! Loaded from a `huella.toml` document or built in code. Every key is
//! optional.
//!
//! ```toml
//! report_on_error = true
//! show_only = "unsatisfied"
//! cache = true
//! cache_dir = ".huella_cache"
//! print_report = true
//!
//! # Overrides the settings of every time-complexity annotation
//! [inference]
//! epsilon = 1e-6
//! min_samples = 2
//! ```

use crate::cache::DEFAULT_CACHE_DIR;
use crate::complexity::InferenceConfig;
use crate::report::ShowOnly;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by configuration validation and parsing
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Behaviour of a check scope
///
/// # Example
/// ```
/// use huella::config::CheckConfig;
///
/// let config = CheckConfig::default();
/// assert!(config.report_on_error);
/// assert!(config.cache);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Build and report the footprint even when the block failed
    pub report_on_error: bool,

    /// Restrict the report to satisfied or unsatisfied references
    pub show_only: Option<ShowOnly>,

    /// Persist the footprint and reference results
    pub cache: bool,

    /// Where cached artifacts are written
    pub cache_dir: PathBuf,

    /// Print the rendered report to stdout
    pub print_report: bool,

    /// Only run annotations in this group
    pub group: Option<String>,

    /// Complexity inference settings imposed on every annotation
    ///
    /// When unset, each annotation keeps its own.
    pub inference: Option<InferenceConfig>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            report_on_error: true,
            show_only: None,
            cache: true,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            print_report: true,
            group: None,
            inference: None,
        }
    }
}

impl CheckConfig {
    /// No printing and no caching; results are only returned
    pub fn quiet() -> Self {
        Self {
            cache: false,
            print_report: false,
            ..Self::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let config: CheckConfig = toml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let document = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&document)
            .with_context(|| format!("Invalid check configuration in {}", path.display()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(inference) = &self.inference {
            inference.validate().map_err(ConfigError::Invalid)?;
        }

        if self.cache && self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "cache_dir must not be empty when caching is enabled".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CheckConfig::default();
        assert!(config.report_on_error);
        assert_eq!(config.show_only, None);
        assert!(config.cache);
        assert_eq!(config.cache_dir, PathBuf::from(".huella_cache"));
        assert!(config.print_report);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_quiet_config() {
        let config = CheckConfig::quiet();
        assert!(!config.cache);
        assert!(!config.print_report);
        assert!(config.report_on_error);
    }

    #[test]
    fn test_toml_full() {
        let config = CheckConfig::from_toml_str(
            r#"
            report_on_error = false
            show_only = "unsatisfied"
            cache = false
            cache_dir = "grading"
            print_report = false
            group = "q1"

            [inference]
            epsilon = 0.001
            min_samples = 4
            "#,
        )
        .unwrap();

        assert!(!config.report_on_error);
        assert_eq!(config.show_only, Some(ShowOnly::Unsatisfied));
        assert_eq!(config.cache_dir, PathBuf::from("grading"));
        assert_eq!(config.group.as_deref(), Some("q1"));
        let inference = config.inference.unwrap();
        assert_eq!(inference.epsilon, 0.001);
        assert_eq!(inference.min_samples, 4);
    }

    #[test]
    fn test_toml_empty_uses_defaults() {
        let config = CheckConfig::from_toml_str("").unwrap();
        assert_eq!(config, CheckConfig::default());
        assert_eq!(config.inference, None);
    }

    #[test]
    fn test_toml_partial_inference_table() {
        let config = CheckConfig::from_toml_str("[inference]\nmin_samples = 10").unwrap();
        assert_eq!(
            config.inference,
            Some(InferenceConfig {
                min_samples: 10,
                ..InferenceConfig::default()
            })
        );
    }

    #[test]
    fn test_toml_invalid_values() {
        let err = CheckConfig::from_toml_str("[inference]\nmin_samples = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = CheckConfig::from_toml_str("cache = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_empty_cache_dir_rejected() {
        let mut config = CheckConfig::default();
        config.cache_dir = PathBuf::new();
        assert!(config.validate().is_err());

        config.cache = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("huella.toml");
        std::fs::write(&path, "print_report = false\n").unwrap();

        let config = CheckConfig::from_file(&path).unwrap();
        assert!(!config.print_report);

        assert!(CheckConfig::from_file(&temp.path().join("missing.toml")).is_err());
    }
}
