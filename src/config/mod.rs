//! Gate configuration
//!
//! Layered the same way as the rest of the RCH tooling:
//! 1. Built-in defaults
//! 2. Host/user config (~/.config/rch/gate.toml)
//! 3. Repo config (.rch/gate.toml)
//! 4. CLI flags

mod layers;

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use layers::{deep_merge, ConfigOrigin, ConfigSource, EffectiveConfig};

/// Default repo config location, relative to the working directory.
pub const REPO_CONFIG_PATH: &str = ".rch/gate.toml";

/// Resolved gate configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub cache: CacheSection,
    pub log: LogSection,
}

/// `[cache]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Root under which every project's cache lives
    pub root: PathBuf,
    /// Per-project directory holding generated resources
    pub generated_dir: String,
    /// Recreate the directory empty after clearing
    pub recreate: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".rch/cache"),
            generated_dir: "generated".to_string(),
            recreate: true,
        }
    }
}

/// `[log]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// `tracing` filter directive; `RUST_LOG` takes precedence
    pub filter: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl GateConfig {
    /// Generated-resource directory for `project`.
    pub fn generated_dir_for(&self, project: &str) -> PathBuf {
        self.cache.root.join(project).join(&self.cache.generated_dir)
    }

    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "cache.root must not be empty".to_string(),
            ));
        }

        let mut components = Path::new(&self.cache.generated_dir).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "cache.generated_dir must be a single directory name, got '{}'",
                    self.cache.generated_dir
                )));
            }
        }

        if self.log.filter.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "log.filter must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = GateConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cache.generated_dir, "generated");
        assert!(config.cache.recreate);
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn test_generated_dir_for() {
        let config = GateConfig::default();
        assert_eq!(
            config.generated_dir_for("app"),
            PathBuf::from(".rch/cache/app/generated")
        );
    }

    #[test]
    fn test_generated_dir_rejects_paths() {
        for bad in ["", "a/b", "..", "/abs"] {
            let mut config = GateConfig::default();
            config.cache.generated_dir = bad.to_string();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("cache.generated_dir"), "{}", bad);
        }
    }

    #[test]
    fn test_empty_log_filter_rejected() {
        let mut config = GateConfig::default();
        config.log.filter = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: GateConfig = serde_json::from_value(serde_json::json!({
            "cache": { "recreate": false }
        }))
        .unwrap();
        assert!(!config.cache.recreate);
        assert_eq!(config.cache.generated_dir, "generated");
        assert_eq!(config.log.filter, "info");
    }
}
