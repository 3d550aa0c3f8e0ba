//! Configuration loading and typed config structures for Warden.
//!
//! The canonical configuration lives in `warden-config.yaml` next to the
//! binary. Every field has a default, so an empty file (or no file at all)
//! yields a working configuration. Values are validated after parsing.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "warden-config.yaml";

/// Audit log file name used inside the checkpoint directory by default.
pub const DEFAULT_AUDIT_FILE: &str = "audit.jsonl";

/// Environment variable overriding `checkpoints.directory`.
pub const CHECKPOINT_DIR_ENV: &str = "WARDEN_CHECKPOINT_DIR";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {message}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level Warden configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WardenConfig {
    /// Governor thresholds.
    #[serde(default)]
    pub governor: GovernorConfig,

    /// Checkpoint and audit log locations.
    #[serde(default)]
    pub checkpoints: CheckpointConfig,

    /// World loop pacing and bounds.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Transport bridge settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Settings for the bundled demonstration world.
    #[serde(default)]
    pub world: WorldConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WardenConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `WARDEN_CHECKPOINT_DIR` overrides `checkpoints.directory`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not a mapping.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(CHECKPOINT_DIR_ENV).filter(|d| !d.is_empty()) {
            self.checkpoints.directory = PathBuf::from(dir);
        }
    }

    /// Check every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.governor.continuity_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid {
                field: "governor.continuity_threshold",
                message: format!("{threshold} is outside [0, 1]"),
            });
        }
        if !self.runner.dt.is_finite() || self.runner.dt <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "runner.dt",
                message: format!("{} must be a positive number", self.runner.dt),
            });
        }
        if self.transport.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "transport.queue_capacity",
                message: String::from("must be greater than zero"),
            });
        }
        Ok(())
    }
}

/// Governor configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GovernorConfig {
    /// `identity_continuity` values below this block the tick and roll back.
    #[serde(default = "default_continuity_threshold")]
    pub continuity_threshold: f64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            continuity_threshold: default_continuity_threshold(),
        }
    }
}

/// Checkpoint storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckpointConfig {
    /// Directory holding checkpoint files and their index.
    #[serde(default = "default_checkpoint_dir")]
    pub directory: PathBuf,

    /// JSON-lines audit log path. Defaults to `audit.jsonl` inside
    /// `directory`, so it follows `WARDEN_CHECKPOINT_DIR`.
    #[serde(default)]
    pub audit_log: Option<PathBuf>,

    /// Ticks between checkpoint requests raised by the world.
    #[serde(default = "default_interval_ticks")]
    pub interval_ticks: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            directory: default_checkpoint_dir(),
            audit_log: None,
            interval_ticks: default_interval_ticks(),
        }
    }
}

impl CheckpointConfig {
    /// The audit log location after applying the default.
    pub fn audit_log_path(&self) -> PathBuf {
        self.audit_log
            .clone()
            .unwrap_or_else(|| self.directory.join(DEFAULT_AUDIT_FILE))
    }
}

/// World loop configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunnerConfig {
    /// Real-time milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Maximum ticks to evaluate (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Simulated time passed to `World::step` per advanced tick.
    #[serde(default = "default_dt")]
    pub dt: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: 0,
            dt: default_dt(),
        }
    }
}

/// Transport bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransportConfig {
    /// Envelopes buffered before the bridge starts dropping.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Demonstration world configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Random seed for reproducible drift.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_continuity_threshold() -> f64 {
    0.9
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

const fn default_interval_ticks() -> u64 {
    10
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

const fn default_dt() -> f64 {
    1.0
}

const fn default_queue_capacity() -> usize {
    256
}

const fn default_seed() -> u64 {
    42
}

fn default_log_level() -> String {
    String::from("info")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = WardenConfig::parse("").unwrap();
        assert_eq!(config.governor.continuity_threshold, 0.9);
        assert_eq!(config.runner.tick_interval_ms, 1000);
        assert_eq!(config.runner.max_ticks, 0);
        assert_eq!(config.transport.queue_capacity, 256);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert_eq!(config.checkpoints.interval_ticks, 10);
        assert_eq!(config.world.seed, 42);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = "
governor:
  continuity_threshold: 0.75
runner:
  max_ticks: 50
logging:
  json: true
";
        let config = WardenConfig::parse(yaml).unwrap();
        assert_eq!(config.governor.continuity_threshold, 0.75);
        assert_eq!(config.runner.max_ticks, 50);
        assert_eq!(config.runner.dt, 1.0);
        assert!(config.logging.json);
        assert_eq!(
            config.checkpoints.audit_log_path(),
            PathBuf::from("checkpoints/audit.jsonl")
        );
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let err = WardenConfig::parse("governor:\n  continuity_threshold: 1.5\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "governor.continuity_threshold",
                ..
            }
        ));
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let err = WardenConfig::parse("transport:\n  queue_capacity: 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "transport.queue_capacity",
                ..
            }
        ));
    }

    #[test]
    fn non_positive_dt_is_rejected() {
        let err = WardenConfig::parse("runner:\n  dt: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "runner.dt", .. }));
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        let err = WardenConfig::parse("governor: [unterminated").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }

    #[test]
    fn checkpoint_dir_override() {
        let mut config = WardenConfig::default();
        config.apply_overrides(|key| {
            (key == CHECKPOINT_DIR_ENV).then(|| String::from("/var/lib/warden"))
        });
        assert_eq!(config.checkpoints.directory, PathBuf::from("/var/lib/warden"));

        config.apply_overrides(|_| Some(String::new()));
        assert_eq!(config.checkpoints.directory, PathBuf::from("/var/lib/warden"));
    }

    #[test]
    fn default_audit_log_follows_checkpoint_dir_override() {
        let mut config = WardenConfig::default();
        config.apply_overrides(|key| {
            (key == CHECKPOINT_DIR_ENV).then(|| String::from("/var/lib/warden"))
        });
        assert_eq!(
            config.checkpoints.audit_log_path(),
            PathBuf::from("/var/lib/warden/audit.jsonl")
        );
    }

    #[test]
    fn explicit_audit_log_ignores_checkpoint_dir_override() {
        let mut config =
            WardenConfig::parse("checkpoints:\n  audit_log: /var/log/warden/audit.jsonl\n")
                .unwrap();
        config.apply_overrides(|key| {
            (key == CHECKPOINT_DIR_ENV).then(|| String::from("/var/lib/warden"))
        });
        assert_eq!(
            config.checkpoints.audit_log_path(),
            PathBuf::from("/var/log/warden/audit.jsonl")
        );
    }
}
