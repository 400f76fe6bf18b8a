//! Configuration management for prepline
//!
//! This module provides a configuration system that loads settings from
//! environment variables with sensible defaults. Configuration includes the
//! buildpack catalog location, the docker registry images are tagged for,
//! image label naming, and script execution limits.
//!
//! # Environment Variables
//!
//! - `PREPLINE_PACK_DIR`: Buildpack catalog root - default: per-user data
//!   directory + "prepline/packs"
//! - `PREPLINE_REGISTRY`: Docker registry host images are tagged for -
//!   default: "localhost:5000"
//! - `PREPLINE_LABEL_PREFIX`: Prefix for image labels - default: "dev.prepline"
//! - `PREPLINE_SCRIPT_TIMEOUT`: Buildpack script deadline in seconds -
//!   default: "300"
//! - `PREPLINE_BUILD_NUMBERS_DIR`: Build-number counter storage - default:
//!   per-user data directory + "prepline/build_numbers"
//! - `PREPLINE_LOG_LEVEL`: Logging level - default: "info"
//!
//! `BUILD_NUMBER` is read separately by the build-number allocator and
//! bypasses counter storage entirely; see [`crate::context`].

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_REGISTRY: &str = "localhost:5000";
const DEFAULT_LABEL_PREFIX: &str = "dev.prepline";
const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Main configuration structure for prepline
///
/// Constructed with `Default::default()`, which loads from environment
/// variables with fallback defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Buildpack catalog root directory
    pub pack_dir: PathBuf,

    /// Docker registry host images are tagged for
    pub docker_registry: String,

    /// Prefix for image labels (e.g. "dev.prepline" -> "dev.prepline.stack.id")
    pub label_prefix: String,

    /// Deadline for a single buildpack script execution, in seconds
    pub script_timeout_secs: u64,

    /// Root directory for persisted build-number counters
    pub build_numbers_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(env::temp_dir);

        let pack_dir = env::var("PREPLINE_PACK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("prepline").join("packs"));

        let docker_registry =
            env::var("PREPLINE_REGISTRY").unwrap_or_else(|_| DEFAULT_REGISTRY.to_string());

        let label_prefix = env::var("PREPLINE_LABEL_PREFIX")
            .unwrap_or_else(|_| DEFAULT_LABEL_PREFIX.to_string());

        let script_timeout_secs = env::var("PREPLINE_SCRIPT_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SCRIPT_TIMEOUT_SECS);

        let build_numbers_dir = env::var("PREPLINE_BUILD_NUMBERS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("prepline").join("build_numbers"));

        let log_level = env::var("PREPLINE_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            pack_dir,
            docker_registry,
            label_prefix,
            script_timeout_secs,
            build_numbers_dir,
            log_level,
        }
    }
}

impl Config {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any validation fails
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.script_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Script timeout must be at least 1 second".to_string(),
            ));
        }
        if self.script_timeout_secs > 3600 {
            return Err(ConfigError::ValidationFailed(
                "Script timeout cannot exceed 1 hour".to_string(),
            ));
        }

        if self.docker_registry.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Docker registry must not be empty".to_string(),
            ));
        }

        if self.label_prefix.is_empty() || self.label_prefix.ends_with('.') {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid label prefix: {:?}",
                self.label_prefix
            )));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    /// The script execution deadline as a [`Duration`].
    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Prepline Configuration:")?;
        writeln!(f, "  Pack Dir: {}", self.pack_dir.display())?;
        writeln!(f, "  Registry: {}", self.docker_registry)?;
        writeln!(f, "  Label Prefix: {}", self.label_prefix)?;
        writeln!(f, "  Script Timeout: {}s", self.script_timeout_secs)?;
        writeln!(
            f,
            "  Build Numbers Dir: {}",
            self.build_numbers_dir.display()
        )?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
