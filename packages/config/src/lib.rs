#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Tunable thresholds for the chart map annotation core.
//!
//! All values have defaults tuned for a phone-sized map view, so an empty
//! TOML file (or no file at all) yields a working [`MapConfig`]. Individual
//! keys can be overridden:
//!
//! ```toml
//! max_annotations = 150
//! throttle_interval_ms = 250
//! ```

use std::path::Path;
use std::time::Duration;

use chart_map_annotation_models::DEFAULT_COORDINATE_PRECISION;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV_VAR: &str = "CHART_MAP_CONFIG";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML or has wrongly typed keys.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value parsed but is outside its allowed range.
    #[error("Invalid config value for {key}: {message}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// Description of what went wrong.
        message: String,
    },
}

/// Thresholds for grid indexing, visible-set capping, region throttling,
/// and reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Grid cell edge length in degrees (0.05° is about 5.5 km).
    pub cell_size: f64,
    /// Extra cells added on each side of a region lookup so annotations
    /// just outside the box are still considered.
    pub edge_padding_cells: u32,
    /// Maximum annotations in a visible set.
    pub max_annotations: usize,
    /// Minimum time between accepted region changes.
    pub throttle_interval_ms: u64,
    /// Region changes smaller than this (degrees) are treated as noise.
    pub deadzone_degrees: f64,
    /// Count difference above which the reconciler replaces everything.
    pub full_replace_delta: usize,
    /// Next-set size above which the reconciler replaces everything.
    pub full_replace_max: usize,
    /// Suggested batch size for applying diffs on the render surface.
    pub diff_chunk_size: usize,
    /// Coordinate precision (degrees) for annotation identity.
    pub coordinate_precision: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            cell_size: 0.05,
            edge_padding_cells: 1,
            max_annotations: 100,
            throttle_interval_ms: 300,
            deadzone_degrees: 0.001,
            full_replace_delta: 50,
            full_replace_max: 200,
            diff_chunk_size: 50,
            coordinate_precision: DEFAULT_COORDINATE_PRECISION,
        }
    }
}

impl MapConfig {
    /// Minimum time between accepted region changes.
    #[must_use]
    pub const fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    /// Parses and validates a TOML config string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or a value is out
    /// of range.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, is malformed,
    /// or a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::debug!("Loaded map config from {}", path.display());
        Ok(config)
    }

    /// Loads config from `path` if given, else from the file named by
    /// [`CONFIG_ENV_VAR`], else returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a config file is named but cannot be
    /// loaded.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(env_path) if !env_path.is_empty() => Self::from_file(Path::new(&env_path)),
            _ => Ok(Self::default()),
        }
    }

    /// Checks every value is within its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(invalid("cell_size", "must be a positive number of degrees"));
        }
        if self.max_annotations == 0 {
            return Err(invalid("max_annotations", "must be at least 1"));
        }
        if !(self.deadzone_degrees.is_finite() && self.deadzone_degrees >= 0.0) {
            return Err(invalid("deadzone_degrees", "must not be negative"));
        }
        if self.diff_chunk_size == 0 {
            return Err(invalid("diff_chunk_size", "must be at least 1"));
        }
        if !(self.coordinate_precision.is_finite() && self.coordinate_precision > 0.0) {
            return Err(invalid(
                "coordinate_precision",
                "must be a positive number of degrees",
            ));
        }
        Ok(())
    }
}

fn invalid(key: &'static str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.to_string(),
    }
}
