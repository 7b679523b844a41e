//! Configuration for building geomap indexes.
//!
//! Configuration is plain serde data so it can be loaded from JSON (or TOML
//! with the `toml` feature) and validated before a writer is created.

use geomap_types::CellEntry;
use serde::de::Error;
use serde::{Deserialize, Serialize};

/// Options passed to the S2 region coverer when turning a region into cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoveringOptions {
    /// Coarsest level a covering may use (0-30)
    #[serde(default = "CoveringOptions::default_min_level")]
    pub min_level: u8,

    /// Finest level a covering may use (0-30)
    #[serde(default = "CoveringOptions::default_max_level")]
    pub max_level: u8,

    /// Upper bound on cells per covering
    #[serde(default = "CoveringOptions::default_max_cells")]
    pub max_cells: usize,
}

impl CoveringOptions {
    const fn default_min_level() -> u8 {
        4
    }

    const fn default_max_level() -> u8 {
        16
    }

    const fn default_max_cells() -> usize {
        8
    }

    pub fn new(min_level: u8, max_level: u8, max_cells: usize) -> Self {
        Self {
            min_level,
            max_level,
            max_cells,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_level > CellEntry::MAX_LEVEL {
            return Err(format!(
                "Covering max_level must be at most {}",
                CellEntry::MAX_LEVEL
            ));
        }
        if self.min_level > self.max_level {
            return Err("Covering min_level must not exceed max_level".to_string());
        }
        if self.max_cells == 0 {
            return Err("Covering max_cells must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Default for CoveringOptions {
    fn default() -> Self {
        Self {
            min_level: Self::default_min_level(),
            max_level: Self::default_max_level(),
            max_cells: Self::default_max_cells(),
        }
    }
}

/// Writer configuration
///
/// # Example
///
/// ```rust
/// use geomap::GeoMapConfig;
///
/// let json = r#"{
///     "level_index_bucket_range": 4,
///     "covering": { "min_level": 6, "max_level": 18, "max_cells": 16 }
/// }"#;
/// let config = GeoMapConfig::from_json(json).unwrap();
/// assert_eq!(config.level_index_bucket_range, 4);
/// assert_eq!(config.covering.max_cells, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoMapConfig {
    /// Number of consecutive levels grouped into one bucket range (1-31)
    #[serde(default = "GeoMapConfig::default_level_index_bucket_range")]
    pub level_index_bucket_range: u8,

    /// Covering options used by the region helpers (`write_rect`, `write_point`)
    #[serde(default)]
    pub covering: CoveringOptions,

    /// Optional upper bound on key length in bytes
    #[serde(default)]
    pub max_key_len: Option<usize>,
}

impl GeoMapConfig {
    const fn default_level_index_bucket_range() -> u8 {
        3
    }

    pub fn with_level_index_bucket_range(mut self, range: u8) -> Self {
        self.level_index_bucket_range = range;
        self
    }

    pub fn with_covering(mut self, covering: CoveringOptions) -> Self {
        self.covering = covering;
        self
    }

    pub fn with_max_key_len(mut self, max_key_len: usize) -> Self {
        assert!(max_key_len > 0, "Max key length must be greater than zero");
        self.max_key_len = Some(max_key_len);
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.level_index_bucket_range == 0 {
            return Err("Level index bucket range must be greater than zero".to_string());
        }
        if self.max_key_len == Some(0) {
            return Err("Max key length must be greater than zero".to_string());
        }
        self.covering.validate()
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: GeoMapConfig = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(serde_json::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: GeoMapConfig = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for GeoMapConfig {
    fn default() -> Self {
        Self {
            level_index_bucket_range: Self::default_level_index_bucket_range(),
            covering: CoveringOptions::default(),
            max_key_len: None,
        }
    }
}
