//! Process-wide scheme settings.
//!
//! Settings are read from a TOML file. A missing or malformed file is not
//! fatal: [`SchemeConfig::load_from`] logs and falls back to defaults.
//!
//! ```toml
//! track_mutations = true
//! converter_mode = "strict"
//!
//! [log]
//! enabled = true
//! redact_values = false
//! ```

use crate::converter::ConverterMode;
use crate::error::{SchemeError, SchemeResult};
use crate::logging::LogSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Defaults applied to entity types built with
/// [`EntityTypeBuilder::config`](crate::EntityTypeBuilder::config).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemeConfig {
    pub log: LogSettings,
    /// Whether proxied container mutations mark fields dirty.
    pub track_mutations: bool,
    /// Mode for converters derived from declared field types.
    pub converter_mode: ConverterMode,
}

impl Default for SchemeConfig {
    fn default() -> Self {
        Self {
            log: LogSettings::default(),
            track_mutations: true,
            converter_mode: ConverterMode::Base,
        }
    }
}

impl SchemeConfig {
    pub fn from_toml_str(contents: &str) -> SchemeResult<Self> {
        toml::from_str(contents).map_err(|e| SchemeError::Config(e.to_string()))
    }

    /// Reads and parses a config file, failing on any problem.
    pub fn try_load_from(path: impl AsRef<Path>) -> SchemeResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SchemeError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Loads a config file, falling back to defaults when it is missing or
    /// cannot be parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No scheme config at {:?}, using defaults", path);
            return Self::default();
        }
        match Self::try_load_from(path) {
            Ok(config) => {
                info!("Loaded scheme config from {:?}", path);
                config
            }
            Err(e) => {
                warn!("{}. Falling back to default scheme config.", e);
                Self::default()
            }
        }
    }
}
