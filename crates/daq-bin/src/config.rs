//! Layered configuration for `pi-daq`.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults ([`Settings::default`])
//! 2. A TOML file (`--config`, default `config/pi-daq.toml`), skipped when absent
//! 3. Environment variables prefixed with `PI_DAQ_`, nested keys split on `__`
//!    (`PI_DAQ_LOG_LEVEL=debug`)
//!
//! ```toml
//! log_level = "info"
//!
//! [[detectors]]
//! id = "camera"
//! type = "picam"
//! acquisition_mode = "streaming"
//! frame_timeout = "2s"
//!
//! [[detectors]]
//! id = "spectrometer"
//! type = "lightfield"
//! kc_pairs = 50
//! ```

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::{Figment, Provider};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/pi-daq.toml";
pub const ENV_PREFIX: &str = "PI_DAQ_";

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// One detector to build through the driver registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Unique identifier for this detector instance
    pub id: String,

    /// Driver type (must match a registered factory)
    #[serde(rename = "type")]
    pub driver_type: String,

    /// Driver-specific keys, handed to the factory as-is.
    #[serde(flatten)]
    pub settings: toml::Table,
}

impl DetectorConfig {
    pub fn new(id: impl Into<String>, driver_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            driver_type: driver_type.into(),
            settings: toml::Table::new(),
        }
    }

    pub fn driver_config(&self) -> toml::Value {
        toml::Value::Table(self.settings.clone())
    }
}

/// Top-level `pi-daq` configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Default tracing filter when `RUST_LOG` is unset.
    ///
    /// Valid values: "error", "warn", "info", "debug", "trace".
    pub log_level: String,

    #[serde(default)]
    pub detectors: Vec<DetectorConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            detectors: vec![
                DetectorConfig::new("camera", "picam"),
                DetectorConfig::new("spectrometer", "lightfield"),
            ],
        }
    }
}

impl Provider for Settings {
    fn metadata(&self) -> figment::Metadata {
        figment::Metadata::named("pi-daq defaults")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        Serialized::defaults(Settings::default()).data()
    }
}

impl Settings {
    /// Load defaults, then `config_path` (or [`DEFAULT_CONFIG_PATH`]), then the environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Settings::default());

        let file_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        if file_path.exists() {
            figment = figment.merge(Toml::file(&file_path));
        } else if config_path.is_some() {
            bail!("Config file not found: {}", file_path.display());
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let settings: Settings = figment
            .extract()
            .context("Failed to extract configuration from Figment")?;
        settings
            .validate()
            .context("Configuration validation failed")?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            bail!(
                "log_level '{}' is not one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            );
        }
        let mut seen = HashSet::new();
        for detector in &self.detectors {
            if detector.id.trim().is_empty() {
                bail!("detector of type '{}' has an empty id", detector.driver_type);
            }
            if !seen.insert(detector.id.as_str()) {
                bail!("duplicate detector id '{}'", detector.id);
            }
        }
        Ok(())
    }
}
