//! Driver configuration, deserialised from the `[[detectors]]` TOML table.

use daq_core::error::DaqError;
use daq_core::limits::CAPTURE_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_pixel_count() -> usize {
    1024
}

fn default_kc_pairs() -> u32 {
    500
}

fn default_capture_timeout() -> Duration {
    CAPTURE_TIMEOUT
}

/// Configuration for [`crate::LightFieldDriver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LightFieldConfig {
    /// Length of the pixel axis shown before the first capture.
    #[serde(default = "default_pixel_count")]
    pub pixel_count: usize,

    /// Signal/reference pairs per capture; frames to store = 2 x pairs.
    #[serde(default = "default_kc_pairs")]
    pub kc_pairs: u32,

    /// Refuse to capture unless this experiment is loaded in LightField.
    #[serde(default)]
    pub required_experiment: Option<String>,

    #[serde(default = "default_capture_timeout", with = "humantime_serde")]
    pub capture_timeout: Duration,
}

impl Default for LightFieldConfig {
    fn default() -> Self {
        Self {
            pixel_count: default_pixel_count(),
            kc_pairs: default_kc_pairs(),
            required_experiment: None,
            capture_timeout: default_capture_timeout(),
        }
    }
}

impl LightFieldConfig {
    pub fn validate(&self) -> Result<(), DaqError> {
        if self.pixel_count == 0 {
            return Err(DaqError::Configuration("pixel_count must be positive".into()));
        }
        if self.kc_pairs == 0 {
            return Err(DaqError::Configuration("kc_pairs must be positive".into()));
        }
        if self.capture_timeout.is_zero() {
            return Err(DaqError::Configuration(
                "capture_timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn frames(&self) -> usize {
        2 * self.kc_pairs as usize
    }
}
