//! Driver configuration, deserialised from the `[[detectors]]` TOML table.

use daq_core::error::DaqError;
use daq_core::limits::{FRAME_WAIT_TIMEOUT, WAIT_POLL_INTERVAL};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whether this plugin owns its camera or borrows one opened elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerStatus {
    #[default]
    Master,
    Slave,
}

impl ControllerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerStatus::Master => "Master",
            ControllerStatus::Slave => "Slave",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Master" => Some(ControllerStatus::Master),
            "Slave" => Some(ControllerStatus::Slave),
            _ => None,
        }
    }
}

/// Which buffered frame a grab reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// Wait on a blocking task per grab, read the oldest unread frame.
    #[default]
    Snapshot,
    /// Wait on the dedicated worker thread, read the newest frame.
    Streaming,
}

/// What to do with an attribute whose kind has no descriptor mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedPolicy {
    /// Initialization fails.
    #[default]
    Fail,
    /// The attribute is left out, with a warning.
    Skip,
}

fn default_settable_priority() -> Vec<String> {
    [
        "Exposure Time",
        "ADC Speed",
        "ADC Analog Gain",
        "ADC Quality",
        "ROIs",
        "Sensor Temperature Set Point",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_read_only_priority() -> Vec<String> {
    [
        "Sensor Temperature",
        "Readout Time Calculation",
        "Frame Rate Calculation",
        "Pixel Width",
        "Pixel Height",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_frame_timeout() -> Duration {
    FRAME_WAIT_TIMEOUT
}

fn default_wait_poll_interval() -> Duration {
    WAIT_POLL_INTERVAL
}

/// Configuration for [`crate::PicamDriver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PicamConfig {
    /// Camera to open; the first enumerated camera when absent.
    #[serde(default)]
    pub serial_number: Option<String>,

    #[serde(default)]
    pub controller_status: ControllerStatus,

    #[serde(default)]
    pub acquisition_mode: AcquisitionMode,

    /// Longest wait for one frame before the grab reports a timeout.
    #[serde(default = "default_frame_timeout", with = "humantime_serde")]
    pub frame_timeout: Duration,

    /// Slice length of each blocking wait call; bounds cancellation latency.
    #[serde(default = "default_wait_poll_interval", with = "humantime_serde")]
    pub wait_poll_interval: Duration,

    #[serde(default)]
    pub unsupported_attributes: UnsupportedPolicy,

    #[serde(default = "default_settable_priority")]
    pub settable_priority: Vec<String>,

    #[serde(default = "default_read_only_priority")]
    pub read_only_priority: Vec<String>,

    /// Attribute names never shown in the settings tree.
    #[serde(default)]
    pub hidden_attributes: Vec<String>,
}

impl Default for PicamConfig {
    fn default() -> Self {
        Self {
            serial_number: None,
            controller_status: ControllerStatus::default(),
            acquisition_mode: AcquisitionMode::default(),
            frame_timeout: default_frame_timeout(),
            wait_poll_interval: default_wait_poll_interval(),
            unsupported_attributes: UnsupportedPolicy::default(),
            settable_priority: default_settable_priority(),
            read_only_priority: default_read_only_priority(),
            hidden_attributes: Vec::new(),
        }
    }
}

impl PicamConfig {
    pub fn validate(&self) -> Result<(), DaqError> {
        if self.frame_timeout.is_zero() {
            return Err(DaqError::Configuration(
                "frame_timeout must be positive".into(),
            ));
        }
        if self.wait_poll_interval.is_zero() {
            return Err(DaqError::Configuration(
                "wait_poll_interval must be positive".into(),
            ));
        }
        if self.wait_poll_interval > self.frame_timeout {
            return Err(DaqError::Configuration(format!(
                "wait_poll_interval ({:?}) exceeds frame_timeout ({:?})",
                self.wait_poll_interval, self.frame_timeout
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_gives_defaults() {
        let cfg: PicamConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, PicamConfig::default());
        assert_eq!(cfg.settable_priority[0], "Exposure Time");
        assert_eq!(cfg.read_only_priority.len(), 5);
    }

    #[test]
    fn durations_use_humantime() {
        let cfg: PicamConfig = toml::from_str(
            r#"
            serial_number = "0008154711"
            controller_status = "slave"
            acquisition_mode = "streaming"
            frame_timeout = "2s"
            wait_poll_interval = "20ms"
            unsupported_attributes = "skip"
            hidden_attributes = ["Readout Count"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.frame_timeout, Duration::from_secs(2));
        assert_eq!(cfg.wait_poll_interval, Duration::from_millis(20));
        assert_eq!(cfg.controller_status, ControllerStatus::Slave);
        assert_eq!(cfg.acquisition_mode, AcquisitionMode::Streaming);
        assert_eq!(cfg.unsupported_attributes, UnsupportedPolicy::Skip);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn poll_longer_than_timeout_is_rejected() {
        let cfg = PicamConfig {
            frame_timeout: Duration::from_millis(10),
            wait_poll_interval: Duration::from_millis(50),
            ..PicamConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(DaqError::Configuration(_))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<PicamConfig>("exposure = 3").is_err());
    }
}
