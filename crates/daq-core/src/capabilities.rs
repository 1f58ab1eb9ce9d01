//! Detector capabilities and host collaborator seams
//!
//! A detector plugin is driven through [`Detector`]: the host calls `initialize`,
//! commits settings one path at a time, grabs, stops and closes. Everything the
//! plugin needs from the host arrives as an injected [`DetectorContext`]:
//!
//! - [`SettingsTree`]: where the plugin publishes its descriptors
//! - [`StatusSink`]: operator-facing status/log messages
//! - [`DataSink`]: grabbed data and temporary viewer-preparation data
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async where it touches hardware (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//!
//! Host-side sinks are synchronous. Emitting a message never blocks on the host.

use crate::data::DataExport;
use crate::parameter::ParamPath;
use crate::settings::SettingsTree;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    /// Shown in the status bar
    Info,
    /// Also written to the host's log
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            text: text.into(),
        }
    }

    pub fn log(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Log,
            text: text.into(),
        }
    }
}

/// Status/log event channel.
pub trait StatusSink: Send + Sync {
    fn emit_status(&self, message: StatusMessage);
}

/// Typed data-emission channel.
pub trait DataSink: Send + Sync {
    /// Data produced by a grab.
    fn emit_data(&self, data: Vec<DataExport>);

    /// Placeholder data used by the host to shape its viewers.
    fn emit_data_temp(&self, data: Vec<DataExport>);
}

/// Host collaborators injected into a detector.
#[derive(Clone)]
pub struct DetectorContext {
    pub settings: Arc<dyn SettingsTree>,
    pub status: Arc<dyn StatusSink>,
    pub data: Arc<dyn DataSink>,
}

impl DetectorContext {
    pub fn new(
        settings: Arc<dyn SettingsTree>,
        status: Arc<dyn StatusSink>,
        data: Arc<dyn DataSink>,
    ) -> Self {
        Self {
            settings,
            status,
            data,
        }
    }

    pub fn info(&self, text: impl Into<String>) {
        self.status.emit_status(StatusMessage::info(text));
    }

    pub fn log(&self, text: impl Into<String>) {
        self.status.emit_status(StatusMessage::log(text));
    }
}

/// Result of [`Detector::initialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitStatus {
    pub initialized: bool,
    pub info: String,
}

impl InitStatus {
    pub fn ok(info: impl Into<String>) -> Self {
        Self {
            initialized: true,
            info: info.into(),
        }
    }

    pub fn failed(info: impl Into<String>) -> Self {
        Self {
            initialized: false,
            info: info.into(),
        }
    }
}

/// Capability: Detector lifecycle
///
/// # Contract
/// - `initialize()` never returns an error; failures are reported in [`InitStatus`]
/// - `commit_setting()` is called after the host changed the value at `path`
/// - `grab()` emits data through the context's [`DataSink`]
/// - `stop()` is idempotent
/// - `close()` releases hardware; a second call is a no-op
///
/// The host never invokes two lifecycle operations concurrently on one instance.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Plugin name, also used as the emitted data name.
    fn name(&self) -> &str;

    async fn initialize(&self) -> InitStatus;

    async fn commit_setting(&self, path: &ParamPath) -> Result<()>;

    /// Acquire and emit one data set. `naverage` is a hint; hardware averaging is
    /// not supported by these plugins.
    async fn grab(&self, naverage: u32) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Capability: Shutter Control
///
/// Devices with a controllable physical shutter (spectrometer cameras).
///
/// # Contract
/// - `open_shutter()` lets light reach the sensor
/// - `close_shutter()` blocks it
/// - Shutter state should be queryable
#[async_trait]
pub trait ShutterControl: Send + Sync {
    async fn open_shutter(&self) -> Result<()>;

    async fn close_shutter(&self) -> Result<()>;

    async fn is_shutter_open(&self) -> Result<bool>;
}
