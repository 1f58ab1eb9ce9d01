//! `daq-core`
//!
//! Core trait definitions and types shared by the Princeton Instruments detector
//! plugins.
//!
//! The plugins sit between a host acquisition framework and a vendor SDK. This crate
//! owns the host side of that translation:
//!
//! - [`parameter`]: tagged-variant settings descriptors
//! - [`settings`]: the settings-tree seam and an in-memory implementation
//! - [`capabilities`]: the [`Detector`](capabilities::Detector) lifecycle and the
//!   status/data sinks
//! - [`events`]: a broadcast hub implementing both sinks
//! - [`data`] and [`core`]: frames, exports, ROI geometry
//! - [`driver`]: factory registry used by the composition root
//! - [`error`]: [`DaqError`](error::DaqError)

pub mod capabilities;
pub mod core;
pub mod data;
pub mod driver;
pub mod error;
pub mod events;
pub mod limits;
pub mod parameter;
pub mod settings;

// Re-export commonly used types
pub use anyhow::{anyhow, Result};
pub use capabilities::{Detector, DetectorContext, InitStatus, StatusMessage};
pub use error::{AppResult, DaqError};
pub use parameter::{ParamDescriptor, ParamKind, ParamPath, ParamValue};
