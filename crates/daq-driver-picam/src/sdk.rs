//! picam vendor seam
//!
//! The picam library is reached through a device-abstraction wrapper that exposes a
//! camera as a dictionary of named attributes plus acquisition calls. These traits
//! mirror that object model so the plugin logic never touches the wrapper directly.
//!
//! All calls are blocking. Only [`PicamCamera::wait_for_frame`] may block for long;
//! the driver never calls it from an async context directly.

use anyhow::Result;
use daq_core::core::Roi;
use daq_core::data::Frame;
use std::sync::Arc;
use std::time::Duration;

/// Vendor attribute kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Integer,
    LargeInteger,
    FloatingPoint,
    Boolean,
    Enumeration,
    Rois,
    Pulse,
    Modulations,
}

impl AttributeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::Integer => "Integer",
            AttributeKind::LargeInteger => "Large Integer",
            AttributeKind::FloatingPoint => "Floating Point",
            AttributeKind::Boolean => "Boolean",
            AttributeKind::Enumeration => "Enumeration",
            AttributeKind::Rois => "ROIs",
            AttributeKind::Pulse => "Pulse",
            AttributeKind::Modulations => "Modulations",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            AttributeKind::Integer | AttributeKind::LargeInteger | AttributeKind::FloatingPoint
        )
    }
}

impl std::fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current value of an attribute, in vendor form.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Enumeration member name
    Enum(String),
    Rois(Vec<Roi>),
    /// Value of a kind the plugin does not model (pulse, modulations)
    Opaque(String),
}

impl AttributeValue {
    /// Textual key used to look the value up in a label mapping.
    pub fn label_key(&self) -> String {
        match self {
            AttributeValue::Int(v) => v.to_string(),
            AttributeValue::Float(v) => v.to_string(),
            AttributeValue::Bool(v) => v.to_string(),
            AttributeValue::Enum(v) | AttributeValue::Opaque(v) => v.clone(),
            AttributeValue::Rois(rois) => format!("{:?}", rois),
        }
    }
}

/// One named discrete value.
///
/// For enumerations `key` is the member name; for labelled numeric attributes it is
/// the numeric value in [`AttributeValue::label_key`] form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeLabel {
    pub key: String,
    pub display: String,
}

impl AttributeLabel {
    pub fn new(key: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display: display.into(),
        }
    }
}

/// Constraint declared by the camera.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeConstraint {
    Range { min: f64, max: f64, permanent: bool },
    Collection { permanent: bool },
}

/// Snapshot of one camera attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraAttribute {
    pub name: String,
    pub kind: AttributeKind,
    pub value: AttributeValue,
    pub writable: bool,
    /// Can be changed while an acquisition is running
    pub can_set_online: bool,
    pub labels: Vec<AttributeLabel>,
    pub constraint: Option<AttributeConstraint>,
}

impl CameraAttribute {
    pub fn new(name: impl Into<String>, kind: AttributeKind, value: AttributeValue) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
            writable: true,
            can_set_online: false,
            labels: Vec::new(),
            constraint: None,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn online(mut self) -> Self {
        self.can_set_online = true;
        self
    }

    pub fn with_labels(mut self, labels: Vec<AttributeLabel>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_range(mut self, min: f64, max: f64, permanent: bool) -> Self {
        self.constraint = Some(AttributeConstraint::Range {
            min,
            max,
            permanent,
        });
        self
    }

    /// `[min, max]` when the camera declares a permanent range.
    pub fn permanent_range(&self) -> Option<(f64, f64)> {
        match self.constraint {
            Some(AttributeConstraint::Range {
                min,
                max,
                permanent: true,
            }) => Some((min, max)),
            _ => None,
        }
    }
}

/// Identity of an enumerated camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraId {
    pub model: String,
    pub serial_number: String,
}

/// Identity reported by an open camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model: String,
    pub serial_number: String,
    pub sensor_name: String,
}

/// Camera enumeration and opening.
pub trait PicamSdk: Send + Sync {
    fn list_cameras(&self) -> Result<Vec<CameraId>>;

    /// Open by serial number, or the first available camera when `None`.
    fn open(&self, serial_number: Option<&str>) -> Result<Arc<dyn PicamCamera>>;
}

/// An open camera handle.
pub trait PicamCamera: Send + Sync {
    fn device_info(&self) -> Result<DeviceInfo>;

    fn attributes(&self) -> Result<Vec<CameraAttribute>>;

    /// Fresh snapshot of one attribute, constraints re-read from the camera.
    fn attribute(&self, name: &str) -> Result<CameraAttribute>;

    /// With `truncate`, out-of-range numbers are clamped instead of rejected.
    fn set_attribute_value(&self, name: &str, value: AttributeValue, truncate: bool)
        -> Result<()>;

    /// Active ROI (index 0 of the ROI list).
    fn roi(&self) -> Result<Roi>;

    fn set_roi(&self, roi: Roi) -> Result<()>;

    /// Ask the camera to validate and apply pending parameters.
    fn commit_parameters(&self) -> Result<()>;

    fn setup_acquisition(&self) -> Result<()>;

    fn clear_acquisition(&self) -> Result<()>;

    fn start_acquisition(&self) -> Result<()>;

    fn stop_acquisition(&self) -> Result<()>;

    fn acquisition_in_progress(&self) -> Result<bool>;

    /// Block up to `timeout` for an unread frame. `Ok(false)` on timeout.
    fn wait_for_frame(&self, timeout: Duration) -> Result<bool>;

    fn read_oldest_image(&self) -> Result<Option<Frame>>;

    fn read_newest_image(&self) -> Result<Option<Frame>>;

    fn close(&self) -> Result<()>;
}
