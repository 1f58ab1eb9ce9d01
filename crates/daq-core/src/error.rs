//! Error types shared by the detector plugins.
//!
//! `DaqError` is the single typed error for the workspace. Driver crates return
//! `anyhow::Result` at their public surface and wrap `DaqError` values, so callers
//! can still `downcast_ref::<DaqError>()` when they need to branch on a category.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: a configuration value parsed but is semantically wrong.
//! - **`Instrument`**: a vendor SDK call failed.
//! - **`Driver`**: structured driver failure carrying a [`DriverErrorKind`].
//! - **`Parameter*`**: a settings-tree operation was rejected (unknown path, read-only,
//!   wrong type, outside limits, not one of the allowed values).
//! - **`UnsupportedAttribute`**: a vendor attribute kind has no descriptor mapping.
//! - **`InvalidState`**: a lifecycle operation was called in the wrong acquisition state.

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Initialization,
    Timeout,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Timeout => "timeout",
        };
        write!(f, "{}", label)
    }
}

#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    pub driver_type: String,
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Convenience alias for results using the workspace error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for the detector plugins.
///
/// # Error Categories
///
/// 1. **Configuration Errors** - `Configuration`
///    - Raised by factories before a driver is built
///    - Recovery: fix the configuration and rebuild the driver
///
/// 2. **Hardware Errors** - `Instrument`, `Driver`, `UnsupportedAttribute`
///    - Raised by the vendor seam
///    - During initialization they become a failed `InitStatus`, never a panic
///
/// 3. **Runtime Errors** - `Parameter*`, `InvalidState`, `NotInitialized`
///    - Raised by settings commits and lifecycle calls
///    - Recovery: correct the request or wait for the acquisition state to change
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration validation failed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use daq_core::error::DaqError;
    ///
    /// fn validate_pairs(kc_pairs: u32) -> Result<(), DaqError> {
    ///     if kc_pairs == 0 {
    ///         return Err(DaqError::Configuration("kc_pairs must be positive".into()));
    ///     }
    ///     Ok(())
    /// }
    /// ```
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A vendor SDK call failed.
    ///
    /// The message is the vendor's own text where one is available; it is shown to
    /// the operator verbatim through the status channel.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// Structured driver error with category
    #[error("{0}")]
    Driver(DriverError),

    /// A vendor attribute kind has no descriptor representation.
    #[error("unsupported attribute kind {kind} for '{name}'")]
    UnsupportedAttribute { name: String, kind: String },

    /// No node exists at the given settings path.
    #[error("Parameter '{0}' not found")]
    ParameterNotFound(String),

    /// A sibling with the same key already exists.
    #[error("Parameter '{0}' already exists")]
    ParameterExists(String),

    /// The node is read-only.
    #[error("Parameter is read-only")]
    ParameterReadOnly,

    /// The value's type does not match the node's kind.
    #[error("Parameter '{path}' expects {expected}, got {actual}")]
    ParameterTypeMismatch {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Numeric value outside the node's limits.
    #[error("Value {value} for '{path}' outside limits [{min}, {max}]")]
    ParameterOutOfRange {
        path: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// List value not in the node's allowed values.
    #[error("Invalid choice '{value}' for '{path}'")]
    ParameterInvalidChoice { path: String, value: String },

    /// A lifecycle operation was called in the wrong acquisition state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The detector has not been initialised (or has been closed).
    #[error("Detector '{0}' is not initialised")]
    NotInitialized(String),

    /// Data processing failed (reshaping, ratio arithmetic).
    #[error("Data processing error: {0}")]
    Processing(String),
}

impl From<DriverError> for DaqError {
    fn from(err: DriverError) -> Self {
        DaqError::Driver(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_display_includes_kind() {
        let err = DriverError::new("picam", DriverErrorKind::Timeout, "no frame");
        assert_eq!(err.to_string(), "Driver 'picam' timeout error: no frame");
        let wrapped: DaqError = err.into();
        assert!(matches!(wrapped, DaqError::Driver(_)));
    }

    #[test]
    fn unsupported_attribute_message() {
        let err = DaqError::UnsupportedAttribute {
            name: "Gating Mode".into(),
            kind: "Pulse".into(),
        };
        assert_eq!(
            err.to_string(),
            "unsupported attribute kind Pulse for 'Gating Mode'"
        );
    }
}
