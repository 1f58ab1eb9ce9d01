//! Shared timing limits for the detector plugins.

use std::time::Duration;

// =============================================================================
// Timeout Constants
// =============================================================================

/// Default wait for the next camera frame (10 seconds).
///
/// A wait that exceeds this is reported as a transient timeout; the acquisition
/// stays armed and the next grab waits again.
pub const FRAME_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between frame-availability polls on the wait worker (50 ms).
///
/// Also bounds how long a cancelled wait keeps the worker busy.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Timeout for graceful shutdown operations (2 seconds).
///
/// Used when joining the wait worker on close.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on a single blocking spectrometer capture (5 minutes).
pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(300);
