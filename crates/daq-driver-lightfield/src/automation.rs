//! LightField automation seam
//!
//! LightField is driven through its .NET automation library. The interop bridge
//! implements [`LightFieldLauncher`] and [`LightFieldAutomation`]; everything else in
//! this crate talks to [`LightFieldSession`], which only offers what a grab needs:
//! shutter, frame count and a blocking capture.

use anyhow::{anyhow, bail, Result};
use ndarray::{Array2, ShapeBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// `CameraSettings.ShutterTimingMode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterTimingMode {
    Normal,
    AlwaysOpen,
    AlwaysClosed,
}

impl ShutterTimingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutterTimingMode::Normal => "Normal",
            ShutterTimingMode::AlwaysOpen => "AlwaysOpen",
            ShutterTimingMode::AlwaysClosed => "AlwaysClosed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Camera,
    Spectrometer,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentDevice {
    pub model: String,
    pub device_type: DeviceType,
}

/// Raw result of `Experiment.Capture`: frames stored one after another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDataset {
    pub frames: usize,
    /// Pixels per frame
    pub width: usize,
    pub buffer: Vec<u16>,
}

/// The running application's experiment object.
pub trait LightFieldAutomation: Send + Sync {
    fn experiment_name(&self) -> Result<String>;

    fn is_ready_to_run(&self) -> Result<bool>;

    fn devices(&self) -> Result<Vec<ExperimentDevice>>;

    fn shutter_timing_mode(&self) -> Result<ShutterTimingMode>;

    fn set_shutter_timing_mode(&self, mode: ShutterTimingMode) -> Result<()>;

    /// `ExperimentSettings.AcquisitionFramesToStore`
    fn frames_to_store(&self) -> Result<usize>;

    fn set_frames_to_store(&self, frames: usize) -> Result<()>;

    /// Blocking capture of `frames` frames.
    fn capture(&self, frames: usize) -> Result<CaptureDataset>;

    /// Release the automation object (closes LightField).
    fn dispose(&self) -> Result<()>;
}

/// Starts LightField and hands out its automation object.
pub trait LightFieldLauncher: Send + Sync {
    fn launch(&self) -> Result<Arc<dyn LightFieldAutomation>>;
}

/// Capability adapter over one LightField instance.
pub struct LightFieldSession {
    automation: Arc<dyn LightFieldAutomation>,
    required_experiment: Option<String>,
    closed: AtomicBool,
}

impl LightFieldSession {
    /// Launch LightField and close the shutter.
    pub fn open(launcher: &dyn LightFieldLauncher, required_experiment: Option<String>) -> Result<Self> {
        let automation = launcher.launch()?;
        automation.set_shutter_timing_mode(ShutterTimingMode::AlwaysClosed)?;
        tracing::info!("LightField session opened, shutter closed");
        Ok(Self {
            automation,
            required_experiment,
            closed: AtomicBool::new(false),
        })
    }

    /// Operator-facing reason the experiment cannot run, if any.
    pub fn readiness_error(&self) -> Result<Option<String>> {
        let ready = self.automation.is_ready_to_run()?;
        let has_camera = self
            .automation
            .devices()?
            .iter()
            .any(|d| d.device_type == DeviceType::Camera);
        if !ready {
            return Ok(Some("Experiment not ready".to_string()));
        }
        if !has_camera {
            return Ok(Some("No camera detected.".to_string()));
        }
        Ok(None)
    }

    pub fn experiment_name(&self) -> Result<String> {
        self.automation.experiment_name()
    }

    pub fn open_shutter(&self, open: bool) -> Result<()> {
        let mode = if open {
            ShutterTimingMode::AlwaysOpen
        } else {
            ShutterTimingMode::AlwaysClosed
        };
        self.ensure_open()?;
        tracing::debug!(mode = mode.as_str(), "setting shutter timing mode");
        self.automation.set_shutter_timing_mode(mode)
    }

    pub fn is_shutter_open(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.automation.shutter_timing_mode()? == ShutterTimingMode::AlwaysOpen)
    }

    pub fn set_frame_count(&self, frames: usize) -> Result<()> {
        self.ensure_open()?;
        tracing::debug!(frames, "setting frames to store");
        self.automation.set_frames_to_store(frames)
    }

    pub fn frame_count(&self) -> Result<usize> {
        self.automation.frames_to_store()
    }

    /// Capture the configured number of frames as a `(pixels, frames)` array.
    pub fn capture_spectra(&self) -> Result<Array2<u16>> {
        self.ensure_open()?;
        if let Some(required) = &self.required_experiment {
            let loaded = self.automation.experiment_name()?;
            if &loaded != required {
                bail!("Experiment '{}' is loaded, expected '{}'", loaded, required);
            }
        }
        if !self.automation.is_ready_to_run()? {
            bail!("Experiment not ready");
        }

        let frames = self.automation.frames_to_store()?;
        let dataset = self.automation.capture(frames)?;
        if dataset.frames != frames {
            bail!("Frames are not equal.");
        }
        let width = dataset.width;
        Array2::from_shape_vec((width, frames).f(), dataset.buffer).map_err(|e| {
            anyhow!(
                "capture buffer does not hold {} frames of {} pixels: {}",
                frames,
                width,
                e
            )
        })
    }

    /// Handler for LightField's closing event: shutter closed, session released.
    pub fn application_closing(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        tracing::info!("LightField is closing");
        let shutter = self
            .automation
            .set_shutter_timing_mode(ShutterTimingMode::AlwaysClosed);
        let closed = self.close();
        shutter.and(closed)
    }

    /// Dispose the automation object. A second call does nothing.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("disposing LightField automation");
        self.automation.dispose()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            bail!("LightField session is closed");
        }
        Ok(())
    }
}
