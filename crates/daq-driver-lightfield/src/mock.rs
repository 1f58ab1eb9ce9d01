//! Mock LightField automation for tests and hardware-free runs.
//!
//! Captures are synthetic pump-probe data: every pump-on frame is twice its
//! following pump-off frame, so the transient absorption of every pixel is
//! `-1000 ln 2`.

use crate::automation::{
    CaptureDataset, DeviceType, ExperimentDevice, LightFieldAutomation, LightFieldLauncher,
    ShutterTimingMode,
};
use anyhow::{anyhow, bail, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockLightFieldBuilder {
    experiment_name: String,
    width: usize,
    ready: bool,
    camera: bool,
    shutter: ShutterTimingMode,
    frames_to_store: usize,
    dropped_frames: usize,
    capture_delay: Duration,
}

impl Default for MockLightFieldBuilder {
    fn default() -> Self {
        Self {
            experiment_name: "TA_pump_probe".to_string(),
            width: 1024,
            ready: true,
            camera: true,
            shutter: ShutterTimingMode::Normal,
            frames_to_store: 1000,
            dropped_frames: 0,
            capture_delay: Duration::ZERO,
        }
    }
}

impl MockLightFieldBuilder {
    pub fn experiment_name(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = name.into();
        self
    }

    /// Pixels per frame.
    pub fn width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    pub fn without_camera(mut self) -> Self {
        self.camera = false;
        self
    }

    pub fn shutter(mut self, mode: ShutterTimingMode) -> Self {
        self.shutter = mode;
        self
    }

    pub fn frames_to_store(mut self, frames: usize) -> Self {
        self.frames_to_store = frames;
        self
    }

    /// Every capture returns `count` frames fewer than requested.
    pub fn drop_frames(mut self, count: usize) -> Self {
        self.dropped_frames = count;
        self
    }

    /// Every capture blocks this long before returning.
    pub fn capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = delay;
        self
    }

    pub fn build(self) -> Arc<MockLightField> {
        let mut devices = vec![ExperimentDevice {
            model: "SpectraPro HRS-300".to_string(),
            device_type: DeviceType::Spectrometer,
        }];
        if self.camera {
            devices.push(ExperimentDevice {
                model: "PyLoN: 100BR_eXcelon".to_string(),
                device_type: DeviceType::Camera,
            });
        }
        Arc::new(MockLightField {
            width: self.width,
            dropped_frames: self.dropped_frames,
            capture_delay: self.capture_delay,
            state: Mutex::new(MockState {
                experiment_name: self.experiment_name,
                ready: self.ready,
                devices,
                shutter: self.shutter,
                frames_to_store: self.frames_to_store,
                captures: 0,
                disposals: 0,
            }),
        })
    }
}

#[derive(Debug)]
struct MockState {
    experiment_name: String,
    ready: bool,
    devices: Vec<ExperimentDevice>,
    shutter: ShutterTimingMode,
    frames_to_store: usize,
    captures: usize,
    disposals: usize,
}

/// Simulated LightField experiment.
#[derive(Debug)]
pub struct MockLightField {
    width: usize,
    dropped_frames: usize,
    capture_delay: Duration,
    state: Mutex<MockState>,
}

impl MockLightField {
    pub fn builder() -> MockLightFieldBuilder {
        MockLightFieldBuilder::default()
    }

    pub fn shutter(&self) -> ShutterTimingMode {
        self.state.lock().shutter
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.lock().ready = ready;
    }

    pub fn capture_count(&self) -> usize {
        self.state.lock().captures
    }

    pub fn dispose_count(&self) -> usize {
        self.state.lock().disposals
    }

    /// Pixel values of frame `index`.
    pub fn frame(&self, index: usize) -> Vec<u16> {
        (0..self.width)
            .map(|pixel| {
                let reference = 100 + (pixel % 50) as u16;
                if index % 2 == 0 {
                    2 * reference
                } else {
                    reference
                }
            })
            .collect()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.state.lock().disposals > 0 {
            bail!("LightField automation was disposed");
        }
        Ok(())
    }
}

impl LightFieldAutomation for MockLightField {
    fn experiment_name(&self) -> Result<String> {
        self.ensure_alive()?;
        Ok(self.state.lock().experiment_name.clone())
    }

    fn is_ready_to_run(&self) -> Result<bool> {
        self.ensure_alive()?;
        Ok(self.state.lock().ready)
    }

    fn devices(&self) -> Result<Vec<ExperimentDevice>> {
        self.ensure_alive()?;
        Ok(self.state.lock().devices.clone())
    }

    fn shutter_timing_mode(&self) -> Result<ShutterTimingMode> {
        self.ensure_alive()?;
        Ok(self.state.lock().shutter)
    }

    fn set_shutter_timing_mode(&self, mode: ShutterTimingMode) -> Result<()> {
        self.ensure_alive()?;
        self.state.lock().shutter = mode;
        Ok(())
    }

    fn frames_to_store(&self) -> Result<usize> {
        self.ensure_alive()?;
        Ok(self.state.lock().frames_to_store)
    }

    fn set_frames_to_store(&self, frames: usize) -> Result<()> {
        self.ensure_alive()?;
        if frames == 0 {
            bail!("frames to store must be at least 1");
        }
        self.state.lock().frames_to_store = frames;
        Ok(())
    }

    fn capture(&self, frames: usize) -> Result<CaptureDataset> {
        self.ensure_alive()?;
        if !self.state.lock().ready {
            bail!("experiment is not ready to run");
        }
        if !self.capture_delay.is_zero() {
            std::thread::sleep(self.capture_delay);
        }
        let delivered = frames.saturating_sub(self.dropped_frames);
        let mut buffer = Vec::with_capacity(delivered * self.width);
        for index in 0..delivered {
            buffer.extend(self.frame(index));
        }
        self.state.lock().captures += 1;
        Ok(CaptureDataset {
            frames: delivered,
            width: self.width,
            buffer,
        })
    }

    fn dispose(&self) -> Result<()> {
        self.state.lock().disposals += 1;
        Ok(())
    }
}

/// Launcher returning a fixed mock instance.
pub struct MockLauncher {
    automation: Option<Arc<MockLightField>>,
}

impl MockLauncher {
    pub fn new(automation: Arc<MockLightField>) -> Self {
        Self {
            automation: Some(automation),
        }
    }

    /// Launcher that fails as if LightField were not installed.
    pub fn unavailable() -> Self {
        Self { automation: None }
    }
}

impl LightFieldLauncher for MockLauncher {
    fn launch(&self) -> Result<Arc<dyn LightFieldAutomation>> {
        let automation = self
            .automation
            .clone()
            .ok_or_else(|| anyhow!("LightField automation is not available"))?;
        Ok(automation)
    }
}
