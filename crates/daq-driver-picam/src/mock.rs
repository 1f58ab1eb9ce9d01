//! Mock picam SDK for tests and hardware-free runs.
//!
//! [`MockPicamCamera`] models a CCD with the attribute set of a typical picam
//! camera: exposure, ADC settings, a single ROI, cooling and a few read-only
//! calculations whose values and limits follow the ROI. Frames appear at a fixed
//! period once acquisition starts and queue up until read or cleared.
//!
//! Every state-changing call is appended to a journal so tests can assert call order.
//!
//! # Example
//!
//! ```rust
//! use daq_driver_picam::mock::{MockPicamCamera, MockPicamSdk};
//! use std::time::Duration;
//!
//! let camera = MockPicamCamera::builder()
//!     .sensor(1340, 400)
//!     .frame_period(Duration::from_millis(5))
//!     .build();
//! let sdk = MockPicamSdk::with_camera(camera);
//! ```

use crate::sdk::{
    AttributeConstraint, AttributeKind, AttributeLabel, AttributeValue, CameraAttribute,
    CameraId, DeviceInfo, PicamCamera, PicamSdk,
};
use anyhow::{anyhow, bail, Result};
use daq_core::core::Roi;
use daq_core::data::Frame;
use daq_core::error::{DaqError, DriverError, DriverErrorKind};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest single sleep inside `wait_for_frame`.
const WAIT_SLICE: Duration = Duration::from_millis(2);

/// Builder for [`MockPicamCamera`].
#[derive(Debug, Clone)]
pub struct MockCameraBuilder {
    model: String,
    serial_number: String,
    sensor: (u32, u32),
    frame_period: Duration,
    wait_failures: u32,
    unsupported_attribute: bool,
    read_only_rois: bool,
}

impl Default for MockCameraBuilder {
    fn default() -> Self {
        Self {
            model: "PIXIS: 400B".to_string(),
            serial_number: "0008154711".to_string(),
            sensor: (1340, 400),
            frame_period: Duration::from_millis(10),
            wait_failures: 0,
            unsupported_attribute: false,
            read_only_rois: false,
        }
    }
}

impl MockCameraBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = serial.into();
        self
    }

    pub fn sensor(mut self, width: u32, height: u32) -> Self {
        self.sensor = (width, height);
        self
    }

    /// Time between two frames while acquiring.
    pub fn frame_period(mut self, period: Duration) -> Self {
        self.frame_period = period.max(Duration::from_millis(1));
        self
    }

    /// The next `count` calls to `wait_for_frame` fail.
    pub fn fail_waits(mut self, count: u32) -> Self {
        self.wait_failures = count;
        self
    }

    /// Expose a pulse-kind attribute ("Repetitive Gate").
    pub fn with_unsupported_attribute(mut self) -> Self {
        self.unsupported_attribute = true;
        self
    }

    pub fn read_only_rois(mut self) -> Self {
        self.read_only_rois = true;
        self
    }

    pub fn build(self) -> Arc<MockPicamCamera> {
        let roi = Roi::full(self.sensor.0, self.sensor.1);
        let mut attributes = base_attributes(&roi, self.sensor, self.read_only_rois);
        if self.unsupported_attribute {
            attributes.push(CameraAttribute::new(
                "Repetitive Gate",
                AttributeKind::Pulse,
                AttributeValue::Opaque("delay=0, width=1000".into()),
            ));
        }
        let mut state = MockState {
            attributes,
            roi,
            started: None,
            frozen: 0,
            consumed: 0,
            closed: false,
            wait_failures: self.wait_failures,
            journal: Vec::new(),
        };
        state.recompute();
        Arc::new(MockPicamCamera {
            info: DeviceInfo {
                model: self.model,
                serial_number: self.serial_number,
                sensor_name: "E2V 1340x400".to_string(),
            },
            sensor: self.sensor,
            frame_period: self.frame_period,
            state: Mutex::new(state),
        })
    }
}

fn enum_labels(keys: &[(&str, &str)]) -> Vec<AttributeLabel> {
    keys.iter()
        .map(|(k, d)| AttributeLabel::new(*k, *d))
        .collect()
}

fn base_attributes(roi: &Roi, sensor: (u32, u32), read_only_rois: bool) -> Vec<CameraAttribute> {
    let mut rois = CameraAttribute::new(
        "ROIs",
        AttributeKind::Rois,
        AttributeValue::Rois(vec![*roi]),
    );
    rois.constraint = Some(AttributeConstraint::Collection { permanent: false });
    if read_only_rois {
        rois = rois.read_only();
    }
    vec![
        CameraAttribute::new(
            "Shutter Timing Mode",
            AttributeKind::Enumeration,
            AttributeValue::Enum("Normal".into()),
        )
        .with_labels(enum_labels(&[
            ("Normal", "Normal"),
            ("AlwaysClosed", "Always Closed"),
            ("AlwaysOpen", "Always Open"),
        ]))
        .online(),
        CameraAttribute::new(
            "ADC Quality",
            AttributeKind::Enumeration,
            AttributeValue::Enum("LowNoise".into()),
        )
        .with_labels(enum_labels(&[
            ("LowNoise", "Low Noise"),
            ("HighCapacity", "High Capacity"),
        ])),
        CameraAttribute::new(
            "Exposure Time",
            AttributeKind::FloatingPoint,
            AttributeValue::Float(100.0),
        )
        .with_range(0.0, 10_000_000.0, true)
        .online(),
        rois,
        CameraAttribute::new(
            "Pixel Width",
            AttributeKind::FloatingPoint,
            AttributeValue::Float(20.0),
        )
        .read_only(),
        CameraAttribute::new(
            "ADC Analog Gain",
            AttributeKind::Enumeration,
            AttributeValue::Enum("Medium".into()),
        )
        .with_labels(enum_labels(&[
            ("Low", "Low"),
            ("Medium", "Medium"),
            ("High", "High"),
        ])),
        CameraAttribute::new(
            "ADC Speed",
            AttributeKind::FloatingPoint,
            AttributeValue::Float(2.0),
        )
        .with_labels(vec![
            AttributeLabel::new(AttributeValue::Float(0.1).label_key(), "100 kHz"),
            AttributeLabel::new(AttributeValue::Float(2.0).label_key(), "2 MHz"),
        ]),
        CameraAttribute::new(
            "Frame Rate Calculation",
            AttributeKind::FloatingPoint,
            AttributeValue::Float(0.0),
        )
        .with_range(0.0, 0.0, false)
        .read_only(),
        CameraAttribute::new(
            "Sensor Temperature Set Point",
            AttributeKind::FloatingPoint,
            AttributeValue::Float(-70.0),
        )
        .with_range(-120.0, 30.0, true)
        .online(),
        CameraAttribute::new(
            "Sensor Temperature",
            AttributeKind::FloatingPoint,
            AttributeValue::Float(-70.0),
        )
        .read_only(),
        CameraAttribute::new(
            "Readout Time Calculation",
            AttributeKind::FloatingPoint,
            AttributeValue::Float(0.0),
        )
        .with_range(0.0, 0.0, true)
        .read_only(),
        CameraAttribute::new(
            "Disable Cooling Fan",
            AttributeKind::Boolean,
            AttributeValue::Bool(false),
        ),
        CameraAttribute::new(
            "Readout Count",
            AttributeKind::LargeInteger,
            AttributeValue::Int(0),
        )
        .with_range(0.0, 1e12, false),
        CameraAttribute::new(
            "Pixel Height",
            AttributeKind::FloatingPoint,
            AttributeValue::Float(20.0),
        )
        .read_only(),
        CameraAttribute::new(
            "Active Width",
            AttributeKind::Integer,
            AttributeValue::Int(i64::from(sensor.0)),
        )
        .with_range(1.0, f64::from(sensor.0), true)
        .read_only(),
        CameraAttribute::new(
            "Active Height",
            AttributeKind::Integer,
            AttributeValue::Int(i64::from(sensor.1)),
        )
        .with_range(1.0, f64::from(sensor.1), true)
        .read_only(),
    ]
}

#[derive(Debug)]
struct MockState {
    attributes: Vec<CameraAttribute>,
    roi: Roi,
    /// Start of the running acquisition
    started: Option<Instant>,
    /// Frames produced by the last, stopped acquisition
    frozen: u64,
    consumed: u64,
    closed: bool,
    wait_failures: u32,
    journal: Vec<String>,
}

impl MockState {
    fn attribute_mut(&mut self, name: &str) -> Result<&mut CameraAttribute> {
        self.attributes
            .iter_mut()
            .find(|a| a.name == name)
            .ok_or_else(|| anyhow!("no attribute named '{}'", name))
    }

    fn float(&self, name: &str) -> f64 {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| match a.value {
                AttributeValue::Float(v) => Some(v),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn set_float(&mut self, name: &str, value: f64, range: Option<(f64, f64)>) {
        if let Ok(attr) = self.attribute_mut(name) {
            attr.value = AttributeValue::Float(value);
            if let (Some((min, max)), Some(AttributeConstraint::Range { permanent, .. })) =
                (range, attr.constraint.clone())
            {
                attr.constraint = Some(AttributeConstraint::Range {
                    min,
                    max,
                    permanent,
                });
            }
        }
    }

    /// Derived values follow exposure, ADC speed and ROI.
    fn recompute(&mut self) {
        let (cols, rows) = self.roi.binned_size();
        let speed_mhz = self.float("ADC Speed").max(0.1);
        let readout_ms = f64::from(cols) * f64::from(rows) / (speed_mhz * 1000.0);
        let exposure_ms = self.float("Exposure Time");
        let frame_rate = 1000.0 / (exposure_ms + readout_ms).max(1e-3);
        self.set_float("Readout Time Calculation", readout_ms, Some((0.0, readout_ms)));
        self.set_float("Frame Rate Calculation", frame_rate, Some((0.0, frame_rate)));
        let roi = self.roi;
        if let Ok(attr) = self.attribute_mut("ROIs") {
            attr.value = AttributeValue::Rois(vec![roi]);
        }
    }

    fn produced(&self, period: Duration) -> u64 {
        match self.started {
            Some(t) => (t.elapsed().as_nanos() / period.as_nanos().max(1)) as u64,
            None => self.frozen,
        }
    }

    fn record(&mut self, call: &str) {
        self.journal.push(call.to_string());
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            bail!("camera handle is closed");
        }
        Ok(())
    }
}

/// Simulated picam camera.
#[derive(Debug)]
pub struct MockPicamCamera {
    info: DeviceInfo,
    sensor: (u32, u32),
    frame_period: Duration,
    state: Mutex<MockState>,
}

impl MockPicamCamera {
    pub fn builder() -> MockCameraBuilder {
        MockCameraBuilder::default()
    }

    pub fn id(&self) -> CameraId {
        CameraId {
            model: self.info.model.clone(),
            serial_number: self.info.serial_number.clone(),
        }
    }

    /// State-changing calls so far, oldest first.
    pub fn journal(&self) -> Vec<String> {
        self.state.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Frames buffered and not yet read.
    pub fn pending_frames(&self) -> u64 {
        let state = self.state.lock();
        state.produced(self.frame_period).saturating_sub(state.consumed)
    }

    fn frame(&self, roi: &Roi, index: u64) -> Frame {
        let (cols, rows) = roi.binned_size();
        let mut pixels = Vec::with_capacity(cols as usize * rows as usize);
        for y in 0..rows {
            for x in 0..cols {
                let value = ((u64::from(x) + u64::from(y) + index) % 4096) as u16;
                pixels.push(value.saturating_add(100));
            }
        }
        Frame::from_u16(cols, rows, pixels)
    }

    fn validate_roi(&self, roi: &Roi) -> Result<()> {
        let (w, h) = self.sensor;
        if roi.width == 0 || roi.height == 0 {
            bail!("ROI must have a non-zero size: {}", roi);
        }
        if roi.x_binning == 0 || roi.y_binning == 0 {
            bail!("ROI binning must be at least 1: {}", roi);
        }
        if roi.x.saturating_add(roi.width) > w || roi.y.saturating_add(roi.height) > h {
            bail!("ROI {} exceeds the {}x{} sensor", roi, w, h);
        }
        Ok(())
    }
}

fn coerce(attr: &CameraAttribute, value: AttributeValue, truncate: bool) -> Result<AttributeValue> {
    if !attr.labels.is_empty() {
        let key = value.label_key();
        if !attr.labels.iter().any(|l| l.key == key) {
            bail!("'{}' is not an allowed value of '{}'", key, attr.name);
        }
    }
    let clamp = |v: f64| -> Result<f64> {
        match attr.constraint {
            Some(AttributeConstraint::Range { min, max, .. }) if v < min || v > max => {
                if truncate {
                    Ok(v.clamp(min, max))
                } else {
                    bail!("{} outside [{}, {}] for '{}'", v, min, max, attr.name)
                }
            }
            _ => Ok(v),
        }
    };
    match (attr.kind, value) {
        (AttributeKind::FloatingPoint, AttributeValue::Float(v)) => {
            Ok(AttributeValue::Float(clamp(v)?))
        }
        (AttributeKind::FloatingPoint, AttributeValue::Int(v)) => {
            Ok(AttributeValue::Float(clamp(v as f64)?))
        }
        (AttributeKind::Integer | AttributeKind::LargeInteger, AttributeValue::Int(v)) => {
            Ok(AttributeValue::Int(clamp(v as f64)?.round() as i64))
        }
        (AttributeKind::Boolean, v @ AttributeValue::Bool(_)) => Ok(v),
        (AttributeKind::Enumeration, v @ AttributeValue::Enum(_)) => Ok(v),
        (kind, v) => bail!("cannot store {:?} in {} attribute '{}'", v, kind, attr.name),
    }
}

impl PicamCamera for MockPicamCamera {
    fn device_info(&self) -> Result<DeviceInfo> {
        self.state.lock().ensure_open()?;
        Ok(self.info.clone())
    }

    fn attributes(&self) -> Result<Vec<CameraAttribute>> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.attributes.clone())
    }

    fn attribute(&self, name: &str) -> Result<CameraAttribute> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.attribute_mut(name).map(|a| a.clone())
    }

    fn set_attribute_value(&self, name: &str, value: AttributeValue, truncate: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.record(&format!("set_attribute_value:{}", name));
        if let AttributeValue::Rois(rois) = &value {
            let roi = *rois
                .first()
                .ok_or_else(|| anyhow!("empty ROI list for '{}'", name))?;
            drop(state);
            return self.set_roi(roi);
        }
        let attr = state.attribute_mut(name)?;
        if !attr.writable {
            bail!("attribute '{}' is read-only", name);
        }
        attr.value = coerce(attr, value, truncate)?;
        state.recompute();
        Ok(())
    }

    fn roi(&self) -> Result<Roi> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.roi)
    }

    fn set_roi(&self, roi: Roi) -> Result<()> {
        self.validate_roi(&roi)?;
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.record("set_roi");
        state.roi = roi;
        state.recompute();
        Ok(())
    }

    fn commit_parameters(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.record("commit_parameters");
        Ok(())
    }

    fn setup_acquisition(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.record("setup_acquisition");
        Ok(())
    }

    fn clear_acquisition(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.record("clear_acquisition");
        state.consumed = state.produced(self.frame_period);
        Ok(())
    }

    fn start_acquisition(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if state.started.is_some() {
            bail!("acquisition already running");
        }
        state.record("start_acquisition");
        state.started = Some(Instant::now());
        state.frozen = 0;
        state.consumed = 0;
        Ok(())
    }

    fn stop_acquisition(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.record("stop_acquisition");
        state.frozen = state.produced(self.frame_period);
        state.started = None;
        Ok(())
    }

    fn acquisition_in_progress(&self) -> Result<bool> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.started.is_some())
    }

    fn wait_for_frame(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        {
            let mut state = self.state.lock();
            state.ensure_open()?;
            if state.wait_failures > 0 {
                state.wait_failures -= 1;
                bail!("injected wait failure");
            }
        }
        loop {
            if self.pending_frames() > 0 {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            std::thread::sleep(WAIT_SLICE.min(deadline - now));
        }
    }

    fn read_oldest_image(&self) -> Result<Option<Frame>> {
        let (roi, index) = {
            let mut state = self.state.lock();
            state.ensure_open()?;
            if state.produced(self.frame_period) <= state.consumed {
                return Ok(None);
            }
            let index = state.consumed;
            state.consumed += 1;
            (state.roi, index)
        };
        Ok(Some(self.frame(&roi, index)))
    }

    fn read_newest_image(&self) -> Result<Option<Frame>> {
        let (roi, index) = {
            let mut state = self.state.lock();
            state.ensure_open()?;
            let produced = state.produced(self.frame_period);
            if produced <= state.consumed {
                return Ok(None);
            }
            state.consumed = produced;
            (state.roi, produced - 1)
        };
        Ok(Some(self.frame(&roi, index)))
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.record("close");
        state.started = None;
        state.closed = true;
        Ok(())
    }
}

/// Mock SDK serving a fixed set of cameras.
#[derive(Debug, Default)]
pub struct MockPicamSdk {
    cameras: Vec<Arc<MockPicamCamera>>,
}

impl MockPicamSdk {
    pub fn new(cameras: Vec<Arc<MockPicamCamera>>) -> Self {
        Self { cameras }
    }

    pub fn with_camera(camera: Arc<MockPicamCamera>) -> Self {
        Self::new(vec![camera])
    }
}

impl PicamSdk for MockPicamSdk {
    fn list_cameras(&self) -> Result<Vec<CameraId>> {
        Ok(self.cameras.iter().map(|c| c.id()).collect())
    }

    fn open(&self, serial_number: Option<&str>) -> Result<Arc<dyn PicamCamera>> {
        let camera = match serial_number {
            Some(serial) => self
                .cameras
                .iter()
                .find(|c| c.info.serial_number == serial)
                .ok_or_else(|| anyhow!("no camera with serial number '{}'", serial))?,
            None => self
                .cameras
                .first()
                .ok_or_else(|| {
                    DaqError::from(DriverError::new(
                        "picam",
                        DriverErrorKind::Initialization,
                        "no picam camera detected",
                    ))
                })?,
        };
        if camera.is_closed() {
            bail!("camera '{}' was closed", camera.info.serial_number);
        }
        Ok(camera.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_queue_until_read_or_cleared() {
        let camera = MockPicamCamera::builder()
            .frame_period(Duration::from_millis(2))
            .build();
        assert_eq!(camera.read_oldest_image().unwrap(), None);
        camera.start_acquisition().unwrap();
        assert!(camera.wait_for_frame(Duration::from_secs(1)).unwrap());
        let first = camera.read_oldest_image().unwrap().unwrap();
        assert_eq!((first.width, first.height), (1340, 400));

        std::thread::sleep(Duration::from_millis(10));
        camera.clear_acquisition().unwrap();
        camera.stop_acquisition().unwrap();
        assert_eq!(camera.pending_frames(), 0);
    }

    #[test]
    fn roi_changes_derived_limits() {
        let camera = MockPicamCamera::builder().build();
        let before = camera.attribute("Readout Time Calculation").unwrap();
        camera
            .set_roi(Roi {
                y_binning: 400,
                ..Roi::full(1340, 400)
            })
            .unwrap();
        let after = camera.attribute("Readout Time Calculation").unwrap();
        assert_ne!(before.constraint, after.constraint);
        assert!(matches!(
            camera.attribute("ROIs").unwrap().value,
            AttributeValue::Rois(ref rois) if rois[0].y_binning == 400
        ));
        assert!(camera.set_roi(Roi::full(2000, 10)).is_err());
    }

    #[test]
    fn truncate_clamps_to_range() {
        let camera = MockPicamCamera::builder().build();
        assert!(camera
            .set_attribute_value("Sensor Temperature Set Point", AttributeValue::Float(-200.0), false)
            .is_err());
        camera
            .set_attribute_value("Sensor Temperature Set Point", AttributeValue::Float(-200.0), true)
            .unwrap();
        assert_eq!(
            camera.attribute("Sensor Temperature Set Point").unwrap().value,
            AttributeValue::Float(-120.0)
        );
    }

    #[test]
    fn sdk_opens_by_serial() {
        let a = MockPicamCamera::builder().serial_number("A").build();
        let b = MockPicamCamera::builder().serial_number("B").build();
        let sdk = MockPicamSdk::new(vec![a, b]);
        assert_eq!(sdk.list_cameras().unwrap().len(), 2);
        assert_eq!(sdk.open(Some("B")).unwrap().device_info().unwrap().serial_number, "B");
        assert!(sdk.open(Some("C")).is_err());

        let err = MockPicamSdk::default().open(None).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<DaqError>(),
            Some(DaqError::Driver(e)) if e.kind == DriverErrorKind::Initialization
        ));
    }
}
