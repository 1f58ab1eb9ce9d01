//! Princeton Instruments picam camera driver (componentized)
//!
//! Components:
//! - Connection: opening, sharing and releasing the camera handle
//! - Attributes: vendor attribute dictionary to settings descriptors
//! - Acquisition: start/stop, online-setting toggling, frame waits
//!
//! On initialization the camera's attributes are translated into two groups of the
//! host settings tree, "Settable Camera Parameters" and "Read Only Camera
//! Parameters", each ordered by a configurable priority list. A grab starts the
//! acquisition on first use, waits for a frame off the async runtime and emits it
//! as `Picam` data whose dimensionality follows the active ROI.

pub mod components;
pub mod config;
#[cfg(feature = "mock")]
pub mod mock;
pub mod sdk;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use daq_core::capabilities::{Detector, DetectorContext, InitStatus};
use daq_core::core::{DataDim, Roi};
use daq_core::data::{squeeze, DataExport};
use daq_core::driver::{Capability, DeviceComponents, DriverFactory};
use daq_core::error::DaqError;
use daq_core::limits::SHUTDOWN_TIMEOUT;
use daq_core::parameter::{normalise_name, ParamDescriptor, ParamPath, ParamValue};
use daq_core::settings::SettingsTree;
use futures::future::BoxFuture;
use ndarray::{ArrayD, IxDyn};
use std::sync::Arc;
use tokio::sync::Mutex;

pub use crate::config::{AcquisitionMode, ControllerStatus, PicamConfig, UnsupportedPolicy};
pub use crate::sdk::{PicamCamera, PicamSdk};

use crate::components::acquisition::AcquisitionController;
use crate::components::attributes::{
    to_attribute_value, to_param_limits, to_param_value, translate_all,
};
use crate::components::connection::PicamConnection;
use crate::components::ordering::{remove_settings, sort_by_priority};
use crate::components::roi::{read_roi, write_roi, ROI_GROUP};
use crate::components::waiter::{run_wait, CancelToken, FrameWaiter, WaitOutcome};

pub const SETTABLE_GROUP_TITLE: &str = "Settable Camera Parameters";
pub const READ_ONLY_GROUP_TITLE: &str = "Read Only Camera Parameters";
pub const CONTROLLER_STATUS: &str = "controller_status";
pub const CONTROLLER_ID: &str = "controller_id";
pub const SERIAL_NUMBER: &str = "serial_number";

/// Name of every data export of this driver.
pub const EXPORT_NAME: &str = "Picam";

pub fn settable_group() -> ParamPath {
    ParamPath::new([normalise_name(SETTABLE_GROUP_TITLE)])
}

pub fn read_only_group() -> ParamPath {
    ParamPath::new([normalise_name(READ_ONLY_GROUP_TITLE)])
}

fn export(dim: DataDim, array: ArrayD<f64>) -> DataExport {
    DataExport::new(EXPORT_NAME, dim, vec![array]).with_labels([format!("{}_{}", EXPORT_NAME, dim)])
}

#[derive(Default)]
struct PicamState {
    connection: Option<PicamConnection>,
    acquisition: AcquisitionController,
    /// Shape the viewer was last prepared for
    data_dim: Option<DataDim>,
    /// Streaming mode only
    waiter: Option<FrameWaiter>,
}

impl PicamState {
    fn camera(&self) -> Option<Arc<dyn PicamCamera>> {
        self.connection.as_ref().map(|c| c.camera())
    }

    fn viewer_dim(&self) -> DataDim {
        self.data_dim.unwrap_or(DataDim::Data2D)
    }
}

/// Driver for picam cameras.
pub struct PicamDriver {
    name: String,
    config: PicamConfig,
    sdk: Arc<dyn PicamSdk>,
    shared_controller: Option<Arc<dyn PicamCamera>>,
    ctx: DetectorContext,
    state: Mutex<PicamState>,
    pending_wait: parking_lot::Mutex<Option<CancelToken>>,
}

impl PicamDriver {
    /// Create the driver and publish the controller parameters at the tree root.
    ///
    /// No camera is opened until [`Detector::initialize`].
    pub fn new(
        name: impl Into<String>,
        config: PicamConfig,
        sdk: Arc<dyn PicamSdk>,
        ctx: DetectorContext,
    ) -> Result<Self> {
        config.validate()?;
        let serials: Vec<String> = sdk
            .list_cameras()?
            .into_iter()
            .map(|id| id.serial_number)
            .collect();
        let selected = config
            .serial_number
            .clone()
            .or_else(|| serials.first().cloned())
            .unwrap_or_default();

        let root = ParamPath::root();
        let tree = ctx.settings.as_ref();
        tree.add_child(
            &root,
            ParamDescriptor::list(
                "Controller Status",
                config.controller_status.as_str(),
                vec![
                    ControllerStatus::Master.as_str().to_string(),
                    ControllerStatus::Slave.as_str().to_string(),
                ],
            ),
        )?;
        tree.add_child(&root, ParamDescriptor::string("Controller ID", "").read_only())?;
        tree.add_child(&root, ParamDescriptor::list("Serial Number", selected, serials))?;

        Ok(Self {
            name: name.into(),
            config,
            sdk,
            shared_controller: None,
            ctx,
            state: Mutex::new(PicamState::default()),
            pending_wait: parking_lot::Mutex::new(None),
        })
    }

    /// Camera opened by another instance, used when this one is a slave.
    pub fn with_shared_controller(mut self, camera: Arc<dyn PicamCamera>) -> Self {
        self.shared_controller = Some(camera);
        self
    }

    pub fn config(&self) -> &PicamConfig {
        &self.config
    }

    /// Handle of the open camera, for sharing with slave instances.
    pub async fn controller(&self) -> Option<Arc<dyn PicamCamera>> {
        self.state.lock().await.camera()
    }

    pub async fn is_acquiring(&self) -> bool {
        self.state.lock().await.acquisition.is_acquiring()
    }

    /// Cancel the wait of an in-flight grab. The grab returns without emitting.
    pub fn cancel_wait(&self) {
        if let Some(cancel) = self.pending_wait.lock().take() {
            tracing::debug!("cancelling pending frame wait");
            cancel.cancel();
        }
    }

    fn tree(&self) -> &dyn SettingsTree {
        self.ctx.settings.as_ref()
    }

    fn role(&self) -> ControllerStatus {
        self.tree()
            .value(&ParamPath::new([CONTROLLER_STATUS]))
            .and_then(|v| v.as_str().and_then(ControllerStatus::from_label))
            .unwrap_or(self.config.controller_status)
    }

    fn selected_serial(&self) -> Option<String> {
        self.tree()
            .value(&ParamPath::new([SERIAL_NUMBER]))
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty())
            .or_else(|| self.config.serial_number.clone())
    }

    async fn try_initialize(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.connection.is_some() {
            return Err(DaqError::InvalidState("Camera already initialised".into()).into());
        }
        let role = self.role();
        let serial = self.selected_serial();
        let sdk = self.sdk.clone();
        let shared = self.shared_controller.clone();
        let mut connection = tokio::task::spawn_blocking(move || {
            PicamConnection::open(sdk.as_ref(), serial.as_deref(), role, shared)
        })
        .await??;

        if let Err(e) = self.populate(&connection, &mut state) {
            self.remove_groups();
            state.waiter = None;
            state.data_dim = None;
            if let Err(close_err) = connection.close() {
                tracing::warn!(error = %close_err, "failed to release camera after init error");
            }
            return Err(e);
        }
        state.connection = Some(connection);
        Ok(())
    }

    fn populate(&self, connection: &PicamConnection, state: &mut PicamState) -> Result<()> {
        let camera = connection.camera();
        let info = connection.device_info()?;
        tracing::info!(
            model = %info.model,
            serial = %info.serial_number,
            sensor = %info.sensor_name,
            role = connection.role().as_str(),
            "picam camera connected"
        );
        self.tree().set_value(
            &ParamPath::new([CONTROLLER_ID]),
            ParamValue::Str(info.model.clone()),
        )?;

        let descriptors = translate_all(
            &camera.attributes()?,
            self.config.unsupported_attributes,
            &self.config.hidden_attributes,
        )?;
        let descriptors = remove_settings(descriptors, &self.config.hidden_attributes);
        let (read_only, settable): (Vec<_>, Vec<_>) =
            descriptors.into_iter().partition(|d| d.read_only);
        tracing::debug!(
            settable = settable.len(),
            read_only = read_only.len(),
            "camera attributes translated"
        );

        let root = ParamPath::root();
        self.tree().add_child(
            &root,
            ParamDescriptor::group(
                SETTABLE_GROUP_TITLE,
                sort_by_priority(settable, &self.config.settable_priority),
            ),
        )?;
        self.tree().add_child(
            &root,
            ParamDescriptor::group(
                READ_ONLY_GROUP_TITLE,
                sort_by_priority(read_only, &self.config.read_only_priority),
            ),
        )?;

        self.prepare_view(&camera.roi()?, state);

        if self.config.acquisition_mode == AcquisitionMode::Streaming {
            state.waiter = Some(FrameWaiter::spawn()?);
        }
        Ok(())
    }

    fn remove_groups(&self) {
        for group in [settable_group(), read_only_group()] {
            if self.tree().contains(&group) {
                if let Err(e) = self.tree().remove_child(&group) {
                    tracing::warn!(group = %group, error = %e, "failed to remove settings group");
                }
            }
        }
    }

    /// Emit a zero array of the ROI-derived shape when the dimensionality changed.
    fn prepare_view(&self, roi: &Roi, state: &mut PicamState) {
        let dim = roi.data_dim();
        if dim == state.viewer_dim() {
            state.data_dim = Some(dim);
            return;
        }
        let (rows, cols) = roi.data_shape();
        let zeros = squeeze(ArrayD::zeros(IxDyn(&[rows, cols])));
        tracing::debug!(dim = %dim, rows, cols, "preparing viewer");
        state.data_dim = Some(dim);
        self.ctx.data.emit_data_temp(vec![export(dim, zeros)]);
    }

    /// Refresh limits and values of both groups from the camera.
    fn update_all_settings(&self, camera: &dyn PicamCamera) -> Result<()> {
        let attributes = camera.attributes()?;
        for group in [settable_group(), read_only_group()] {
            for child in self.tree().children(&group) {
                let path = group.child(child.name.as_str());
                if child.name == ROI_GROUP && child.is_group() {
                    write_roi(self.tree(), &path, &camera.roi()?)?;
                    continue;
                }
                let Some(attr) = attributes
                    .iter()
                    .find(|a| normalise_name(&a.name) == child.name)
                else {
                    continue;
                };
                if let Some(limits) = to_param_limits(attr) {
                    self.tree().set_limits(&path, limits)?;
                }
                if let Some(value) = to_param_value(attr) {
                    if child.value().as_ref() != Some(&value) {
                        self.tree().set_value(&path, value.clone())?;
                        self.ctx.info(format!("updated {}: {}", child.title, value));
                    }
                }
            }
        }
        Ok(())
    }

    fn update_rois(&self, camera: &dyn PicamCamera, state: &mut PicamState) -> Result<()> {
        if state.acquisition.is_acquiring() {
            return Err(DaqError::InvalidState("Cannot change ROI while acquiring".into()).into());
        }
        let group = settable_group().child(ROI_GROUP);
        let candidate = read_roi(self.tree(), &group)?;
        let current = camera.roi()?;
        if candidate == current {
            return Ok(());
        }

        if let Err(e) = camera.set_roi(candidate) {
            write_roi(self.tree(), &group, &current)?;
            return Err(e);
        }
        self.ctx.info(format!("Changed ROI: {}", candidate));
        self.update_all_settings(camera)?;
        camera.clear_acquisition()?;
        camera.commit_parameters()?;
        camera.setup_acquisition()?;
        self.prepare_view(&candidate, state);
        Ok(())
    }

    fn update_setting(
        &self,
        camera: &dyn PicamCamera,
        state: &PicamState,
        path: &ParamPath,
    ) -> Result<()> {
        let Some(key) = path.name() else {
            return Ok(());
        };
        let Some(attr) = camera
            .attributes()?
            .into_iter()
            .find(|a| normalise_name(&a.name) == key)
        else {
            return Err(DaqError::ParameterNotFound(path.to_string()).into());
        };
        if !attr.writable {
            return Ok(());
        }
        if state.acquisition.is_acquiring() && !attr.can_set_online {
            return Err(DaqError::InvalidState(format!(
                "Cannot change {} while acquiring",
                attr.name
            ))
            .into());
        }
        let value = self
            .tree()
            .value(path)
            .ok_or_else(|| DaqError::ParameterNotFound(path.to_string()))?;
        if to_param_value(&attr).as_ref() == Some(&value) {
            return Ok(());
        }

        camera.set_attribute_value(&attr.name, to_attribute_value(&attr, &value)?, true)?;
        self.ctx.info(format!("Changed {}: {}", attr.name, value));
        self.update_all_settings(camera)
    }
}

#[async_trait]
impl Detector for PicamDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> InitStatus {
        match self.try_initialize().await {
            Ok(()) => {
                tracing::info!(driver = %self.name, "picam driver initialised");
                InitStatus::ok("Initialised camera")
            }
            Err(e) => {
                let info = format!("{:#}", e);
                tracing::warn!(driver = %self.name, error = %info, "picam initialization failed");
                self.ctx.log(info.clone());
                InitStatus::failed(info)
            }
        }
    }

    async fn commit_setting(&self, path: &ParamPath) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(camera) = state.camera() else {
            if matches!(path.name(), Some(CONTROLLER_STATUS | SERIAL_NUMBER)) {
                return Ok(());
            }
            return Err(DaqError::NotInitialized(self.name.clone()).into());
        };

        if path.parent_name() == Some(ROI_GROUP) {
            self.update_rois(camera.as_ref(), &mut state)
        } else if path.parent().as_ref() == Some(&settable_group()) {
            self.update_setting(camera.as_ref(), &state, path)
        } else {
            if matches!(path.name(), Some(CONTROLLER_STATUS | SERIAL_NUMBER)) {
                tracing::debug!(path = %path, "controller setting applies on next initialization");
            }
            Ok(())
        }
    }

    async fn grab(&self, naverage: u32) -> Result<()> {
        let (camera, dim, client, cancel) = {
            let mut state = self.state.lock().await;
            let camera = state
                .camera()
                .ok_or_else(|| DaqError::NotInitialized(self.name.clone()))?;
            if !state.acquisition.is_acquiring() {
                state
                    .acquisition
                    .start(camera.as_ref(), self.tree(), &settable_group())?;
                tracing::info!(driver = %self.name, "picam acquisition started");
            }
            let client = state.waiter.as_ref().and_then(|w| w.client());
            // Registered under the state lock so a concurrent stop always sees it.
            let cancel = CancelToken::new();
            *self.pending_wait.lock() = Some(cancel.clone());
            (camera, state.viewer_dim(), client, cancel)
        };
        if naverage > 1 {
            tracing::debug!(naverage, "averaging is left to the host, emitting single frames");
        }

        let timeout = self.config.frame_timeout;
        let poll = self.config.wait_poll_interval;
        let outcome = match client {
            Some(client) => client
                .request(camera.clone(), timeout, poll, cancel.clone())?
                .await
                .unwrap_or(WaitOutcome::Cancelled),
            None => {
                let camera = camera.clone();
                let cancel = cancel.clone();
                tokio::task::spawn_blocking(move || {
                    run_wait(camera.as_ref(), timeout, poll, &cancel)
                })
                .await?
            }
        };
        self.pending_wait.lock().take();

        match outcome {
            WaitOutcome::Ready => {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                let frame = match self.config.acquisition_mode {
                    AcquisitionMode::Snapshot => camera.read_oldest_image()?,
                    AcquisitionMode::Streaming => camera.read_newest_image()?,
                };
                let frame = frame.ok_or_else(|| anyhow!("frame reported ready but buffer is empty"))?;
                tracing::debug!(width = frame.width, height = frame.height, "frame read");
                let array = frame.to_squeezed_array()?;
                self.ctx.data.emit_data(vec![export(dim, array)]);
            }
            WaitOutcome::TimedOut => {
                tracing::warn!(timeout = ?timeout, "no frame before timeout");
                self.ctx.log(format!("Timed out waiting for a frame after {:?}", timeout));
            }
            WaitOutcome::Failed(message) => {
                tracing::warn!(error = %message, "frame wait failed");
                self.ctx.log(format!("Frame wait failed: {}", message));
            }
            WaitOutcome::Cancelled => {
                tracing::debug!("frame wait cancelled, nothing emitted");
            }
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.cancel_wait();
        let mut state = self.state.lock().await;
        self.cancel_wait();
        let Some(camera) = state.camera() else {
            return Ok(());
        };
        if state.acquisition.stop(camera.as_ref(), self.tree())? {
            tracing::info!(driver = %self.name, "picam acquisition stopped");
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.cancel_wait();
        let mut state = self.state.lock().await;
        self.cancel_wait();
        let Some(mut connection) = state.connection.take() else {
            return Ok(());
        };
        let camera = connection.camera();
        if let Err(e) = state.acquisition.stop(camera.as_ref(), self.tree()) {
            tracing::warn!(error = %e, "failed to stop acquisition on close");
        }
        state.acquisition.reset(self.tree());

        if let Some(mut waiter) = state.waiter.take() {
            let joined = tokio::time::timeout(
                SHUTDOWN_TIMEOUT,
                tokio::task::spawn_blocking(move || waiter.shutdown()),
            )
            .await;
            if joined.is_err() {
                tracing::warn!(timeout = ?SHUTDOWN_TIMEOUT, "frame wait worker did not stop in time");
            }
        }

        let closed = tokio::task::spawn_blocking(move || connection.close()).await?;
        self.remove_groups();
        state.data_dim = None;
        closed?;
        tracing::info!(driver = %self.name, "picam driver closed");
        Ok(())
    }
}

/// Factory for [`PicamDriver`].
#[derive(Default)]
pub struct PicamFactory {
    sdk: Option<Arc<dyn PicamSdk>>,
}

static PICAM_CAPABILITIES: &[Capability] = &[Capability::FrameProducer, Capability::Parameterized];

impl PicamFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every driver against `sdk` instead of the default backend.
    pub fn with_sdk(sdk: Arc<dyn PicamSdk>) -> Self {
        Self { sdk: Some(sdk) }
    }

    fn sdk(&self) -> Result<Arc<dyn PicamSdk>> {
        match &self.sdk {
            Some(sdk) => Ok(sdk.clone()),
            None => default_sdk(),
        }
    }
}

#[cfg(feature = "mock")]
fn default_sdk() -> Result<Arc<dyn PicamSdk>> {
    tracing::warn!("no picam backend configured, using the mock camera");
    Ok(Arc::new(mock::MockPicamSdk::with_camera(
        mock::MockPicamCamera::builder().build(),
    )))
}

#[cfg(not(feature = "mock"))]
fn default_sdk() -> Result<Arc<dyn PicamSdk>> {
    Err(anyhow!(
        "no picam backend available; pass one with PicamFactory::with_sdk or enable the `mock` feature"
    ))
}

impl DriverFactory for PicamFactory {
    fn driver_type(&self) -> &'static str {
        "picam"
    }

    fn name(&self) -> &'static str {
        "Princeton Instruments picam camera"
    }

    fn capabilities(&self) -> &'static [Capability] {
        PICAM_CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: PicamConfig = config.clone().try_into()?;
        cfg.validate()?;
        Ok(())
    }

    fn build(
        &self,
        config: toml::Value,
        context: DetectorContext,
    ) -> BoxFuture<'static, Result<DeviceComponents>> {
        let sdk = self.sdk();
        Box::pin(async move {
            let cfg: PicamConfig = config.try_into()?;
            let driver = PicamDriver::new(EXPORT_NAME, cfg, sdk?, context)?;
            Ok(DeviceComponents::new(Arc::new(driver)))
        })
    }
}
