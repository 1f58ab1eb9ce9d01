//! Princeton Instruments LightField driver
//!
//! Drives a pump-probe spectroscopy experiment running in LightField. Each grab
//! captures `2 x kc_pairs` frames, splits them into pump-on/pump-off columns and
//! emits two spectra, `TA` (transient absorption, mOD) and `I_avg` (mean counts).
//!
//! The shutter is closed whenever the session opens and when LightField closes.

pub mod automation;
pub mod config;
#[cfg(feature = "mock")]
pub mod mock;
pub mod spectra;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use daq_core::capabilities::{Detector, DetectorContext, InitStatus, ShutterControl};
use daq_core::core::DataDim;
use daq_core::data::{DataAxis, DataExport};
use daq_core::driver::{Capability, DeviceComponents, DriverFactory};
use daq_core::error::{DaqError, DriverError, DriverErrorKind};
use daq_core::parameter::{ParamDescriptor, ParamPath, ParamValue};
use daq_core::settings::SettingsTree;
use futures::future::BoxFuture;
use ndarray::{Array1, ArrayD};
use std::sync::Arc;
use tokio::sync::Mutex;

pub use crate::automation::{LightFieldAutomation, LightFieldLauncher, LightFieldSession};
pub use crate::config::LightFieldConfig;

pub const PARAMS_GROUP_TITLE: &str = "Lightfield Params";
pub const CAMERA_SHUTTER: &str = "camera_shutter";
pub const KC_PAIRS: &str = "kc_pairs";

pub const EXPORT_NAME: &str = "Spectra";
pub const LABELS: [&str; 2] = ["TA", "I_avg"];

pub fn params_group() -> ParamPath {
    ParamPath::new(["lightfield_params"])
}

fn spectra_export(ta: Array1<f64>, i_avg: Array1<f64>, axis: &DataAxis) -> DataExport {
    let arrays: Vec<ArrayD<f64>> = vec![ta.into_dyn(), i_avg.into_dyn()];
    DataExport::new(EXPORT_NAME, DataDim::Data1D, arrays)
        .with_labels(LABELS)
        .with_x_axis(axis.clone())
}

/// Driver for a LightField pump-probe experiment.
pub struct LightFieldDriver {
    name: String,
    config: LightFieldConfig,
    launcher: Arc<dyn LightFieldLauncher>,
    ctx: DetectorContext,
    x_axis: DataAxis,
    session: Mutex<Option<Arc<LightFieldSession>>>,
    /// Held by the blocking capture until it returns, even past `capture_timeout`.
    capture: Arc<Mutex<()>>,
}

impl LightFieldDriver {
    pub fn new(
        name: impl Into<String>,
        config: LightFieldConfig,
        launcher: Arc<dyn LightFieldLauncher>,
        ctx: DetectorContext,
    ) -> Result<Self> {
        config.validate()?;
        let group = ParamDescriptor::group(
            PARAMS_GROUP_TITLE,
            vec![
                ParamDescriptor::boolean("Camera Shutter", false),
                ParamDescriptor::int(
                    "Number of pairs of spectra",
                    i64::from(config.kc_pairs),
                    Some((1, i64::from(u32::MAX))),
                )
                .with_name(KC_PAIRS),
            ],
        );
        ctx.settings.add_child(&ParamPath::root(), group)?;
        let x_axis = DataAxis::pixel_index(config.pixel_count);
        Ok(Self {
            name: name.into(),
            config,
            launcher,
            ctx,
            x_axis,
            session: Mutex::new(None),
            capture: Arc::new(Mutex::new(())),
        })
    }

    fn tree(&self) -> &dyn SettingsTree {
        self.ctx.settings.as_ref()
    }

    async fn session(&self) -> Result<Arc<LightFieldSession>> {
        self.session
            .lock()
            .await
            .clone()
            .ok_or_else(|| DaqError::NotInitialized(self.name.clone()).into())
    }

    fn axis_for(&self, pixels: usize) -> DataAxis {
        if pixels == self.x_axis.data.len() {
            self.x_axis.clone()
        } else {
            DataAxis::pixel_index(pixels)
        }
    }

    fn kc_pairs(&self) -> usize {
        self.tree()
            .value(&params_group().child(KC_PAIRS))
            .and_then(|v| v.as_i64())
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(self.config.kc_pairs as usize)
    }

    async fn try_initialize(&self) -> Result<Option<String>> {
        let mut slot = self.session.lock().await;
        if slot.is_some() {
            return Err(DaqError::InvalidState("LightField already initialised".into()).into());
        }
        let launcher = self.launcher.clone();
        let required = self.config.required_experiment.clone();
        let session = tokio::task::spawn_blocking(move || {
            LightFieldSession::open(launcher.as_ref(), required)
        })
        .await??;
        let session = Arc::new(session);
        *slot = Some(session.clone());
        drop(slot);

        self.tree().set_value(
            &params_group().child(CAMERA_SHUTTER),
            ParamValue::Bool(false),
        )?;

        let zeros = Array1::<f64>::zeros(self.config.pixel_count);
        self.ctx
            .data
            .emit_data_temp(vec![spectra_export(zeros.clone(), zeros, &self.x_axis)]);

        if let Some(reason) = session.readiness_error()? {
            return Ok(Some(reason));
        }
        session.set_frame_count(2 * self.kc_pairs())?;
        tracing::info!(
            experiment = %session.experiment_name()?,
            frames = session.frame_count()?,
            "LightField experiment ready"
        );
        Ok(None)
    }

    /// LightField's closing event: close the shutter and release the session.
    pub async fn application_closing(&self) -> Result<()> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || session.application_closing()).await?
    }
}

#[async_trait]
impl Detector for LightFieldDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> InitStatus {
        match self.try_initialize().await {
            Ok(None) => InitStatus::ok(""),
            Ok(Some(reason)) => {
                tracing::warn!(driver = %self.name, reason = %reason, "LightField not ready");
                self.ctx.log(reason.clone());
                InitStatus::failed(reason)
            }
            Err(e) => {
                let info = format!("{:#}", e);
                tracing::warn!(driver = %self.name, error = %info, "LightField initialization failed");
                self.ctx.log(info.clone());
                InitStatus::failed(info)
            }
        }
    }

    async fn commit_setting(&self, path: &ParamPath) -> Result<()> {
        if path.parent().as_ref() != Some(&params_group()) {
            return Ok(());
        }
        let session = self.session().await?;
        let value = self
            .tree()
            .value(path)
            .ok_or_else(|| DaqError::ParameterNotFound(path.to_string()))?;
        match path.name() {
            Some(CAMERA_SHUTTER) => {
                let open = value.as_bool().ok_or_else(|| anyhow!("{} is not a bool", path))?;
                session.open_shutter(open)?;
                tracing::info!(open, "camera shutter changed");
            }
            Some(KC_PAIRS) => {
                let pairs = value
                    .as_i64()
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(|| anyhow!("{} is not a pair count", path))?;
                session.set_frame_count(2 * pairs)?;
                tracing::info!(pairs, frames = 2 * pairs, "frames to store changed");
            }
            _ => {}
        }
        Ok(())
    }

    async fn grab(&self, naverage: u32) -> Result<()> {
        let session = self.session().await?;
        if naverage > 1 {
            tracing::debug!(naverage, "each capture already averages kc_pairs pairs");
        }
        let in_flight = self.capture.clone().try_lock_owned().map_err(|_| {
            DaqError::InvalidState("previous LightField capture is still running".into())
        })?;
        let capture = tokio::time::timeout(
            self.config.capture_timeout,
            tokio::task::spawn_blocking(move || {
                let _in_flight = in_flight;
                session.capture_spectra()
            }),
        )
        .await
        .map_err(|_| {
            DaqError::from(DriverError::new(
                "lightfield",
                DriverErrorKind::Timeout,
                format!(
                    "capture did not finish within {:?}",
                    self.config.capture_timeout
                ),
            ))
        })?;

        let image = match capture? {
            Ok(image) => image,
            Err(e) => {
                self.ctx.log(format!("{:#}", e));
                return Err(e);
            }
        };
        tracing::debug!(pixels = image.nrows(), frames = image.ncols(), "capture done");
        if image.nrows() != self.config.pixel_count {
            tracing::debug!(
                configured = self.config.pixel_count,
                captured = image.nrows(),
                "capture width differs from pixel_count"
            );
        }
        let axis = self.axis_for(image.nrows());
        let reduced = spectra::reduce(&image)?;
        self.ctx.data.emit_data(vec![spectra_export(
            reduced.transient_absorption,
            reduced.average_intensity,
            &axis,
        )]);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.ctx.info("Lightfield plugin stopped");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || session.close()).await??;
        tracing::info!(driver = %self.name, "LightField driver closed");
        Ok(())
    }
}

#[async_trait]
impl ShutterControl for LightFieldDriver {
    async fn open_shutter(&self) -> Result<()> {
        self.session().await?.open_shutter(true)?;
        self.tree()
            .set_value(&params_group().child(CAMERA_SHUTTER), ParamValue::Bool(true))?;
        Ok(())
    }

    async fn close_shutter(&self) -> Result<()> {
        self.session().await?.open_shutter(false)?;
        self.tree()
            .set_value(&params_group().child(CAMERA_SHUTTER), ParamValue::Bool(false))?;
        Ok(())
    }

    async fn is_shutter_open(&self) -> Result<bool> {
        self.session().await?.is_shutter_open()
    }
}

/// Factory for [`LightFieldDriver`].
#[derive(Default)]
pub struct LightFieldFactory {
    launcher: Option<Arc<dyn LightFieldLauncher>>,
}

static LIGHTFIELD_CAPABILITIES: &[Capability] = &[
    Capability::SpectrumProducer,
    Capability::Parameterized,
    Capability::ShutterControl,
];

impl LightFieldFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_launcher(launcher: Arc<dyn LightFieldLauncher>) -> Self {
        Self {
            launcher: Some(launcher),
        }
    }

    fn launcher(&self) -> Result<Arc<dyn LightFieldLauncher>> {
        match &self.launcher {
            Some(launcher) => Ok(launcher.clone()),
            None => default_launcher(),
        }
    }
}

#[cfg(feature = "mock")]
fn default_launcher() -> Result<Arc<dyn LightFieldLauncher>> {
    tracing::warn!("no LightField bridge configured, using the mock experiment");
    Ok(Arc::new(mock::MockLauncher::new(
        mock::MockLightField::builder().build(),
    )))
}

#[cfg(not(feature = "mock"))]
fn default_launcher() -> Result<Arc<dyn LightFieldLauncher>> {
    Err(anyhow!(
        "no LightField bridge available; pass one with LightFieldFactory::with_launcher or enable the `mock` feature"
    ))
}

impl DriverFactory for LightFieldFactory {
    fn driver_type(&self) -> &'static str {
        "lightfield"
    }

    fn name(&self) -> &'static str {
        "Princeton Instruments LightField"
    }

    fn capabilities(&self) -> &'static [Capability] {
        LIGHTFIELD_CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: LightFieldConfig = config.clone().try_into()?;
        cfg.validate()?;
        Ok(())
    }

    fn build(
        &self,
        config: toml::Value,
        context: DetectorContext,
    ) -> BoxFuture<'static, Result<DeviceComponents>> {
        let launcher = self.launcher();
        Box::pin(async move {
            let cfg: LightFieldConfig = config.try_into()?;
            let driver = Arc::new(LightFieldDriver::new("Lightfield", cfg, launcher?, context)?);
            Ok(DeviceComponents::new(driver.clone()).with_shutter(driver))
        })
    }
}
