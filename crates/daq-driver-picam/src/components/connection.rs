//! Picam connection management
//!
//! A master opens its own camera through the SDK and closes it on shutdown. A
//! slave borrows a handle opened by another plugin instance and never closes it.

use crate::config::ControllerStatus;
use crate::sdk::{DeviceInfo, PicamCamera, PicamSdk};
use anyhow::{anyhow, Result};
use std::sync::Arc;

pub const NO_SHARED_CONTROLLER: &str =
    "no controller has been defined externally while this detector is a slave one";

pub struct PicamConnection {
    camera: Arc<dyn PicamCamera>,
    role: ControllerStatus,
    closed: bool,
}

impl PicamConnection {
    /// Open (master) or adopt (slave) a camera.
    ///
    /// Blocking; call from `spawn_blocking`.
    pub fn open(
        sdk: &dyn PicamSdk,
        serial_number: Option<&str>,
        role: ControllerStatus,
        shared: Option<Arc<dyn PicamCamera>>,
    ) -> Result<Self> {
        let camera = match role {
            ControllerStatus::Master => {
                tracing::info!(serial = ?serial_number, "opening picam camera");
                sdk.open(serial_number)?
            }
            ControllerStatus::Slave => shared.ok_or_else(|| anyhow!(NO_SHARED_CONTROLLER))?,
        };
        Ok(Self {
            camera,
            role,
            closed: false,
        })
    }

    pub fn camera(&self) -> Arc<dyn PicamCamera> {
        self.camera.clone()
    }

    pub fn role(&self) -> ControllerStatus {
        self.role
    }

    pub fn device_info(&self) -> Result<DeviceInfo> {
        self.camera.device_info()
    }

    /// Release the camera. Only a master closes the vendor handle; a second call
    /// does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.role {
            ControllerStatus::Master => {
                tracing::info!("closing picam camera");
                self.camera.close()
            }
            ControllerStatus::Slave => {
                tracing::debug!("slave connection released, handle left open");
                Ok(())
            }
        }
    }
}
