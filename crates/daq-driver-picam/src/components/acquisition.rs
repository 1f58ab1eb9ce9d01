//! Acquisition state and online-setting toggling.
//!
//! While the camera acquires, only attributes the vendor marks as settable online
//! stay editable. Everything else in the settable group is disabled on start and
//! re-enabled on stop. The ROI group is always disabled while acquiring.

use crate::components::roi::ROI_GROUP;
use crate::sdk::PicamCamera;
use anyhow::{bail, Result};
use daq_core::parameter::{normalise_name, ParamPath};
use daq_core::settings::SettingsTree;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Acquiring,
}

#[derive(Debug, Default)]
pub struct AcquisitionController {
    state: AcquisitionState,
    /// Paths disabled by the running acquisition
    disabled: Vec<ParamPath>,
}

impl AcquisitionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn is_acquiring(&self) -> bool {
        self.state == AcquisitionState::Acquiring
    }

    pub fn disabled_paths(&self) -> &[ParamPath] {
        &self.disabled
    }

    /// Lock offline settings and start the camera.
    pub fn start(
        &mut self,
        camera: &dyn PicamCamera,
        tree: &dyn SettingsTree,
        settable_group: &ParamPath,
    ) -> Result<()> {
        if self.is_acquiring() {
            bail!("Acquisition already running");
        }
        self.disable_offline(camera, tree, settable_group)?;

        let started = camera
            .clear_acquisition()
            .and_then(|_| camera.start_acquisition());
        if let Err(e) = started {
            self.enable_all(tree);
            return Err(e);
        }
        self.state = AcquisitionState::Acquiring;
        tracing::debug!(locked = self.disabled.len(), "acquisition started");
        Ok(())
    }

    /// Stop the camera and unlock settings. Returns `false` when already idle.
    pub fn stop(&mut self, camera: &dyn PicamCamera, tree: &dyn SettingsTree) -> Result<bool> {
        if !self.is_acquiring() {
            return Ok(false);
        }
        let stopped = camera
            .stop_acquisition()
            .and_then(|_| camera.clear_acquisition());
        self.enable_all(tree);
        self.state = AcquisitionState::Idle;
        stopped?;
        tracing::debug!("acquisition stopped");
        Ok(true)
    }

    /// Forget all state without touching the camera (camera already closed).
    pub fn reset(&mut self, tree: &dyn SettingsTree) {
        self.enable_all(tree);
        self.state = AcquisitionState::Idle;
    }

    fn disable_offline(
        &mut self,
        camera: &dyn PicamCamera,
        tree: &dyn SettingsTree,
        settable_group: &ParamPath,
    ) -> Result<()> {
        let online: HashSet<String> = camera
            .attributes()?
            .into_iter()
            .filter(|a| a.can_set_online)
            .map(|a| normalise_name(&a.name))
            .collect();

        for child in tree.children(settable_group) {
            let path = settable_group.child(child.name.as_str());
            if child.name == ROI_GROUP {
                for field in child.children() {
                    self.disable(tree, path.child(field.name.as_str()));
                }
                self.disable(tree, path);
            } else if !online.contains(&child.name) {
                self.disable(tree, path);
            }
        }
        Ok(())
    }

    fn disable(&mut self, tree: &dyn SettingsTree, path: ParamPath) {
        if tree.get(&path).is_some_and(|d| !d.enabled) {
            return;
        }
        match tree.set_enabled(&path, false) {
            Ok(()) => self.disabled.push(path),
            Err(e) => tracing::warn!(path = %path, error = %e, "could not disable setting"),
        }
    }

    fn enable_all(&mut self, tree: &dyn SettingsTree) {
        for path in self.disabled.drain(..) {
            if let Err(e) = tree.set_enabled(&path, true) {
                // The group may already be gone after close.
                tracing::debug!(path = %path, error = %e, "could not re-enable setting");
            }
        }
    }
}
