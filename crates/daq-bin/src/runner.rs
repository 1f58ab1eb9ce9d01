//! Builds configured detectors through the driver registry and runs them.

use crate::config::DetectorConfig;
use anyhow::{Context, Result};
use daq_core::capabilities::{DetectorContext, InitStatus};
use daq_core::driver::DriverRegistry;
use daq_core::events::{drain, DetectorEvent, EventHub};
use daq_core::settings::MemorySettingsTree;
use daq_driver_lightfield::LightFieldFactory;
use daq_driver_picam::PicamFactory;
use std::sync::Arc;

/// Registry with every detector plugin of this workspace.
pub fn registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry.register(PicamFactory::new());
    registry.register(LightFieldFactory::new());
    registry
}

/// Everything one detector did during [`run_detector`].
#[derive(Debug)]
pub struct DetectorRun {
    pub id: String,
    pub init: InitStatus,
    /// Grabs that returned without error.
    pub grabs: u32,
    pub events: Vec<DetectorEvent>,
}

impl DetectorRun {
    pub fn data_events(&self) -> impl Iterator<Item = &DetectorEvent> + '_ {
        self.events
            .iter()
            .filter(|e| matches!(e, DetectorEvent::Data(_)))
    }
}

/// Build, initialise, grab `grabs` times, stop and close one detector.
///
/// Each detector gets its own settings tree and event hub. A failed
/// initialisation is reported in the returned run, not as an error.
pub async fn run_detector(
    registry: &DriverRegistry,
    config: &DetectorConfig,
    grabs: u32,
) -> Result<DetectorRun> {
    let tree = Arc::new(MemorySettingsTree::new());
    let hub = Arc::new(EventHub::new());
    let mut rx = hub.subscribe();
    let ctx = DetectorContext::new(tree, hub.clone(), hub);

    let components = registry
        .build(&config.driver_type, config.driver_config(), ctx)
        .await
        .with_context(|| format!("Failed to build detector '{}'", config.id))?;
    let detector = components.detector;

    let init = detector.initialize().await;
    let mut events = drain(&mut rx);
    let mut completed = 0;
    if init.initialized {
        tracing::info!(id = %config.id, info = %init.info, "detector initialised");
        for index in 0..grabs {
            match detector.grab(1).await {
                Ok(()) => completed += 1,
                Err(e) => {
                    tracing::warn!(id = %config.id, grab = index, error = %e, "grab failed");
                    events.extend(drain(&mut rx));
                    break;
                }
            }
            events.extend(drain(&mut rx));
        }
        detector.stop().await?;
    } else {
        tracing::warn!(id = %config.id, info = %init.info, "detector failed to initialise");
    }
    detector.close().await?;
    events.extend(drain(&mut rx));

    Ok(DetectorRun {
        id: config.id.clone(),
        init,
        grabs: completed,
        events,
    })
}

/// One line per event, as printed by `pi-daq run`.
pub fn describe(event: &DetectorEvent) -> String {
    match event {
        DetectorEvent::Status(message) => format!("[{:?}] {}", message.level, message.text),
        DetectorEvent::Data(exports) | DetectorEvent::TemporaryData(exports) => {
            let kind = if matches!(event, DetectorEvent::Data(_)) {
                "data"
            } else {
                "viewer"
            };
            exports
                .iter()
                .map(|export| {
                    format!(
                        "[{}] {} {} {:?} labels={:?}",
                        kind,
                        export.name,
                        export.dim.as_str(),
                        export.shape(),
                        export.labels
                    )
                })
                .collect::<Vec<_>>()
                .join("; ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_core::capabilities::StatusMessage;
    use daq_core::core::DataDim;
    use daq_core::data::DataExport;
    use ndarray::ArrayD;

    #[test]
    fn registry_knows_both_plugins() {
        let registry = registry();
        assert_eq!(
            registry.driver_types().collect::<Vec<_>>(),
            vec!["lightfield", "picam"]
        );
    }

    #[test]
    fn describe_events() {
        let status = DetectorEvent::Status(StatusMessage::info("Initialised camera"));
        assert_eq!(describe(&status), "[Info] Initialised camera");

        let export = DataExport::new(
            "Picam",
            DataDim::Data2D,
            vec![ArrayD::<f64>::zeros(vec![4, 8])],
        )
        .with_labels(["Picam_Data2D"]);
        let line = describe(&DetectorEvent::TemporaryData(vec![export]));
        assert!(line.starts_with("[viewer] Picam"));
        assert!(line.contains("[4, 8]"));
    }
}
