//! Driver Factory and Component Types
//!
//! Detector plugins implement [`DriverFactory`] and are registered with a
//! [`DriverRegistry`] at startup via explicit `registry.register(factory)` calls.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 Composition Root (main.rs)               │
//! │  registry.register(PicamFactory);                        │
//! │  registry.register(LightFieldFactory);                   │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                     DriverRegistry                       │
//! │  factories: BTreeMap<driver_type, Box<dyn DriverFactory>> │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │          DriverFactory::build(config, context)           │
//! │  Parses TOML config, instantiates driver, returns parts  │
//! └──────────────────────────────────────────────────────────┘
//! ```

use crate::capabilities::{Detector, DetectorContext, ShutterControl};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Capability Enum (Runtime Introspection)
// =============================================================================

/// Runtime capability flags for device introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Produces 2D image frames (cameras)
    FrameProducer,

    /// Produces 1D spectra
    SpectrumProducer,

    /// Publishes its settings into the host tree
    /// Corresponds to [`crate::settings::SettingsTree`] usage
    Parameterized,

    /// Has shutter control
    /// Corresponds to [`crate::capabilities::ShutterControl`]
    ShutterControl,
}

impl Capability {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::FrameProducer => "Frame Producer",
            Self::SpectrumProducer => "Spectrum Producer",
            Self::Parameterized => "Parameterized",
            Self::ShutterControl => "Shutter Control",
        }
    }
}

// =============================================================================
// Device Components (Capability Bag)
// =============================================================================

/// Container for the trait objects returned by a factory.
#[derive(Clone)]
pub struct DeviceComponents {
    pub detector: Arc<dyn Detector>,
    pub shutter: Option<Arc<dyn ShutterControl>>,
}

impl DeviceComponents {
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self {
            detector,
            shutter: None,
        }
    }

    pub fn with_shutter(mut self, shutter: Arc<dyn ShutterControl>) -> Self {
        self.shutter = Some(shutter);
        self
    }
}

// =============================================================================
// DriverFactory Trait
// =============================================================================

/// Plugin entry point for one driver type.
pub trait DriverFactory: Send + Sync + 'static {
    /// Driver type name used in the TOML config `type` field.
    fn driver_type(&self) -> &'static str;

    /// Human-readable name for documentation and error messages.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    /// Validate configuration without instantiating.
    fn validate(&self, config: &toml::Value) -> Result<()>;

    /// Async instantiation of the driver against the given host collaborators.
    ///
    /// Building does not touch hardware; the host calls
    /// [`Detector::initialize`] afterwards.
    fn build(
        &self,
        config: toml::Value,
        context: DetectorContext,
    ) -> BoxFuture<'static, Result<DeviceComponents>>;
}

// =============================================================================
// Registry
// =============================================================================

/// Factories keyed by driver type.
#[derive(Default)]
pub struct DriverRegistry {
    factories: BTreeMap<&'static str, Box<dyn DriverFactory>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. A later registration for the same type replaces the earlier one.
    pub fn register(&mut self, factory: impl DriverFactory) {
        let driver_type = factory.driver_type();
        if self.factories.insert(driver_type, Box::new(factory)).is_some() {
            tracing::warn!(driver_type, "replacing previously registered driver factory");
        }
    }

    pub fn get(&self, driver_type: &str) -> Option<&dyn DriverFactory> {
        self.factories.get(driver_type).map(|f| f.as_ref())
    }

    pub fn driver_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn factories(&self) -> impl Iterator<Item = &dyn DriverFactory> + '_ {
        self.factories.values().map(|f| f.as_ref())
    }

    /// Validate then build a driver of `driver_type`.
    pub async fn build(
        &self,
        driver_type: &str,
        config: toml::Value,
        context: DetectorContext,
    ) -> Result<DeviceComponents> {
        let factory = self
            .get(driver_type)
            .ok_or_else(|| anyhow!("unknown driver type '{}'", driver_type))?;
        factory.validate(&config)?;
        tracing::info!(driver_type, name = factory.name(), "building driver");
        factory.build(config, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::InitStatus;
    use crate::events::EventHub;
    use crate::parameter::ParamPath;
    use crate::settings::MemorySettingsTree;
    use async_trait::async_trait;

    struct NullDetector;

    #[async_trait]
    impl Detector for NullDetector {
        fn name(&self) -> &str {
            "null"
        }
        async fn initialize(&self) -> InitStatus {
            InitStatus::ok("ready")
        }
        async fn commit_setting(&self, _path: &ParamPath) -> Result<()> {
            Ok(())
        }
        async fn grab(&self, _naverage: u32) -> Result<()> {
            Ok(())
        }
        async fn stop(&self) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct NullFactory;

    impl DriverFactory for NullFactory {
        fn driver_type(&self) -> &'static str {
            "null"
        }
        fn name(&self) -> &'static str {
            "Null Detector"
        }
        fn validate(&self, config: &toml::Value) -> Result<()> {
            if config.get("broken").is_some() {
                anyhow::bail!("broken config");
            }
            Ok(())
        }
        fn build(
            &self,
            _config: toml::Value,
            _context: DetectorContext,
        ) -> BoxFuture<'static, Result<DeviceComponents>> {
            Box::pin(async { Ok(DeviceComponents::new(Arc::new(NullDetector))) })
        }
    }

    fn context() -> DetectorContext {
        let hub = Arc::new(EventHub::new());
        DetectorContext::new(Arc::new(MemorySettingsTree::new()), hub.clone(), hub)
    }

    #[tokio::test]
    async fn registry_builds_known_types() {
        let mut registry = DriverRegistry::new();
        registry.register(NullFactory);
        assert_eq!(registry.driver_types().collect::<Vec<_>>(), vec!["null"]);

        let parts = registry
            .build("null", toml::Value::Table(Default::default()), context())
            .await
            .unwrap();
        assert!(parts.detector.initialize().await.initialized);
    }

    #[tokio::test]
    async fn registry_rejects_unknown_and_invalid() {
        let mut registry = DriverRegistry::new();
        registry.register(NullFactory);
        assert!(registry
            .build("missing", toml::Value::Table(Default::default()), context())
            .await
            .is_err());

        let mut table = toml::map::Map::new();
        table.insert("broken".into(), toml::Value::Boolean(true));
        assert!(registry
            .build("null", toml::Value::Table(table), context())
            .await
            .is_err());
    }
}
