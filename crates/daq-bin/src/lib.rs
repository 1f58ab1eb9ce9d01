//! Library half of the `pi-daq` binary: configuration loading and the
//! registry-driven acquisition run, shared by `main.rs` and the integration tests.

pub mod config;
pub mod runner;

pub use config::{DetectorConfig, Settings};
pub use runner::{describe, registry, run_detector, DetectorRun};
