//! CLI entry point for the Princeton Instruments detector plugins.
//!
//! # Usage
//!
//! List driver types and visible cameras:
//! ```bash
//! pi-daq list
//! ```
//!
//! Initialise every configured detector, grab three times, then shut down:
//! ```bash
//! pi-daq run --config config/pi-daq.toml --grabs 3
//! ```
//!
//! Without vendor libraries both drivers run against their mock backends.

use anyhow::Result;
use clap::{Parser, Subcommand};
use daq_bin::{describe, registry, run_detector, Settings};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pi-daq")]
#[command(about = "Princeton Instruments picam and LightField detector runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered driver types and the cameras the picam backend can see
    List,

    /// Build, initialise and grab from every configured detector
    Run {
        /// Configuration file (TOML format)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of grabs per detector
        #[arg(long, default_value = "1")]
        grabs: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            init_logging("info");
            list()
        }
        Commands::Run { config, grabs } => {
            let settings = Settings::load(config.as_deref())?;
            init_logging(&settings.log_level);
            run(settings, grabs).await
        }
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn list() -> Result<()> {
    let registry = registry();
    println!("Driver types:");
    for factory in registry.factories() {
        let capabilities: Vec<_> = factory.capabilities().iter().map(|c| c.name()).collect();
        println!(
            "  {:<12} {} [{}]",
            factory.driver_type(),
            factory.name(),
            capabilities.join(", ")
        );
    }
    list_cameras()
}

#[cfg(feature = "mock")]
fn list_cameras() -> Result<()> {
    use daq_driver_picam::mock::{MockPicamCamera, MockPicamSdk};
    use daq_driver_picam::sdk::PicamSdk;

    let sdk = MockPicamSdk::with_camera(MockPicamCamera::builder().build());
    println!("Cameras (mock picam backend):");
    for camera in sdk.list_cameras()? {
        println!("  {} (serial {})", camera.model, camera.serial_number);
    }
    Ok(())
}

#[cfg(not(feature = "mock"))]
fn list_cameras() -> Result<()> {
    println!("Cameras: no picam backend compiled in");
    Ok(())
}

async fn run(settings: Settings, grabs: u32) -> Result<()> {
    let registry = registry();
    if settings.detectors.is_empty() {
        tracing::warn!("no detectors configured");
    }

    let mut failures = 0;
    for detector in &settings.detectors {
        println!("== {} ({})", detector.id, detector.driver_type);
        let run = match run_detector(&registry, detector, grabs).await {
            Ok(run) => run,
            Err(e) => {
                eprintln!("   error: {:#}", e);
                failures += 1;
                continue;
            }
        };
        for event in &run.events {
            println!("   {}", describe(event));
        }
        if run.init.initialized {
            println!(
                "   {} of {} grabs completed, {} data events",
                run.grabs,
                grabs,
                run.data_events().count()
            );
        } else {
            println!("   not initialised: {}", run.init.info);
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{} detector(s) failed", failures);
    }
    Ok(())
}
