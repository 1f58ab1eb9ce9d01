//! Integration tests for PicamDriver
//!
//! Tests the detector lifecycle against the mock SDK:
//! - Settings tree synthesis and ordering
//! - Grabs in snapshot and streaming mode
//! - ROI and ordinary setting commits
//! - Stop/close idempotence, master/slave roles
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p daq-driver-picam --test driver_test
//! ```

#![cfg(feature = "mock")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use daq_core::capabilities::{Detector, DetectorContext, StatusLevel};
use daq_core::core::DataDim;
use daq_core::data::DataExport;
use daq_core::driver::DriverFactory;
use daq_core::events::{drain, DetectorEvent, EventHub};
use daq_core::parameter::{ParamPath, ParamValue};
use daq_core::settings::{MemorySettingsTree, SettingsTree};
use daq_driver_picam::mock::{MockCameraBuilder, MockPicamCamera, MockPicamSdk};
use daq_driver_picam::{
    read_only_group, settable_group, AcquisitionMode, ControllerStatus, PicamCamera,
    PicamConfig, PicamDriver, PicamFactory, UnsupportedPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_test::traced_test;

struct Harness {
    driver: PicamDriver,
    camera: Arc<MockPicamCamera>,
    tree: Arc<MemorySettingsTree>,
    rx: broadcast::Receiver<DetectorEvent>,
}

fn small_camera() -> MockCameraBuilder {
    MockPicamCamera::builder()
        .sensor(64, 32)
        .frame_period(Duration::from_millis(2))
}

fn fast_config() -> PicamConfig {
    PicamConfig {
        frame_timeout: Duration::from_secs(2),
        wait_poll_interval: Duration::from_millis(5),
        ..PicamConfig::default()
    }
}

fn context() -> (DetectorContext, Arc<MemorySettingsTree>, broadcast::Receiver<DetectorEvent>) {
    let tree = Arc::new(MemorySettingsTree::new());
    let hub = Arc::new(EventHub::new());
    let rx = hub.subscribe();
    (DetectorContext::new(tree.clone(), hub.clone(), hub), tree, rx)
}

fn harness_with(builder: MockCameraBuilder, config: PicamConfig) -> Harness {
    let camera = builder.build();
    let sdk = Arc::new(MockPicamSdk::with_camera(camera.clone()));
    let (ctx, tree, rx) = context();
    let driver = PicamDriver::new("Picam", config, sdk, ctx).unwrap();
    Harness {
        driver,
        camera,
        tree,
        rx,
    }
}

async fn initialised() -> Harness {
    let h = harness_with(small_camera(), fast_config());
    let status = h.driver.initialize().await;
    assert!(status.initialized, "{}", status.info);
    h
}

fn titles(tree: &MemorySettingsTree, group: &ParamPath) -> Vec<String> {
    tree.children(group).into_iter().map(|d| d.title).collect()
}

fn data(events: &[DetectorEvent]) -> Vec<&DataExport> {
    events
        .iter()
        .filter_map(|e| match e {
            DetectorEvent::Data(d) => d.first(),
            _ => None,
        })
        .collect()
}

fn temporary(events: &[DetectorEvent]) -> Vec<&DataExport> {
    events
        .iter()
        .filter_map(|e| match e {
            DetectorEvent::TemporaryData(d) => d.first(),
            _ => None,
        })
        .collect()
}

fn statuses(events: &[DetectorEvent]) -> Vec<(StatusLevel, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            DetectorEvent::Status(m) => Some((m.level, m.text.clone())),
            _ => None,
        })
        .collect()
}

fn roi_field(name: &str) -> ParamPath {
    settable_group().child("rois").child(name)
}

// =============================================================================
// Initialization
// =============================================================================

#[tokio::test]
async fn construction_publishes_controller_parameters() {
    let h = harness_with(small_camera(), fast_config());
    assert_eq!(
        h.tree.value(&ParamPath::new(["controller_status"])),
        Some(ParamValue::Str("Master".into()))
    );
    assert_eq!(
        h.tree.value(&ParamPath::new(["serial_number"])),
        Some(ParamValue::Str("0008154711".into()))
    );
    assert!(h.tree.get(&ParamPath::new(["controller_id"])).unwrap().read_only);
    assert!(!h.tree.contains(&settable_group()));
}

#[tokio::test]
async fn initialize_builds_ordered_groups() {
    let mut h = initialised().await;

    assert_eq!(
        titles(&h.tree, &settable_group()),
        vec![
            "Exposure Time",
            "ADC Speed",
            "ADC Analog Gain",
            "ADC Quality",
            "ROIs",
            "Sensor Temperature Set Point",
            "Shutter Timing Mode",
            "Disable Cooling Fan",
            "Readout Count",
        ]
    );
    assert_eq!(
        titles(&h.tree, &read_only_group()),
        vec![
            "Sensor Temperature",
            "Readout Time Calculation",
            "Frame Rate Calculation",
            "Pixel Width",
            "Pixel Height",
            "Active Width",
            "Active Height",
        ]
    );
    assert_eq!(
        h.tree.value(&ParamPath::new(["controller_id"])),
        Some(ParamValue::Str("PIXIS: 400B".into()))
    );
    assert_eq!(
        h.tree.value(&settable_group().child("adc_speed")),
        Some(ParamValue::Str("2 MHz".into()))
    );
    assert_eq!(h.tree.value(&roi_field("width")), Some(ParamValue::Int(64)));

    // Full-sensor ROI is 2D, which is what the viewer starts with.
    assert!(temporary(&drain(&mut h.rx)).is_empty());
}

#[tokio::test]
async fn second_initialize_is_refused() {
    let h = initialised().await;
    let status = h.driver.initialize().await;
    assert!(!status.initialized);
    assert!(status.info.contains("already initialised"));
}

#[tokio::test]
async fn serial_number_selects_the_camera() {
    let a = small_camera().serial_number("A").build();
    let b = small_camera().serial_number("B").model("ProEM: 512B").build();
    let sdk = Arc::new(MockPicamSdk::new(vec![a, b.clone()]));
    let (ctx, tree, _rx) = context();
    let config = PicamConfig {
        serial_number: Some("B".into()),
        ..fast_config()
    };
    let driver = PicamDriver::new("Picam", config, sdk, ctx).unwrap();
    assert!(driver.initialize().await.initialized);
    assert_eq!(
        tree.value(&ParamPath::new(["controller_id"])),
        Some(ParamValue::Str("ProEM: 512B".into()))
    );
    driver.close().await.unwrap();
    assert!(b.is_closed());
}

#[traced_test]
#[tokio::test]
async fn unsupported_attribute_fails_initialization() {
    let mut h = harness_with(small_camera().with_unsupported_attribute(), fast_config());
    let status = h.driver.initialize().await;

    assert!(!status.initialized);
    assert!(status
        .info
        .contains("unsupported attribute kind Pulse for 'Repetitive Gate'"));
    assert!(statuses(&drain(&mut h.rx)).contains(&(StatusLevel::Log, status.info.clone())));
    assert!(!h.tree.contains(&settable_group()));
    assert!(!h.tree.contains(&read_only_group()));
    assert!(h.camera.is_closed());
    assert!(logs_contain("picam initialization failed"));
}

#[traced_test]
#[tokio::test]
async fn unsupported_attribute_skipped_when_configured() {
    let config = PicamConfig {
        unsupported_attributes: UnsupportedPolicy::Skip,
        ..fast_config()
    };
    let h = harness_with(small_camera().with_unsupported_attribute(), config);
    assert!(h.driver.initialize().await.initialized);
    assert!(!h.tree.contains(&settable_group().child("repetitive_gate")));
    assert!(logs_contain("skipping unsupported attribute"));
}

#[tokio::test]
async fn hidden_attributes_are_left_out() {
    let config = PicamConfig {
        hidden_attributes: vec!["Repetitive Gate".into(), "Disable Cooling Fan".into()],
        ..fast_config()
    };
    let h = harness_with(small_camera().with_unsupported_attribute(), config);
    assert!(h.driver.initialize().await.initialized);
    assert!(!h.tree.contains(&settable_group().child("repetitive_gate")));
    assert!(!h.tree.contains(&settable_group().child("disable_cooling_fan")));
    assert!(h.tree.contains(&settable_group().child("exposure_time")));
}

// =============================================================================
// Master / slave
// =============================================================================

#[tokio::test]
async fn slave_without_shared_controller_fails() {
    let config = PicamConfig {
        controller_status: ControllerStatus::Slave,
        ..fast_config()
    };
    let h = harness_with(small_camera(), config);
    let status = h.driver.initialize().await;
    assert!(!status.initialized);
    assert_eq!(
        status.info,
        "no controller has been defined externally while this detector is a slave one"
    );
}

#[tokio::test]
async fn slave_uses_and_keeps_the_master_camera() {
    let master = initialised().await;
    let shared = master.driver.controller().await.unwrap();

    let (ctx, tree, _rx) = context();
    let config = PicamConfig {
        controller_status: ControllerStatus::Slave,
        ..fast_config()
    };
    let slave = PicamDriver::new(
        "Picam slave",
        config,
        Arc::new(MockPicamSdk::default()),
        ctx,
    )
    .unwrap()
    .with_shared_controller(shared);

    assert!(slave.initialize().await.initialized);
    assert!(tree.contains(&settable_group()));
    slave.close().await.unwrap();
    assert!(!master.camera.is_closed());

    master.driver.close().await.unwrap();
    assert!(master.camera.is_closed());
}

#[tokio::test]
async fn role_is_read_from_the_tree_at_initialization() {
    let h = harness_with(small_camera(), fast_config());
    h.tree
        .edit_value(
            &ParamPath::new(["controller_status"]),
            ParamValue::Str("Slave".into()),
        )
        .unwrap();
    h.driver
        .commit_setting(&ParamPath::new(["controller_status"]))
        .await
        .unwrap();
    assert!(!h.driver.initialize().await.initialized);
}

// =============================================================================
// Grabs
// =============================================================================

#[tokio::test]
async fn grab_before_initialize_is_an_error() {
    let h = harness_with(small_camera(), fast_config());
    assert!(h.driver.grab(1).await.is_err());
}

#[tokio::test]
async fn grab_emits_a_2d_frame() {
    let mut h = initialised().await;
    drain(&mut h.rx);
    h.driver.grab(1).await.unwrap();

    let events = drain(&mut h.rx);
    let frames = data(&events);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].name, "Picam");
    assert_eq!(frames[0].dim, DataDim::Data2D);
    assert_eq!(frames[0].labels, vec!["Picam_Data2D".to_string()]);
    assert_eq!(frames[0].shape(), vec![32, 64]);
    assert!(h.driver.is_acquiring().await);
}

#[tokio::test]
async fn acquisition_locks_offline_settings() {
    let h = initialised().await;
    h.driver.grab(1).await.unwrap();

    let enabled = |path: ParamPath| h.tree.get(&path).unwrap().enabled;
    assert!(enabled(settable_group().child("exposure_time")));
    assert!(!enabled(settable_group().child("adc_speed")));
    assert!(!enabled(roi_field("x")));

    h.driver.stop().await.unwrap();
    assert!(enabled(settable_group().child("adc_speed")));
    assert!(enabled(roi_field("x")));
}

#[tokio::test]
async fn stop_twice_is_a_noop() {
    let h = initialised().await;
    h.driver.grab(1).await.unwrap();
    h.driver.stop().await.unwrap();
    h.driver.stop().await.unwrap();

    assert!(!h.driver.is_acquiring().await);
    let stops = h
        .camera
        .journal()
        .iter()
        .filter(|c| *c == "stop_acquisition")
        .count();
    assert_eq!(stops, 1);
}

#[traced_test]
#[tokio::test]
async fn timeout_is_reported_and_acquisition_stays_armed() {
    let config = PicamConfig {
        frame_timeout: Duration::from_millis(30),
        wait_poll_interval: Duration::from_millis(5),
        ..PicamConfig::default()
    };
    let mut h = harness_with(
        small_camera().frame_period(Duration::from_secs(30)),
        config,
    );
    assert!(h.driver.initialize().await.initialized);
    drain(&mut h.rx);

    h.driver.grab(1).await.unwrap();
    let events = drain(&mut h.rx);
    assert!(data(&events).is_empty());
    assert!(statuses(&events)
        .iter()
        .any(|(level, text)| *level == StatusLevel::Log && text.starts_with("Timed out waiting")));
    assert!(h.driver.is_acquiring().await);
    assert!(logs_contain("no frame before timeout"));
}

#[tokio::test]
async fn wait_failure_is_logged_and_next_grab_recovers() {
    let mut h = harness_with(small_camera().fail_waits(1), fast_config());
    assert!(h.driver.initialize().await.initialized);
    drain(&mut h.rx);

    h.driver.grab(1).await.unwrap();
    let events = drain(&mut h.rx);
    assert!(data(&events).is_empty());
    assert!(statuses(&events)
        .iter()
        .any(|(_, text)| text.contains("injected")));

    h.driver.grab(1).await.unwrap();
    assert_eq!(data(&drain(&mut h.rx)).len(), 1);
}

#[tokio::test]
async fn streaming_mode_reads_through_the_worker() {
    let config = PicamConfig {
        acquisition_mode: AcquisitionMode::Streaming,
        ..fast_config()
    };
    let mut h = harness_with(small_camera(), config);
    assert!(h.driver.initialize().await.initialized);
    drain(&mut h.rx);

    for _ in 0..3 {
        h.driver.grab(1).await.unwrap();
    }
    assert_eq!(data(&drain(&mut h.rx)).len(), 3);
    h.driver.close().await.unwrap();
}

/// The mock encodes the frame index in the first pixel (`100 + index`).
fn frame_index(export: &DataExport) -> u64 {
    let first = export.arrays[0].iter().next().copied().unwrap();
    (first - 100.0) as u64
}

#[tokio::test]
async fn streaming_mode_skips_the_backlog() {
    let config = PicamConfig {
        acquisition_mode: AcquisitionMode::Streaming,
        ..fast_config()
    };
    let mut h = harness_with(
        small_camera().frame_period(Duration::from_millis(5)),
        config,
    );
    assert!(h.driver.initialize().await.initialized);
    drain(&mut h.rx);

    h.driver.grab(1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(h.camera.pending_frames() >= 10);

    h.driver.grab(1).await.unwrap();
    let events = drain(&mut h.rx);
    let frames = data(&events);
    assert_eq!(frames.len(), 2);
    assert!(frame_index(frames[1]) >= 20, "got frame {}", frame_index(frames[1]));
    assert!(h.camera.pending_frames() <= 1);
    h.driver.close().await.unwrap();
}

#[tokio::test]
async fn snapshot_mode_reads_the_oldest_frame() {
    let mut h = harness_with(
        small_camera().frame_period(Duration::from_millis(5)),
        fast_config(),
    );
    assert!(h.driver.initialize().await.initialized);
    drain(&mut h.rx);

    h.driver.grab(1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    h.driver.grab(1).await.unwrap();

    let events = drain(&mut h.rx);
    let frames = data(&events);
    assert_eq!(frames.len(), 2);
    assert_eq!(frame_index(frames[0]), 0);
    assert_eq!(frame_index(frames[1]), 1);
    assert!(h.camera.pending_frames() >= 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_right_after_acquisition_start_cancels_the_grab() {
    let config = PicamConfig {
        frame_timeout: Duration::from_secs(20),
        wait_poll_interval: Duration::from_millis(5),
        ..PicamConfig::default()
    };
    let h = harness_with(small_camera().frame_period(Duration::from_secs(60)), config);
    assert!(h.driver.initialize().await.initialized);
    let driver = Arc::new(h.driver);
    let mut rx = h.rx;
    drain(&mut rx);

    let grab = tokio::spawn({
        let driver = driver.clone();
        async move { driver.grab(1).await }
    });
    // Acquisition starts under the same lock that registers the wait.
    while !driver.is_acquiring().await {
        tokio::task::yield_now().await;
    }
    driver.stop().await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), grab)
        .await
        .expect("grab should not wait out the frame timeout")
        .unwrap()
        .unwrap();

    let events = drain(&mut rx);
    assert!(data(&events).is_empty());
    assert!(!statuses(&events)
        .iter()
        .any(|(_, text)| text.starts_with("Timed out waiting")));
}

#[tokio::test]
async fn stop_cancels_a_pending_wait_without_emitting() {
    let config = PicamConfig {
        frame_timeout: Duration::from_secs(20),
        wait_poll_interval: Duration::from_millis(5),
        ..PicamConfig::default()
    };
    let h = harness_with(small_camera().frame_period(Duration::from_secs(60)), config);
    assert!(h.driver.initialize().await.initialized);
    let driver = Arc::new(h.driver);
    let mut rx = h.rx;
    drain(&mut rx);

    let grab = tokio::spawn({
        let driver = driver.clone();
        async move { driver.grab(1).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    driver.stop().await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), grab)
        .await
        .expect("grab should return promptly after stop")
        .unwrap()
        .unwrap();
    assert!(data(&drain(&mut rx)).is_empty());
}

// =============================================================================
// Commits
// =============================================================================

#[tokio::test]
async fn roi_change_rearms_and_reshapes_viewer() {
    let mut h = initialised().await;
    drain(&mut h.rx);
    h.camera.clear_journal();

    h.tree
        .edit_value(&roi_field("height"), ParamValue::Int(1))
        .unwrap();
    h.driver.commit_setting(&roi_field("height")).await.unwrap();

    assert_eq!(
        h.camera.journal(),
        vec![
            "set_roi",
            "clear_acquisition",
            "commit_parameters",
            "setup_acquisition"
        ]
    );
    assert_eq!(h.camera.roi().unwrap().height, 1);

    let events = drain(&mut h.rx);
    let changed = events
        .iter()
        .position(|e| matches!(e, DetectorEvent::Status(m) if m.text.starts_with("Changed ROI:")))
        .unwrap();
    let reshaped = events
        .iter()
        .position(|e| matches!(e, DetectorEvent::TemporaryData(_)))
        .unwrap();
    assert!(changed < reshaped);
    assert!(statuses(&events)
        .iter()
        .any(|(_, text)| text.starts_with("updated Readout Time Calculation:")));

    let view = temporary(&events);
    assert_eq!(view[0].dim, DataDim::Data1D);
    assert_eq!(view[0].labels, vec!["Picam_Data1D".to_string()]);
    assert_eq!(view[0].shape(), vec![64]);

    h.driver.grab(1).await.unwrap();
    let frames = drain(&mut h.rx);
    let frames = data(&frames);
    assert_eq!(frames[0].dim, DataDim::Data1D);
    assert_eq!(frames[0].shape(), vec![64]);
}

#[tokio::test]
async fn unchanged_roi_touches_nothing() {
    let h = initialised().await;
    h.camera.clear_journal();
    h.driver.commit_setting(&roi_field("x")).await.unwrap();
    assert!(h.camera.journal().is_empty());
}

#[tokio::test]
async fn rejected_roi_restores_the_tree() {
    let h = initialised().await;
    h.tree
        .edit_value(&roi_field("width"), ParamValue::Int(100))
        .unwrap();
    assert!(h.driver.commit_setting(&roi_field("width")).await.is_err());
    assert_eq!(h.tree.value(&roi_field("width")), Some(ParamValue::Int(64)));
    assert_eq!(h.camera.roi().unwrap().width, 64);
}

#[tokio::test]
async fn roi_commit_refused_while_acquiring() {
    let h = initialised().await;
    h.driver.grab(1).await.unwrap();
    h.tree
        .set_value(&roi_field("width"), ParamValue::Int(16))
        .unwrap();
    let err = h.driver.commit_setting(&roi_field("width")).await.unwrap_err();
    assert!(err.to_string().contains("Cannot change ROI while acquiring"));
    assert_eq!(h.camera.roi().unwrap().width, 64);
}

#[tokio::test]
async fn exposure_commit_writes_camera_and_resyncs() {
    let mut h = initialised().await;
    drain(&mut h.rx);
    let path = settable_group().child("exposure_time");
    h.tree.edit_value(&path, ParamValue::Float(250.0)).unwrap();
    h.driver.commit_setting(&path).await.unwrap();

    let attr = h.camera.attribute("Exposure Time").unwrap();
    assert_eq!(
        attr.value,
        daq_driver_picam::sdk::AttributeValue::Float(250.0)
    );
    let texts: Vec<String> = statuses(&drain(&mut h.rx))
        .into_iter()
        .map(|(_, t)| t)
        .collect();
    assert_eq!(texts[0], "Changed Exposure Time: 250");
    assert!(texts
        .iter()
        .any(|t| t.starts_with("updated Frame Rate Calculation:")));
}

#[tokio::test]
async fn list_commit_resolves_display_to_key() {
    let h = initialised().await;
    let path = settable_group().child("adc_speed");
    h.tree
        .edit_value(&path, ParamValue::Str("100 kHz".into()))
        .unwrap();
    h.driver.commit_setting(&path).await.unwrap();
    assert_eq!(
        h.camera.attribute("ADC Speed").unwrap().value,
        daq_driver_picam::sdk::AttributeValue::Float(0.1)
    );
}

#[tokio::test]
async fn unchanged_setting_is_not_written() {
    let h = initialised().await;
    h.camera.clear_journal();
    h.driver
        .commit_setting(&settable_group().child("adc_quality"))
        .await
        .unwrap();
    assert!(h.camera.journal().is_empty());
}

// =============================================================================
// Close
// =============================================================================

#[tokio::test]
async fn close_twice_releases_once_and_cleans_tree() {
    let h = initialised().await;
    h.driver.grab(1).await.unwrap();
    h.driver.close().await.unwrap();
    h.driver.close().await.unwrap();

    assert!(h.camera.is_closed());
    let journal = h.camera.journal();
    assert_eq!(journal.iter().filter(|c| *c == "close").count(), 1);
    let stop = journal.iter().position(|c| c == "stop_acquisition").unwrap();
    let close = journal.iter().position(|c| c == "close").unwrap();
    assert!(stop < close);
    assert!(!h.tree.contains(&settable_group()));
    assert!(!h.tree.contains(&read_only_group()));
    assert!(h.driver.grab(1).await.is_err());
}

// =============================================================================
// Factory
// =============================================================================

#[tokio::test]
async fn factory_validates_and_builds() {
    let camera = small_camera().build();
    let factory = PicamFactory::with_sdk(Arc::new(MockPicamSdk::with_camera(camera)));
    assert_eq!(factory.driver_type(), "picam");

    let config: toml::Value = toml::from_str(
        r#"
        acquisition_mode = "streaming"
        frame_timeout = "2s"
        wait_poll_interval = "10ms"
        "#,
    )
    .unwrap();
    factory.validate(&config).unwrap();

    let bad: toml::Value = toml::from_str("exposure = 3").unwrap();
    assert!(factory.validate(&bad).is_err());
    let slow_poll: toml::Value =
        toml::from_str("frame_timeout = \"10ms\"\nwait_poll_interval = \"1s\"").unwrap();
    assert!(factory.validate(&slow_poll).is_err());

    let (ctx, tree, _rx) = context();
    let components = factory.build(config, ctx).await.unwrap();
    assert!(components.shutter.is_none());
    assert!(components.detector.initialize().await.initialized);
    assert!(tree.contains(&settable_group()));
    components.detector.close().await.unwrap();
}
