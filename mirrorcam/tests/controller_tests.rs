//! Integration tests for the camera controller
//!
//! Runs against synthetic cameras and encoders on tokio's paused clock.

use mirrorcam::*;
use mirrorcam_core::MemoryPreferenceStore;
use mirrorcam_media::{
    ConstrainValue, DisplaySurface, HeadlessDisplay, MemoryDownloadSink, SyntheticCamera,
    SyntheticDevices, SyntheticEncoderFactory,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const SMALL: VideoResolution = VideoResolution::new(64, 48);

struct Rig {
    devices: Arc<SyntheticDevices>,
    sink: Arc<MemoryDownloadSink>,
    store: Arc<MemoryPreferenceStore>,
    display: Arc<HeadlessDisplay>,
    appearance: SystemAppearance,
    camera: CameraController,
}

fn rig_with(cameras: Vec<SyntheticCamera>, encoders: SyntheticEncoderFactory) -> Rig {
    let devices = Arc::new(SyntheticDevices::new(cameras));
    let sink = Arc::new(MemoryDownloadSink::new());
    let store = Arc::new(MemoryPreferenceStore::new());
    let display = Arc::new(HeadlessDisplay::new());
    let appearance = SystemAppearance::new(Theme::Light);

    let camera = CameraController::builder()
        .media_devices(devices.clone())
        .encoder_factory(Arc::new(encoders))
        .download_sink(sink.clone())
        .preference_store(store.clone())
        .appearance(appearance.subscribe())
        .display(display.clone())
        .build()
        .expect("controller builds");

    Rig {
        devices,
        sink,
        store,
        display,
        appearance,
        camera,
    }
}

fn two_cameras() -> Vec<SyntheticCamera> {
    vec![
        SyntheticCamera::new("cam-a", "Front", SMALL),
        SyntheticCamera::new("cam-b", "", VideoResolution::new(32, 24)),
    ]
}

fn rig() -> Rig {
    rig_with(two_cameras(), SyntheticEncoderFactory::new())
}

// ============================================================================
// INITIALIZATION TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_initialize_opens_default_camera_at_ceiling() {
    let mut rig = rig();
    let mut events = rig.camera.subscribe();

    assert_ok!(rig.camera.initialize().await);

    assert!(rig.camera.is_started());
    assert_eq!(rig.camera.error(), None);
    assert_eq!(rig.camera.selected_device(), Some("cam-a"));
    assert_eq!(rig.camera.devices().len(), 2);

    let info = rig.camera.camera_info().unwrap();
    assert_eq!(info.label, "Front");
    assert_eq!(info.resolution_label(), "64x48");
    assert_eq!(info.frame_rate_label(), "30 fps");
    assert_eq!(info.rendered, Some(SMALL));

    // Probe stream released, negotiated stream live
    assert_eq!(rig.devices.live_track_count(), 1);
    let requests = rig.devices.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].requested_device(), None);
    assert_eq!(requests[1].width, Some(ConstrainValue::Exact(64)));

    let kinds: Vec<_> = events.drain().iter().map(|e| e.event_type()).collect();
    assert_eq!(kinds, vec!["devices_changed", "camera_started", "metadata_loaded"]);
}

#[tokio::test(start_paused = true)]
async fn test_initialize_falls_back_to_relaxed_constraints() {
    let mut rig = rig_with(
        vec![SyntheticCamera::new("cam", "Cam", VideoResolution::HD)
            .reporting_max(VideoResolution::FULL_HD)],
        SyntheticEncoderFactory::new(),
    );

    assert_ok!(rig.camera.initialize().await);

    let requests = rig.devices.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].width, Some(ConstrainValue::Exact(1920)));
    assert_eq!(requests[2].width, Some(ConstrainValue::Ideal(1920)));
    assert_eq!(
        rig.camera.camera_info().unwrap().resolution_label(),
        "1280x720"
    );
}

#[tokio::test(start_paused = true)]
async fn test_initialize_without_permission_reports_error() {
    let mut rig = rig();
    rig.devices.set_permission(false);
    let mut events = rig.camera.subscribe();

    let result = rig.camera.initialize().await;
    assert!(matches!(result, Err(MediaError::PermissionDenied { .. })));
    assert!(!rig.camera.is_started());

    let message = rig.camera.error().unwrap();
    assert!(message.starts_with("Cannot list devices: "), "{}", message);
    assert!(events.drain().iter().any(|e| e.is_error_event()));
}

#[tokio::test(start_paused = true)]
async fn test_reinitialize_replaces_session() {
    let mut rig = rig();
    rig.camera.initialize().await.unwrap();
    let first = rig.camera.session().unwrap().stream().clone();
    let mut events = rig.camera.subscribe();

    assert_ok!(rig.camera.initialize().await);

    assert!(rig.camera.is_started());
    assert_eq!(rig.devices.live_track_count(), 1);
    assert!(!first.is_active());
    assert_ne!(rig.camera.session().unwrap().stream().id(), first.id());
    let kinds: Vec<_> = events.drain().iter().map(|e| e.event_type()).collect();
    assert_eq!(kinds[0], "camera_stopped");
}

#[tokio::test(start_paused = true)]
async fn test_reinitialize_while_recording_rejected() {
    let mut rig = rig();
    rig.camera.initialize().await.unwrap();
    assert!(rig.camera.start_recording().unwrap());

    let result = rig.camera.initialize().await;
    assert!(matches!(result, Err(MediaError::RecordingActive)));

    assert!(rig.camera.is_recording());
    assert!(rig.camera.is_started());
    assert_eq!(rig.devices.live_track_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_reinitialize_clears_session() {
    let mut rig = rig();
    rig.camera.initialize().await.unwrap();
    rig.devices.set_permission(false);

    assert_err!(rig.camera.initialize().await);

    assert!(!rig.camera.is_started());
    assert!(rig.camera.session().is_none());
    assert_eq!(rig.devices.live_track_count(), 0);
}

// ============================================================================
// DEVICE SWITCH TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_switch_device_replaces_session() {
    let mut rig = rig();
    rig.camera.initialize().await.unwrap();

    let start = tokio::time::Instant::now();
    assert_ok!(rig.camera.switch_device("cam-b").await);
    // Grace delay plus the probe release delay
    assert!(start.elapsed() >= Duration::from_millis(400));

    assert!(rig.camera.is_started());
    assert_eq!(rig.camera.selected_device(), Some("cam-b"));
    assert_eq!(rig.camera.session().unwrap().device_id(), "cam-b");
    assert_eq!(rig.devices.live_track_count(), 1);
    assert_eq!(
        rig.camera.camera_info().unwrap().rendered,
        Some(VideoResolution::new(32, 24))
    );
}

#[tokio::test(start_paused = true)]
async fn test_switch_to_missing_device_reports_error() {
    let mut rig = rig();
    rig.camera.initialize().await.unwrap();

    let result = rig.camera.switch_device("gone").await;
    assert!(matches!(result, Err(MediaError::DeviceNotFound { .. })));
    assert!(!rig.camera.is_started());
    assert!(rig.camera.session().is_none());
    assert!(rig
        .camera
        .error()
        .unwrap()
        .starts_with("Cannot access camera: "));
    assert_eq!(rig.devices.live_track_count(), 0);

    // A later successful switch clears the message
    rig.camera.switch_device("cam-a").await.unwrap();
    assert_eq!(rig.camera.error(), None);
}

#[tokio::test(start_paused = true)]
async fn test_switch_while_recording_is_rejected() {
    let mut rig = rig();
    rig.camera.initialize().await.unwrap();
    assert!(rig.camera.start_recording().unwrap());

    let result = rig.camera.switch_device("cam-b").await;
    assert!(matches!(result, Err(MediaError::RecordingActive)));

    assert!(rig.camera.is_recording());
    assert!(rig.camera.is_started());
    assert_eq!(rig.camera.session().unwrap().device_id(), "cam-a");
    assert_eq!(rig.camera.selected_device(), Some("cam-a"));

    rig.camera.stop_recording().unwrap().wait().await;
}

#[tokio::test(start_paused = true)]
async fn test_device_options_label_unnamed_cameras() {
    let mut rig = rig();
    rig.camera.initialize().await.unwrap();

    assert_eq!(
        rig.camera.device_options(),
        vec![
            ("cam-a".to_string(), "Front".to_string()),
            ("cam-b".to_string(), "Camera 2".to_string()),
        ]
    );
}

// ============================================================================
// CAPTURE TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_take_photo() {
    let mut rig = rig();
    assert_eq!(rig.camera.take_photo().unwrap(), None);

    rig.camera.initialize().await.unwrap();
    let mut events = rig.camera.subscribe();
    let saved = rig.camera.take_photo().unwrap().expect("photo saved");

    assert!(saved.filename.starts_with("photo-"));
    assert_eq!(rig.sink.download_count(), 1);
    assert_eq!(events.drain(), vec![ControllerEvent::PhotoSaved(saved)]);
}

#[tokio::test(start_paused = true)]
async fn test_recording_round_trip() {
    let mut rig = rig();
    rig.camera.initialize().await.unwrap();
    let mut events = rig.camera.subscribe();

    assert!(matches!(
        rig.camera.toggle_recording().unwrap(),
        RecorderToggle::Started
    ));
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(rig.camera.recording_elapsed(), "00:01");

    let RecorderToggle::Stopped(handle) = rig.camera.toggle_recording().unwrap() else {
        panic!("expected the recording to stop");
    };
    let RecordingOutcome::Saved(saved) = handle.wait().await else {
        panic!("expected a saved recording");
    };
    assert!(saved.filename.ends_with(".webm"));
    assert_eq!(rig.camera.recording_elapsed(), "00:00");

    tokio::time::sleep(Duration::from_millis(10)).await;
    let forwarded: Vec<_> = events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            ControllerEvent::Recorder(event) => Some(event),
            _ => None,
        })
        .collect();
    assert!(matches!(forwarded[0], RecorderEvent::Started { resolution: SMALL, .. }));
    assert_eq!(forwarded[1], RecorderEvent::Saved(saved));
}

#[tokio::test(start_paused = true)]
async fn test_recording_requires_camera() {
    let mut rig = rig();
    assert!(!rig.camera.start_recording().unwrap());
    assert!(matches!(
        rig.camera.toggle_recording().unwrap(),
        RecorderToggle::Unavailable
    ));
}

#[tokio::test(start_paused = true)]
async fn test_encoder_creation_failure_sets_error() {
    let mut rig = rig_with(two_cameras(), SyntheticEncoderFactory::new().failing_creation());
    rig.camera.initialize().await.unwrap();

    let result = rig.camera.start_recording();
    assert!(matches!(result, Err(MediaError::EncoderCreation { .. })));
    assert!(!rig.camera.is_recording());
    assert!(rig.camera.is_started());
    assert!(rig
        .camera
        .error()
        .unwrap()
        .starts_with("Cannot start recording: "));
}

// ============================================================================
// SCAN TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_scan_keeps_live_session() {
    let mut rig = rig();
    assert_err!(rig.camera.scan_resolutions().await);

    rig.camera.initialize().await.unwrap();
    let results = rig.camera.scan_resolutions().await.unwrap();

    // cam-a tops out at 64x48, so every candidate is rejected
    assert_eq!(results.len(), 8);
    assert!(results.iter().all(|r| r.granted().is_none()));
    assert_eq!(rig.camera.scan_results(), results.as_slice());
    assert!(!rig.camera.is_scanning());

    assert!(rig.camera.session().unwrap().is_live());
    assert_eq!(rig.devices.live_track_count(), 1);
}

// ============================================================================
// THEME, FULLSCREEN AND SHORTCUT TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_theme_cycle_is_persisted() {
    let mut rig = rig();
    assert_eq!(rig.camera.theme_mode(), ThemeMode::Auto);

    assert_eq!(rig.camera.cycle_theme().unwrap(), ThemeMode::Light);
    assert_eq!(rig.camera.cycle_theme().unwrap(), ThemeMode::Dark);
    assert_eq!(rig.camera.applied_theme(), Theme::Dark);
    assert_eq!(rig.store.write_count(), 2);

    // Appearance changes are ignored outside auto
    rig.appearance.set(Theme::Dark);
    assert_eq!(rig.camera.sync_theme(), None);

    rig.camera.set_theme_mode(ThemeMode::Auto).unwrap();
    assert_eq!(rig.camera.applied_theme(), Theme::Dark);
    rig.appearance.set(Theme::Light);
    assert_eq!(rig.camera.sync_theme(), Some(Theme::Light));
}

#[tokio::test(start_paused = true)]
async fn test_fullscreen_toggle() {
    let mut rig = rig();
    assert!(rig.camera.toggle_fullscreen());
    assert!(rig.camera.is_fullscreen());
    assert!(!rig.camera.toggle_fullscreen());

    let mut refusing = CameraController::builder()
        .media_devices(rig.devices.clone())
        .encoder_factory(Arc::new(SyntheticEncoderFactory::new()))
        .download_sink(rig.sink.clone())
        .preference_store(rig.store.clone())
        .display(Arc::new(HeadlessDisplay::refusing_fullscreen()))
        .build()
        .unwrap();
    assert!(!refusing.toggle_fullscreen());
    assert!(!refusing.is_fullscreen());
    assert_eq!(refusing.error(), None);
}

#[tokio::test(start_paused = true)]
async fn test_shortcuts_drive_controller() {
    let mut rig = rig();
    rig.camera.initialize().await.unwrap();

    let photo = Shortcut::from_key_code("Space").unwrap();
    rig.camera.handle_shortcut(photo).unwrap();
    assert_eq!(rig.sink.download_count(), 1);

    rig.camera.handle_shortcut(Shortcut::Record).unwrap();
    assert!(rig.camera.is_recording());
    tokio::time::sleep(Duration::from_millis(600)).await;
    rig.camera.handle_shortcut(Shortcut::Record).unwrap();
    assert!(!rig.camera.is_recording());

    rig.camera.handle_shortcut(Shortcut::Fullscreen).unwrap();
    assert!(rig.display.is_fullscreen());
}

#[tokio::test(start_paused = true)]
async fn test_present_frame_is_mirrored() {
    let mut rig = rig();
    assert!(!rig.camera.present_frame().unwrap());

    rig.camera.initialize().await.unwrap();
    assert!(rig.camera.present_frame().unwrap());

    let shown = rig.display.last_frame().unwrap();
    let source = rig.camera.preview().current_frame().unwrap();
    assert_eq!(shown.pixel(0, 3), source.pixel(63, 3));
}

// ============================================================================
// TEARDOWN TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_everything() {
    let mut rig = rig();
    rig.camera.initialize().await.unwrap();
    rig.camera.start_recording().unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;

    let finalize = rig.camera.shutdown().expect("pending recording");
    assert!(!rig.camera.is_recording());
    assert!(!rig.camera.is_started());
    assert_eq!(rig.devices.live_track_count(), 0);
    assert!(matches!(finalize.wait().await, RecordingOutcome::Saved(_)));

    // Idempotent
    assert!(rig.camera.shutdown().is_none());
}
