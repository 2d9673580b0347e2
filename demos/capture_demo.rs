//! Capture Demo
//!
//! Drives the controller against two synthetic cameras: negotiation, a
//! device switch, a mirrored photo, a short recording and a resolution scan,
//! printing controller events as they arrive. Output goes to `./captures`.

use anyhow::Result;
use mirrorcam::{init_logging, CameraConfig, CameraController, ControllerEvent, Shortcut};
use mirrorcam_core::MemoryPreferenceStore;
use mirrorcam_media::{
    ConstraintPolicy, HeadlessDisplay, SyntheticCamera, SyntheticDevices, SyntheticEncoderFactory,
    VideoResolution,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("info,mirrorcam_media=debug")?;

    let devices = Arc::new(SyntheticDevices::new(vec![
        SyntheticCamera::new("front", "Front Camera", VideoResolution::HD)
            .reporting_max(VideoResolution::FULL_HD),
        SyntheticCamera::new("usb", "", VideoResolution::new(800, 600))
            .with_policy(ConstraintPolicy::Clamp),
    ]));

    let mut camera = CameraController::builder()
        .config(CameraConfig::default())
        .media_devices(devices)
        .encoder_factory(Arc::new(SyntheticEncoderFactory::new()))
        .preference_store(Arc::new(MemoryPreferenceStore::new()))
        .display(Arc::new(HeadlessDisplay::new()))
        .build()?;

    let mut events = camera.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match &event {
                ControllerEvent::CameraStarted { info } => println!(
                    "camera started: {} at {} ({})",
                    info.label,
                    info.resolution_label(),
                    info.frame_rate_label()
                ),
                ControllerEvent::Error { message } => println!("error: {}", message),
                other => println!("event: {}", other.event_type()),
            }
        }
    });

    println!("1. Negotiating the default camera");
    camera.initialize().await?;
    for (id, label) in camera.device_options() {
        println!("   {} -> {}", id, label);
    }

    println!("2. Switching to the USB camera");
    camera.switch_device("usb").await?;

    println!("3. Taking a photo");
    camera.handle_shortcut(Shortcut::Photo)?;

    println!("4. Recording for two seconds");
    camera.start_recording()?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    if let Some(handle) = camera.stop_recording() {
        println!("   outcome: {:?}", handle.wait().await);
    }

    println!("5. Scanning resolutions");
    for entry in camera.scan_resolutions().await? {
        println!("   {}", entry);
    }

    camera.shutdown();
    drop(camera);
    printer.await?;
    Ok(())
}
