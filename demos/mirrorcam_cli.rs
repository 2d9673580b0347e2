//! MirrorCam command-line front end
//!
//! ```text
//! mirrorcam_cli [--config FILE] devices
//! mirrorcam_cli [--config FILE] info [DEVICE]
//! mirrorcam_cli [--config FILE] photo [DEVICE]
//! mirrorcam_cli [--config FILE] record SECONDS [DEVICE]
//! mirrorcam_cli [--config FILE] scan [DEVICE]
//! mirrorcam_cli [--config FILE] theme [auto|light|dark|cycle]
//! ```
//!
//! Built without the `native` feature the synthetic camera is used.

use anyhow::{bail, Context, Result};
use mirrorcam::{
    init_logging, CameraConfig, CameraController, RecordingOutcome, ThemeMode,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("info")?;

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).cloned().context("--config needs a file")?;
            args.drain(i..=i + 1);
            CameraConfig::from_file(&path).with_context(|| format!("loading {}", path))?
        }
        None => CameraConfig::default(),
    };

    let mut camera = CameraController::builder().config(config).build()?;
    let command = args.first().map(String::as_str).unwrap_or("info");

    match command {
        "devices" => list_devices(&mut camera).await?,
        "info" => show_info(&mut camera, args.get(1)).await?,
        "photo" => take_photo(&mut camera, args.get(1)).await?,
        "record" => {
            let seconds: u64 = args
                .get(1)
                .context("record needs a duration in seconds")?
                .parse()
                .context("duration must be a whole number of seconds")?;
            record(&mut camera, seconds, args.get(2)).await?
        }
        "scan" => scan(&mut camera, args.get(1)).await?,
        "theme" => theme(&mut camera, args.get(1).map(String::as_str))?,
        other => bail!("unknown command: {}", other),
    }

    camera.shutdown();
    Ok(())
}

async fn start(camera: &mut CameraController, device: Option<&String>) -> Result<()> {
    let outcome = camera.initialize().await;
    if let Some(message) = camera.error() {
        bail!("{}", message);
    }
    outcome?;
    if let Some(device) = device {
        camera.switch_device(device).await?;
    }
    Ok(())
}

async fn list_devices(camera: &mut CameraController) -> Result<()> {
    start(camera, None).await?;
    for (id, label) in camera.device_options() {
        let marker = if camera.selected_device() == Some(id.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{} {}  {}", marker, id, label);
    }
    Ok(())
}

async fn show_info(camera: &mut CameraController, device: Option<&String>) -> Result<()> {
    start(camera, device).await?;
    let info = camera.camera_info().context("no camera info")?;
    println!("Device:      {}", info.label);
    println!("Resolution:  {}", info.resolution_label());
    println!("Frame rate:  {}", info.frame_rate_label());
    println!("Rendered:    {}", info.rendered_label());
    if let Some(caps) = &info.capabilities {
        if let (Some(w), Some(h)) = (&caps.width, &caps.height) {
            println!("Max size:    {}x{}", w.max, h.max);
        }
    }
    Ok(())
}

async fn take_photo(camera: &mut CameraController, device: Option<&String>) -> Result<()> {
    start(camera, device).await?;
    match camera.take_photo()? {
        Some(saved) => println!("Saved {} ({} bytes)", saved.filename, saved.size),
        None => println!("No frame available yet"),
    }
    Ok(())
}

async fn record(camera: &mut CameraController, seconds: u64, device: Option<&String>) -> Result<()> {
    start(camera, device).await?;
    if !camera.start_recording()? {
        bail!("recording could not start");
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    for _ in 0..=seconds {
        ticker.tick().await;
        if !camera.is_recording() {
            break;
        }
        println!("REC {}", camera.recording_elapsed());
    }

    let handle = camera.stop_recording().context("recording already finished")?;
    match handle.wait().await {
        RecordingOutcome::Saved(saved) => println!("Saved {} ({} bytes)", saved.filename, saved.size),
        RecordingOutcome::Discarded => println!("Nothing was recorded"),
        RecordingOutcome::Failed { reason } => bail!("recording failed: {}", reason),
    }
    Ok(())
}

async fn scan(camera: &mut CameraController, device: Option<&String>) -> Result<()> {
    start(camera, device).await?;
    for entry in camera.scan_resolutions().await? {
        let verdict = if entry.is_exact_match() { "ok" } else { "--" };
        println!("{} {}", verdict, entry);
    }
    Ok(())
}

fn theme(camera: &mut CameraController, choice: Option<&str>) -> Result<()> {
    match choice {
        None => {}
        Some("cycle") => {
            camera.cycle_theme()?;
        }
        Some(mode) => {
            let mode: ThemeMode = mode.parse()?;
            camera.set_theme_mode(mode)?;
        }
    }
    let mode = camera.theme_mode();
    println!(
        "[{}] {} -> {}",
        mode.label(),
        mode.title(),
        camera.applied_theme()
    );
    Ok(())
}
