//! # MirrorCam - Mirrored Webcam Capture
//!
//! MirrorCam opens a camera at the highest resolution it will actually
//! deliver, shows a horizontally mirrored live preview, and saves mirrored
//! still photos and video clips.
//!
//! ## Key Features
//!
//! - **Resolution negotiation**: probe the device's capability ceiling, then
//!   reopen it at that ceiling with a single relaxed retry
//! - **Mirrored output**: photos and recordings match what the preview shows
//! - **Resolution scanner**: check which common sizes a camera really grants
//! - **Theme preference**: `auto`, `light` or `dark`, persisted between runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mirrorcam::{CameraConfig, CameraController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut camera = CameraController::builder()
//!         .config(CameraConfig::default())
//!         .build()?;
//!
//!     camera.initialize().await?;
//!     if let Some(info) = camera.camera_info() {
//!         println!("{} at {}", info.label, info.resolution_label());
//!     }
//!
//!     camera.take_photo()?;
//!     camera.shutdown();
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export the types front ends work with
pub use mirrorcam_core::{CoreError, CoreResult, SystemAppearance, Theme, ThemeMode};
pub use mirrorcam_diagnostics::{init_logging, ScanOutcome, ScanResultEntry};
pub use mirrorcam_media::{
    CameraInfo, DeviceDescriptor, FinalizeHandle, MediaError, MediaResult, RecorderEvent,
    RecorderToggle, RecordingOutcome, SavedDownload, VideoResolution,
};

// Public API modules
pub mod config;
pub mod controller;
pub mod event;
pub mod shortcuts;

// Re-export main API types
pub use config::{CameraConfig, CeilingConfig, Dimensions};
pub use controller::{CameraController, CameraControllerBuilder};
pub use event::{ControllerEvent, EventStream};
pub use shortcuts::Shortcut;
