//! Controller events

use mirrorcam_core::{Theme, ThemeMode};
use mirrorcam_diagnostics::ScanResultEntry;
use mirrorcam_media::{CameraInfo, DeviceDescriptor, RecorderEvent, SavedDownload, VideoResolution};
use tokio::sync::broadcast;
use tracing::warn;

/// Everything the controller reports to its front end
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// Video input list was refreshed
    DevicesChanged {
        /// Current video inputs
        devices: Vec<DeviceDescriptor>,
    },
    /// A capture session became active
    CameraStarted {
        /// Snapshot of the new session
        info: CameraInfo,
    },
    /// The capture session was stopped
    CameraStopped,
    /// The preview saw its first frame
    MetadataLoaded {
        /// Rendered dimensions
        rendered: VideoResolution,
    },
    /// A user-visible error message was set
    Error {
        /// Message as shown to the user
        message: String,
    },
    /// A photo was written
    PhotoSaved(SavedDownload),
    /// Forwarded recorder notification
    Recorder(RecorderEvent),
    /// Theme mode or applied theme changed
    ThemeChanged {
        /// Selected mode
        mode: ThemeMode,
        /// Theme now applied
        applied: Theme,
    },
    /// Fullscreen state changed
    FullscreenChanged {
        /// Whether the preview is now fullscreen
        fullscreen: bool,
    },
    /// A resolution scan finished
    ScanCompleted {
        /// Scan report, in candidate order
        results: Vec<ScanResultEntry>,
    },
}

impl ControllerEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            ControllerEvent::DevicesChanged { .. } => "devices_changed",
            ControllerEvent::CameraStarted { .. } => "camera_started",
            ControllerEvent::CameraStopped => "camera_stopped",
            ControllerEvent::MetadataLoaded { .. } => "metadata_loaded",
            ControllerEvent::Error { .. } => "error",
            ControllerEvent::PhotoSaved(_) => "photo_saved",
            ControllerEvent::Recorder(_) => "recorder",
            ControllerEvent::ThemeChanged { .. } => "theme_changed",
            ControllerEvent::FullscreenChanged { .. } => "fullscreen_changed",
            ControllerEvent::ScanCompleted { .. } => "scan_completed",
        }
    }

    /// Check if this is a camera lifecycle event
    pub fn is_camera_event(&self) -> bool {
        matches!(
            self,
            ControllerEvent::DevicesChanged { .. }
                | ControllerEvent::CameraStarted { .. }
                | ControllerEvent::CameraStopped
                | ControllerEvent::MetadataLoaded { .. }
        )
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(
            self,
            ControllerEvent::Error { .. }
                | ControllerEvent::Recorder(RecorderEvent::EncoderFailed { .. })
                | ControllerEvent::Recorder(RecorderEvent::SaveFailed { .. })
        )
    }
}

/// Stream of controller events for async iteration
///
/// A slow reader that falls behind skips the events it missed.
#[derive(Debug)]
pub struct EventStream {
    receiver: broadcast::Receiver<ControllerEvent>,
}

impl EventStream {
    /// Wrap a broadcast receiver
    pub fn new(receiver: broadcast::Receiver<ControllerEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event; `None` once the controller is gone
    pub async fn next(&mut self) -> Option<ControllerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to get the next event without waiting
    pub fn try_next(&mut self) -> Option<ControllerEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Drain everything currently queued
    pub fn drain(&mut self) -> Vec<ControllerEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}
