//! Active capture session and its read-only info snapshot

use crate::devices::VideoResolution;
use crate::negotiation::ProbeResult;
use crate::tracks::{MediaStream, MediaTrack, TrackCapabilities, TrackSettings};
use std::sync::Arc;
use tracing::info;

/// One negotiated, live camera stream
#[derive(Debug)]
pub struct CaptureSession {
    stream: MediaStream,
    track: Arc<dyn MediaTrack>,
    probe: Option<ProbeResult>,
}

impl CaptureSession {
    /// Wrap a stream; `None` when it carries no video track
    pub fn from_stream(stream: MediaStream, probe: Option<ProbeResult>) -> Option<Self> {
        let track = stream.video_track()?.clone();
        Some(Self {
            stream,
            track,
            probe,
        })
    }

    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    /// Track the preview and recorder read frames from
    pub fn frame_source(&self) -> Arc<dyn MediaTrack> {
        self.track.clone()
    }

    pub fn settings(&self) -> TrackSettings {
        self.track.settings()
    }

    /// Capability ranges from the live track, else from the probe
    pub fn capabilities(&self) -> Option<TrackCapabilities> {
        self.track
            .capabilities()
            .or_else(|| self.probe.as_ref().and_then(|p| p.capabilities.clone()))
    }

    pub fn device_id(&self) -> String {
        self.track.settings().device_id
    }

    pub fn label(&self) -> &str {
        self.track.label()
    }

    pub fn probe(&self) -> Option<&ProbeResult> {
        self.probe.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.stream.is_active()
    }

    /// Stop every track; idempotent
    pub fn stop(&self) {
        if self.stream.is_active() {
            info!(device = %self.device_id(), "Stopping capture session");
        }
        self.stream.stop_all();
    }
}

/// Snapshot of what the camera is doing, for display
#[derive(Debug, Clone, PartialEq)]
pub struct CameraInfo {
    pub device_id: String,
    pub label: String,
    pub settings: TrackSettings,
    pub capabilities: Option<TrackCapabilities>,
    /// Dimensions the preview actually renders, once known
    pub rendered: Option<VideoResolution>,
}

impl CameraInfo {
    pub fn from_session(session: &CaptureSession) -> Self {
        let settings = session.settings();
        Self {
            device_id: settings.device_id.clone(),
            label: session.label().to_string(),
            settings,
            capabilities: session.capabilities(),
            rendered: None,
        }
    }

    pub fn with_rendered(mut self, rendered: Option<VideoResolution>) -> Self {
        self.rendered = rendered;
        self
    }

    /// Negotiated `WxH`
    pub fn resolution_label(&self) -> String {
        self.settings.resolution().to_string()
    }

    /// Negotiated frame rate, `N/A` when unknown
    pub fn frame_rate_label(&self) -> String {
        match self.settings.frame_rate {
            Some(fps) => format!("{} fps", fps.round() as u32),
            None => "N/A".to_string(),
        }
    }

    /// Rendered `WxH`, `N/A` before metadata loads
    pub fn rendered_label(&self) -> String {
        self.rendered
            .map(|r| r.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{SyntheticCamera, SyntheticDevices};
    use crate::devices::{MediaConstraints, MediaDevices};

    async fn open(devices: &SyntheticDevices) -> CaptureSession {
        let stream = devices
            .get_user_media(&MediaConstraints::for_device(Some("cam")))
            .await
            .unwrap();
        CaptureSession::from_stream(stream, None).unwrap()
    }

    #[tokio::test]
    async fn test_session_stop_releases_track() {
        let devices = SyntheticDevices::single(SyntheticCamera::new(
            "cam",
            "Desk Cam",
            VideoResolution::HD,
        ));
        let session = open(&devices).await;
        assert!(session.is_live());
        assert_eq!(session.label(), "Desk Cam");

        session.stop();
        session.stop();
        assert!(!session.is_live());
        assert_eq!(devices.live_track_count(), 0);
    }

    #[tokio::test]
    async fn test_info_labels() {
        let devices = SyntheticDevices::single(SyntheticCamera::new(
            "cam",
            "Desk Cam",
            VideoResolution::HD,
        ));
        let session = open(&devices).await;
        let mut info = CameraInfo::from_session(&session);

        assert_eq!(info.resolution_label(), "640x480");
        assert_eq!(info.frame_rate_label(), "30 fps");
        assert_eq!(info.rendered_label(), "N/A");

        info.settings.frame_rate = None;
        assert_eq!(info.frame_rate_label(), "N/A");

        let info = info.with_rendered(Some(VideoResolution::HD));
        assert_eq!(info.rendered_label(), "1280x720");
    }
}
