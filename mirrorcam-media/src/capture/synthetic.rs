//! Synthetic camera backend
//!
//! Virtual cameras that produce a deterministic test pattern and apply
//! constraints the way a platform would. Used by the test-suite and as the
//! fallback backend when native capture is not compiled in. Every request is
//! logged so callers can assert on the exact negotiation sequence.

use crate::devices::{
    ConstrainValue, DeviceDescriptor, MediaConstraints, MediaDevices, VideoResolution,
};
use crate::error::{MediaError, MediaResult};
use crate::tracks::{
    MediaStream, MediaTrack, TrackCapabilities, TrackSettings, ValueRange, VideoFrame,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// How a synthetic camera reacts to an out-of-range `Exact` dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstraintPolicy {
    /// Fail the request with [`MediaError::Overconstrained`]
    #[default]
    Reject,
    /// Silently grant the nearest supported value
    Clamp,
}

/// Virtual camera description
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    pub device_id: String,
    pub label: String,
    pub min_resolution: VideoResolution,
    pub max_resolution: VideoResolution,
    /// Resolution granted when no size is requested
    pub default_resolution: VideoResolution,
    pub max_frame_rate: f64,
    /// Maximum advertised through capabilities, when it differs from reality
    pub reported_max: Option<VideoResolution>,
    pub report_capabilities: bool,
    pub policy: ConstraintPolicy,
    pub deliver_frames: bool,
}

impl SyntheticCamera {
    pub fn new(
        device_id: impl Into<String>,
        label: impl Into<String>,
        max_resolution: VideoResolution,
    ) -> Self {
        let default_resolution = VideoResolution::new(
            VideoResolution::VGA.width.min(max_resolution.width),
            VideoResolution::VGA.height.min(max_resolution.height),
        );
        Self {
            device_id: device_id.into(),
            label: label.into(),
            min_resolution: VideoResolution::new(1, 1),
            max_resolution,
            default_resolution,
            max_frame_rate: 30.0,
            reported_max: None,
            report_capabilities: true,
            policy: ConstraintPolicy::Reject,
            deliver_frames: true,
        }
    }

    pub fn with_policy(mut self, policy: ConstraintPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_frame_rate(mut self, frame_rate: f64) -> Self {
        self.max_frame_rate = frame_rate;
        self
    }

    pub fn with_default_resolution(mut self, resolution: VideoResolution) -> Self {
        self.default_resolution = resolution;
        self
    }

    /// Advertise a larger maximum than the sensor can actually deliver
    pub fn reporting_max(mut self, resolution: VideoResolution) -> Self {
        self.reported_max = Some(resolution);
        self
    }

    pub fn without_capabilities(mut self) -> Self {
        self.report_capabilities = false;
        self
    }

    pub fn without_frames(mut self) -> Self {
        self.deliver_frames = false;
        self
    }

    fn capabilities(&self) -> Option<TrackCapabilities> {
        if !self.report_capabilities {
            return None;
        }
        let max = self.reported_max.unwrap_or(self.max_resolution);
        Some(TrackCapabilities {
            width: Some(ValueRange::new(self.min_resolution.width, max.width)),
            height: Some(ValueRange::new(self.min_resolution.height, max.height)),
            frame_rate: Some(ValueRange::new(1.0, self.max_frame_rate)),
        })
    }

    fn resolve_dimension(
        &self,
        name: &str,
        requested: Option<&ConstrainValue<u32>>,
        default: u32,
        min: u32,
        max: u32,
    ) -> MediaResult<u32> {
        match requested {
            None => Ok(default.clamp(min, max)),
            Some(ConstrainValue::Ideal(value)) => Ok((*value).clamp(min, max)),
            Some(ConstrainValue::Exact(value)) => {
                if (min..=max).contains(value) {
                    Ok(*value)
                } else {
                    match self.policy {
                        ConstraintPolicy::Reject => Err(MediaError::Overconstrained {
                            constraint: name.to_string(),
                            message: format!(
                                "{} {} outside supported range {}..={}",
                                name, value, min, max
                            ),
                        }),
                        ConstraintPolicy::Clamp => Ok((*value).clamp(min, max)),
                    }
                }
            }
        }
    }
}

#[derive(Debug)]
struct DeviceState {
    permission_granted: bool,
    requests: Vec<MediaConstraints>,
    live_tracks: Vec<Arc<SyntheticTrack>>,
    peak_live: usize,
}

/// Synthetic [`MediaDevices`] implementation
#[derive(Debug)]
pub struct SyntheticDevices {
    cameras: Vec<SyntheticCamera>,
    state: Mutex<DeviceState>,
}

impl SyntheticDevices {
    pub fn new(cameras: Vec<SyntheticCamera>) -> Self {
        Self {
            cameras,
            state: Mutex::new(DeviceState {
                permission_granted: true,
                requests: Vec::new(),
                live_tracks: Vec::new(),
                peak_live: 0,
            }),
        }
    }

    /// Single camera backend
    pub fn single(camera: SyntheticCamera) -> Self {
        Self::new(vec![camera])
    }

    pub fn cameras(&self) -> &[SyntheticCamera] {
        &self.cameras
    }

    /// Grant or revoke capture permission
    pub fn set_permission(&self, granted: bool) {
        self.state.lock().permission_granted = granted;
    }

    /// Every constraint set requested so far, in order
    pub fn requests(&self) -> Vec<MediaConstraints> {
        self.state.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    /// Tracks not yet stopped
    pub fn live_track_count(&self) -> usize {
        let mut state = self.state.lock();
        state.live_tracks.retain(|t| t.is_live());
        state.live_tracks.len()
    }

    /// Highest number of simultaneously live tracks ever observed
    pub fn peak_live_tracks(&self) -> usize {
        self.state.lock().peak_live
    }

    fn select_camera(&self, constraints: &MediaConstraints) -> MediaResult<&SyntheticCamera> {
        let first = self.cameras.first().ok_or(MediaError::NoDevices)?;
        match &constraints.device_id {
            None => Ok(first),
            Some(ConstrainValue::Ideal(id)) => Ok(self
                .cameras
                .iter()
                .find(|c| &c.device_id == id)
                .unwrap_or(first)),
            Some(ConstrainValue::Exact(id)) => self
                .cameras
                .iter()
                .find(|c| &c.device_id == id)
                .ok_or_else(|| MediaError::DeviceNotFound {
                    device_id: id.clone(),
                }),
        }
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::single(SyntheticCamera::new(
            "synthetic-0",
            "Synthetic Camera",
            VideoResolution::FULL_HD,
        ))
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> MediaResult<MediaStream> {
        let mut state = self.state.lock();
        state.requests.push(constraints.clone());

        if !state.permission_granted {
            return Err(MediaError::PermissionDenied {
                operation: "camera access".to_string(),
            });
        }

        let camera = self.select_camera(constraints)?;
        let width = camera.resolve_dimension(
            "width",
            constraints.width.as_ref(),
            camera.default_resolution.width,
            camera.min_resolution.width,
            camera.max_resolution.width,
        )?;
        let height = camera.resolve_dimension(
            "height",
            constraints.height.as_ref(),
            camera.default_resolution.height,
            camera.min_resolution.height,
            camera.max_resolution.height,
        )?;
        let frame_rate = constraints
            .frame_rate
            .as_ref()
            .map(|c| *c.value())
            .unwrap_or(30.0)
            .clamp(1.0, camera.max_frame_rate);

        let settings = TrackSettings {
            device_id: camera.device_id.clone(),
            width,
            height,
            frame_rate: Some(frame_rate),
        };
        debug!(
            device = %camera.device_id,
            granted = %settings.resolution(),
            "Synthetic stream opened"
        );

        let track = Arc::new(SyntheticTrack::new(camera, settings));
        state.live_tracks.retain(|t| t.is_live());
        state.live_tracks.push(track.clone());
        state.peak_live = state.peak_live.max(state.live_tracks.len());

        Ok(MediaStream::new(vec![track as Arc<dyn MediaTrack>]))
    }

    async fn enumerate_devices(&self) -> MediaResult<Vec<DeviceDescriptor>> {
        let labels_visible = self.state.lock().permission_granted;
        Ok(self
            .cameras
            .iter()
            .map(|c| {
                let label = if labels_visible { c.label.clone() } else { String::new() };
                DeviceDescriptor::video_input(c.device_id.clone(), label)
            })
            .collect())
    }
}

/// Track produced by [`SyntheticDevices`]
#[derive(Debug)]
pub struct SyntheticTrack {
    id: String,
    label: String,
    settings: TrackSettings,
    capabilities: Option<TrackCapabilities>,
    deliver_frames: bool,
    live: AtomicBool,
    frame: Mutex<Option<Arc<VideoFrame>>>,
}

impl SyntheticTrack {
    fn new(camera: &SyntheticCamera, settings: TrackSettings) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: camera.label.clone(),
            settings,
            capabilities: camera.capabilities(),
            deliver_frames: camera.deliver_frames,
            live: AtomicBool::new(true),
            frame: Mutex::new(None),
        }
    }
}

/// Deterministic gradient: red grows left to right, green top to bottom
pub fn test_pattern(width: u32, height: u32, timestamp: u64) -> VideoFrame {
    let scale = |v: u32, extent: u32| -> u8 {
        if extent <= 1 {
            0
        } else {
            (v as u64 * 255 / (extent as u64 - 1)) as u8
        }
    };
    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        let g = scale(y, height);
        for x in 0..width {
            data.extend_from_slice(&[scale(x, width), g, 0x40, 0xFF]);
        }
    }
    VideoFrame {
        width,
        height,
        data,
        timestamp,
    }
}

impl MediaTrack for SyntheticTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn settings(&self) -> TrackSettings {
        self.settings.clone()
    }

    fn capabilities(&self) -> Option<TrackCapabilities> {
        self.capabilities.clone()
    }

    fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        if !self.deliver_frames || !self.is_live() {
            return None;
        }
        let mut frame = self.frame.lock();
        let frame = frame.get_or_insert_with(|| {
            Arc::new(test_pattern(self.settings.width, self.settings.height, 0))
        });
        Some(frame.clone())
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::AcqRel) {
            debug!(track = %self.id, "Synthetic track stopped");
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}
