//! Device enumeration and stream acquisition
//!
//! [`MediaDevices`] is the seam to camera hardware: it lists devices and
//! opens streams against a [`MediaConstraints`] set. Width, height and frame
//! rate can each be requested as a hard (`Exact`) or soft (`Ideal`) value.

use crate::error::MediaResult;
use crate::tracks::MediaStream;
use async_trait::async_trait;
use std::fmt;

/// Video resolution information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoResolution {
    pub width: u32,
    pub height: u32,
}

impl VideoResolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const HD: Self = Self::new(1280, 720);
    pub const FULL_HD: Self = Self::new(1920, 1080);
    pub const VGA: Self = Self::new(640, 480);

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for VideoResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Kind of media device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// Device descriptor as reported by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Opaque, stable identifier
    pub device_id: String,
    /// Human-readable label (empty before permission is granted on some platforms)
    pub label: String,
    /// Device kind
    pub kind: DeviceKind,
}

impl DeviceDescriptor {
    pub fn video_input(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            kind: DeviceKind::VideoInput,
        }
    }

    /// Label for menus; unlabeled devices show as `Camera N` (1-based)
    pub fn display_label(&self, index: usize) -> String {
        if self.label.trim().is_empty() {
            format!("Camera {}", index + 1)
        } else {
            self.label.clone()
        }
    }
}

/// Hard or soft constraint value
#[derive(Debug, Clone, PartialEq)]
pub enum ConstrainValue<T> {
    /// Must be met exactly or the request fails
    Exact(T),
    /// Best effort; the platform picks the closest supported value
    Ideal(T),
}

impl<T> ConstrainValue<T> {
    pub fn value(&self) -> &T {
        match self {
            ConstrainValue::Exact(v) | ConstrainValue::Ideal(v) => v,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, ConstrainValue::Exact(_))
    }
}

/// Constraint set for a video stream request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaConstraints {
    pub device_id: Option<ConstrainValue<String>>,
    pub width: Option<ConstrainValue<u32>>,
    pub height: Option<ConstrainValue<u32>>,
    pub frame_rate: Option<ConstrainValue<f64>>,
}

impl MediaConstraints {
    /// Constraint set pinned to one device (or any device when `None`)
    pub fn for_device(device_id: Option<&str>) -> Self {
        Self {
            device_id: device_id.map(|id| ConstrainValue::Exact(id.to_string())),
            ..Self::default()
        }
    }

    pub fn exact_resolution(mut self, resolution: VideoResolution) -> Self {
        self.width = Some(ConstrainValue::Exact(resolution.width));
        self.height = Some(ConstrainValue::Exact(resolution.height));
        self
    }

    pub fn ideal_resolution(mut self, resolution: VideoResolution) -> Self {
        self.width = Some(ConstrainValue::Ideal(resolution.width));
        self.height = Some(ConstrainValue::Ideal(resolution.height));
        self
    }

    pub fn ideal_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = Some(ConstrainValue::Ideal(frame_rate));
        self
    }

    /// Requested device identity, if any
    pub fn requested_device(&self) -> Option<&str> {
        self.device_id.as_ref().map(|c| c.value().as_str())
    }

    /// Whether any dimension is a hard constraint
    pub fn has_exact_resolution(&self) -> bool {
        self.width.as_ref().is_some_and(ConstrainValue::is_exact)
            || self.height.as_ref().is_some_and(ConstrainValue::is_exact)
    }
}

/// Platform media device access
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Open a stream satisfying `constraints`
    async fn get_user_media(&self, constraints: &MediaConstraints) -> MediaResult<MediaStream>;

    /// List all media devices
    async fn enumerate_devices(&self) -> MediaResult<Vec<DeviceDescriptor>>;

    /// List video input devices only
    async fn video_inputs(&self) -> MediaResult<Vec<DeviceDescriptor>> {
        Ok(self
            .enumerate_devices()
            .await?
            .into_iter()
            .filter(|d| d.kind == DeviceKind::VideoInput)
            .collect())
    }
}
