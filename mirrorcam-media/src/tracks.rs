//! Track abstractions and video frame types

use crate::devices::VideoResolution;
use crate::error::{MediaError, MediaResult};
use image::{imageops, RgbaImage};
use std::sync::Arc;

/// Video frame representation (packed RGBA, 8 bits per channel)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel data, row-major RGBA
    pub data: Vec<u8>,
    /// Timestamp in milliseconds
    pub timestamp: u64,
}

impl VideoFrame {
    /// Bytes per RGBA pixel
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Create a frame, validating the buffer length
    pub fn new(width: u32, height: u32, data: Vec<u8>, timestamp: u64) -> MediaResult<Self> {
        let expected = width as usize * height as usize * Self::BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
            timestamp,
        })
    }

    /// Frame filled with a single color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4], timestamp: u64) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * Self::BYTES_PER_PIXEL)
            .collect();
        Self {
            width,
            height,
            data,
            timestamp,
        }
    }

    /// Wrap an RGBA image
    pub fn from_image(image: RgbaImage, timestamp: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
            timestamp,
        }
    }

    /// Copy into an RGBA image
    pub fn to_image(&self) -> MediaResult<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            MediaError::InvalidFrameData {
                expected: self.width as usize * self.height as usize * Self::BYTES_PER_PIXEL,
                actual: self.data.len(),
            },
        )
    }

    /// Frame dimensions
    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width, self.height)
    }

    /// RGBA value at `(x, y)`, `None` outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * Self::BYTES_PER_PIXEL;
        let px = self.data.get(offset..offset + Self::BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Horizontally flipped copy
    pub fn mirrored(&self) -> MediaResult<Self> {
        let flipped = imageops::flip_horizontal(&self.to_image()?);
        Ok(Self::from_image(flipped, self.timestamp))
    }
}

/// Settings a track was actually opened with
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSettings {
    /// Negotiated device identity
    pub device_id: String,
    /// Negotiated width in pixels
    pub width: u32,
    /// Negotiated height in pixels
    pub height: u32,
    /// Negotiated frame rate, when reported
    pub frame_rate: Option<f64>,
}

impl TrackSettings {
    /// Negotiated resolution
    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width, self.height)
    }
}

/// Inclusive min/max range reported by a device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange<T> {
    /// Lower bound
    pub min: T,
    /// Upper bound
    pub max: T,
}

impl<T> ValueRange<T> {
    /// Create a range
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

/// Capability ranges exposed by a track (any may be absent)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackCapabilities {
    /// Supported widths
    pub width: Option<ValueRange<u32>>,
    /// Supported heights
    pub height: Option<ValueRange<u32>>,
    /// Supported frame rates
    pub frame_rate: Option<ValueRange<f64>>,
}

/// A live hardware (or synthetic) video track
pub trait MediaTrack: Send + Sync + std::fmt::Debug {
    /// Track identifier
    fn id(&self) -> &str;

    /// Human-readable device label (may be empty)
    fn label(&self) -> &str;

    /// Negotiated settings
    fn settings(&self) -> TrackSettings;

    /// Capability ranges, `None` when introspection is unsupported
    fn capabilities(&self) -> Option<TrackCapabilities>;

    /// Most recent frame, `None` until the first frame arrives or after stop
    fn latest_frame(&self) -> Option<Arc<VideoFrame>>;

    /// Release the hardware; idempotent
    fn stop(&self);

    /// Whether the track is still delivering
    fn is_live(&self) -> bool;
}

/// A set of tracks returned by one acquisition request
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl MediaStream {
    /// Create a stream from tracks
    pub fn new(tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    /// Stream identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All tracks
    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    /// First video track
    pub fn video_track(&self) -> Option<&Arc<dyn MediaTrack>> {
        self.tracks.first()
    }

    /// Stop every track of this stream
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// Whether any track is still live
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }
}
