//! Mirrored live preview
//!
//! [`LivePreview`] binds the active session track and hands mirrored frames
//! to an optional [`DisplaySurface`]. Rendered dimensions become known
//! ("metadata loaded") once the bound track has delivered its first frame.

use crate::devices::VideoResolution;
use crate::error::{MediaError, MediaResult};
use crate::tracks::{MediaTrack, VideoFrame};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where preview frames end up
pub trait DisplaySurface: Send + Sync {
    /// Show a (mirrored) frame
    fn present(&self, frame: &VideoFrame) -> MediaResult<()>;

    fn request_fullscreen(&self) -> MediaResult<()>;

    fn exit_fullscreen(&self) -> MediaResult<()>;

    fn is_fullscreen(&self) -> bool;
}

/// Display that keeps the last presented frame in memory
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    last: Mutex<Option<VideoFrame>>,
    presented: Mutex<u64>,
    fullscreen: Mutex<bool>,
    refuse_fullscreen: bool,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display whose fullscreen requests always fail
    pub fn refusing_fullscreen() -> Self {
        Self {
            refuse_fullscreen: true,
            ..Self::default()
        }
    }

    pub fn last_frame(&self) -> Option<VideoFrame> {
        self.last.lock().clone()
    }

    pub fn presented_count(&self) -> u64 {
        *self.presented.lock()
    }
}

impl DisplaySurface for HeadlessDisplay {
    fn present(&self, frame: &VideoFrame) -> MediaResult<()> {
        *self.last.lock() = Some(frame.clone());
        *self.presented.lock() += 1;
        Ok(())
    }

    fn request_fullscreen(&self) -> MediaResult<()> {
        if self.refuse_fullscreen {
            return Err(MediaError::Display {
                message: "fullscreen not allowed".to_string(),
            });
        }
        *self.fullscreen.lock() = true;
        Ok(())
    }

    fn exit_fullscreen(&self) -> MediaResult<()> {
        *self.fullscreen.lock() = false;
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        *self.fullscreen.lock()
    }
}

/// Live preview sink, always mirrored
#[derive(Default)]
pub struct LivePreview {
    track: Option<Arc<dyn MediaTrack>>,
    rendered: Option<VideoResolution>,
    display: Option<Arc<dyn DisplaySurface>>,
}

impl std::fmt::Debug for LivePreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivePreview")
            .field("track", &self.track.as_ref().map(|t| t.id().to_string()))
            .field("rendered", &self.rendered)
            .field("has_display", &self.display.is_some())
            .finish()
    }
}

impl LivePreview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_display(display: Arc<dyn DisplaySurface>) -> Self {
        Self {
            display: Some(display),
            ..Self::default()
        }
    }

    pub fn attach_display(&mut self, display: Arc<dyn DisplaySurface>) {
        self.display = Some(display);
    }

    /// Bind a new track; metadata must load again
    pub fn bind(&mut self, track: Arc<dyn MediaTrack>) {
        debug!(track = %track.id(), "Preview bound");
        self.track = Some(track);
        self.rendered = None;
    }

    pub fn unbind(&mut self) {
        self.track = None;
        self.rendered = None;
    }

    pub fn is_bound(&self) -> bool {
        self.track.is_some()
    }

    /// Load metadata if the bound track has produced a frame
    ///
    /// Returns the rendered dimensions once known.
    pub fn poll_metadata(&mut self) -> Option<VideoResolution> {
        if self.rendered.is_none() {
            if let Some(frame) = self.track.as_ref().and_then(|t| t.latest_frame()) {
                let resolution = frame.resolution();
                info!(rendered = %resolution, "Preview metadata loaded");
                self.rendered = Some(resolution);
            }
        }
        self.rendered
    }

    /// Rendered dimensions, `None` until metadata loads
    pub fn video_dimensions(&self) -> Option<VideoResolution> {
        self.rendered
    }

    /// Newest unmirrored frame from the bound track
    pub fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        self.track.as_ref()?.latest_frame()
    }

    /// Shared handle to the bound track, for background readers
    pub fn frame_source(&self) -> Option<Arc<dyn MediaTrack>> {
        self.track.clone()
    }

    /// Push the current mirrored frame to the display
    ///
    /// Returns `false` when there is nothing to show.
    pub fn present(&self) -> MediaResult<bool> {
        let (Some(display), Some(frame)) = (&self.display, self.current_frame()) else {
            return Ok(false);
        };
        display.present(&frame.mirrored()?)?;
        Ok(true)
    }

    /// Toggle fullscreen; failures are logged and leave the state unchanged
    pub fn toggle_fullscreen(&self) -> bool {
        let Some(display) = &self.display else {
            debug!("No display attached, ignoring fullscreen toggle");
            return false;
        };
        let result = if display.is_fullscreen() {
            display.exit_fullscreen()
        } else {
            display.request_fullscreen()
        };
        if let Err(e) = result {
            warn!("Fullscreen toggle failed: {}", e);
        }
        display.is_fullscreen()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.display.as_ref().is_some_and(|d| d.is_fullscreen())
    }
}
