//! Mirrored still capture

use crate::download::{timestamped_filename, Blob, DownloadSink, SavedDownload};
use crate::error::MediaResult;
use crate::preview::LivePreview;
use crate::surface::Surface;
use chrono::{DateTime, Local};
use tracing::{debug, info};

pub const PHOTO_MIME_TYPE: &str = "image/png";

/// Save the current preview frame, mirrored, as a PNG
///
/// Does nothing (`Ok(None)`) until the preview has loaded metadata and has a
/// frame to copy.
pub fn capture_photo(
    preview: &LivePreview,
    sink: &dyn DownloadSink,
    at: DateTime<Local>,
) -> MediaResult<Option<SavedDownload>> {
    let Some(dimensions) = preview.video_dimensions() else {
        debug!("Photo skipped, preview metadata not loaded");
        return Ok(None);
    };
    let Some(frame) = preview.current_frame() else {
        debug!("Photo skipped, no frame available");
        return Ok(None);
    };

    let mut scratch = Surface::new(dimensions)?;
    scratch.draw_mirrored(&frame)?;
    let blob = Blob::new(PHOTO_MIME_TYPE, scratch.encode_png()?);

    let filename = timestamped_filename("photo", "png", &at);
    let handle = sink.save(&filename, &blob)?;
    sink.release(handle);

    info!(file = %filename, size = blob.len(), "Photo captured");
    Ok(Some(SavedDownload {
        filename,
        size: blob.len(),
        mime_type: blob.mime_type,
    }))
}
