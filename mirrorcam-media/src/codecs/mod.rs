//! Video encoder interfaces
//!
//! The recorder only talks to [`EncoderFactory`] and [`VideoEncoder`]. An
//! encoder accepts raw RGBA frames and produces container bytes that can be
//! drained incrementally ([`VideoEncoder::flush`]) and completed on stop
//! ([`VideoEncoder::finish`]). Concatenating every drained fragment in order
//! yields a playable file.

pub mod ffmpeg;
pub mod synthetic;

use crate::error::MediaResult;
use crate::tracks::VideoFrame;
use bytes::Bytes;

pub use ffmpeg::{FfmpegEncoder, FfmpegEncoderFactory};
pub use synthetic::{SyntheticEncoder, SyntheticEncoderFactory};

/// WebM with VP9
pub const MIME_WEBM_VP9: &str = "video/webm;codecs=vp9";
/// WebM, encoder's choice of codec
pub const MIME_WEBM: &str = "video/webm";
/// Fragmented MP4
pub const MIME_MP4: &str = "video/mp4";

/// Default container preference, most preferred first
pub const DEFAULT_MIME_PREFERENCE: [&str; 3] = [MIME_WEBM_VP9, MIME_WEBM, MIME_MP4];

/// First supported entry of `preference`, else its last entry
pub fn select_mime_type(factory: &dyn EncoderFactory, preference: &[String]) -> String {
    preference
        .iter()
        .find(|mime| factory.is_type_supported(mime))
        .or_else(|| preference.last())
        .cloned()
        .unwrap_or_else(|| MIME_WEBM.to_string())
}

/// File extension for a container MIME type
pub fn container_extension(mime_type: &str) -> &'static str {
    if mime_type.contains("mp4") {
        "mp4"
    } else {
        "webm"
    }
}

/// Encoder construction parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub mime_type: String,
}

/// Codec information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecInfo {
    /// Codec name
    pub name: String,
    /// MIME type
    pub mime_type: String,
}

/// Streaming video encoder
pub trait VideoEncoder: Send + std::fmt::Debug {
    /// Queue one RGBA frame
    fn encode(&mut self, frame: &VideoFrame) -> MediaResult<()>;

    /// Drain output produced since the last drain (may be empty)
    fn flush(&mut self) -> MediaResult<Bytes>;

    /// Close the stream and return the remaining output
    ///
    /// May block while the encoder drains; call from a blocking context.
    fn finish(&mut self) -> MediaResult<Bytes>;

    fn codec_info(&self) -> CodecInfo;
}

/// Creates encoders for supported container types
pub trait EncoderFactory: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn create(&self, settings: &EncoderSettings) -> MediaResult<Box<dyn VideoEncoder>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> Vec<String> {
        DEFAULT_MIME_PREFERENCE.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_first_supported() {
        let factory = SyntheticEncoderFactory::supporting(&[MIME_WEBM, MIME_MP4]);
        assert_eq!(select_mime_type(&factory, &prefs()), MIME_WEBM);
    }

    #[test]
    fn test_select_falls_back_to_last() {
        let factory = SyntheticEncoderFactory::supporting(&[]);
        assert_eq!(select_mime_type(&factory, &prefs()), MIME_MP4);
    }

    #[test]
    fn test_container_extension() {
        assert_eq!(container_extension(MIME_WEBM_VP9), "webm");
        assert_eq!(container_extension("video/mp4;codecs=avc1"), "mp4");
        assert_eq!(container_extension("video/x-matroska"), "webm");
    }
}
