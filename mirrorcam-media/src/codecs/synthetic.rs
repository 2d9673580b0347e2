//! Deterministic in-process encoder
//!
//! Produces a byte stream that starts with the real container signature
//! (EBML header id for WebM, an `ftyp` box for MP4) followed by one small
//! record per frame. Failure modes can be programmed for tests.

use super::{CodecInfo, EncoderFactory, EncoderSettings, VideoEncoder};
use crate::error::{MediaError, MediaResult};
use crate::tracks::VideoFrame;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::sync::Arc;

/// EBML header element id, first four bytes of every WebM file
pub const WEBM_SIGNATURE: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Box type at offset 4 of every MP4 file
pub const MP4_BOX_TYPE: &[u8; 4] = b"ftyp";

const FRAME_RECORD_TAG: u8 = 0xA3;

fn container_header(mime_type: &str, settings: &EncoderSettings) -> Vec<u8> {
    let mut header = BytesMut::new();
    if mime_type.contains("mp4") {
        header.put_u32(16);
        header.put_slice(MP4_BOX_TYPE);
        header.put_slice(b"isom");
        header.put_u32(0x200);
    } else {
        header.put_slice(&WEBM_SIGNATURE);
    }
    header.put_u32(settings.width);
    header.put_u32(settings.height);
    header.to_vec()
}

/// Factory for [`SyntheticEncoder`]
#[derive(Debug)]
pub struct SyntheticEncoderFactory {
    supported: Vec<String>,
    fail_create: bool,
    fail_after_frames: Option<u64>,
    silent: bool,
    created: Mutex<Vec<EncoderSettings>>,
    encoded: Arc<Mutex<u64>>,
}

impl SyntheticEncoderFactory {
    /// Supports every default container type
    pub fn new() -> Self {
        Self::supporting(&super::DEFAULT_MIME_PREFERENCE)
    }

    pub fn supporting(types: &[&str]) -> Self {
        Self {
            supported: types.iter().map(|t| t.to_string()).collect(),
            fail_create: false,
            fail_after_frames: None,
            silent: false,
            created: Mutex::new(Vec::new()),
            encoded: Arc::new(Mutex::new(0)),
        }
    }

    /// Every `create` call fails
    pub fn failing_creation(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Encoders fail once `frames` frames have been accepted
    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after_frames = Some(frames);
        self
    }

    /// Encoders accept frames but never emit output
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Settings of every encoder created so far
    pub fn created(&self) -> Vec<EncoderSettings> {
        self.created.lock().clone()
    }

    /// Frames accepted across all encoders
    pub fn frames_encoded(&self) -> u64 {
        *self.encoded.lock()
    }
}

impl Default for SyntheticEncoderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderFactory for SyntheticEncoderFactory {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|t| t == mime_type)
    }

    fn create(&self, settings: &EncoderSettings) -> MediaResult<Box<dyn VideoEncoder>> {
        if self.fail_create || !self.is_type_supported(&settings.mime_type) {
            return Err(MediaError::EncoderCreation {
                mime_type: settings.mime_type.clone(),
                reason: "synthetic encoder refused".to_string(),
            });
        }
        self.created.lock().push(settings.clone());
        Ok(Box::new(SyntheticEncoder {
            settings: settings.clone(),
            pending: BytesMut::new(),
            frames: 0,
            header_written: false,
            fail_after_frames: self.fail_after_frames,
            silent: self.silent,
            encoded: self.encoded.clone(),
        }))
    }
}

/// Encoder created by [`SyntheticEncoderFactory`]
#[derive(Debug)]
pub struct SyntheticEncoder {
    settings: EncoderSettings,
    pending: BytesMut,
    frames: u64,
    header_written: bool,
    fail_after_frames: Option<u64>,
    silent: bool,
    encoded: Arc<Mutex<u64>>,
}

impl VideoEncoder for SyntheticEncoder {
    fn encode(&mut self, frame: &VideoFrame) -> MediaResult<()> {
        if self.fail_after_frames.is_some_and(|limit| self.frames >= limit) {
            return Err(MediaError::EncoderRuntime {
                reason: format!("synthetic failure after {} frames", self.frames),
            });
        }
        if (frame.width, frame.height) != (self.settings.width, self.settings.height) {
            return Err(MediaError::EncoderRuntime {
                reason: format!(
                    "frame {}x{} does not match encoder {}x{}",
                    frame.width, frame.height, self.settings.width, self.settings.height
                ),
            });
        }

        self.frames += 1;
        *self.encoded.lock() += 1;
        if self.silent {
            return Ok(());
        }
        if !self.header_written {
            self.pending
                .put_slice(&container_header(&self.settings.mime_type, &self.settings));
            self.header_written = true;
        }
        self.pending.put_u8(FRAME_RECORD_TAG);
        self.pending.put_u64(self.frames);
        Ok(())
    }

    fn flush(&mut self) -> MediaResult<Bytes> {
        Ok(self.pending.split().freeze())
    }

    fn finish(&mut self) -> MediaResult<Bytes> {
        self.flush()
    }

    fn codec_info(&self) -> CodecInfo {
        CodecInfo {
            name: "synthetic".to_string(),
            mime_type: self.settings.mime_type.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::{MIME_MP4, MIME_WEBM_VP9};

    fn settings(mime_type: &str) -> EncoderSettings {
        EncoderSettings {
            width: 4,
            height: 2,
            frame_rate: 30,
            mime_type: mime_type.to_string(),
        }
    }

    #[test]
    fn test_webm_stream_starts_with_signature() {
        let factory = SyntheticEncoderFactory::new();
        let mut encoder = factory.create(&settings(MIME_WEBM_VP9)).unwrap();
        assert!(encoder.flush().unwrap().is_empty());

        encoder.encode(&VideoFrame::solid(4, 2, [0; 4], 0)).unwrap();
        let out = encoder.flush().unwrap();
        assert_eq!(&out[..4], &WEBM_SIGNATURE);
    }

    #[test]
    fn test_mp4_stream_has_ftyp_box() {
        let factory = SyntheticEncoderFactory::new();
        let mut encoder = factory.create(&settings(MIME_MP4)).unwrap();
        encoder.encode(&VideoFrame::solid(4, 2, [0; 4], 0)).unwrap();
        let out = encoder.finish().unwrap();
        assert_eq!(&out[4..8], MP4_BOX_TYPE);
    }

    #[test]
    fn test_programmed_failures() {
        let factory = SyntheticEncoderFactory::new().failing_creation();
        assert!(matches!(
            factory.create(&settings(MIME_MP4)),
            Err(MediaError::EncoderCreation { .. })
        ));

        let factory = SyntheticEncoderFactory::new().failing_after(1);
        let mut encoder = factory.create(&settings(MIME_MP4)).unwrap();
        let frame = VideoFrame::solid(4, 2, [0; 4], 0);
        encoder.encode(&frame).unwrap();
        assert!(matches!(
            encoder.encode(&frame),
            Err(MediaError::EncoderRuntime { .. })
        ));
        assert_eq!(factory.frames_encoded(), 1);
    }
}
