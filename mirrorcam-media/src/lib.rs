//! # MirrorCam Media
//!
//! Camera access, resolution negotiation, mirrored preview, photo capture and
//! recording for MirrorCam. Hardware, display, encoders and file output are
//! reached through traits ([`MediaDevices`], [`DisplaySurface`],
//! [`EncoderFactory`], [`DownloadSink`]) so every pipeline can run against
//! the synthetic backends in tests.

#![warn(clippy::all)]

pub mod capture;
pub mod codecs;
pub mod devices;
pub mod download;
pub mod error;
pub mod media_recorder;
pub mod negotiation;
pub mod photo;
pub mod preview;
pub mod recorder;
pub mod session;
pub mod surface;
pub mod tracks;

// Re-export main types
pub use capture::{default_media_devices, ConstraintPolicy, SyntheticCamera, SyntheticDevices};
pub use codecs::{
    container_extension, select_mime_type, CodecInfo, EncoderFactory, EncoderSettings,
    FfmpegEncoderFactory, SyntheticEncoderFactory, VideoEncoder, DEFAULT_MIME_PREFERENCE,
    MIME_MP4, MIME_WEBM, MIME_WEBM_VP9,
};
pub use devices::{
    ConstrainValue, DeviceDescriptor, DeviceKind, MediaConstraints, MediaDevices, VideoResolution,
};
pub use download::{
    timestamped_filename, Blob, DirectoryDownloadSink, DownloadHandle, DownloadSink,
    MemoryDownloadSink, SavedDownload,
};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use media_recorder::{MediaRecorder, RecorderSignal, RecorderState, SurfaceStream};
pub use negotiation::{
    negotiate, open_best_stream, probe_capabilities, CapabilityCeiling, NegotiationConfig,
    ProbeResult,
};
pub use photo::capture_photo;
pub use preview::{DisplaySurface, HeadlessDisplay, LivePreview};
pub use recorder::{
    format_elapsed, FinalizeHandle, MirroredRecorder, RecorderConfig, RecorderEvent,
    RecorderToggle, RecordingOutcome,
};
pub use session::{CameraInfo, CaptureSession};
pub use surface::Surface;
pub use tracks::{MediaStream, MediaTrack, TrackCapabilities, TrackSettings, ValueRange, VideoFrame};
