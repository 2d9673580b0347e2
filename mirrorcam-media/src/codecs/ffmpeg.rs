//! WebM/MP4 encoding through an FFmpeg child process
//!
//! Raw RGBA frames are piped to FFmpeg's stdin by a writer thread and the
//! muxed container is read from stdout by a reader thread, so `encode` and
//! `flush` never block the recorder. MP4 output is fragmented so it can be
//! streamed through a pipe.

use super::{
    CodecInfo, EncoderFactory, EncoderSettings, VideoEncoder, MIME_MP4, MIME_WEBM, MIME_WEBM_VP9,
};
use crate::error::{MediaError, MediaResult};
use crate::tracks::VideoFrame;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Raw frames allowed to wait for the ffmpeg writer before new ones are dropped
const FRAME_QUEUE_DEPTH: usize = 8;

/// Test whether `path` is a working ffmpeg binary
fn test_ffmpeg_binary(path: &Path) -> bool {
    Command::new(path)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn find_in_system_path(binary: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Locate ffmpeg: the sidecar location first, then `PATH`
pub fn find_ffmpeg() -> Option<PathBuf> {
    let sidecar_path = ffmpeg_sidecar::paths::ffmpeg_path();
    if test_ffmpeg_binary(&sidecar_path) {
        debug!(path = %sidecar_path.display(), "Using sidecar ffmpeg");
        return Some(sidecar_path);
    }

    let binary = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
    let path = find_in_system_path(binary).filter(|p| test_ffmpeg_binary(p));
    if path.is_none() {
        warn!("No working ffmpeg found");
    }
    path
}

fn list_encoders(ffmpeg: &Path) -> Vec<String> {
    let output = match Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            warn!("Listing ffmpeg encoders failed: {}", e);
            return Vec::new();
        }
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let flags = fields.next()?;
            let name = fields.next()?;
            flags.starts_with('V').then(|| name.to_string())
        })
        .collect()
}

/// Output muxer and codec arguments for one container type
#[derive(Debug, Clone, PartialEq, Eq)]
struct OutputProfile {
    codec: &'static str,
    format: &'static str,
}

/// [`EncoderFactory`] backed by an ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegEncoderFactory {
    ffmpeg: PathBuf,
    encoders: Vec<String>,
}

impl FfmpegEncoderFactory {
    /// Find ffmpeg and query its video encoders; `None` if ffmpeg is missing
    pub fn detect() -> Option<Self> {
        find_ffmpeg().map(Self::with_path)
    }

    pub fn with_path(ffmpeg: impl Into<PathBuf>) -> Self {
        let ffmpeg = ffmpeg.into();
        let encoders = list_encoders(&ffmpeg);
        info!(
            path = %ffmpeg.display(),
            encoders = encoders.len(),
            "FFmpeg encoder factory ready"
        );
        Self { ffmpeg, encoders }
    }

    fn has(&self, encoder: &str) -> bool {
        self.encoders.iter().any(|e| e == encoder)
    }

    fn profile(&self, mime_type: &str) -> Option<OutputProfile> {
        let pick = |candidates: &[&'static str], format: &'static str| {
            candidates
                .iter()
                .find(|c| self.has(c))
                .map(|codec| OutputProfile {
                    codec: *codec,
                    format,
                })
        };
        match mime_type {
            MIME_WEBM_VP9 => pick(&["libvpx-vp9"], "webm"),
            MIME_WEBM => pick(&["libvpx-vp9", "libvpx"], "webm"),
            MIME_MP4 => pick(&["libx264", "mpeg4"], "mp4"),
            _ => None,
        }
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.profile(mime_type).is_some()
    }

    fn create(&self, settings: &EncoderSettings) -> MediaResult<Box<dyn VideoEncoder>> {
        let profile = self
            .profile(&settings.mime_type)
            .ok_or_else(|| MediaError::EncoderCreation {
                mime_type: settings.mime_type.clone(),
                reason: "no matching ffmpeg encoder".to_string(),
            })?;
        let encoder = FfmpegEncoder::spawn(&self.ffmpeg, settings, &profile)?;
        Ok(Box::new(encoder))
    }
}

fn build_args(settings: &EncoderSettings, profile: &OutputProfile) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-s".into(),
        format!("{}x{}", settings.width, settings.height),
        "-r".into(),
        settings.frame_rate.to_string(),
        "-i".into(),
        "pipe:0".into(),
        "-c:v".into(),
        profile.codec.into(),
    ];
    match profile.codec {
        "libvpx-vp9" | "libvpx" => args.extend(
            ["-deadline", "realtime", "-cpu-used", "4", "-b:v", "0", "-crf", "32"]
                .map(String::from),
        ),
        "libx264" => args.extend(["-preset", "veryfast", "-crf", "23"].map(String::from)),
        _ => {}
    }
    args.extend(["-pix_fmt", "yuv420p", "-f", profile.format].map(String::from));
    if profile.format == "mp4" {
        args.extend(
            ["-movflags", "frag_keyframe+empty_moov+default_base_moof"].map(String::from),
        );
    }
    args.push("pipe:1".into());
    args
}

/// Bounded hand-off of raw frames to the ffmpeg writer thread
///
/// A full queue drops the incoming frame instead of buffering it, so a
/// stalled encoder costs dropped frames rather than memory.
#[derive(Debug)]
struct FrameQueue {
    sender: mpsc::Sender<Vec<u8>>,
    dropped: u64,
}

impl FrameQueue {
    fn new(depth: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (sender, receiver) = mpsc::channel(depth);
        (Self { sender, dropped: 0 }, receiver)
    }

    /// Queue a frame; `Ok(false)` when it was dropped because the writer is behind
    fn push(&mut self, frame: Vec<u8>) -> MediaResult<bool> {
        match self.sender.try_send(frame) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped == 1 || self.dropped % 30 == 0 {
                    warn!(dropped = self.dropped, "ffmpeg is falling behind, dropping frames");
                }
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => Err(MediaError::EncoderRuntime {
                reason: "ffmpeg writer stopped".to_string(),
            }),
        }
    }

    fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Running ffmpeg encode
#[derive(Debug)]
pub struct FfmpegEncoder {
    info: CodecInfo,
    resolution: (u32, u32),
    child: Child,
    frames: Option<FrameQueue>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    output: Arc<Mutex<BytesMut>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl FfmpegEncoder {
    fn spawn(ffmpeg: &Path, settings: &EncoderSettings, profile: &OutputProfile) -> MediaResult<Self> {
        let creation_error = |reason: String| MediaError::EncoderCreation {
            mime_type: settings.mime_type.clone(),
            reason,
        };

        let args = build_args(settings, profile);
        debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| creation_error(format!("failed to start ffmpeg: {}", e)))?;

        let (Some(mut stdin), Some(mut stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(creation_error("ffmpeg pipes unavailable".to_string()));
        };

        let failure = Arc::new(Mutex::new(None));
        let output = Arc::new(Mutex::new(BytesMut::new()));
        let (frames_tx, mut frames_rx) = FrameQueue::new(FRAME_QUEUE_DEPTH);

        let writer_failure = failure.clone();
        let writer = std::thread::Builder::new()
            .name("ffmpeg-writer".to_string())
            .spawn(move || {
                while let Some(frame) = frames_rx.blocking_recv() {
                    if let Err(e) = stdin.write_all(&frame) {
                        *writer_failure.lock() = Some(format!("ffmpeg stdin closed: {}", e));
                        break;
                    }
                }
            })?;

        let reader_output = output.clone();
        let reader_failure = failure.clone();
        let reader = std::thread::Builder::new()
            .name("ffmpeg-reader".to_string())
            .spawn(move || {
                let mut buf = vec![0u8; 64 * 1024];
                loop {
                    match stdout.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => reader_output.lock().extend_from_slice(&buf[..n]),
                        Err(e) => {
                            *reader_failure.lock() = Some(format!("ffmpeg stdout failed: {}", e));
                            break;
                        }
                    }
                }
            })?;

        info!(
            codec = profile.codec,
            format = profile.format,
            size = %format!("{}x{}", settings.width, settings.height),
            "FFmpeg encoder started"
        );

        Ok(Self {
            info: CodecInfo {
                name: profile.codec.to_string(),
                mime_type: settings.mime_type.clone(),
            },
            resolution: (settings.width, settings.height),
            child,
            frames: Some(frames_tx),
            writer: Some(writer),
            reader: Some(reader),
            output,
            failure,
        })
    }

    fn check_failure(&self) -> MediaResult<()> {
        match self.failure.lock().clone() {
            Some(reason) => Err(MediaError::EncoderRuntime { reason }),
            None => Ok(()),
        }
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&mut self, frame: &VideoFrame) -> MediaResult<()> {
        self.check_failure()?;
        if (frame.width, frame.height) != self.resolution {
            return Err(MediaError::EncoderRuntime {
                reason: format!(
                    "frame {}x{} does not match encoder {}x{}",
                    frame.width, frame.height, self.resolution.0, self.resolution.1
                ),
            });
        }
        let queue = self.frames.as_mut().ok_or_else(|| MediaError::EncoderRuntime {
            reason: "encoder already finished".to_string(),
        })?;
        queue.push(frame.data.clone()).map(|_| ())
    }

    fn flush(&mut self) -> MediaResult<Bytes> {
        self.check_failure()?;
        Ok(self.output.lock().split().freeze())
    }

    fn finish(&mut self) -> MediaResult<Bytes> {
        // Closing the channel ends the writer, which drops stdin and lets ffmpeg drain.
        if let Some(queue) = self.frames.take() {
            if queue.dropped() > 0 {
                warn!(dropped = queue.dropped(), "Frames dropped during encode");
            }
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        let status = self.child.wait()?;
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.check_failure()?;
        if !status.success() {
            return Err(MediaError::EncoderRuntime {
                reason: format!("ffmpeg exited with {}", status),
            });
        }
        Ok(self.output.lock().split().freeze())
    }

    fn codec_info(&self) -> CodecInfo {
        self.info.clone()
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.writer.is_some() {
            self.frames.take();
            if let Err(e) = self.child.kill() {
                debug!("ffmpeg already exited: {}", e);
            }
            let _ = self.child.wait();
        }
    }
}
