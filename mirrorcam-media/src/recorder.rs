//! Mirrored recorder
//!
//! While recording, a redraw loop copies each live frame, flipped, onto an
//! offscreen [`Surface`] at display cadence. A [`MediaRecorder`] samples that
//! surface at the recording frame rate and emits encoded fragments, which are
//! collected in arrival order and saved as a single container file once the
//! recorder has stopped.

use crate::codecs::{container_extension, select_mime_type, EncoderFactory, DEFAULT_MIME_PREFERENCE};
use crate::devices::VideoResolution;
use crate::download::{timestamped_filename, Blob, DownloadSink, SavedDownload};
use crate::error::MediaResult;
use crate::media_recorder::{MediaRecorder, RecorderSignal, RecorderState, SharedSurface, SurfaceStream};
use crate::preview::LivePreview;
use crate::surface::Surface;
use crate::tracks::MediaTrack;
use bytes::Bytes;
use chrono::Local;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Recorder tuning
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Sampling rate of the recorded stream
    pub record_fps: u32,
    /// Redraw cadence of the mirrored surface
    pub display_refresh_hz: u32,
    /// Interval between encoder drains
    pub timeslice: Duration,
    /// Surface size used before the preview reports its dimensions
    pub fallback_surface: VideoResolution,
    /// Delay before a saved recording's download handle is released
    pub download_release_delay: Duration,
    /// Container preference, most preferred first
    pub mime_preference: Vec<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            record_fps: 30,
            display_refresh_hz: 60,
            timeslice: Duration::from_millis(500),
            fallback_surface: VideoResolution::FULL_HD,
            download_release_delay: Duration::from_secs(1),
            mime_preference: DEFAULT_MIME_PREFERENCE.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Recorder notifications
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    Started {
        mime_type: String,
        resolution: VideoResolution,
    },
    Saved(SavedDownload),
    /// Stopped without producing any data
    Discarded,
    /// Encoder failed mid-recording; collected data was dropped
    EncoderFailed {
        reason: String,
    },
    /// Data was recorded but could not be saved
    SaveFailed {
        reason: String,
    },
}

/// How a recording ended
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingOutcome {
    Saved(SavedDownload),
    Discarded,
    Failed { reason: String },
}

/// Completes when the stopped recording has been finalized
#[derive(Debug)]
pub struct FinalizeHandle {
    task: JoinHandle<RecordingOutcome>,
}

impl FinalizeHandle {
    pub async fn wait(self) -> RecordingOutcome {
        self.task.await.unwrap_or_else(|e| RecordingOutcome::Failed {
            reason: format!("finalize task failed: {}", e),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Result of [`MirroredRecorder::toggle`]
#[derive(Debug)]
pub enum RecorderToggle {
    Started,
    Stopped(FinalizeHandle),
    /// Nothing to record from
    Unavailable,
}

/// Format elapsed seconds as `mm:ss`
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

struct RecordingSession {
    surface: SharedSurface,
    redraw: JoinHandle<()>,
    ticker: JoinHandle<()>,
    media_recorder: MediaRecorder,
    finalize: JoinHandle<RecordingOutcome>,
}

impl RecordingSession {
    /// Cancel loops, release the surface, request encoder stop
    fn shutdown(mut self, inner: &RecorderInner) -> JoinHandle<RecordingOutcome> {
        inner.recording.store(false, Ordering::Release);
        self.redraw.abort();
        self.ticker.abort();
        inner.elapsed.store(0, Ordering::Release);

        if self.media_recorder.state() != RecorderState::Inactive {
            if let Err(e) = self.media_recorder.stop() {
                warn!("Stopping media recorder failed: {}", e);
            }
        }
        drop(self.surface);
        self.finalize
    }
}

struct RecorderInner {
    recording: AtomicBool,
    elapsed: AtomicU64,
    redraw_iterations: AtomicU64,
    events: broadcast::Sender<RecorderEvent>,
    session: Mutex<Option<RecordingSession>>,
    detached: Mutex<Option<JoinHandle<RecordingOutcome>>>,
}

impl RecorderInner {
    fn emit(&self, event: RecorderEvent) {
        let _ = self.events.send(event);
    }

    fn force_stop(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            let finalize = session.shutdown(self);
            *self.detached.lock() = Some(finalize);
        }
    }
}

/// Records the live preview, mirrored, into a downloadable file
pub struct MirroredRecorder {
    config: RecorderConfig,
    factory: Arc<dyn EncoderFactory>,
    sink: Arc<dyn DownloadSink>,
    inner: Arc<RecorderInner>,
}

impl std::fmt::Debug for MirroredRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirroredRecorder")
            .field("config", &self.config)
            .field("recording", &self.is_recording())
            .finish()
    }
}

impl MirroredRecorder {
    pub fn new(
        config: RecorderConfig,
        factory: Arc<dyn EncoderFactory>,
        sink: Arc<dyn DownloadSink>,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            config,
            factory,
            sink,
            inner: Arc::new(RecorderInner {
                recording: AtomicBool::new(false),
                elapsed: AtomicU64::new(0),
                redraw_iterations: AtomicU64::new(0),
                events,
                session: Mutex::new(None),
                detached: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Start recording the preview
    ///
    /// Returns `Ok(false)` when already recording or when the preview has no
    /// frame source. Encoder construction failures are returned as errors and
    /// leave the recorder idle.
    pub fn start(&self, preview: &LivePreview) -> MediaResult<bool> {
        let mut slot = self.inner.session.lock();
        if slot.is_some() || self.is_recording() {
            debug!("Recording already running");
            return Ok(false);
        }
        let Some(source) = preview.frame_source() else {
            debug!("No frame source, recording not started");
            return Ok(false);
        };

        let resolution = preview
            .video_dimensions()
            .unwrap_or(self.config.fallback_surface);
        let mut surface = Surface::new(resolution)?;
        if let Some(frame) = source.latest_frame() {
            surface.draw_mirrored(&frame)?;
        }
        let surface: SharedSurface = Arc::new(Mutex::new(surface));

        let mime_type = select_mime_type(self.factory.as_ref(), &self.config.mime_preference);
        let stream = SurfaceStream::new(surface.clone(), self.config.record_fps);
        let (media_recorder, signals) = match MediaRecorder::start(
            stream,
            self.factory.as_ref(),
            &mime_type,
            self.config.timeslice,
        ) {
            Ok(started) => started,
            Err(e) => {
                error!(mime = %mime_type, "Cannot start recording: {}", e);
                return Err(e);
            }
        };

        self.inner.detached.lock().take();
        self.inner.elapsed.store(0, Ordering::Release);
        self.inner.recording.store(true, Ordering::Release);

        let redraw = tokio::spawn(redraw_loop(
            self.inner.clone(),
            source,
            surface.clone(),
            Duration::from_secs_f64(1.0 / self.config.display_refresh_hz.max(1) as f64),
        ));
        let ticker = tokio::spawn(elapsed_ticker(self.inner.clone()));
        let finalize = tokio::spawn(collect_and_finalize(
            self.inner.clone(),
            signals,
            mime_type.clone(),
            self.sink.clone(),
            self.config.download_release_delay,
        ));

        *slot = Some(RecordingSession {
            surface,
            redraw,
            ticker,
            media_recorder,
            finalize,
        });
        drop(slot);

        info!(mime = %mime_type, size = %resolution, "Recording started");
        self.inner.emit(RecorderEvent::Started {
            mime_type,
            resolution,
        });
        Ok(true)
    }

    /// Stop recording; safe to call when idle
    ///
    /// Returns a handle to the pending finalization, if any.
    pub fn stop(&self) -> Option<FinalizeHandle> {
        let session = self.inner.session.lock().take();
        let task = match session {
            Some(session) => {
                info!(elapsed = %format_elapsed(self.elapsed_secs()), "Recording stopped");
                Some(session.shutdown(&self.inner))
            }
            None => {
                self.inner.recording.store(false, Ordering::Release);
                self.inner.elapsed.store(0, Ordering::Release);
                self.inner.detached.lock().take()
            }
        };
        task.map(|task| FinalizeHandle { task })
    }

    pub fn toggle(&self, preview: &LivePreview) -> MediaResult<RecorderToggle> {
        if self.is_recording() {
            return Ok(match self.stop() {
                Some(handle) => RecorderToggle::Stopped(handle),
                None => RecorderToggle::Unavailable,
            });
        }
        Ok(if self.start(preview)? {
            RecorderToggle::Started
        } else {
            RecorderToggle::Unavailable
        })
    }

    pub fn is_recording(&self) -> bool {
        self.inner.recording.load(Ordering::Acquire)
    }

    /// Whole seconds since recording started (0 when idle)
    pub fn elapsed_secs(&self) -> u64 {
        self.inner.elapsed.load(Ordering::Acquire)
    }

    /// Redraw loop iterations across all recordings
    pub fn redraw_iterations(&self) -> u64 {
        self.inner.redraw_iterations.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.inner.events.subscribe()
    }

    /// Stop without waiting for finalization
    pub fn shutdown(&self) {
        if self.stop().is_some() {
            debug!("Recorder shut down with a pending finalize");
        }
    }
}

impl Drop for MirroredRecorder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn redraw_loop(
    inner: Arc<RecorderInner>,
    source: Arc<dyn MediaTrack>,
    surface: SharedSurface,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if !inner.recording.load(Ordering::Acquire) {
            break;
        }
        inner.redraw_iterations.fetch_add(1, Ordering::AcqRel);
        if let Some(frame) = source.latest_frame() {
            if let Err(e) = surface.lock().draw_mirrored(&frame) {
                warn!("Redraw failed: {}", e);
            }
        }
    }
}

async fn elapsed_ticker(inner: Arc<RecorderInner>) {
    let second = Duration::from_secs(1);
    let mut ticker = interval_at(Instant::now() + second, second);
    loop {
        ticker.tick().await;
        if !inner.recording.load(Ordering::Acquire) {
            break;
        }
        inner.elapsed.fetch_add(1, Ordering::AcqRel);
    }
}

async fn collect_and_finalize(
    inner: Arc<RecorderInner>,
    mut signals: mpsc::UnboundedReceiver<RecorderSignal>,
    mime_type: String,
    sink: Arc<dyn DownloadSink>,
    release_delay: Duration,
) -> RecordingOutcome {
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut failure: Option<String> = None;

    while let Some(signal) = signals.recv().await {
        match signal {
            RecorderSignal::Data(chunk) => {
                if !chunk.is_empty() {
                    chunks.push(chunk);
                }
            }
            RecorderSignal::Error(reason) => {
                if failure.is_none() {
                    failure = Some(reason);
                    inner.force_stop();
                }
            }
            RecorderSignal::Stopped => break,
        }
    }

    if let Some(reason) = failure {
        warn!(chunks = chunks.len(), "Discarding recording after encoder failure");
        inner.emit(RecorderEvent::EncoderFailed {
            reason: reason.clone(),
        });
        return RecordingOutcome::Failed { reason };
    }

    if chunks.is_empty() {
        info!("Recording produced no data, nothing saved");
        inner.emit(RecorderEvent::Discarded);
        return RecordingOutcome::Discarded;
    }

    let blob = Blob::from_chunks(mime_type.as_str(), &chunks);
    chunks.clear();
    let filename = timestamped_filename("video", container_extension(&mime_type), &Local::now());

    match sink.save(&filename, &blob) {
        Ok(handle) => {
            let release_sink = sink.clone();
            tokio::spawn(async move {
                tokio::time::sleep(release_delay).await;
                release_sink.release(handle);
            });
            let saved = SavedDownload {
                filename,
                size: blob.len(),
                mime_type,
            };
            info!(file = %saved.filename, size = saved.size, "Recording saved");
            inner.emit(RecorderEvent::Saved(saved.clone()));
            RecordingOutcome::Saved(saved)
        }
        Err(e) => {
            error!("Saving recording failed: {}", e);
            inner.emit(RecorderEvent::SaveFailed {
                reason: e.to_string(),
            });
            RecordingOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(65), "01:05");
        assert_eq!(format_elapsed(3600), "60:00");
    }

    #[test]
    fn test_default_config() {
        let config = RecorderConfig::default();
        assert_eq!(config.record_fps, 30);
        assert_eq!(config.timeslice, Duration::from_millis(500));
        assert_eq!(config.fallback_surface, VideoResolution::new(1920, 1080));
        assert_eq!(config.mime_preference[0], "video/webm;codecs=vp9");
    }
}
