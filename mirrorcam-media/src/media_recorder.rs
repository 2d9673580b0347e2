//! Timesliced stream recorder
//!
//! [`MediaRecorder`] samples a [`SurfaceStream`] at its frame rate, feeds the
//! samples to a [`VideoEncoder`] and emits the encoded output as
//! [`RecorderSignal::Data`] fragments every timeslice. A runtime encoder
//! failure emits [`RecorderSignal::Error`] and stops the recorder. Every
//! session ends with exactly one [`RecorderSignal::Stopped`].

use crate::codecs::{EncoderFactory, EncoderSettings, VideoEncoder};
use crate::error::{MediaError, MediaResult};
use crate::surface::Surface;
use crate::tracks::VideoFrame;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Surface shared between the redraw loop and the sampler
pub type SharedSurface = Arc<Mutex<Surface>>;

/// A surface exposed as a fixed-rate frame stream
#[derive(Debug, Clone)]
pub struct SurfaceStream {
    surface: SharedSurface,
    frame_rate: u32,
}

impl SurfaceStream {
    pub fn new(surface: SharedSurface, frame_rate: u32) -> Self {
        Self {
            surface,
            frame_rate: frame_rate.max(1),
        }
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate as f64)
    }

    /// Current surface contents
    pub fn sample(&self, timestamp: u64) -> VideoFrame {
        self.surface.lock().snapshot(timestamp)
    }

    fn dimensions(&self) -> (u32, u32) {
        let resolution = self.surface.lock().resolution();
        (resolution.width, resolution.height)
    }
}

/// Recorder lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Inactive,
    Recording,
}

/// Output of a running recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderSignal {
    /// Encoded fragment, in production order
    Data(Bytes),
    /// Runtime encoder failure
    Error(String),
    /// Recorder has stopped; no further signals follow
    Stopped,
}

/// Records a [`SurfaceStream`] into an encoded container
#[derive(Debug)]
pub struct MediaRecorder {
    mime_type: String,
    state: Arc<Mutex<RecorderState>>,
    stop_tx: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
}

impl MediaRecorder {
    /// Construct the encoder and start recording
    ///
    /// Encoder construction failures are returned before anything is spawned.
    pub fn start(
        stream: SurfaceStream,
        factory: &dyn EncoderFactory,
        mime_type: &str,
        timeslice: Duration,
    ) -> MediaResult<(Self, mpsc::UnboundedReceiver<RecorderSignal>)> {
        let (width, height) = stream.dimensions();
        let settings = EncoderSettings {
            width,
            height,
            frame_rate: stream.frame_rate(),
            mime_type: mime_type.to_string(),
        };
        let encoder = factory.create(&settings)?;
        info!(
            mime = %mime_type,
            codec = %encoder.codec_info().name,
            size = %format!("{}x{}", width, height),
            "Media recorder started"
        );

        let state = Arc::new(Mutex::new(RecorderState::Recording));
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        let driver = tokio::spawn(drive(
            encoder,
            stream,
            timeslice,
            stop_rx,
            signal_tx,
            state.clone(),
        ));

        Ok((
            Self {
                mime_type: mime_type.to_string(),
                state,
                stop_tx: Some(stop_tx),
                driver: Some(driver),
            },
            signal_rx,
        ))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn state(&self) -> RecorderState {
        *self.state.lock()
    }

    /// Request a stop; the final fragment and `Stopped` follow asynchronously
    pub fn stop(&mut self) -> MediaResult<()> {
        if self.state() == RecorderState::Inactive {
            return Err(MediaError::InvalidState {
                message: "recorder is not recording".to_string(),
            });
        }
        let stop_tx = self.stop_tx.take().ok_or_else(|| MediaError::InvalidState {
            message: "stop already requested".to_string(),
        })?;
        stop_tx.send(()).map_err(|_| MediaError::InvalidState {
            message: "recorder driver has exited".to_string(),
        })
    }

    /// Wait for the driver task to exit
    pub async fn join(&mut self) {
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
    }
}

async fn drive(
    mut encoder: Box<dyn VideoEncoder>,
    stream: SurfaceStream,
    timeslice: Duration,
    mut stop_rx: oneshot::Receiver<()>,
    signals: mpsc::UnboundedSender<RecorderSignal>,
    state: Arc<Mutex<RecorderState>>,
) {
    let started = Instant::now();
    let mut capture = interval(stream.frame_interval());
    capture.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut slice = interval_at(started + timeslice, timeslice);
    slice.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome: MediaResult<()> = loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break Ok(()),
            _ = capture.tick() => {
                let timestamp = started.elapsed().as_millis() as u64;
                if let Err(e) = encoder.encode(&stream.sample(timestamp)) {
                    break Err(e);
                }
            }
            _ = slice.tick() => match encoder.flush() {
                Ok(chunk) if !chunk.is_empty() => {
                    let _ = signals.send(RecorderSignal::Data(chunk));
                }
                Ok(_) => {}
                Err(e) => break Err(e),
            },
        }
    };

    let outcome = match outcome {
        Ok(()) => {
            let finished = tokio::task::spawn_blocking(move || encoder.finish()).await;
            match finished {
                Ok(Ok(tail)) => {
                    if !tail.is_empty() {
                        let _ = signals.send(RecorderSignal::Data(tail));
                    }
                    Ok(())
                }
                Ok(Err(e)) => Err(e),
                Err(e) => Err(MediaError::EncoderRuntime {
                    reason: format!("encoder task failed: {}", e),
                }),
            }
        }
        Err(e) => Err(e),
    };

    *state.lock() = RecorderState::Inactive;
    if let Err(e) = outcome {
        error!("Recording encoder failed: {}", e);
        let _ = signals.send(RecorderSignal::Error(e.to_string()));
    }
    let _ = signals.send(RecorderSignal::Stopped);
    debug!("Media recorder driver exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::{SyntheticEncoderFactory, MIME_WEBM};
    use crate::devices::VideoResolution;

    fn stream() -> SurfaceStream {
        let surface = Surface::new(VideoResolution::new(8, 6)).unwrap();
        SurfaceStream::new(Arc::new(Mutex::new(surface)), 30)
    }

    async fn drain(rx: &mut mpsc::UnboundedReceiver<RecorderSignal>) -> Vec<RecorderSignal> {
        let mut out = Vec::new();
        while let Some(signal) = rx.recv().await {
            let done = signal == RecorderSignal::Stopped;
            out.push(signal);
            if done {
                break;
            }
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_fragments_every_timeslice() {
        let factory = SyntheticEncoderFactory::new();
        let (mut recorder, mut rx) =
            MediaRecorder::start(stream(), &factory, MIME_WEBM, Duration::from_millis(500))
                .unwrap();

        tokio::time::sleep(Duration::from_millis(1200)).await;
        recorder.stop().unwrap();
        let signals = drain(&mut rx).await;

        let data = signals
            .iter()
            .filter(|s| matches!(s, RecorderSignal::Data(_)))
            .count();
        assert!(data >= 2, "expected at least two fragments, got {}", data);
        assert_eq!(signals.last(), Some(&RecorderSignal::Stopped));
        assert_eq!(recorder.state(), RecorderState::Inactive);
        assert!(recorder.stop().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_failure_stops_recorder() {
        let factory = SyntheticEncoderFactory::new().failing_after(3);
        let (mut recorder, mut rx) =
            MediaRecorder::start(stream(), &factory, MIME_WEBM, Duration::from_millis(500))
                .unwrap();

        let signals = drain(&mut rx).await;
        assert!(signals
            .iter()
            .any(|s| matches!(s, RecorderSignal::Error(_))));
        assert_eq!(signals.last(), Some(&RecorderSignal::Stopped));
        recorder.join().await;
        assert_eq!(recorder.state(), RecorderState::Inactive);
    }

    #[test]
    fn test_creation_failure_is_synchronous() {
        let factory = SyntheticEncoderFactory::new().failing_creation();
        let result = MediaRecorder::start(stream(), &factory, MIME_WEBM, Duration::from_millis(500));
        assert!(matches!(result, Err(MediaError::EncoderCreation { .. })));
    }
}
