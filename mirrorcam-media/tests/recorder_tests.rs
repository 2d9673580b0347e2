//! Integration tests for the mirrored recorder
//!
//! All timing runs on tokio's paused clock, so the redraw loop, the 30 fps
//! sampler, the timeslice and the elapsed counter advance deterministically.

use bytes::Bytes;
use mirrorcam_media::codecs::synthetic::{MP4_BOX_TYPE, WEBM_SIGNATURE};
use mirrorcam_media::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const SMALL: VideoResolution = VideoResolution::new(64, 48);

struct Rig {
    _devices: SyntheticDevices,
    _stream: MediaStream,
    preview: LivePreview,
    sink: Arc<MemoryDownloadSink>,
}

async fn rig(camera: SyntheticCamera) -> Rig {
    let devices = SyntheticDevices::single(camera);
    let stream = devices
        .get_user_media(&MediaConstraints::default())
        .await
        .unwrap();
    let mut preview = LivePreview::new();
    preview.bind(stream.video_track().unwrap().clone());
    preview.poll_metadata();
    Rig {
        _devices: devices,
        _stream: stream,
        preview,
        sink: Arc::new(MemoryDownloadSink::new()),
    }
}

fn small_camera() -> SyntheticCamera {
    SyntheticCamera::new("cam", "Cam", SMALL)
}

fn recorder(rig: &Rig, factory: Arc<dyn EncoderFactory>) -> MirroredRecorder {
    MirroredRecorder::new(RecorderConfig::default(), factory, rig.sink.clone())
}

// ============================================================================
// SAVE PATH TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_recording_saves_single_webm() {
    let rig = rig(small_camera()).await;
    let recorder = recorder(&rig, Arc::new(SyntheticEncoderFactory::new()));
    let mut events = recorder.subscribe();

    assert!(recorder.start(&rig.preview).unwrap());
    assert!(recorder.is_recording());

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(recorder.elapsed_secs(), 2);

    let handle = recorder.stop().expect("finalize handle");
    assert!(!recorder.is_recording());
    assert_eq!(recorder.elapsed_secs(), 0);

    let saved = match handle.wait().await {
        RecordingOutcome::Saved(saved) => saved,
        other => panic!("expected a saved recording, got {:?}", other),
    };
    assert!(saved.filename.starts_with("video-"));
    assert!(saved.filename.ends_with(".webm"));
    assert_eq!(saved.mime_type, MIME_WEBM_VP9);

    let downloads = rig.sink.downloads();
    assert_eq!(downloads.len(), 1);
    let (filename, blob) = &downloads[0];
    assert_eq!(filename, &saved.filename);
    assert_eq!(&blob.data[..4], &WEBM_SIGNATURE);
    assert_eq!(blob.len(), saved.size);

    assert!(matches!(
        events.recv().await.unwrap(),
        RecorderEvent::Started { resolution: SMALL, .. }
    ));
    assert_eq!(events.recv().await.unwrap(), RecorderEvent::Saved(saved));
}

#[tokio::test(start_paused = true)]
async fn test_download_released_after_delay() {
    let rig = rig(small_camera()).await;
    let recorder = recorder(&rig, Arc::new(SyntheticEncoderFactory::new()));

    recorder.start(&rig.preview).unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;
    recorder.stop().unwrap().wait().await;

    assert_eq!(rig.sink.outstanding(), 1);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(rig.sink.outstanding(), 0);
    assert_eq!(rig.sink.released().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_mp4_fallback_extension() {
    let rig = rig(small_camera()).await;
    let factory = Arc::new(SyntheticEncoderFactory::supporting(&[MIME_MP4]));
    let recorder = recorder(&rig, factory);

    recorder.start(&rig.preview).unwrap();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let outcome = recorder.stop().unwrap().wait().await;

    let RecordingOutcome::Saved(saved) = outcome else {
        panic!("expected a saved recording");
    };
    assert!(saved.filename.ends_with(".mp4"));
    let (_, blob) = &rig.sink.downloads()[0];
    assert_eq!(&blob.data[4..8], MP4_BOX_TYPE);
}

#[tokio::test(start_paused = true)]
async fn test_zero_chunks_produce_no_file() {
    let rig = rig(small_camera()).await;
    let recorder = recorder(&rig, Arc::new(SyntheticEncoderFactory::new().silent()));
    let mut events = recorder.subscribe();

    recorder.start(&rig.preview).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let outcome = recorder.stop().unwrap().wait().await;

    assert_eq!(outcome, RecordingOutcome::Discarded);
    assert_eq!(rig.sink.download_count(), 0);
    let _started = events.recv().await.unwrap();
    assert_eq!(events.recv().await.unwrap(), RecorderEvent::Discarded);
}

// ============================================================================
// FAILURE TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_encoder_creation_failure_leaves_idle() {
    let rig = rig(small_camera()).await;
    let recorder = recorder(
        &rig,
        Arc::new(SyntheticEncoderFactory::new().failing_creation()),
    );

    let result = recorder.start(&rig.preview);
    assert!(matches!(result, Err(MediaError::EncoderCreation { .. })));
    assert!(!recorder.is_recording());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(recorder.redraw_iterations(), 0);
    assert!(recorder.stop().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_encoder_runtime_failure_discards_data() {
    let rig = rig(small_camera()).await;
    let recorder = recorder(
        &rig,
        Arc::new(SyntheticEncoderFactory::new().failing_after(20)),
    );
    let mut events = recorder.subscribe();

    recorder.start(&rig.preview).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!recorder.is_recording());

    let outcome = recorder.stop().expect("detached finalize").wait().await;
    assert!(matches!(outcome, RecordingOutcome::Failed { .. }));
    assert_eq!(rig.sink.download_count(), 0);

    let _started = events.recv().await.unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        RecorderEvent::EncoderFailed { .. }
    ));

    let iterations = recorder.redraw_iterations();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(recorder.redraw_iterations(), iterations);
}

// ============================================================================
// LIFECYCLE TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_leaks_no_redraw_iterations() {
    let rig = rig(small_camera()).await;
    let recorder = recorder(&rig, Arc::new(SyntheticEncoderFactory::new()));

    recorder.start(&rig.preview).unwrap();
    assert!(!recorder.start(&rig.preview).unwrap());
    tokio::time::sleep(Duration::from_millis(500)).await;
    let handle = recorder.stop().unwrap();

    let iterations = recorder.redraw_iterations();
    assert!(iterations >= 25, "redraw loop ran {} times", iterations);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(recorder.redraw_iterations(), iterations);

    handle.wait().await;
    assert!(recorder.stop().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_no_frame_source_is_noop() {
    let sink = Arc::new(MemoryDownloadSink::new());
    let recorder = MirroredRecorder::new(
        RecorderConfig::default(),
        Arc::new(SyntheticEncoderFactory::new()),
        sink,
    );
    assert!(!recorder.start(&LivePreview::new()).unwrap());
    assert!(!recorder.is_recording());
}

#[tokio::test(start_paused = true)]
async fn test_surface_falls_back_before_metadata() {
    let rig = rig(small_camera().without_frames()).await;
    let factory = Arc::new(SyntheticEncoderFactory::new());
    let config = RecorderConfig {
        fallback_surface: VideoResolution::new(32, 24),
        ..RecorderConfig::default()
    };
    let recorder = MirroredRecorder::new(config, factory.clone(), rig.sink.clone());

    assert!(recorder.start(&rig.preview).unwrap());
    let created = factory.created();
    assert_eq!((created[0].width, created[0].height), (32, 24));
    recorder.stop();
}

#[tokio::test(start_paused = true)]
async fn test_toggle_flips_state() {
    let rig = rig(small_camera()).await;
    let recorder = recorder(&rig, Arc::new(SyntheticEncoderFactory::new()));

    assert!(matches!(
        recorder.toggle(&rig.preview).unwrap(),
        RecorderToggle::Started
    ));
    tokio::time::sleep(Duration::from_millis(600)).await;
    let RecorderToggle::Stopped(handle) = recorder.toggle(&rig.preview).unwrap() else {
        panic!("expected the recording to stop");
    };
    assert!(matches!(handle.wait().await, RecordingOutcome::Saved(_)));
}

// ============================================================================
// MIRRORING
// ============================================================================

#[derive(Debug, Default)]
struct FrameLog {
    frames: Mutex<Vec<VideoFrame>>,
}

#[derive(Debug)]
struct CapturingEncoder {
    log: Arc<FrameLog>,
}

impl VideoEncoder for CapturingEncoder {
    fn encode(&mut self, frame: &VideoFrame) -> MediaResult<()> {
        self.log.frames.lock().push(frame.clone());
        Ok(())
    }

    fn flush(&mut self) -> MediaResult<Bytes> {
        Ok(Bytes::from_static(b"x"))
    }

    fn finish(&mut self) -> MediaResult<Bytes> {
        Ok(Bytes::new())
    }

    fn codec_info(&self) -> CodecInfo {
        CodecInfo {
            name: "capture".to_string(),
            mime_type: MIME_WEBM.to_string(),
        }
    }
}

struct CapturingFactory {
    log: Arc<FrameLog>,
}

impl EncoderFactory for CapturingFactory {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type == MIME_WEBM
    }

    fn create(&self, _settings: &EncoderSettings) -> MediaResult<Box<dyn VideoEncoder>> {
        Ok(Box::new(CapturingEncoder {
            log: self.log.clone(),
        }))
    }
}

#[tokio::test(start_paused = true)]
async fn test_recorded_frames_are_mirrored() {
    let rig = rig(small_camera()).await;
    let log = Arc::new(FrameLog::default());
    let recorder = recorder(&rig, Arc::new(CapturingFactory { log: log.clone() }));

    recorder.start(&rig.preview).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    recorder.stop().unwrap().wait().await;

    let source = rig.preview.current_frame().unwrap();
    let frames = log.frames.lock();
    assert!(!frames.is_empty());
    for frame in frames.iter() {
        assert_eq!(frame.resolution(), SMALL);
        for x in [0, 17, 63] {
            assert_eq!(frame.pixel(x, 5), source.pixel(63 - x, 5));
        }
    }
}

// ============================================================================
// CHUNK ASSEMBLY
// ============================================================================

#[derive(Debug, Default)]
struct FragmentLog {
    flushes: Mutex<u32>,
    emitted: Mutex<Vec<Bytes>>,
}

/// Emits `<1>`, `<2>`, ... on each flush, with every third flush empty
#[derive(Debug)]
struct NumberedEncoder {
    log: Arc<FragmentLog>,
}

impl VideoEncoder for NumberedEncoder {
    fn encode(&mut self, _frame: &VideoFrame) -> MediaResult<()> {
        Ok(())
    }

    fn flush(&mut self) -> MediaResult<Bytes> {
        let mut flushes = self.log.flushes.lock();
        *flushes += 1;
        if *flushes % 3 == 0 {
            return Ok(Bytes::new());
        }
        let fragment = Bytes::from(format!("<{}>", *flushes));
        self.log.emitted.lock().push(fragment.clone());
        Ok(fragment)
    }

    fn finish(&mut self) -> MediaResult<Bytes> {
        Ok(Bytes::from_static(b"<end>"))
    }

    fn codec_info(&self) -> CodecInfo {
        CodecInfo {
            name: "numbered".to_string(),
            mime_type: MIME_WEBM.to_string(),
        }
    }
}

struct NumberedFactory {
    log: Arc<FragmentLog>,
}

impl EncoderFactory for NumberedFactory {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type == MIME_WEBM
    }

    fn create(&self, _settings: &EncoderSettings) -> MediaResult<Box<dyn VideoEncoder>> {
        Ok(Box::new(NumberedEncoder {
            log: self.log.clone(),
        }))
    }
}

#[tokio::test(start_paused = true)]
async fn test_saved_blob_joins_fragments_in_order() {
    let rig = rig(small_camera()).await;
    let log = Arc::new(FragmentLog::default());
    let recorder = recorder(&rig, Arc::new(NumberedFactory { log: log.clone() }));

    recorder.start(&rig.preview).unwrap();
    tokio::time::sleep(Duration::from_millis(3200)).await;
    let outcome = recorder.stop().unwrap().wait().await;
    assert!(matches!(outcome, RecordingOutcome::Saved(_)));

    assert!(*log.flushes.lock() >= 6);
    let mut expected: Vec<u8> = log
        .emitted
        .lock()
        .iter()
        .flat_map(|fragment| fragment.iter().copied())
        .collect();
    expected.extend_from_slice(b"<end>");

    let downloads = rig.sink.downloads();
    assert_eq!(downloads.len(), 1);
    let (_, blob) = &downloads[0];
    assert_eq!(&blob.data[..], &expected[..]);
    assert!(blob.data.starts_with(b"<1><2><4><5>"));
    assert_eq!(blob.len(), expected.len());
}
