//! Native camera capture through nokhwa
//!
//! Each opened stream owns a dedicated capture thread: the nokhwa `Camera`
//! is created, opened and read on that thread and never leaves it. The
//! thread publishes the newest decoded frame into a shared slot and exits
//! (releasing the device) once the track is stopped, so hardware release is
//! asynchronous with respect to [`MediaTrack::stop`].

use crate::devices::{
    ConstrainValue, DeviceDescriptor, MediaConstraints, MediaDevices, VideoResolution,
};
use crate::error::{MediaError, MediaResult};
use crate::tracks::{
    MediaStream, MediaTrack, TrackCapabilities, TrackSettings, ValueRange, VideoFrame,
};
use async_trait::async_trait;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// [`MediaDevices`] backed by the platform camera API
#[derive(Debug, Default)]
pub struct NokhwaDevices;

impl NokhwaDevices {
    pub fn new() -> Self {
        Self
    }
}

fn parse_index(device_id: &str) -> CameraIndex {
    match device_id.parse::<u32>() {
        Ok(index) => CameraIndex::Index(index),
        Err(_) => CameraIndex::String(device_id.to_string()),
    }
}

fn device_error(context: &str, err: impl std::fmt::Display) -> MediaError {
    MediaError::DeviceAccess {
        reason: format!("{}: {}", context, err),
    }
}

fn requested_format(constraints: &MediaConstraints) -> RequestedFormat<'static> {
    let width = constraints.width.as_ref().map(|c| *c.value());
    let height = constraints.height.as_ref().map(|c| *c.value());
    let frame_rate = constraints
        .frame_rate
        .as_ref()
        .map(|c| c.value().round() as u32)
        .unwrap_or(30);

    let kind = match (width, height) {
        (Some(w), Some(h)) => RequestedFormatType::Closest(CameraFormat::new(
            Resolution::new(w, h),
            FrameFormat::MJPEG,
            frame_rate,
        )),
        _ => RequestedFormatType::None,
    };
    RequestedFormat::new::<RgbAFormat>(kind)
}

fn capabilities_of(camera: &mut Camera) -> Option<TrackCapabilities> {
    let formats = match camera.compatible_camera_formats() {
        Ok(formats) if !formats.is_empty() => formats,
        Ok(_) => return None,
        Err(e) => {
            debug!("Capability query unsupported: {}", e);
            return None;
        }
    };

    let widths = formats.iter().map(|f| f.width());
    let heights = formats.iter().map(|f| f.height());
    let rates = formats.iter().map(|f| f.frame_rate() as f64);

    Some(TrackCapabilities {
        width: Some(ValueRange::new(widths.clone().min()?, widths.max()?)),
        height: Some(ValueRange::new(heights.clone().min()?, heights.max()?)),
        frame_rate: Some(ValueRange::new(
            rates.clone().fold(f64::INFINITY, f64::min),
            rates.fold(0.0, f64::max),
        )),
    })
}

fn check_exact(constraints: &MediaConstraints, granted: VideoResolution) -> MediaResult<()> {
    if let Some(ConstrainValue::Exact(w)) = constraints.width {
        if w != granted.width {
            return Err(MediaError::Overconstrained {
                constraint: "width".to_string(),
                message: format!("requested {}, device offers {}", w, granted.width),
            });
        }
    }
    if let Some(ConstrainValue::Exact(h)) = constraints.height {
        if h != granted.height {
            return Err(MediaError::Overconstrained {
                constraint: "height".to_string(),
                message: format!("requested {}, device offers {}", h, granted.height),
            });
        }
    }
    Ok(())
}

struct Opened {
    label: String,
    settings: TrackSettings,
    capabilities: Option<TrackCapabilities>,
}

#[async_trait]
impl MediaDevices for NokhwaDevices {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> MediaResult<MediaStream> {
        if !nokhwa::nokhwa_check() {
            return Err(MediaError::PermissionDenied {
                operation: "camera access".to_string(),
            });
        }

        let device_id = match constraints.requested_device() {
            Some(id) => id.to_string(),
            None => self
                .video_inputs()
                .await?
                .first()
                .map(|d| d.device_id.clone())
                .ok_or(MediaError::NoDevices)?,
        };

        let live = Arc::new(AtomicBool::new(true));
        let slot: Arc<Mutex<Option<Arc<VideoFrame>>>> = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = oneshot::channel::<MediaResult<Opened>>();

        let thread_live = live.clone();
        let thread_slot = slot.clone();
        let thread_constraints = constraints.clone();
        let thread_device = device_id.clone();
        std::thread::Builder::new()
            .name(format!("camera-{}", device_id))
            .spawn(move || {
                capture_thread(
                    thread_device,
                    thread_constraints,
                    thread_live,
                    thread_slot,
                    ready_tx,
                )
            })?;

        let opened = ready_rx.await.map_err(|_| MediaError::DeviceAccess {
            reason: "capture thread exited before opening the device".to_string(),
        })??;

        info!(
            device = %device_id,
            granted = %opened.settings.resolution(),
            "Camera stream opened"
        );

        let track = Arc::new(NokhwaTrack {
            id: uuid::Uuid::new_v4().to_string(),
            label: opened.label,
            settings: opened.settings,
            capabilities: opened.capabilities,
            live,
            slot,
        });
        Ok(MediaStream::new(vec![track as Arc<dyn MediaTrack>]))
    }

    async fn enumerate_devices(&self) -> MediaResult<Vec<DeviceDescriptor>> {
        let cameras = tokio::task::spawn_blocking(|| nokhwa::query(ApiBackend::Auto))
            .await
            .map_err(|e| device_error("device query task failed", e))?
            .map_err(|e| device_error("device query failed", e))?;

        Ok(cameras
            .into_iter()
            .map(|info| DeviceDescriptor::video_input(info.index().to_string(), info.human_name()))
            .collect())
    }
}

fn capture_thread(
    device_id: String,
    constraints: MediaConstraints,
    live: Arc<AtomicBool>,
    slot: Arc<Mutex<Option<Arc<VideoFrame>>>>,
    ready: oneshot::Sender<MediaResult<Opened>>,
) {
    let mut camera = match Camera::new(parse_index(&device_id), requested_format(&constraints)) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(device_error("failed to open camera", e)));
            return;
        }
    };

    let capabilities = capabilities_of(&mut camera);

    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(device_error("failed to start stream", e)));
        return;
    }

    let resolution = camera.resolution();
    let granted = VideoResolution::new(resolution.width(), resolution.height());
    if let Err(e) = check_exact(&constraints, granted) {
        let _ = camera.stop_stream();
        let _ = ready.send(Err(e));
        return;
    }

    let opened = Opened {
        label: camera.info().human_name(),
        settings: TrackSettings {
            device_id: device_id.clone(),
            width: granted.width,
            height: granted.height,
            frame_rate: Some(camera.frame_rate() as f64),
        },
        capabilities,
    };
    if ready.send(Ok(opened)).is_err() {
        let _ = camera.stop_stream();
        return;
    }

    while live.load(Ordering::Acquire) {
        let decoded = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbAFormat>());
        match decoded {
            Ok(image) => {
                let (width, height) = (image.width(), image.height());
                let timestamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                match VideoFrame::new(width, height, image.into_raw(), timestamp) {
                    Ok(frame) => *slot.lock() = Some(Arc::new(frame)),
                    Err(e) => warn!("Dropping malformed frame: {}", e),
                }
            }
            Err(e) => {
                warn!(device = %device_id, "Frame capture failed: {}", e);
                break;
            }
        }
    }

    live.store(false, Ordering::Release);
    *slot.lock() = None;
    if let Err(e) = camera.stop_stream() {
        debug!("Stopping camera stream failed: {}", e);
    }
    debug!(device = %device_id, "Capture thread exited");
}

/// Track backed by a nokhwa capture thread
#[derive(Debug)]
pub struct NokhwaTrack {
    id: String,
    label: String,
    settings: TrackSettings,
    capabilities: Option<TrackCapabilities>,
    live: Arc<AtomicBool>,
    slot: Arc<Mutex<Option<Arc<VideoFrame>>>>,
}

impl MediaTrack for NokhwaTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn settings(&self) -> TrackSettings {
        self.settings.clone()
    }

    fn capabilities(&self) -> Option<TrackCapabilities> {
        self.capabilities.clone()
    }

    fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.slot.lock().clone()
    }

    fn stop(&self) {
        self.live.store(false, Ordering::Release);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}
