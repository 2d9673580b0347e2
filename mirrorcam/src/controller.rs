//! Camera controller
//!
//! [`CameraController`] is the single owner of the capture session, the
//! preview, the recorder, the theme, and everything the front end displays.
//! Every state transition goes through one of its methods, so negotiation
//! never races itself: the controller is driven through `&mut self`.

use crate::config::CameraConfig;
use crate::event::{ControllerEvent, EventStream};
use crate::shortcuts::Shortcut;
use chrono::Local;
use mirrorcam_core::{
    JsonPreferenceStore, PreferenceStore, SystemAppearance, Theme, ThemeManager, ThemeMode,
};
use mirrorcam_diagnostics::{ResolutionScanner, ScanResultEntry};
use mirrorcam_media::{
    capture_photo, default_media_devices, format_elapsed, negotiate, probe_capabilities,
    CameraInfo, CaptureSession, DeviceDescriptor, DirectoryDownloadSink, DisplaySurface,
    DownloadSink, EncoderFactory, FfmpegEncoderFactory, FinalizeHandle, LivePreview, MediaDevices,
    MediaError, MediaResult, MirroredRecorder, ProbeResult, RecorderToggle, SavedDownload,
    VideoResolution,
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const ACCESS_ERROR: &str = "Cannot access camera";
const DEVICE_LIST_ERROR: &str = "Cannot list devices";
const RECORD_ERROR: &str = "Cannot start recording";

/// Fluent builder for [`CameraController`]
///
/// Anything not supplied falls back to the platform: the default device
/// backend, ffmpeg for encoding, the configured output directory and
/// preference file.
pub struct CameraControllerBuilder {
    config: CameraConfig,
    devices: Option<Arc<dyn MediaDevices>>,
    encoders: Option<Arc<dyn EncoderFactory>>,
    sink: Option<Arc<dyn DownloadSink>>,
    preferences: Option<Arc<dyn PreferenceStore>>,
    appearance: Option<watch::Receiver<Theme>>,
    display: Option<Arc<dyn DisplaySurface>>,
}

impl std::fmt::Debug for CameraControllerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraControllerBuilder")
            .field("config", &self.config)
            .field("devices", &self.devices.is_some())
            .field("encoders", &self.encoders.is_some())
            .field("sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl CameraControllerBuilder {
    fn new() -> Self {
        Self {
            config: CameraConfig::default(),
            devices: None,
            encoders: None,
            sink: None,
            preferences: None,
            appearance: None,
            display: None,
        }
    }

    /// Use this configuration
    pub fn config(mut self, config: CameraConfig) -> Self {
        self.config = config;
        self
    }

    /// Camera backend
    pub fn media_devices(mut self, devices: Arc<dyn MediaDevices>) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Encoder backend for recordings
    pub fn encoder_factory(mut self, encoders: Arc<dyn EncoderFactory>) -> Self {
        self.encoders = Some(encoders);
        self
    }

    /// Where photos and recordings go
    pub fn download_sink(mut self, sink: Arc<dyn DownloadSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Where the theme mode is persisted
    pub fn preference_store(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(store);
        self
    }

    /// System appearance signal that `auto` follows
    pub fn appearance(mut self, appearance: watch::Receiver<Theme>) -> Self {
        self.appearance = Some(appearance);
        self
    }

    /// Display the preview is presented on
    pub fn display(mut self, display: Arc<dyn DisplaySurface>) -> Self {
        self.display = Some(display);
        self
    }

    /// Validate the configuration and assemble the controller
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> MediaResult<CameraController> {
        self.config.validate()?;

        let devices = self.devices.unwrap_or_else(default_media_devices);
        let encoders: Arc<dyn EncoderFactory> = match self.encoders {
            Some(encoders) => encoders,
            None => match FfmpegEncoderFactory::detect() {
                Some(factory) => Arc::new(factory),
                None => {
                    warn!("ffmpeg not found, recording will be unavailable");
                    Arc::new(FfmpegEncoderFactory::with_path("ffmpeg"))
                }
            },
        };
        let sink: Arc<dyn DownloadSink> = match self.sink {
            Some(sink) => sink,
            None => Arc::new(DirectoryDownloadSink::new(&self.config.output_dir)?),
        };
        let preferences: Arc<dyn PreferenceStore> = match self.preferences {
            Some(store) => store,
            None => Arc::new(JsonPreferenceStore::open(&self.config.preferences_path)?),
        };
        let appearance = self
            .appearance
            .unwrap_or_else(|| SystemAppearance::new(Theme::Light).subscribe());

        let mut preview = LivePreview::new();
        if let Some(display) = self.display {
            preview.attach_display(display);
        }

        let recorder = MirroredRecorder::new(self.config.recorder(), encoders, sink.clone());
        let (events, _) = broadcast::channel(64);
        let forwarder = spawn_recorder_forwarder(&recorder, events.clone());

        Ok(CameraController {
            scanner: ResolutionScanner::new(self.config.scan_delay()),
            theme: ThemeManager::load(preferences, appearance),
            config: self.config,
            devices,
            sink,
            preview,
            recorder,
            session: None,
            device_list: Vec::new(),
            selected_device: None,
            camera_info: None,
            scan_results: Vec::new(),
            error: None,
            is_started: false,
            is_fullscreen: false,
            events,
            forwarder,
        })
    }
}

fn spawn_recorder_forwarder(
    recorder: &MirroredRecorder,
    events: broadcast::Sender<ControllerEvent>,
) -> JoinHandle<()> {
    let mut recorder_events = recorder.subscribe();
    tokio::spawn(async move {
        loop {
            match recorder_events.recv().await {
                Ok(event) => {
                    let _ = events.send(ControllerEvent::Recorder(event));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Dropped {} recorder events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Owner of all camera state
pub struct CameraController {
    config: CameraConfig,
    devices: Arc<dyn MediaDevices>,
    sink: Arc<dyn DownloadSink>,
    preview: LivePreview,
    recorder: MirroredRecorder,
    scanner: ResolutionScanner,
    theme: ThemeManager,
    session: Option<CaptureSession>,
    device_list: Vec<DeviceDescriptor>,
    selected_device: Option<String>,
    camera_info: Option<CameraInfo>,
    scan_results: Vec<ScanResultEntry>,
    error: Option<String>,
    is_started: bool,
    is_fullscreen: bool,
    events: broadcast::Sender<ControllerEvent>,
    forwarder: JoinHandle<()>,
}

impl std::fmt::Debug for CameraController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraController")
            .field("selected_device", &self.selected_device)
            .field("is_started", &self.is_started)
            .field("is_recording", &self.recorder.is_recording())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl CameraController {
    /// Start building a controller
    pub fn builder() -> CameraControllerBuilder {
        CameraControllerBuilder::new()
    }

    // ------------------------------------------------------------------
    // Camera lifecycle
    // ------------------------------------------------------------------

    /// Probe the default camera, list devices, and open it at its best resolution
    ///
    /// Any open session is stopped first. Rejected with
    /// [`MediaError::RecordingActive`] while recording.
    pub async fn initialize(&mut self) -> MediaResult<()> {
        if self.recorder.is_recording() {
            warn!("Re-initialization rejected while recording");
            return Err(MediaError::RecordingActive);
        }

        info!("Initializing camera");
        self.stop_camera();
        let negotiation = self.config.negotiation();

        let probe = match probe_capabilities(self.devices.as_ref(), None, &negotiation).await {
            Ok(probe) => probe,
            Err(e) => return Err(self.fail_camera(DEVICE_LIST_ERROR, e)),
        };
        if let Err(e) = self.refresh_devices().await {
            return Err(self.fail_camera(DEVICE_LIST_ERROR, e));
        }

        self.selected_device = Some(probe.device_id.clone());
        self.open_session(probe).await
    }

    /// Replace the active session with one on `device_id`
    ///
    /// Rejected with [`MediaError::RecordingActive`] while recording; the
    /// recording and the current session are left untouched.
    pub async fn switch_device(&mut self, device_id: &str) -> MediaResult<()> {
        if self.recorder.is_recording() {
            warn!(device = %device_id, "Device switch rejected while recording");
            return Err(MediaError::RecordingActive);
        }

        info!(device = %device_id, "Switching camera");
        self.selected_device = Some(device_id.to_string());
        self.stop_camera();
        tokio::time::sleep(self.config.switch_grace_delay()).await;

        let negotiation = self.config.negotiation();
        let probe =
            match probe_capabilities(self.devices.as_ref(), Some(device_id), &negotiation).await {
                Ok(probe) => probe,
                Err(e) => return Err(self.fail_camera(ACCESS_ERROR, e)),
            };
        self.open_session(probe).await
    }

    async fn open_session(&mut self, probe: ProbeResult) -> MediaResult<()> {
        let negotiation = self.config.negotiation();
        let stream = match negotiate(
            self.devices.as_ref(),
            &probe.device_id,
            &probe.ceiling,
            &negotiation,
        )
        .await
        {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail_camera(ACCESS_ERROR, e)),
        };

        let Some(session) = CaptureSession::from_stream(stream.clone(), Some(probe)) else {
            stream.stop_all();
            return Err(self.fail_camera(ACCESS_ERROR, MediaError::CaptureNotActive));
        };

        self.preview.bind(session.frame_source());
        let info = CameraInfo::from_session(&session);
        info!(
            device = %info.device_id,
            label = %info.label,
            resolution = %info.resolution_label(),
            fps = %info.frame_rate_label(),
            "Camera started"
        );
        self.session = Some(session);
        self.camera_info = Some(info.clone());
        self.error = None;
        self.is_started = true;
        self.emit(ControllerEvent::CameraStarted { info });

        self.refresh_metadata();
        Ok(())
    }

    /// Stop the active session, if any; a running recording is stopped first
    pub fn stop_camera(&mut self) -> Option<FinalizeHandle> {
        let finalize = self.recorder.stop();
        if let Some(session) = self.session.take() {
            session.stop();
            self.preview.unbind();
            self.emit(ControllerEvent::CameraStopped);
        }
        self.is_started = false;
        finalize
    }

    /// Re-enumerate video inputs
    pub async fn refresh_devices(&mut self) -> MediaResult<Vec<DeviceDescriptor>> {
        let devices = self.devices.video_inputs().await?;
        debug!(count = devices.len(), "Video inputs enumerated");
        self.device_list = devices.clone();
        self.emit(ControllerEvent::DevicesChanged {
            devices: devices.clone(),
        });
        Ok(devices)
    }

    /// Pick up the preview's rendered dimensions once its first frame arrives
    ///
    /// Returns the dimensions when they were loaded by this call.
    pub fn refresh_metadata(&mut self) -> Option<VideoResolution> {
        if self.preview.video_dimensions().is_some() {
            return None;
        }
        let rendered = self.preview.poll_metadata()?;
        if let Some(session) = &self.session {
            self.camera_info = Some(CameraInfo::from_session(session).with_rendered(Some(rendered)));
        }
        debug!(rendered = %rendered, "Preview metadata loaded");
        self.emit(ControllerEvent::MetadataLoaded { rendered });
        Some(rendered)
    }

    /// Present the current mirrored frame on the display
    pub fn present_frame(&mut self) -> MediaResult<bool> {
        self.refresh_metadata();
        self.preview.present()
    }

    // ------------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------------

    /// Save the current mirrored frame as a PNG
    ///
    /// `Ok(None)` when no frame is available yet.
    pub fn take_photo(&mut self) -> MediaResult<Option<SavedDownload>> {
        self.refresh_metadata();
        let saved = capture_photo(&self.preview, self.sink.as_ref(), Local::now())?;
        if let Some(saved) = &saved {
            self.emit(ControllerEvent::PhotoSaved(saved.clone()));
        }
        Ok(saved)
    }

    /// Start recording the preview
    ///
    /// `Ok(false)` when already recording or no camera is running.
    pub fn start_recording(&mut self) -> MediaResult<bool> {
        if !self.is_started {
            debug!("Recording requested without an active camera");
            return Ok(false);
        }
        self.refresh_metadata();
        match self.recorder.start(&self.preview) {
            Ok(started) => Ok(started),
            Err(e) => Err(self.report_error(RECORD_ERROR, e)),
        }
    }

    /// Stop recording; the handle resolves once the file is finalized
    pub fn stop_recording(&mut self) -> Option<FinalizeHandle> {
        self.recorder.stop()
    }

    /// Start or stop recording
    pub fn toggle_recording(&mut self) -> MediaResult<RecorderToggle> {
        if self.recorder.is_recording() {
            return Ok(match self.recorder.stop() {
                Some(handle) => RecorderToggle::Stopped(handle),
                None => RecorderToggle::Unavailable,
            });
        }
        Ok(if self.start_recording()? {
            RecorderToggle::Started
        } else {
            RecorderToggle::Unavailable
        })
    }

    /// Probe the selected device at every scan candidate
    ///
    /// The live session is left running. Results replace the previous run's.
    pub async fn scan_resolutions(&mut self) -> MediaResult<Vec<ScanResultEntry>> {
        let device_id = self
            .selected_device
            .clone()
            .ok_or_else(|| MediaError::InvalidState {
                message: "no camera selected".to_string(),
            })?;

        let results = self.scanner.scan(self.devices.as_ref(), &device_id).await?;
        self.scan_results = results.clone();
        self.emit(ControllerEvent::ScanCompleted {
            results: results.clone(),
        });
        Ok(results)
    }

    // ------------------------------------------------------------------
    // Presentation
    // ------------------------------------------------------------------

    /// Toggle fullscreen; failures are logged and change nothing
    pub fn toggle_fullscreen(&mut self) -> bool {
        self.preview.toggle_fullscreen();
        self.sync_fullscreen()
    }

    /// Follow fullscreen changes made outside the controller
    pub fn sync_fullscreen(&mut self) -> bool {
        let fullscreen = self.preview.is_fullscreen();
        if fullscreen != self.is_fullscreen {
            self.is_fullscreen = fullscreen;
            self.emit(ControllerEvent::FullscreenChanged { fullscreen });
        }
        fullscreen
    }

    /// Advance the theme mode (`auto`, `light`, `dark`)
    pub fn cycle_theme(&mut self) -> MediaResult<ThemeMode> {
        let mode = self.theme.cycle()?;
        self.emit_theme();
        Ok(mode)
    }

    /// Select a theme mode and persist it
    pub fn set_theme_mode(&mut self, mode: ThemeMode) -> MediaResult<Theme> {
        let applied = self.theme.set_mode(mode)?;
        self.emit_theme();
        Ok(applied)
    }

    /// Apply a pending system appearance change
    pub fn sync_theme(&mut self) -> Option<Theme> {
        let applied = self.theme.sync_system()?;
        self.emit_theme();
        Some(applied)
    }

    /// Run the action bound to a shortcut
    ///
    /// A recording stopped this way finalizes in the background.
    pub fn handle_shortcut(&mut self, shortcut: Shortcut) -> MediaResult<()> {
        debug!(%shortcut, "Shortcut");
        match shortcut {
            Shortcut::Photo => {
                self.take_photo()?;
            }
            Shortcut::Fullscreen => {
                self.toggle_fullscreen();
            }
            Shortcut::Record => {
                self.toggle_recording()?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Subscribe to controller events
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Active configuration
    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Last enumerated video inputs
    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.device_list
    }

    /// `(device_id, label)` pairs for a device menu
    pub fn device_options(&self) -> Vec<(String, String)> {
        self.device_list
            .iter()
            .enumerate()
            .map(|(i, d)| (d.device_id.clone(), d.display_label(i)))
            .collect()
    }

    /// Device the controller last opened or tried to open
    pub fn selected_device(&self) -> Option<&str> {
        self.selected_device.as_deref()
    }

    /// Active session, if any
    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    /// Snapshot for display
    pub fn camera_info(&self) -> Option<&CameraInfo> {
        self.camera_info.as_ref()
    }

    /// Preview sink
    pub fn preview(&self) -> &LivePreview {
        &self.preview
    }

    /// Current user-visible error message
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether a camera session is running
    pub fn is_started(&self) -> bool {
        self.is_started
    }

    /// Whether a recording is running
    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Recording time as `mm:ss`
    pub fn recording_elapsed(&self) -> String {
        format_elapsed(self.recorder.elapsed_secs())
    }

    /// Results of the last completed scan
    pub fn scan_results(&self) -> &[ScanResultEntry] {
        &self.scan_results
    }

    /// Whether a scan is running
    pub fn is_scanning(&self) -> bool {
        self.scanner.is_running()
    }

    /// Whether the preview is fullscreen
    pub fn is_fullscreen(&self) -> bool {
        self.is_fullscreen
    }

    /// Selected theme mode
    pub fn theme_mode(&self) -> ThemeMode {
        self.theme.mode()
    }

    /// Theme currently applied
    pub fn applied_theme(&self) -> Theme {
        self.theme.applied()
    }

    /// Stop recording, release the camera, and stop background tasks
    ///
    /// Returns the pending recording finalization, if any. Idempotent.
    pub fn shutdown(&mut self) -> Option<FinalizeHandle> {
        let finalize = self.stop_camera();
        self.forwarder.abort();
        info!("Camera controller shut down");
        finalize
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    fn emit_theme(&self) {
        self.emit(ControllerEvent::ThemeChanged {
            mode: self.theme.mode(),
            applied: self.theme.applied(),
        });
    }

    fn report_error(&mut self, prefix: &str, error: MediaError) -> MediaError {
        let message = format!("{}: {}", prefix, error);
        warn!("{}", message);
        self.error = Some(message.clone());
        self.emit(ControllerEvent::Error { message });
        error
    }

    fn fail_camera(&mut self, prefix: &str, error: MediaError) -> MediaError {
        self.is_started = false;
        self.report_error(prefix, error)
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        self.recorder.shutdown();
        if let Some(session) = self.session.take() {
            session.stop();
        }
        self.forwarder.abort();
    }
}
