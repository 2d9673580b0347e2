//! Two-phase resolution negotiation
//!
//! 1. **Probe**: open the device with only its identity constrained, read the
//!    capability ranges, and stop the probe stream straight away.
//! 2. **Negotiate**: after a short grace delay (so the hardware can release the
//!    probe), reopen at the capability ceiling with width/height as `Exact`
//!    constraints, retrying once with them relaxed to `Ideal`.
//!
//! Requests are strictly sequential: simultaneous hardware opens are
//! unreliable on most platforms.

use crate::devices::{MediaConstraints, MediaDevices, VideoResolution};
use crate::error::{MediaError, MediaResult};
use crate::tracks::{MediaStream, TrackCapabilities};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ceiling assumed when the device does not expose capabilities
pub const DEFAULT_CEILING: CapabilityCeiling = CapabilityCeiling {
    resolution: VideoResolution::FULL_HD,
    frame_rate: 30.0,
};

/// Upper bound applied to a reported maximum frame rate
pub const MAX_FRAME_RATE_CAP: f64 = 60.0;

/// Maximum width, height, and frame rate a device reports supporting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapabilityCeiling {
    pub resolution: VideoResolution,
    pub frame_rate: f64,
}

impl CapabilityCeiling {
    /// Derive the ceiling from (possibly missing) capability ranges
    pub fn from_capabilities(
        capabilities: Option<&TrackCapabilities>,
        defaults: &CapabilityCeiling,
        frame_rate_cap: f64,
    ) -> Self {
        let Some(caps) = capabilities else {
            return *defaults;
        };
        Self {
            resolution: VideoResolution::new(
                caps.width.map_or(defaults.resolution.width, |r| r.max),
                caps.height.map_or(defaults.resolution.height, |r| r.max),
            ),
            frame_rate: caps
                .frame_rate
                .map_or(defaults.frame_rate, |r| r.max.min(frame_rate_cap)),
        }
    }
}

/// Negotiation tuning
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Wait between closing the probe and reopening the device
    pub probe_release_delay: Duration,
    /// Ceiling used when capabilities are not exposed
    pub default_ceiling: CapabilityCeiling,
    /// Cap applied to an exposed frame-rate maximum
    pub frame_rate_cap: f64,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            probe_release_delay: Duration::from_millis(200),
            default_ceiling: DEFAULT_CEILING,
            frame_rate_cap: MAX_FRAME_RATE_CAP,
        }
    }
}

/// Outcome of a capability probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    /// Device identity the platform actually opened
    pub device_id: String,
    /// Derived capability ceiling
    pub ceiling: CapabilityCeiling,
    /// Raw capability ranges, when exposed
    pub capabilities: Option<TrackCapabilities>,
}

/// Probe a device for its identity and capability ceiling
///
/// The probe stream is always stopped before returning.
pub async fn probe_capabilities(
    devices: &dyn MediaDevices,
    device_id: Option<&str>,
    config: &NegotiationConfig,
) -> MediaResult<ProbeResult> {
    debug!(device = ?device_id, "Probing camera capabilities");

    let stream = devices
        .get_user_media(&MediaConstraints::for_device(device_id))
        .await?;

    let result = match stream.video_track() {
        Some(track) => {
            let settings = track.settings();
            let capabilities = track.capabilities();
            let ceiling = CapabilityCeiling::from_capabilities(
                capabilities.as_ref(),
                &config.default_ceiling,
                config.frame_rate_cap,
            );
            Ok(ProbeResult {
                device_id: settings.device_id,
                ceiling,
                capabilities,
            })
        }
        None => Err(MediaError::CaptureNotActive),
    };

    stream.stop_all();

    if let Ok(probe) = &result {
        info!(
            device = %probe.device_id,
            max = %probe.ceiling.resolution,
            fps = probe.ceiling.frame_rate,
            exposed = probe.capabilities.is_some(),
            "Probe complete"
        );
    }
    result
}

/// Reopen a device at its capability ceiling
///
/// Issues at most two requests: exact width/height first, then the same
/// values as ideal constraints if the platform rejected the exact request.
pub async fn negotiate(
    devices: &dyn MediaDevices,
    device_id: &str,
    ceiling: &CapabilityCeiling,
    config: &NegotiationConfig,
) -> MediaResult<MediaStream> {
    tokio::time::sleep(config.probe_release_delay).await;

    let base = MediaConstraints::for_device(Some(device_id)).ideal_frame_rate(ceiling.frame_rate);

    let exact = base.clone().exact_resolution(ceiling.resolution);
    match devices.get_user_media(&exact).await {
        Ok(stream) => {
            debug!(device = %device_id, requested = %ceiling.resolution, "Exact request granted");
            return Ok(stream);
        }
        Err(e) => {
            warn!(
                device = %device_id,
                requested = %ceiling.resolution,
                "Exact resolution rejected, relaxing constraints: {}",
                e
            );
        }
    }

    let relaxed = base.ideal_resolution(ceiling.resolution);
    devices
        .get_user_media(&relaxed)
        .await
        .map_err(|e| MediaError::NegotiationFailed {
            device_id: device_id.to_string(),
            reason: e.to_string(),
        })
}

/// Probe then negotiate, returning both results
pub async fn open_best_stream(
    devices: &dyn MediaDevices,
    device_id: Option<&str>,
    config: &NegotiationConfig,
) -> MediaResult<(ProbeResult, MediaStream)> {
    let probe = probe_capabilities(devices, device_id, config).await?;
    let stream = negotiate(devices, &probe.device_id, &probe.ceiling, config).await?;
    Ok((probe, stream))
}
