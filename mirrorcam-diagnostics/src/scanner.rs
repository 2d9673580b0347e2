//! Resolution scanner
//!
//! Requests a fixed list of common resolutions as hard constraints, one at a
//! time, and records what the device actually granted for each. Useful for
//! spotting cameras whose advertised capabilities do not match what they
//! deliver. The scanner opens its own trial streams and never touches a live
//! capture session.

use mirrorcam_media::{MediaConstraints, MediaDevices, MediaError, MediaResult, VideoResolution};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Resolutions tried, in order
pub const SCAN_CANDIDATES: [VideoResolution; 8] = [
    VideoResolution::new(1920, 1080),
    VideoResolution::new(1600, 1200),
    VideoResolution::new(1552, 1552),
    VideoResolution::new(1536, 1536),
    VideoResolution::new(1280, 720),
    VideoResolution::new(1024, 768),
    VideoResolution::new(800, 600),
    VideoResolution::new(640, 480),
];

/// Pause between trial requests
pub const DEFAULT_SCAN_DELAY: Duration = Duration::from_millis(200);

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Device granted a stream of this size (`WxH`)
    Granted(String),
    /// Request failed with this message
    Failed(String),
}

/// One line of a scan report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResultEntry {
    /// Requested size (`WxH`)
    pub requested: String,
    /// Result of the request
    pub outcome: ScanOutcome,
}

impl ScanResultEntry {
    /// Granted size, if the request succeeded
    pub fn granted(&self) -> Option<&str> {
        match &self.outcome {
            ScanOutcome::Granted(size) => Some(size),
            ScanOutcome::Failed(_) => None,
        }
    }

    /// Whether the device delivered exactly what was asked for
    pub fn is_exact_match(&self) -> bool {
        self.granted() == Some(self.requested.as_str())
    }
}

impl fmt::Display for ScanResultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ScanOutcome::Granted(size) => write!(f, "{} -> {}", self.requested, size),
            ScanOutcome::Failed(message) => write!(f, "{} -> failed: {}", self.requested, message),
        }
    }
}

/// Clears the running flag however the scan ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sequential resolution prober
#[derive(Debug)]
pub struct ResolutionScanner {
    candidates: Vec<VideoResolution>,
    delay: Duration,
    running: AtomicBool,
}

impl ResolutionScanner {
    /// Scanner over [`SCAN_CANDIDATES`]
    pub fn new(delay: Duration) -> Self {
        Self::with_candidates(SCAN_CANDIDATES.to_vec(), delay)
    }

    /// Scanner over a custom candidate list
    pub fn with_candidates(candidates: Vec<VideoResolution>, delay: Duration) -> Self {
        Self {
            candidates,
            delay,
            running: AtomicBool::new(false),
        }
    }

    /// Candidate list, in scan order
    pub fn candidates(&self) -> &[VideoResolution] {
        &self.candidates
    }

    /// Whether a scan is in progress
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Try every candidate on `device_id`
    ///
    /// Fails with [`MediaError::ScanInProgress`] if another scan is running.
    pub async fn scan(
        &self,
        devices: &dyn MediaDevices,
        device_id: &str,
    ) -> MediaResult<Vec<ScanResultEntry>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(MediaError::ScanInProgress);
        }
        let _guard = RunningGuard(&self.running);

        info!(device = %device_id, candidates = self.candidates.len(), "Starting resolution scan");
        let mut results = Vec::with_capacity(self.candidates.len());

        for candidate in &self.candidates {
            let constraints =
                MediaConstraints::for_device(Some(device_id)).exact_resolution(*candidate);
            let outcome = match devices.get_user_media(&constraints).await {
                Ok(stream) => {
                    let granted = stream
                        .video_track()
                        .map(|t| t.settings().resolution().to_string())
                        .unwrap_or_default();
                    stream.stop_all();
                    ScanOutcome::Granted(granted)
                }
                Err(e) => ScanOutcome::Failed(e.to_string()),
            };

            let entry = ScanResultEntry {
                requested: candidate.to_string(),
                outcome,
            };
            debug!("Scan: {}", entry);
            results.push(entry);

            tokio::time::sleep(self.delay).await;
        }

        info!(
            granted = results.iter().filter(|r| r.granted().is_some()).count(),
            "Resolution scan complete"
        );
        Ok(results)
    }
}

impl Default for ResolutionScanner {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_DELAY)
    }
}
