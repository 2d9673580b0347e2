#[cfg(feature = "native")]
pub mod native;
pub mod synthetic;

use crate::devices::MediaDevices;
use std::sync::Arc;

#[cfg(feature = "native")]
pub use native::{NokhwaDevices, NokhwaTrack};
pub use synthetic::{test_pattern, ConstraintPolicy, SyntheticCamera, SyntheticDevices, SyntheticTrack};

/// Get the appropriate platform device backend
pub fn default_media_devices() -> Arc<dyn MediaDevices> {
    #[cfg(feature = "native")]
    {
        Arc::new(NokhwaDevices::new())
    }
    #[cfg(not(feature = "native"))]
    {
        tracing::warn!("Native capture not compiled in, using synthetic cameras");
        Arc::new(SyntheticDevices::default())
    }
}
