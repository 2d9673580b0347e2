//! # MirrorCam Diagnostics
//!
//! Diagnostic tools for MirrorCam.
//! Provides the resolution scanner and structured logging setup.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod logging;
pub mod scanner;

// Re-export main types
pub use logging::init_logging;
pub use scanner::{
    ResolutionScanner, ScanOutcome, ScanResultEntry, DEFAULT_SCAN_DELAY, SCAN_CANDIDATES,
};
