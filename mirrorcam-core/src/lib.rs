//! # MirrorCam Core
//!
//! Shared foundations for the MirrorCam workspace: the core error type,
//! durable preference storage, and theme mode resolution against the
//! system appearance signal.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod preference;
pub mod theme;

// Re-export main types
pub use error::{CoreError, CoreResult};
pub use preference::{JsonPreferenceStore, MemoryPreferenceStore, PreferenceStore, THEME_KEY};
pub use theme::{SystemAppearance, Theme, ThemeManager, ThemeMode};
