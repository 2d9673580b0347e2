//! Error types for MirrorCam core services

use thiserror::Error;

/// Main error type for core operations (preferences, theme, configuration)
#[derive(Error, Debug)]
pub enum CoreError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Preference file could not be parsed or written
    #[error("Preference serialization failed: {source}")]
    Serialization {
        /// Underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// Stored preference holds a value outside its domain
    #[error("Invalid preference value for {key}: {value}")]
    InvalidPreference {
        /// Preference key
        key: String,
        /// Offending value
        value: String,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Logging subsystem could not be installed
    #[error("Logging initialization failed: {reason}")]
    Logging {
        /// Reason for failure
        reason: String,
    },
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
