//! Media error types and handling
//!
//! This module defines all error types used throughout the capture, preview,
//! and recording pipeline, providing clear messages that can be shown to the
//! user directly.

use mirrorcam_core::CoreError;
use thiserror::Error;

/// Main error type for media operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Core service failed (preferences, configuration)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Capture permission was refused
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// No video input device present
    #[error("No video input devices available")]
    NoDevices,

    /// Device not found error
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// Device identifier
        device_id: String,
    },

    /// Device exists but could not be opened or read
    #[error("Device access failed: {reason}")]
    DeviceAccess {
        /// Failure reason
        reason: String,
    },

    /// A hard constraint could not be satisfied by the device
    #[error("Constraint {constraint} cannot be satisfied: {message}")]
    Overconstrained {
        /// Name of the rejected constraint
        constraint: String,
        /// Error message
        message: String,
    },

    /// Both the exact and the relaxed stream request were rejected
    #[error("Resolution negotiation failed for {device_id}: {reason}")]
    NegotiationFailed {
        /// Device identifier
        device_id: String,
        /// Failure reason of the relaxed attempt
        reason: String,
    },

    /// Capture not active error
    #[error("Capture not active")]
    CaptureNotActive,

    /// Invalid frame data error
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected data size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// Encoder could not be constructed for the chosen format
    #[error("Encoder initialization failed: {mime_type} - {reason}")]
    EncoderCreation {
        /// Chosen container/codec identifier
        mime_type: String,
        /// Failure reason
        reason: String,
    },

    /// Encoder failed while recording
    #[error("Encoding failed: {reason}")]
    EncoderRuntime {
        /// Failure reason
        reason: String,
    },

    /// Invalid state for operation
    #[error("Invalid state: {message}")]
    InvalidState {
        /// State error message
        message: String,
    },

    /// Device switch attempted while a recording is running
    #[error("Cannot switch devices while recording")]
    RecordingActive,

    /// A resolution scan is already running
    #[error("A resolution scan is already in progress")]
    ScanInProgress,

    /// Saving a download failed
    #[error("Download of {filename} failed: {reason}")]
    Download {
        /// Target file name
        filename: String,
        /// Failure reason
        reason: String,
    },

    /// Image encoding failed
    #[error("Image error: {source}")]
    Image {
        #[from]
        source: image::ImageError,
    },

    /// Display surface refused an operation
    #[error("Display error: {message}")]
    Display {
        /// Error message
        message: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if retrying the same operation later can succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::Io { .. } => true,
            MediaError::DeviceAccess { .. } => true,
            MediaError::CaptureNotActive => true,
            MediaError::RecordingActive => true,
            MediaError::ScanInProgress => true,
            MediaError::Overconstrained { .. } => false,
            MediaError::PermissionDenied { .. } => false,
            MediaError::EncoderCreation { .. } => false,
            MediaError::NoDevices => false,
            _ => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::Io { .. } => ErrorCategory::System,
            MediaError::Core(_) => ErrorCategory::Configuration,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::PermissionDenied { .. } => ErrorCategory::Permission,
            MediaError::NoDevices => ErrorCategory::Device,
            MediaError::DeviceNotFound { .. } => ErrorCategory::Device,
            MediaError::DeviceAccess { .. } => ErrorCategory::Device,
            MediaError::Overconstrained { .. } => ErrorCategory::Negotiation,
            MediaError::NegotiationFailed { .. } => ErrorCategory::Negotiation,
            MediaError::CaptureNotActive => ErrorCategory::State,
            MediaError::InvalidFrameData { .. } => ErrorCategory::Data,
            MediaError::EncoderCreation { .. } => ErrorCategory::Codec,
            MediaError::EncoderRuntime { .. } => ErrorCategory::Codec,
            MediaError::InvalidState { .. } => ErrorCategory::State,
            MediaError::RecordingActive => ErrorCategory::State,
            MediaError::ScanInProgress => ErrorCategory::State,
            MediaError::Download { .. } => ErrorCategory::System,
            MediaError::Image { .. } => ErrorCategory::Data,
            MediaError::Display { .. } => ErrorCategory::Display,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// System-level errors (I/O, file output)
    System,
    /// Configuration and parameter errors
    Configuration,
    /// Capture permission errors
    Permission,
    /// Device and hardware errors
    Device,
    /// Constraint negotiation errors
    Negotiation,
    /// Encoder errors
    Codec,
    /// Frame and image data errors
    Data,
    /// State management errors
    State,
    /// Display surface errors
    Display,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let rejected = MediaError::Overconstrained {
            constraint: "width".to_string(),
            message: "1920 exceeds 1280".to_string(),
        };
        assert_eq!(rejected.category(), ErrorCategory::Negotiation);
        assert!(!rejected.is_recoverable());

        let busy = MediaError::RecordingActive;
        assert_eq!(busy.category(), ErrorCategory::State);
        assert!(busy.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = MediaError::InvalidFrameData {
            expected: 1024,
            actual: 512,
        };
        assert_eq!(
            error.to_string(),
            "Invalid frame data: expected 1024 bytes, got 512"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let media_error = MediaError::from(io_error);

        match media_error {
            MediaError::Io { .. } => (),
            _ => panic!("Expected Io error variant"),
        }
    }
}
