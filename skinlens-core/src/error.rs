//! Error types for SkinLens

use thiserror::Error;

/// Message shown to the user when the analysis upload fails
pub const UPLOAD_FAILED_MESSAGE: &str = "Failed to upload image. Please try again.";

/// Main error type for SkinLens operations outside the camera pipeline
#[derive(Error, Debug)]
pub enum SkinLensError {
    /// Invalid configuration error
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// The inference endpoint could not be reached or refused the request
    #[error("Upload to {endpoint} failed: {reason}")]
    UploadFailed {
        /// Endpoint the request was sent to
        endpoint: String,
        /// HTTP status, when the server answered
        status: Option<u16>,
        /// Reason for failure
        reason: String,
    },

    /// The inference endpoint answered 2xx with a body we cannot use
    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse {
        /// Endpoint that produced the response
        endpoint: String,
        /// Reason the body was rejected
        reason: String,
    },

    /// User input rejected before any request was made
    #[error("Invalid {field}: {message}")]
    InvalidInput {
        /// Field that failed validation
        field: String,
        /// User-facing explanation
        message: String,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// The camera could not be acquired
    #[error("Camera unavailable ({code}): {reason}")]
    CameraUnavailable {
        /// Failure class, e.g. `PERMISSION_DENIED` or `DEVICE_BUSY`
        code: &'static str,
        /// User-facing explanation
        reason: String,
        /// Whether the user can recover by retrying
        recoverable: bool,
    },

    /// Camera or still image processing error
    #[error("Media processing error: {reason}")]
    MediaProcessing {
        /// Reason for media error
        reason: String,
        /// Whether the user can recover by retrying
        recoverable: bool,
    },
}

impl SkinLensError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            SkinLensError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            SkinLensError::UploadFailed { .. } => "UPLOAD_FAILED",
            SkinLensError::InvalidResponse { .. } => "INVALID_RESPONSE",
            SkinLensError::InvalidInput { .. } => "INVALID_INPUT",
            SkinLensError::InvalidState { .. } => "INVALID_STATE",
            SkinLensError::CameraUnavailable { code, .. } => *code,
            SkinLensError::MediaProcessing { .. } => "MEDIA_PROCESSING_ERROR",
        }
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            SkinLensError::UploadFailed { .. } | SkinLensError::InvalidResponse { .. } => {
                UPLOAD_FAILED_MESSAGE.to_string()
            }
            SkinLensError::InvalidInput { message, .. }
            | SkinLensError::CameraUnavailable {
                reason: message, ..
            } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether a manual retry of the same operation can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SkinLensError::UploadFailed { status, .. } => {
                !matches!(status, Some(code) if (400..500).contains(code) && *code != 429)
            }
            SkinLensError::InvalidResponse { .. } => true,
            SkinLensError::CameraUnavailable { recoverable, .. }
            | SkinLensError::MediaProcessing { recoverable, .. } => *recoverable,
            _ => false,
        }
    }
}
