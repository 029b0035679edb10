//! Camera pipeline error types and handling
//!
//! Platform failures arrive as [`PlatformError`] values shaped after the
//! Media Capture error names. The acquirer classifies the last one into an
//! [`AcquisitionErrorKind`] exactly once, and every kind maps to a single
//! message the UI can show as-is.

use skinlens_core::SkinLensError;
use std::fmt;
use thiserror::Error;

/// Failure classes reported by the media device platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformErrorKind {
    /// The user or the platform refused access (also returned by `play()` under autoplay policy)
    NotAllowed,
    /// No device satisfies the request
    NotFound,
    /// The device exists but cannot be read, usually because another process holds it
    NotReadable,
    /// A constraint could not be satisfied
    Overconstrained {
        /// Name of the offending constraint
        constraint: String,
    },
    /// The operation was interrupted
    Abort,
    /// Access blocked by a security policy
    Security,
    /// Anything else
    Other,
}

impl PlatformErrorKind {
    /// Media Capture style error name
    pub fn name(&self) -> &'static str {
        match self {
            PlatformErrorKind::NotAllowed => "NotAllowedError",
            PlatformErrorKind::NotFound => "NotFoundError",
            PlatformErrorKind::NotReadable => "NotReadableError",
            PlatformErrorKind::Overconstrained { .. } => "OverconstrainedError",
            PlatformErrorKind::Abort => "AbortError",
            PlatformErrorKind::Security => "SecurityError",
            PlatformErrorKind::Other => "Error",
        }
    }
}

/// Error raised by a [`crate::MediaDevices`], [`crate::MediaTrack`] or [`crate::VideoSink`] implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: {message}", .kind.name())]
pub struct PlatformError {
    /// Failure class
    pub kind: PlatformErrorKind,
    /// Platform supplied detail
    pub message: String,
}

impl PlatformError {
    /// Create a platform error
    pub fn new(kind: PlatformErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// `NotAllowedError`
    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::new(PlatformErrorKind::NotAllowed, message)
    }

    /// `NotFoundError`
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(PlatformErrorKind::NotFound, message)
    }

    /// `NotReadableError`
    pub fn not_readable(message: impl Into<String>) -> Self {
        Self::new(PlatformErrorKind::NotReadable, message)
    }

    /// `OverconstrainedError` naming the rejected constraint
    pub fn overconstrained(constraint: impl Into<String>) -> Self {
        let constraint = constraint.into();
        Self::new(
            PlatformErrorKind::Overconstrained {
                constraint: constraint.clone(),
            },
            format!("cannot satisfy constraint '{}'", constraint),
        )
    }

    /// Unclassified platform failure
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(PlatformErrorKind::Other, message)
    }

    /// Whether this is an `OverconstrainedError`
    pub fn is_overconstrained(&self) -> bool {
        matches!(self.kind, PlatformErrorKind::Overconstrained { .. })
    }
}

/// Terminal acquisition failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquisitionErrorKind {
    /// Camera permission was refused
    PermissionDenied,
    /// No video input device exists
    NoDeviceFound,
    /// The device is held by something else
    DeviceBusy,
    /// No device can satisfy the request
    Overconstrained,
    /// Anything the platform did not explain
    Unknown,
}

impl AcquisitionErrorKind {
    /// Classify a platform failure
    pub fn classify(error: &PlatformError) -> Self {
        match error.kind {
            PlatformErrorKind::NotAllowed | PlatformErrorKind::Security => {
                AcquisitionErrorKind::PermissionDenied
            }
            PlatformErrorKind::NotFound => AcquisitionErrorKind::NoDeviceFound,
            PlatformErrorKind::NotReadable => AcquisitionErrorKind::DeviceBusy,
            PlatformErrorKind::Overconstrained { .. } => AcquisitionErrorKind::Overconstrained,
            PlatformErrorKind::Abort | PlatformErrorKind::Other => AcquisitionErrorKind::Unknown,
        }
    }

    /// Stable code carried into `SkinLensError::CameraUnavailable`
    pub fn code(&self) -> &'static str {
        match self {
            AcquisitionErrorKind::PermissionDenied => "PERMISSION_DENIED",
            AcquisitionErrorKind::NoDeviceFound => "NO_DEVICE_FOUND",
            AcquisitionErrorKind::DeviceBusy => "DEVICE_BUSY",
            AcquisitionErrorKind::Overconstrained => "OVERCONSTRAINED",
            AcquisitionErrorKind::Unknown => "CAMERA_START_FAILED",
        }
    }

    /// Inverse of [`code`](Self::code)
    pub fn from_code(code: &str) -> Option<Self> {
        [
            AcquisitionErrorKind::PermissionDenied,
            AcquisitionErrorKind::NoDeviceFound,
            AcquisitionErrorKind::DeviceBusy,
            AcquisitionErrorKind::Overconstrained,
            AcquisitionErrorKind::Unknown,
        ]
        .into_iter()
        .find(|kind| kind.code() == code)
    }

    /// User-facing message for this class
    pub fn user_message(&self) -> &'static str {
        match self {
            AcquisitionErrorKind::PermissionDenied => {
                "Unable to access camera. Please ensure camera permissions are granted."
            }
            AcquisitionErrorKind::NoDeviceFound => {
                "No camera was found. Connect a camera or upload a photo instead."
            }
            AcquisitionErrorKind::DeviceBusy => {
                "Your camera is being used by another application. Close it and try again."
            }
            AcquisitionErrorKind::Overconstrained => {
                "Your camera does not support the required video settings."
            }
            AcquisitionErrorKind::Unknown => "Unable to start the camera. Please try again.",
        }
    }
}

impl fmt::Display for AcquisitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionErrorKind::PermissionDenied => "permission denied",
            AcquisitionErrorKind::NoDeviceFound => "no device found",
            AcquisitionErrorKind::DeviceBusy => "device busy",
            AcquisitionErrorKind::Overconstrained => "overconstrained",
            AcquisitionErrorKind::Unknown => "unknown acquisition failure",
        };
        f.write_str(name)
    }
}

/// Classified, terminal failure of one acquisition chain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Camera acquisition failed ({kind}) after {attempts} attempt(s): {source}")]
pub struct AcquisitionError {
    /// Failure class
    pub kind: AcquisitionErrorKind,
    /// Number of requests made before giving up
    pub attempts: u32,
    /// Platform error of the final attempt
    #[source]
    pub source: PlatformError,
}

impl AcquisitionError {
    /// Classify the final platform error of a chain
    pub fn from_platform(source: PlatformError, attempts: u32) -> Self {
        Self {
            kind: AcquisitionErrorKind::classify(&source),
            attempts,
            source,
        }
    }

    /// User-facing message
    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

/// Main error type for the camera pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// Device acquisition failed for good
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    /// The sink reports no decoded frame yet
    #[error("Camera not ready for capture: intrinsic size {width}x{height}")]
    NotReadyForCapture {
        /// Reported intrinsic width
        width: u32,
        /// Reported intrinsic height
        height: u32,
    },

    /// No stream is attached
    #[error("No active camera stream")]
    NoActiveStream,

    /// The operation was overtaken by a restart or stop
    #[error("Camera operation superseded by a newer request")]
    Superseded,

    /// Raster data does not match the reported geometry
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected data size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// Still image encoding failed
    #[error("Encoding failed: {reason}")]
    EncodingFailed {
        /// Failure reason
        reason: String,
    },

    /// A selected file is not a usable image
    #[error("Invalid image: {reason}")]
    InvalidImage {
        /// Why the file was rejected
        reason: String,
    },

    /// A selected file exceeds the size limit
    #[error("Image too large: {size} bytes (limit {limit})")]
    ImageTooLarge {
        /// File size in bytes
        size: usize,
        /// Limit in bytes
        limit: usize,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Platform failure outside acquisition
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

/// Result type alias for camera pipeline operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if the user can recover by waiting or retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::NotReadyForCapture { .. } => true,
            MediaError::Superseded => true,
            MediaError::InvalidImage { .. } => true,
            MediaError::ImageTooLarge { .. } => true,
            MediaError::InvalidFrameData { .. } => true,
            MediaError::Acquisition(error) => matches!(
                error.kind,
                AcquisitionErrorKind::DeviceBusy | AcquisitionErrorKind::Unknown
            ),
            MediaError::NoActiveStream => true,
            MediaError::EncodingFailed { .. } => false,
            MediaError::InvalidConfiguration { .. } => false,
            MediaError::Platform(_) => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::Acquisition(error) => match error.kind {
                AcquisitionErrorKind::PermissionDenied => ErrorCategory::Permission,
                _ => ErrorCategory::Device,
            },
            MediaError::NotReadyForCapture { .. } => ErrorCategory::State,
            MediaError::NoActiveStream => ErrorCategory::State,
            MediaError::Superseded => ErrorCategory::State,
            MediaError::InvalidFrameData { .. } => ErrorCategory::Data,
            MediaError::EncodingFailed { .. } => ErrorCategory::Codec,
            MediaError::InvalidImage { .. } => ErrorCategory::Data,
            MediaError::ImageTooLarge { .. } => ErrorCategory::Data,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::Platform(_) => ErrorCategory::Platform,
        }
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            MediaError::Acquisition(error) => error.user_message().to_string(),
            MediaError::NotReadyForCapture { .. } | MediaError::NoActiveStream => {
                "Camera not ready. Please wait a moment and try again.".to_string()
            }
            MediaError::InvalidImage { .. } => "Please select a valid image file.".to_string(),
            MediaError::ImageTooLarge { .. } => "Image size must be less than 10MB.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Permission refused by the user or policy
    Permission,
    /// Device and hardware errors
    Device,
    /// State management errors
    State,
    /// Data validation errors
    Data,
    /// Encoding errors
    Codec,
    /// Configuration and parameter errors
    Configuration,
    /// Other platform errors
    Platform,
}

impl From<MediaError> for SkinLensError {
    fn from(error: MediaError) -> Self {
        let recoverable = error.is_recoverable();
        match error {
            MediaError::Acquisition(acquisition) => SkinLensError::CameraUnavailable {
                code: acquisition.kind.code(),
                reason: acquisition.user_message().to_string(),
                recoverable,
            },
            other => SkinLensError::MediaProcessing {
                reason: other.user_message(),
                recoverable,
            },
        }
    }
}
