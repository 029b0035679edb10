//! Camera pipeline configuration

use crate::device::{FacingMode, VideoResolution};
use crate::error::MediaError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Camera pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Facing hint for the first acquisition attempt
    pub preferred_facing: FacingMode,
    /// Resolution hint for the first acquisition attempt
    pub ideal_resolution: VideoResolution,
    /// Wait after playback start before checking for frozen frames
    pub freeze_check_delay: Duration,
    /// Acquisition time after which the manual start affordance is raised
    pub slow_acquisition_threshold: Duration,
    /// JPEG quality for captured stills, 1..=100
    pub jpeg_quality: u8,
    /// Largest accepted selected photo, in bytes
    pub max_upload_bytes: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            preferred_facing: FacingMode::User,
            ideal_resolution: VideoResolution::HD,
            freeze_check_delay: Duration::from_millis(1200),
            slow_acquisition_threshold: Duration::from_millis(1500),
            jpeg_quality: 90,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl CameraConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), MediaError> {
        if self.ideal_resolution.is_empty() {
            return Err(MediaError::InvalidConfiguration {
                message: "Invalid resolution".to_string(),
            });
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(MediaError::InvalidConfiguration {
                message: format!("JPEG quality must be 1..=100, got {}", self.jpeg_quality),
            });
        }

        if self.freeze_check_delay.is_zero() {
            return Err(MediaError::InvalidConfiguration {
                message: "Freeze check delay must be > 0".to_string(),
            });
        }

        if self.max_upload_bytes == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: "Upload size limit must be > 0".to_string(),
            });
        }

        Ok(())
    }
}
