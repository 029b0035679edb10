//! Configuration types and defaults

use crate::{CameraConfig, InferenceConfig, SkinLensError};
use serde::{Deserialize, Serialize};
use skinlens_diagnostics::DEFAULT_LOG_CAPACITY;

/// Global SkinLens configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinLensConfig {
    /// Camera pipeline settings
    pub camera: CameraConfig,
    /// Inference endpoint settings
    pub inference: InferenceConfig,
    /// Enable debug logging
    pub debug_logging: bool,
    /// Entries kept in each session's diagnostic log
    pub diagnostic_log_capacity: usize,
}

impl Default for SkinLensConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            inference: InferenceConfig::default(),
            debug_logging: false,
            diagnostic_log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl SkinLensConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SkinLensError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SkinLensError::InvalidConfiguration {
                message: format!("Failed to parse configuration: {}", e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), SkinLensError> {
        self.camera
            .validate()
            .map_err(|e| SkinLensError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        self.inference.validate()?;

        if self.diagnostic_log_capacity == 0 {
            return Err(SkinLensError::InvalidConfiguration {
                message: "Diagnostic log capacity must be > 0".to_string(),
            });
        }

        Ok(())
    }

    /// Default `tracing` directive for this configuration
    pub fn log_directive(&self) -> &'static str {
        if self.debug_logging {
            "debug"
        } else {
            "info"
        }
    }
}
