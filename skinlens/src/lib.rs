//! # SkinLens
//!
//! Camera capture pipeline for a skin-analysis app. SkinLens opens a camera,
//! checks that frames are really arriving, and recovers once from a frozen
//! feed. It snapshots a JPEG still and uploads it for demographic analysis.
//! The camera device is released on every exit path.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skinlens::{MockMediaDevices, MockVideoSink, SkinLens};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let skinlens = SkinLens::init()?;
//!     let session = skinlens.session(
//!         Arc::new(MockMediaDevices::with_default_camera()),
//!         Arc::new(MockVideoSink::new()),
//!     )?;
//!
//!     let mut events = session.events();
//!     session.start_camera().await?;
//!     session.capture_photo()?;
//!
//!     let report = session.submit().await?;
//!     println!("Predictions: {:?}", report);
//!
//!     while let Some(event) = events.try_next()? {
//!         println!("Session event: {}", event.event_type());
//!     }
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use skinlens_core::{
    AcceptedProfile, AnalysisResponse, Category, DemographicReport, Distribution,
    HttpInferenceClient, InferenceClient, InferenceConfig, Prediction, PredictionSet,
    ProfileDetails, RankedPredictions, SkinLensError, NETWORK_ERROR_MESSAGE,
    PROFILE_FAILED_MESSAGE, UPLOAD_FAILED_MESSAGE,
};

pub use skinlens_media::{
    AcquisitionError, AcquisitionErrorKind, CameraConfig, CameraEvent, CameraLifecycle,
    CameraStatus, CaptureReadinessState, FacingMode, MediaDevices, MediaError,
    MockCameraBehavior, MockMediaDevices, MockVideoSink, PlatformError, PlatformErrorKind,
    RecoveryPlan, StillImage, StillSource, VideoResolution, VideoSink, FROZEN_MESSAGE, JPEG_MIME,
};

#[cfg(feature = "native")]
pub use skinlens_media::{NativeMediaDevices, NativeVideoSink};

pub use skinlens_diagnostics::{DiagnosticLog, DiagnosticLogEntry};

// Public API modules
pub mod config;
pub mod event;
pub mod session;

// Re-export main API types
pub use config::SkinLensConfig;
pub use event::{Event, EventFilter, EventStream, FilteredEventStream};
pub use session::CaptureSession;

use std::sync::Arc;
use tracing::debug;

/// Main entry point for SkinLens
#[derive(Clone)]
pub struct SkinLens {
    inner: Arc<SkinLensInner>,
}

struct SkinLensInner {
    config: SkinLensConfig,
    inference: Arc<dyn InferenceClient>,
}

impl SkinLens {
    /// Initialize SkinLens with default settings
    ///
    /// # Example
    /// ```rust,no_run
    /// use skinlens::SkinLens;
    ///
    /// let skinlens = SkinLens::init()?;
    /// # Ok::<(), skinlens::SkinLensError>(())
    /// ```
    pub fn init() -> Result<Self, SkinLensError> {
        Self::init_with(SkinLensConfig::default())
    }

    /// Initialize with custom configuration
    pub fn init_with(config: SkinLensConfig) -> Result<Self, SkinLensError> {
        config.validate()?;

        if !skinlens_diagnostics::init_logging(config.log_directive())? {
            debug!("tracing subscriber already installed");
        }

        let client = HttpInferenceClient::new(config.inference.clone())?;
        Ok(Self::with_inference_client(config, Arc::new(client)))
    }

    /// Build with a caller-supplied inference client. Logging is left alone.
    pub fn with_inference_client(
        config: SkinLensConfig,
        inference: Arc<dyn InferenceClient>,
    ) -> Self {
        Self {
            inner: Arc::new(SkinLensInner { config, inference }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &SkinLensConfig {
        &self.inner.config
    }

    /// Open a capture session over the given camera backend and video sink
    pub fn session(
        &self,
        devices: Arc<dyn MediaDevices>,
        sink: Arc<dyn VideoSink>,
    ) -> Result<CaptureSession, SkinLensError> {
        let config = &self.inner.config;
        let log = DiagnosticLog::with_capacity(config.diagnostic_log_capacity);
        let camera = CameraLifecycle::new(devices, sink, config.camera.clone(), log)?;
        Ok(CaptureSession::new(camera, self.inner.inference.clone()))
    }

    /// Open a capture session on the system camera
    #[cfg(feature = "native")]
    pub fn native_session(&self) -> Result<CaptureSession, SkinLensError> {
        self.session(
            Arc::new(NativeMediaDevices::new()),
            Arc::new(NativeVideoSink::new()),
        )
    }
}

impl std::fmt::Debug for SkinLens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkinLens")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
