//! # SkinLens Core
//!
//! Shared foundation for the SkinLens workspace. It holds the top-level error
//! type and the client for the remote skin-analysis inference endpoint. It
//! also holds the demographic review model built from the endpoint's
//! predictions, plus validation of the profile details sent before the photo
//! step.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod demographics;
pub mod error;
pub mod inference;
pub mod profile;

// Re-export main types
pub use demographics::{AcceptedProfile, Category, DemographicReport, Prediction, RankedPredictions};
pub use error::{SkinLensError, UPLOAD_FAILED_MESSAGE};
pub use inference::{
    AnalysisResponse, Distribution, HttpInferenceClient, InferenceClient, InferenceConfig,
    PredictionSet,
    DEFAULT_ANALYSIS_URL, DEFAULT_PROFILE_URL,
};
pub use profile::{
    profile_failure_message, ProfileDetails, NETWORK_ERROR_MESSAGE, PROFILE_FAILED_MESSAGE,
};
