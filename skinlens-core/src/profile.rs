//! Profile details collected before the photo step

use crate::error::SkinLensError;
use serde::{Deserialize, Serialize};

/// Message shown when the profile endpoint rejects the submission
pub const PROFILE_FAILED_MESSAGE: &str = "Failed to submit data. Please try again.";

/// Message shown when the profile endpoint could not be reached
pub const NETWORK_ERROR_MESSAGE: &str = "Network error. Please try again.";

/// User-facing message for a failed profile registration.
///
/// Only an upload that never got an HTTP answer counts as a network error.
pub fn profile_failure_message(error: &SkinLensError) -> &'static str {
    match error {
        SkinLensError::UploadFailed { status: None, .. } => NETWORK_ERROR_MESSAGE,
        _ => PROFILE_FAILED_MESSAGE,
    }
}

/// Validated name and city
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDetails {
    /// Trimmed name, letters and spaces only
    pub name: String,
    /// Trimmed city, letters and spaces only
    pub location: String,
}

impl ProfileDetails {
    /// Trim and validate both fields
    pub fn new(name: &str, location: &str) -> Result<Self, SkinLensError> {
        Ok(Self {
            name: validate_field("name", "Name", name)?,
            location: validate_field("location", "City", location)?,
        })
    }
}

fn validate_field(field: &str, label: &str, value: &str) -> Result<String, SkinLensError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SkinLensError::InvalidInput {
            field: field.to_string(),
            message: format!("{} is required", label),
        });
    }

    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c.is_whitespace())
    {
        return Err(SkinLensError::InvalidInput {
            field: field.to_string(),
            message: format!("{} must contain only letters and spaces", label),
        });
    }

    Ok(trimmed.to_string())
}
