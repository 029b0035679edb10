//! Client for the remote skin-analysis inference endpoint
//!
//! The endpoint is an opaque HTTPS service: it receives a base64 still and
//! answers with per-category confidence distributions. Requests are made with
//! a blocking `ureq` agent moved onto tokio's blocking pool so callers stay
//! responsive while the upload is in flight.

use crate::error::SkinLensError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Analysis endpoint used by the hosted service
pub const DEFAULT_ANALYSIS_URL: &str =
    "https://us-central1-api-skinstric-ai.cloudfunctions.net/skinstricPhaseTwo";

/// Profile registration endpoint used by the hosted service
pub const DEFAULT_PROFILE_URL: &str =
    "https://us-central1-api-skinstric-ai.cloudfunctions.net/skinstricPhaseOne";

/// Inference endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// URL receiving `{ "image": <base64> }`
    pub analysis_url: String,
    /// URL receiving `{ "name", "location" }`
    pub profile_url: String,
    /// Whole-request timeout
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            analysis_url: DEFAULT_ANALYSIS_URL.to_string(),
            profile_url: DEFAULT_PROFILE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl InferenceConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), SkinLensError> {
        for (field, url) in [
            ("analysis_url", &self.analysis_url),
            ("profile_url", &self.profile_url),
        ] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(SkinLensError::InvalidConfiguration {
                    message: format!("{} must be an http(s) URL, got '{}'", field, url),
                });
            }
        }

        if self.timeout.is_zero() {
            return Err(SkinLensError::InvalidConfiguration {
                message: "timeout must be > 0".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Serialize)]
struct AnalysisRequest<'a> {
    image: &'a str,
}

#[derive(Serialize)]
struct ProfileRequest<'a> {
    name: &'a str,
    location: &'a str,
}

/// Label to confidence, in the order the service listed the labels.
///
/// Confidences are nominally in `0.0..=1.0`. Order matters: ranking is
/// stable, so labels tied after rounding keep the order they arrived in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Distribution {
    entries: Vec<(String, f64)>,
}

impl Distribution {
    /// Labels and confidences in arrival order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries
            .iter()
            .map(|(label, confidence)| (label.as_str(), *confidence))
    }

    /// Confidence for `label`, if present
    pub fn get(&self, label: &str) -> Option<f64> {
        self.iter()
            .find(|(candidate, _)| *candidate == label)
            .map(|(_, confidence)| confidence)
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no labels were returned
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<L: Into<String>> FromIterator<(L, f64)> for Distribution {
    fn from_iter<I: IntoIterator<Item = (L, f64)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(label, confidence)| (label.into(), confidence))
                .collect(),
        }
    }
}

impl TryFrom<Map<String, Value>> for Distribution {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        map.into_iter()
            .map(|(label, value)| match value.as_f64() {
                Some(confidence) => Ok((label, confidence)),
                None => Err(format!("confidence for '{}' is not a number: {}", label, value)),
            })
            .collect()
    }
}

impl From<Distribution> for Map<String, Value> {
    fn from(distribution: Distribution) -> Self {
        distribution
            .entries
            .into_iter()
            .map(|(label, confidence)| (label, Value::from(confidence)))
            .collect()
    }
}

/// Confidence distributions returned by the analysis endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionSet {
    /// Race label to confidence
    #[serde(default)]
    pub race: Distribution,
    /// Age range to confidence
    #[serde(default)]
    pub age: Distribution,
    /// Gender label to confidence
    #[serde(default)]
    pub gender: Distribution,
}

/// Body of a successful analysis response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Free-form status message from the service
    #[serde(default)]
    pub message: String,
    /// Prediction distributions
    pub data: PredictionSet,
}

impl AnalysisResponse {
    /// Parse a response body
    pub fn from_json(endpoint: &str, body: &str) -> Result<Self, SkinLensError> {
        serde_json::from_str(body).map_err(|e| SkinLensError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Remote analysis collaborator
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Submit a base64-encoded still for analysis
    async fn analyze(&self, image_base64: &str) -> Result<AnalysisResponse, SkinLensError>;

    /// Register the user's name and city before the photo step
    async fn register_profile(&self, name: &str, location: &str) -> Result<(), SkinLensError>;
}

/// `ureq` backed [`InferenceClient`]
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    agent: ureq::Agent,
    config: InferenceConfig,
}

impl HttpInferenceClient {
    /// Create a client for the given endpoints
    pub fn new(config: InferenceConfig) -> Result<Self, SkinLensError> {
        config.validate()?;
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self { agent, config })
    }

    /// Endpoint configuration
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    async fn post(&self, url: &str, body: String) -> Result<String, SkinLensError> {
        let agent = self.agent.clone();
        let target = url.to_string();

        tokio::task::spawn_blocking(move || post_json(&agent, &target, &body))
            .await
            .map_err(|e| SkinLensError::UploadFailed {
                endpoint: url.to_string(),
                status: None,
                reason: format!("upload task aborted: {}", e),
            })?
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn analyze(&self, image_base64: &str) -> Result<AnalysisResponse, SkinLensError> {
        let url = &self.config.analysis_url;
        let body = encode_body(url, &AnalysisRequest {
            image: image_base64,
        })?;

        info!("Uploading {} byte image for analysis", image_base64.len());
        let response = self.post(url, body).await?;
        let parsed = AnalysisResponse::from_json(url, &response)?;

        debug!(
            "Analysis returned {} race, {} age, {} gender predictions",
            parsed.data.race.len(),
            parsed.data.age.len(),
            parsed.data.gender.len()
        );
        Ok(parsed)
    }

    async fn register_profile(&self, name: &str, location: &str) -> Result<(), SkinLensError> {
        let url = &self.config.profile_url;
        let body = encode_body(url, &ProfileRequest { name, location })?;

        self.post(url, body).await?;
        info!("Registered profile for {} from {}", name, location);
        Ok(())
    }
}

fn encode_body<T: Serialize>(endpoint: &str, request: &T) -> Result<String, SkinLensError> {
    serde_json::to_string(request).map_err(|e| SkinLensError::UploadFailed {
        endpoint: endpoint.to_string(),
        status: None,
        reason: format!("failed to encode request: {}", e),
    })
}

fn post_json(agent: &ureq::Agent, url: &str, body: &str) -> Result<String, SkinLensError> {
    let response = agent
        .post(url)
        .set("Content-Type", "application/json")
        .send_string(body);

    match response {
        Ok(response) => response
            .into_string()
            .map_err(|e| SkinLensError::InvalidResponse {
                endpoint: url.to_string(),
                reason: format!("failed to read body: {}", e),
            }),
        Err(ureq::Error::Status(code, response)) => {
            let reason = response
                .into_string()
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!("Endpoint {} answered {}: {}", url, code, reason);
            Err(SkinLensError::UploadFailed {
                endpoint: url.to_string(),
                status: Some(code),
                reason,
            })
        }
        Err(ureq::Error::Transport(transport)) => {
            warn!("Transport failure talking to {}: {}", url, transport);
            Err(SkinLensError::UploadFailed {
                endpoint: url.to_string(),
                status: None,
                reason: transport.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = InferenceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.analysis_url, DEFAULT_ANALYSIS_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_rejects_non_http_url() {
        let config = InferenceConfig {
            analysis_url: "ftp://example.test".to_string(),
            ..InferenceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SkinLensError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let config = InferenceConfig {
            timeout: Duration::ZERO,
            ..InferenceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let body = encode_body("x", &AnalysisRequest { image: "aGVsbG8=" }).unwrap();
        assert_eq!(body, r#"{"image":"aGVsbG8="}"#);

        let body = encode_body(
            "x",
            &ProfileRequest {
                name: "Ada",
                location: "London",
            },
        )
        .unwrap();
        assert_eq!(body, r#"{"name":"Ada","location":"London"}"#);
    }

    #[test]
    fn test_parse_analysis_response() {
        let body = r#"{
            "message": "Success",
            "data": {
                "race": {"east asian": 0.61, "white": 0.2},
                "age": {"20-29": 0.7, "30-39": 0.3},
                "gender": {"male": 0.1, "female": 0.9}
            }
        }"#;
        let response = AnalysisResponse::from_json("x", body).unwrap();
        assert_eq!(response.message, "Success");
        assert_eq!(response.data.race.len(), 2);
        assert_eq!(response.data.gender["female"], 0.9);
    }

    #[test]
    fn test_parse_rejects_missing_data() {
        let error = AnalysisResponse::from_json("https://x.test", r#"{"message":"oops"}"#)
            .unwrap_err();
        assert_eq!(error.error_code(), "INVALID_RESPONSE");
    }

    #[test]
    fn test_client_requires_valid_config() {
        let config = InferenceConfig {
            profile_url: String::new(),
            ..InferenceConfig::default()
        };
        assert!(HttpInferenceClient::new(config).is_err());
    }
}
