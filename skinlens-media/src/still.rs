//! Still images awaiting upload

use crate::device::VideoResolution;
use crate::error::{MediaError, MediaResult};
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;

/// MIME type of camera captures
pub const JPEG_MIME: &str = "image/jpeg";

/// Where a still came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StillSource {
    Camera,
    SelectedFile,
}

/// Encoded still image. Immutable once produced.
#[derive(Clone, PartialEq, Eq)]
pub struct StillImage {
    width: u32,
    height: u32,
    bytes: Bytes,
    mime: String,
    source: StillSource,
    captured_at: DateTime<Utc>,
}

impl StillImage {
    pub(crate) fn from_capture(width: u32, height: u32, jpeg: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bytes: Bytes::from(jpeg),
            mime: JPEG_MIME.to_string(),
            source: StillSource::Camera,
            captured_at: Utc::now(),
        }
    }

    /// Validate a user-selected file and keep its original bytes.
    ///
    /// The MIME type must be `image/*`, the file at most `limit` bytes and
    /// decodable as an image.
    pub fn from_selected_file(bytes: Bytes, mime: &str, limit: usize) -> MediaResult<Self> {
        if !mime.starts_with("image/") {
            return Err(MediaError::InvalidImage {
                reason: format!("unsupported MIME type '{}'", mime),
            });
        }

        if bytes.len() > limit {
            return Err(MediaError::ImageTooLarge {
                size: bytes.len(),
                limit,
            });
        }

        let decoded = image::load_from_memory(&bytes).map_err(|e| MediaError::InvalidImage {
            reason: e.to_string(),
        })?;

        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            bytes,
            mime: mime.to_string(),
            source: StillSource::SelectedFile,
            captured_at: Utc::now(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width, self.height)
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn source(&self) -> StillSource {
        self.source
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Bare base64 payload, as posted to the analysis endpoint
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>`
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.to_base64())
    }
}

impl fmt::Debug for StillImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StillImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .field("mime", &self.mime)
            .field("source", &self.source)
            .field("captured_at", &self.captured_at)
            .finish()
    }
}
