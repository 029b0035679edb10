//! Video sink boundary
//!
//! The sink is the element a stream is rendered into. It reports the
//! intrinsic size of decoded frames and the presentation time, and can copy
//! its current frame into a raster.

use crate::device::{StreamView, VideoResolution};
use crate::error::{MediaError, PlatformError};
use async_trait::async_trait;
use std::fmt;
use tokio::sync::broadcast;

/// Informational sink lifecycle events
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    LoadedMetadata { width: u32, height: u32 },
    CanPlay,
    Playing,
    Paused,
    Stalled,
    Suspend,
    Waiting,
    Error { message: String },
}

impl SinkEvent {
    /// DOM-style event name
    pub fn name(&self) -> &'static str {
        match self {
            SinkEvent::LoadedMetadata { .. } => "loadedmetadata",
            SinkEvent::CanPlay => "canplay",
            SinkEvent::Playing => "playing",
            SinkEvent::Paused => "pause",
            SinkEvent::Stalled => "stalled",
            SinkEvent::Suspend => "suspend",
            SinkEvent::Waiting => "waiting",
            SinkEvent::Error { .. } => "error",
        }
    }
}

impl fmt::Display for SinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkEvent::LoadedMetadata { width, height } => {
                write!(f, "{} {}x{}", self.name(), width, height)
            }
            SinkEvent::Error { message } => write!(f, "{}: {}", self.name(), message),
            other => f.write_str(other.name()),
        }
    }
}

/// Tightly packed RGB8 copy of one frame
#[derive(Clone, PartialEq, Eq)]
pub struct RasterFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RasterFrame {
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::BYTES_PER_PIXEL
    }

    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width, self.height)
    }

    /// Check the buffer matches the geometry
    pub fn validate(&self) -> Result<(), MediaError> {
        let expected = Self::expected_len(self.width, self.height);
        if self.data.len() != expected {
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for RasterFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Element that renders a live stream
#[async_trait]
pub trait VideoSink: Send + Sync {
    /// Set or clear the rendered stream
    fn attach(&self, stream: Option<StreamView>);

    /// Start playback. Fails with `NotAllowed` when playback needs a user gesture.
    async fn play(&self) -> Result<(), PlatformError>;

    /// Intrinsic width of the decoded frames, 0 before the first frame
    fn video_width(&self) -> u32;

    /// Intrinsic height of the decoded frames, 0 before the first frame
    fn video_height(&self) -> u32;

    /// Presentation time in seconds
    fn current_time(&self) -> f64;

    /// Copy the current frame at intrinsic size
    fn draw_frame(&self) -> Result<RasterFrame, PlatformError>;

    /// Diagnostic event feed
    fn subscribe(&self) -> broadcast::Receiver<SinkEvent>;

    fn intrinsic_resolution(&self) -> VideoResolution {
        VideoResolution::new(self.video_width(), self.video_height())
    }
}
