//! Media device platform boundary
//!
//! These traits describe the capture platform the pipeline runs on: request a
//! stream under constraints, enumerate inputs, stop tracks. A browser's Media
//! Capture API, a native camera stack and the in-crate mock all fit behind
//! them.
//!
//! Ownership of a granted stream is split in two. [`DeviceStreamHandle`] is
//! the single owner and the only value able to stop tracks; it never leaves
//! the lifecycle manager. Everything else receives a [`StreamView`], which can
//! identify and display the stream but cannot release it.

use crate::error::PlatformError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Video resolution information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoResolution {
    pub width: u32,
    pub height: u32,
}

impl VideoResolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const HD: Self = Self::new(1280, 720);
    pub const VGA: Self = Self::new(640, 480);

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for VideoResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Logical camera orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, facing the user
    User,
    /// Rear camera, facing away from the user
    Environment,
}

impl FacingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A constraint value and how strictly the platform must honour it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint<T> {
    /// Hint the platform may relax
    Ideal(T),
    /// Requirement; the request fails with `OverconstrainedError` if unmet
    Exact(T),
}

impl<T> Constraint<T> {
    pub fn value(&self) -> &T {
        match self {
            Constraint::Ideal(value) | Constraint::Exact(value) => value,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Constraint::Exact(_))
    }
}

impl<T: fmt::Display> fmt::Display for Constraint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Ideal(value) => write!(f, "ideal({})", value),
            Constraint::Exact(value) => write!(f, "exact({})", value),
        }
    }
}

/// Video constraints for one acquisition request. Audio is never requested.
///
/// A record is built once per attempt and not mutated; looser fallbacks are
/// new records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionConstraints {
    pub facing_mode: Option<Constraint<FacingMode>>,
    pub width: Option<Constraint<u32>>,
    pub height: Option<Constraint<u32>>,
    pub device_id: Option<Constraint<String>>,
}

impl AcquisitionConstraints {
    /// Ideal facing plus ideal resolution
    pub fn preferred(facing: FacingMode, resolution: VideoResolution) -> Self {
        Self {
            facing_mode: Some(Constraint::Ideal(facing)),
            width: Some(Constraint::Ideal(resolution.width)),
            height: Some(Constraint::Ideal(resolution.height)),
            device_id: None,
        }
    }

    /// `video: true`
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// Ideal facing only
    pub fn facing(facing: FacingMode) -> Self {
        Self {
            facing_mode: Some(Constraint::Ideal(facing)),
            ..Self::default()
        }
    }

    /// One specific device and nothing else
    pub fn exact_device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(Constraint::Exact(device_id.into())),
            ..Self::default()
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self == &Self::default()
    }
}

impl fmt::Display for AcquisitionConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unconstrained() {
            return f.write_str("{video: true}");
        }

        let mut parts = Vec::new();
        if let Some(facing) = &self.facing_mode {
            parts.push(format!("facingMode: {}", facing));
        }
        if let Some(width) = &self.width {
            parts.push(format!("width: {}", width));
        }
        if let Some(height) = &self.height {
            parts.push(format!("height: {}", height));
        }
        if let Some(device_id) = &self.device_id {
            parts.push(format!("deviceId: {}", device_id));
        }
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Kind of an enumerated device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// Enumerated media device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDeviceInfo {
    pub device_id: String,
    pub kind: DeviceKind,
    /// Empty until the user has granted access on some platforms
    pub label: String,
}

/// Kind of a stream track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

/// One track of a granted stream
pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    fn label(&self) -> &str;
    /// Device the track reads from, if the platform reports it
    fn device_id(&self) -> Option<String>;
    /// `false` once the track has ended
    fn is_live(&self) -> bool;
    /// Stop the track and release the underlying device
    fn stop(&self) -> Result<(), PlatformError>;
}

/// A granted media stream
pub trait MediaStream: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;
    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;
    /// Concrete platform type, for sinks that render it
    fn as_any(&self) -> &dyn Any;
}

/// Media device platform
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Request a video stream. May suspend for as long as a permission prompt is open.
    async fn get_user_media(
        &self,
        constraints: &AcquisitionConstraints,
    ) -> Result<Arc<dyn MediaStream>, PlatformError>;

    /// List available devices
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, PlatformError>;
}

/// Read-only view of an acquired stream.
///
/// Lets the sink and the verifier identify and render the stream. Offers no
/// way to stop it.
#[derive(Debug, Clone)]
pub struct StreamView {
    stream: Arc<dyn MediaStream>,
}

impl StreamView {
    pub fn id(&self) -> &str {
        self.stream.id()
    }

    /// Device id of the first video track
    pub fn device_id(&self) -> Option<String> {
        first_video_track(&self.stream).and_then(|track| track.device_id())
    }

    /// Whether any video track is still live
    pub fn is_live(&self) -> bool {
        self.stream
            .tracks()
            .iter()
            .any(|track| track.kind() == TrackKind::Video && track.is_live())
    }

    /// Downcast to the platform's stream type
    pub fn downcast_ref<T: MediaStream + 'static>(&self) -> Option<&T> {
        self.stream.as_any().downcast_ref::<T>()
    }
}

/// Outcome of releasing a handle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub tracks_stopped: usize,
    pub stop_failures: usize,
}

/// Exclusive owner of an active stream.
///
/// Dropping the handle releases it. Release is idempotent and never fails:
/// a track that refuses to stop is logged and the remaining tracks are still
/// stopped.
#[derive(Debug)]
pub struct DeviceStreamHandle {
    stream: Arc<dyn MediaStream>,
    constraints: AcquisitionConstraints,
    acquired_at: Instant,
    released: bool,
}

impl DeviceStreamHandle {
    pub(crate) fn new(stream: Arc<dyn MediaStream>, constraints: AcquisitionConstraints) -> Self {
        Self {
            stream,
            constraints,
            acquired_at: Instant::now(),
            released: false,
        }
    }

    pub fn id(&self) -> &str {
        self.stream.id()
    }

    /// Device id of the first video track
    pub fn device_id(&self) -> Option<String> {
        first_video_track(&self.stream).and_then(|track| track.device_id())
    }

    /// Constraints this stream was granted under
    pub fn constraints(&self) -> &AcquisitionConstraints {
        &self.constraints
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// Whether the stream carries at least one live video track
    pub fn has_live_video(&self) -> bool {
        self.view().is_live()
    }

    pub fn view(&self) -> StreamView {
        StreamView {
            stream: self.stream.clone(),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop every track
    pub(crate) fn release(&mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        if self.released {
            return report;
        }
        self.released = true;

        for track in self.stream.tracks() {
            match track.stop() {
                Ok(()) => report.tracks_stopped += 1,
                Err(e) => {
                    report.stop_failures += 1;
                    warn!("Failed to stop track {} of {}: {}", track.id(), self.id(), e);
                }
            }
        }

        debug!(
            "Released stream {} ({} stopped, {} failed)",
            self.id(),
            report.tracks_stopped,
            report.stop_failures
        );
        report
    }
}

impl Drop for DeviceStreamHandle {
    fn drop(&mut self) {
        if !self.released {
            self.release();
        }
    }
}

fn first_video_track(stream: &Arc<dyn MediaStream>) -> Option<Arc<dyn MediaTrack>> {
    stream
        .tracks()
        .into_iter()
        .find(|track| track.kind() == TrackKind::Video)
}
