//! # SkinLens Media
//!
//! Camera acquisition and capture pipeline for SkinLens. This crate negotiates
//! access to a video input, verifies that frames actually flow, recovers once
//! from a frozen feed, snapshots frames into JPEG stills and owns the stream
//! lifetime so the device is always released.

#![warn(clippy::all)]

pub mod acquire;
pub mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod lifecycle;
pub mod platform;
pub mod playback;
pub mod sink;
pub mod still;

// Re-export main types
pub use acquire::DeviceAcquirer;
pub use capture::FrameCapturer;
pub use config::CameraConfig;
pub use device::{
    AcquisitionConstraints, Constraint, DeviceKind, DeviceStreamHandle, FacingMode,
    MediaDeviceInfo, MediaDevices, MediaStream, MediaTrack, ReleaseReport, StreamView, TrackKind,
    VideoResolution,
};
pub use error::{
    AcquisitionError, AcquisitionErrorKind, ErrorCategory, MediaError, MediaResult, PlatformError,
    PlatformErrorKind,
};
pub use lifecycle::{
    CameraEvent, CameraLifecycle, CameraStatus, CaptureReadinessState, FROZEN_MESSAGE,
};
pub use platform::{MockCameraBehavior, MockMediaDevices, MockMediaStream, MockVideoSink};
#[cfg(feature = "native")]
pub use platform::{NativeMediaDevices, NativeVideoSink};
pub use playback::{plan_recovery, PlaybackVerifier, RecoveryPlan, VerifyOutcome};
pub use sink::{RasterFrame, SinkEvent, VideoSink};
pub use still::{StillImage, StillSource, JPEG_MIME};
