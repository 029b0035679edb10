//! Playback verification and frozen-frame recovery planning

use crate::device::{DeviceKind, FacingMode, MediaDevices, StreamView, VideoResolution};
use crate::error::PlatformErrorKind;
use crate::sink::VideoSink;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one playback verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Frames are advancing at the given intrinsic size
    Verified { resolution: VideoResolution },
    /// Presentation time has not moved since playback started
    Frozen,
    /// The platform refused autoplay; a user gesture must resume playback
    NeedsUserGesture,
    /// Time advances but the sink has not reported a frame size yet
    AwaitingFrames,
}

impl fmt::Display for VerifyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyOutcome::Verified { resolution } => write!(f, "verified at {}", resolution),
            VerifyOutcome::Frozen => f.write_str("frozen"),
            VerifyOutcome::NeedsUserGesture => f.write_str("needs user gesture"),
            VerifyOutcome::AwaitingFrames => f.write_str("awaiting frames"),
        }
    }
}

/// Attaches a stream to a sink and checks that frames actually flow
#[derive(Debug, Clone, Copy)]
pub struct PlaybackVerifier {
    freeze_check_delay: Duration,
}

impl PlaybackVerifier {
    pub fn new(freeze_check_delay: Duration) -> Self {
        Self { freeze_check_delay }
    }

    pub fn freeze_check_delay(&self) -> Duration {
        self.freeze_check_delay
    }

    /// Attach `view`, start playback and run the single frozen-frame check.
    ///
    /// A rejected `play()` other than `NotAllowed` is logged and the check
    /// still runs; the presentation clock decides.
    pub async fn verify(&self, sink: &dyn VideoSink, view: StreamView) -> VerifyOutcome {
        let stream_id = view.id().to_string();
        sink.attach(Some(view));

        match sink.play().await {
            Ok(()) => debug!("Playback started for stream {}", stream_id),
            Err(e) if e.kind == PlatformErrorKind::NotAllowed => {
                info!("Autoplay blocked for stream {}: {}", stream_id, e);
                return VerifyOutcome::NeedsUserGesture;
            }
            Err(e) => warn!("play() rejected for stream {}: {}", stream_id, e),
        }

        self.check_after_delay(sink).await
    }

    /// Start playback again after a user gesture.
    ///
    /// Reports `NeedsUserGesture` again if the platform still refuses.
    pub async fn resume(&self, sink: &dyn VideoSink) -> VerifyOutcome {
        match sink.play().await {
            Ok(()) => self.check_after_delay(sink).await,
            Err(e) if e.kind == PlatformErrorKind::NotAllowed => VerifyOutcome::NeedsUserGesture,
            Err(e) => {
                warn!("play() rejected on resume: {}", e);
                self.check_after_delay(sink).await
            }
        }
    }

    async fn check_after_delay(&self, sink: &dyn VideoSink) -> VerifyOutcome {
        tokio::time::sleep(self.freeze_check_delay).await;
        let outcome = Self::inspect(sink);
        debug!("Playback check after {:?}: {}", self.freeze_check_delay, outcome);
        outcome
    }

    /// Classify the sink's current state without waiting
    pub fn inspect(sink: &dyn VideoSink) -> VerifyOutcome {
        if sink.current_time() <= 0.0 {
            return VerifyOutcome::Frozen;
        }

        let resolution = sink.intrinsic_resolution();
        if resolution.is_empty() {
            VerifyOutcome::AwaitingFrames
        } else {
            VerifyOutcome::Verified { resolution }
        }
    }
}

/// How to re-acquire after a frozen stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryPlan {
    /// Another video input exists; request it exactly
    AlternateDevice { device_id: String },
    /// Only the current device is known; relax to another facing direction
    RelaxFacing { facing: FacingMode },
}

impl fmt::Display for RecoveryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryPlan::AlternateDevice { device_id } => {
                write!(f, "switch to device {}", device_id)
            }
            RecoveryPlan::RelaxFacing { facing } => write!(f, "relax facing to {}", facing),
        }
    }
}

/// Decide how to recover from a frozen stream on `current_device`.
///
/// Enumeration failures fall back to relaxing the facing mode.
pub async fn plan_recovery(
    devices: &dyn MediaDevices,
    current_device: Option<&str>,
) -> RecoveryPlan {
    let relax = RecoveryPlan::RelaxFacing {
        facing: FacingMode::Environment,
    };

    let inputs = match devices.enumerate_devices().await {
        Ok(inputs) => inputs,
        Err(e) => {
            warn!("Device enumeration failed during recovery: {}", e);
            return relax;
        }
    };

    let alternate = inputs
        .into_iter()
        .filter(|info| info.kind == DeviceKind::VideoInput)
        .find(|info| !info.device_id.is_empty() && Some(info.device_id.as_str()) != current_device);

    match alternate {
        Some(info) => RecoveryPlan::AlternateDevice {
            device_id: info.device_id,
        },
        None => relax,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AcquisitionConstraints, DeviceStreamHandle};
    use crate::error::PlatformError;
    use crate::platform::mock::{MockMediaDevices, MockVideoSink};

    async fn granted(devices: &MockMediaDevices) -> DeviceStreamHandle {
        let stream = devices
            .get_user_media(&AcquisitionConstraints::unconstrained())
            .await
            .unwrap();
        DeviceStreamHandle::new(stream, AcquisitionConstraints::unconstrained())
    }

    #[tokio::test(start_paused = true)]
    async fn test_verified_when_time_advances() {
        let devices = MockMediaDevices::with_default_camera();
        let sink = MockVideoSink::new();
        sink.set_frame_source(VideoResolution::HD, 0.5);

        let verifier = PlaybackVerifier::new(Duration::from_millis(1200));
        let handle = granted(&devices).await;
        let outcome = verifier.verify(&sink, handle.view()).await;

        assert_eq!(
            outcome,
            VerifyOutcome::Verified {
                resolution: VideoResolution::HD
            }
        );
        assert!(sink.attached_stream().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_frozen_when_time_stays_zero() {
        let devices = MockMediaDevices::with_default_camera();
        let sink = MockVideoSink::new();
        sink.set_frame_source(VideoResolution::HD, 0.0);

        let verifier = PlaybackVerifier::new(Duration::from_millis(1200));
        let handle = granted(&devices).await;
        let outcome = verifier.verify(&sink, handle.view()).await;
        assert_eq!(outcome, VerifyOutcome::Frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autoplay_block_needs_gesture() {
        let devices = MockMediaDevices::with_default_camera();
        let sink = MockVideoSink::new();
        sink.push_play_result(Err(PlatformError::not_allowed("autoplay")));

        let verifier = PlaybackVerifier::new(Duration::from_millis(1200));
        let handle = granted(&devices).await;
        let outcome = verifier.verify(&sink, handle.view()).await;
        assert_eq!(outcome, VerifyOutcome::NeedsUserGesture);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_play_failure_still_checks() {
        let devices = MockMediaDevices::with_default_camera();
        let sink = MockVideoSink::new();
        sink.push_play_result(Err(PlatformError::other("interrupted")));
        sink.set_frame_source(VideoResolution::VGA, 0.3);

        let verifier = PlaybackVerifier::new(Duration::from_millis(1200));
        let handle = granted(&devices).await;
        let outcome = verifier.verify(&sink, handle.view()).await;
        assert_eq!(
            outcome,
            VerifyOutcome::Verified {
                resolution: VideoResolution::VGA
            }
        );
    }

    #[test]
    fn test_inspect_awaiting_frames() {
        let sink = MockVideoSink::new();
        sink.set_frame_source(VideoResolution::new(0, 0), 0.2);
        assert_eq!(PlaybackVerifier::inspect(&sink), VerifyOutcome::AwaitingFrames);
    }

    #[tokio::test]
    async fn test_plan_prefers_alternate_device() {
        let devices = MockMediaDevices::with_cameras(&["front", "back"]);
        let plan = plan_recovery(&devices, Some("front")).await;
        assert_eq!(
            plan,
            RecoveryPlan::AlternateDevice {
                device_id: "back".to_string()
            }
        );
        assert_eq!(devices.enumerate_calls(), 1);
    }

    #[tokio::test]
    async fn test_plan_relaxes_with_single_device() {
        let devices = MockMediaDevices::with_cameras(&["front"]);
        let plan = plan_recovery(&devices, Some("front")).await;
        assert_eq!(
            plan,
            RecoveryPlan::RelaxFacing {
                facing: FacingMode::Environment
            }
        );
    }
}
