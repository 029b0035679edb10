//! Device acquisition with constraint fallback
//!
//! Requests walk an ordered chain of constraint records, each tried only if
//! the previous one failed. Only the final failure is classified.

use crate::device::{
    AcquisitionConstraints, DeviceStreamHandle, FacingMode, MediaDevices, VideoResolution,
};
use crate::error::{AcquisitionError, PlatformError};
use crate::playback::RecoveryPlan;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Negotiates access to a video input device
#[derive(Clone)]
pub struct DeviceAcquirer {
    devices: Arc<dyn MediaDevices>,
    ideal_resolution: VideoResolution,
}

impl DeviceAcquirer {
    pub fn new(devices: Arc<dyn MediaDevices>, ideal_resolution: VideoResolution) -> Self {
        Self {
            devices,
            ideal_resolution,
        }
    }

    /// Ideal facing and resolution, then `video: true`
    pub fn primary_chain(&self, preferred: FacingMode) -> Vec<AcquisitionConstraints> {
        vec![
            AcquisitionConstraints::preferred(preferred, self.ideal_resolution),
            AcquisitionConstraints::unconstrained(),
        ]
    }

    /// Acquire a stream for the preferred facing direction
    pub async fn acquire(
        &self,
        preferred: FacingMode,
    ) -> Result<DeviceStreamHandle, AcquisitionError> {
        self.acquire_with_chain(self.primary_chain(preferred)).await
    }

    /// Walk an explicit chain of constraint records.
    ///
    /// Returns a handle with at least one live video track, or the classified
    /// error of the last attempt. A stream granted without live video is
    /// released before moving on.
    pub async fn acquire_with_chain(
        &self,
        chain: Vec<AcquisitionConstraints>,
    ) -> Result<DeviceStreamHandle, AcquisitionError> {
        let mut attempts = 0u32;
        let mut last_error = None;

        for constraints in chain {
            attempts += 1;
            debug!("Camera request #{} with {}", attempts, constraints);

            match self.devices.get_user_media(&constraints).await {
                Ok(stream) => {
                    let mut handle = DeviceStreamHandle::new(stream, constraints);
                    if handle.has_live_video() {
                        info!(
                            "Camera granted: stream {} on device {}",
                            handle.id(),
                            handle.device_id().as_deref().unwrap_or("unknown")
                        );
                        return Ok(handle);
                    }

                    warn!("Stream {} granted without a live video track", handle.id());
                    handle.release();
                    last_error = Some(PlatformError::not_readable(
                        "granted stream has no live video track",
                    ));
                }
                Err(e) => {
                    warn!("Camera request {} failed: {}", attempt_label(attempts), e);
                    last_error = Some(e);
                }
            }
        }

        let source =
            last_error.unwrap_or_else(|| PlatformError::other("no acquisition attempts made"));
        let error = AcquisitionError::from_platform(source, attempts);
        warn!("Camera acquisition gave up: {}", error);
        Err(error)
    }

    /// Acquire according to a frozen-frame recovery plan
    pub async fn acquire_for_recovery(
        &self,
        plan: &RecoveryPlan,
    ) -> Result<DeviceStreamHandle, AcquisitionError> {
        match plan {
            RecoveryPlan::AlternateDevice { device_id } => {
                self.acquire_with_chain(vec![AcquisitionConstraints::exact_device(
                    device_id.clone(),
                )])
                .await
            }
            RecoveryPlan::RelaxFacing { facing } => {
                match self
                    .acquire_with_chain(vec![AcquisitionConstraints::facing(*facing)])
                    .await
                {
                    Err(e) if e.source.is_overconstrained() => {
                        debug!("Facing {} rejected, falling back to any camera", facing);
                        self.acquire_with_chain(vec![AcquisitionConstraints::unconstrained()])
                            .await
                    }
                    other => other,
                }
            }
        }
    }
}

fn attempt_label(attempt: u32) -> String {
    match attempt {
        1 => "with preferred constraints".to_string(),
        n => format!("attempt #{}", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AcquisitionErrorKind;
    use crate::platform::mock::{MockCameraBehavior, MockMediaDevices};

    fn acquirer(devices: &Arc<MockMediaDevices>) -> DeviceAcquirer {
        DeviceAcquirer::new(devices.clone(), VideoResolution::HD)
    }

    #[tokio::test]
    async fn test_primary_request_succeeds() {
        let devices = Arc::new(MockMediaDevices::with_default_camera());
        let handle = acquirer(&devices).acquire(FacingMode::User).await.unwrap();

        assert_eq!(devices.request_log().len(), 1);
        assert_eq!(
            handle.constraints(),
            &AcquisitionConstraints::preferred(FacingMode::User, VideoResolution::HD)
        );
        assert_eq!(devices.live_streams(), 1);
    }

    #[tokio::test]
    async fn test_unconstrained_fallback_after_failure() {
        let devices = Arc::new(MockMediaDevices::with_default_camera());
        devices.push_failure(PlatformError::overconstrained("width"));

        let handle = acquirer(&devices).acquire(FacingMode::User).await.unwrap();
        let requests = devices.request_log();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].is_unconstrained());
        assert!(handle.constraints().is_unconstrained());
    }

    #[tokio::test]
    async fn test_terminal_error_after_two_attempts() {
        let devices = Arc::new(MockMediaDevices::with_default_camera());
        devices.push_failure(PlatformError::not_found("no camera"));
        devices.push_failure(PlatformError::not_readable("busy"));

        let error = acquirer(&devices).acquire(FacingMode::User).await.unwrap_err();
        assert_eq!(error.kind, AcquisitionErrorKind::DeviceBusy);
        assert_eq!(error.attempts, 2);
        assert_eq!(devices.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_stream_without_video_is_released() {
        let devices = Arc::new(MockMediaDevices::with_default_camera());
        devices.set_behavior(MockCameraBehavior {
            grant_without_video: true,
            ..MockCameraBehavior::default()
        });

        let error = acquirer(&devices).acquire(FacingMode::User).await.unwrap_err();
        assert_eq!(error.kind, AcquisitionErrorKind::DeviceBusy);
        assert_eq!(devices.streams_granted(), 2);
        assert_eq!(devices.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_recovery_relaxes_to_unconstrained_when_overconstrained() {
        let devices = Arc::new(MockMediaDevices::with_default_camera());
        devices.push_failure(PlatformError::overconstrained("facingMode"));

        let plan = RecoveryPlan::RelaxFacing {
            facing: FacingMode::Environment,
        };
        let handle = acquirer(&devices).acquire_for_recovery(&plan).await.unwrap();

        let requests = devices.request_log();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], AcquisitionConstraints::facing(FacingMode::Environment));
        assert!(handle.constraints().is_unconstrained());
    }

    #[tokio::test]
    async fn test_recovery_does_not_relax_other_failures() {
        let devices = Arc::new(MockMediaDevices::with_default_camera());
        devices.push_failure(PlatformError::not_allowed("revoked"));

        let plan = RecoveryPlan::RelaxFacing {
            facing: FacingMode::Environment,
        };
        let error = acquirer(&devices).acquire_for_recovery(&plan).await.unwrap_err();
        assert_eq!(error.kind, AcquisitionErrorKind::PermissionDenied);
        assert_eq!(devices.request_log().len(), 1);
    }
}
