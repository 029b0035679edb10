//! Integration tests for the camera lifecycle
//!
//! These drive `CameraLifecycle` end to end against the scriptable mock
//! platform, with tokio's clock paused so the freeze check and the slow
//! acquisition timer fire deterministically.

use skinlens_diagnostics::DiagnosticLog;
use skinlens_media::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_test::{assert_err, assert_ok};

fn lifecycle(devices: &Arc<MockMediaDevices>, sink: &Arc<MockVideoSink>) -> CameraLifecycle {
    CameraLifecycle::new(
        devices.clone(),
        sink.clone(),
        CameraConfig::default(),
        DiagnosticLog::default(),
    )
    .unwrap()
}

fn drain(events: &mut broadcast::Receiver<CameraEvent>) -> Vec<CameraEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn reached(events: &[CameraEvent], state: CaptureReadinessState) -> bool {
    events
        .iter()
        .any(|event| matches!(event, CameraEvent::StateChanged { to, .. } if *to == state))
}

// ============================================================================
// ACQUISITION SCENARIOS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_ideal_constraints_reach_ready_and_capture() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    let sink = Arc::new(MockVideoSink::new());
    sink.set_frame_source(VideoResolution::new(160, 120), 0.8);
    let camera = lifecycle(&devices, &sink);

    let status = camera.start().await.unwrap();
    assert_eq!(status.state, CaptureReadinessState::Ready);
    assert!(status.error.is_none());

    let requests = devices.request_log();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0],
        AcquisitionConstraints::preferred(FacingMode::User, VideoResolution::HD)
    );

    let still = camera.capture().unwrap();
    assert_eq!(still.width(), 160);
    assert_eq!(still.height(), 120);
    assert_eq!(still.mime(), "image/jpeg");
}

#[tokio::test(start_paused = true)]
async fn test_overconstrained_falls_back_to_unconstrained() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    devices.push_failure(PlatformError::overconstrained("width"));
    let sink = Arc::new(MockVideoSink::new());
    let camera = lifecycle(&devices, &sink);

    let status = camera.start().await.unwrap();
    assert_eq!(status.state, CaptureReadinessState::Ready);

    let requests = devices.request_log();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].is_unconstrained());
    assert_eq!(devices.live_streams(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_never_ready() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    devices.push_failure(PlatformError::not_allowed("Permission denied"));
    devices.push_failure(PlatformError::not_allowed("Permission denied"));
    let sink = Arc::new(MockVideoSink::new());
    let camera = lifecycle(&devices, &sink);
    let mut events = camera.subscribe();

    let error = camera.start().await.unwrap_err();
    match &error {
        MediaError::Acquisition(e) => {
            assert_eq!(e.kind, AcquisitionErrorKind::PermissionDenied);
            assert_eq!(e.attempts, 2);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(
        error.user_message(),
        "Unable to access camera. Please ensure camera permissions are granted."
    );

    let status = camera.status();
    assert_eq!(status.state, CaptureReadinessState::Failed);
    assert_eq!(status.error.as_deref(), Some(error.user_message().as_str()));
    assert!(!status.is_loading);
    assert!(!reached(&drain(&mut events), CaptureReadinessState::Ready));
    assert_eq!(devices.request_log().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_camera_reports_no_device() {
    let devices = Arc::new(MockMediaDevices::without_cameras());
    let sink = Arc::new(MockVideoSink::new());
    let camera = lifecycle(&devices, &sink);

    let error = camera.start().await.unwrap_err();
    assert!(matches!(
        error,
        MediaError::Acquisition(AcquisitionError {
            kind: AcquisitionErrorKind::NoDeviceFound,
            ..
        })
    ));
    assert!(!camera.has_stream());
}

// ============================================================================
// FROZEN FRAME RECOVERY
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_frozen_feed_switches_to_alternate_device() {
    let devices = Arc::new(MockMediaDevices::with_cameras(&["front", "back"]));
    let sink = Arc::new(MockVideoSink::new());
    sink.freeze_device("front");
    let camera = lifecycle(&devices, &sink);
    let mut events = camera.subscribe();

    let status = camera.start().await.unwrap();
    assert_eq!(status.state, CaptureReadinessState::Ready);
    assert_eq!(devices.enumerate_calls(), 1);

    let requests = devices.request_log();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1], AcquisitionConstraints::exact_device("back"));
    assert_eq!(devices.live_streams(), 1);

    let seen = drain(&mut events);
    assert!(reached(&seen, CaptureReadinessState::Frozen));
    assert!(seen.iter().any(|event| matches!(
        event,
        CameraEvent::RecoveryStarted {
            plan: RecoveryPlan::AlternateDevice { .. }
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_frozen_recovery_happens_once() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    let sink = Arc::new(MockVideoSink::new());
    sink.set_frame_source(VideoResolution::HD, 0.0);
    let camera = lifecycle(&devices, &sink);

    let status = camera.start().await.unwrap();
    assert_eq!(status.state, CaptureReadinessState::Frozen);
    assert_eq!(status.error.as_deref(), Some(FROZEN_MESSAGE));
    assert_eq!(devices.enumerate_calls(), 1);

    let requests = devices.request_log();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1],
        AcquisitionConstraints::facing(FacingMode::Environment)
    );
    assert_eq!(devices.live_streams(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_budget_resets_on_new_session() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    let sink = Arc::new(MockVideoSink::new());
    sink.set_frame_source(VideoResolution::HD, 0.0);
    let camera = lifecycle(&devices, &sink);

    camera.start().await.unwrap();
    camera.restart().await.unwrap();
    assert_eq!(devices.enumerate_calls(), 2);
}

// ============================================================================
// TEARDOWN AND SUPERSESSION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_twice_leaves_nothing_live() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    let sink = Arc::new(MockVideoSink::new());
    let camera = lifecycle(&devices, &sink);
    camera.start().await.unwrap();

    camera.stop();
    camera.stop();
    assert!(!camera.has_stream());
    assert_eq!(camera.state(), CaptureReadinessState::Idle);
    assert_eq!(devices.live_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_acquisition_after_stop_is_released() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    devices.set_behavior(MockCameraBehavior {
        grant_delay: Duration::from_secs(3),
        ..MockCameraBehavior::default()
    });
    let sink = Arc::new(MockVideoSink::new());
    let camera = lifecycle(&devices, &sink);

    let pending = {
        let camera = camera.clone();
        tokio::spawn(async move { camera.start().await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    camera.stop();

    let result = pending.await.unwrap();
    assert_eq!(result.unwrap_err(), MediaError::Superseded);
    assert_eq!(devices.streams_granted(), 1);
    assert_eq!(devices.live_streams(), 0);
    assert!(!camera.has_stream());
    assert!(sink.attached_stream().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_newer_start_supersedes_pending_one() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    devices.set_behavior(MockCameraBehavior {
        grant_delay: Duration::from_secs(2),
        ..MockCameraBehavior::default()
    });
    let sink = Arc::new(MockVideoSink::new());
    let camera = lifecycle(&devices, &sink);

    let first = {
        let camera = camera.clone();
        tokio::spawn(async move { camera.start().await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    let second = camera.start().await.unwrap();

    assert_eq!(first.await.unwrap().unwrap_err(), MediaError::Superseded);
    assert_eq!(second.state, CaptureReadinessState::Ready);
    assert_eq!(devices.streams_granted(), 2);
    assert_eq!(devices.live_streams(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failing_track_stop_still_clears_handle() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    devices.set_behavior(MockCameraBehavior {
        failing_track_stop: true,
        ..MockCameraBehavior::default()
    });
    let sink = Arc::new(MockVideoSink::new());
    let camera = lifecycle(&devices, &sink);
    camera.start().await.unwrap();

    let report = camera.stop();
    assert_eq!(report.stop_failures, 1);
    assert!(!camera.has_stream());
    assert_eq!(camera.stop(), ReleaseReport::default());
}

#[tokio::test(start_paused = true)]
async fn test_drop_releases_stream() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    let sink = Arc::new(MockVideoSink::new());
    {
        let camera = lifecycle(&devices, &sink);
        camera.start().await.unwrap();
        assert_eq!(devices.live_streams(), 1);
    }
    assert_eq!(devices.live_streams(), 0);
}

// ============================================================================
// PLAYBACK AND AFFORDANCES
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_acquisition_offers_manual_start() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    devices.set_behavior(MockCameraBehavior {
        grant_delay: Duration::from_secs(4),
        ..MockCameraBehavior::default()
    });
    let sink = Arc::new(MockVideoSink::new());
    let camera = lifecycle(&devices, &sink);

    let pending = {
        let camera = camera.clone();
        tokio::spawn(async move { camera.start().await })
    };
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(!camera.status().needs_manual_start);

    tokio::time::sleep(Duration::from_millis(700)).await;
    let status = camera.status();
    assert!(status.needs_manual_start);
    assert!(status.is_loading);

    let settled = pending.await.unwrap().unwrap();
    assert_eq!(settled.state, CaptureReadinessState::Ready);
    assert!(!settled.needs_manual_start);
}

#[tokio::test(start_paused = true)]
async fn test_freeze_check_does_not_count_as_slow_acquisition() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    devices.set_behavior(MockCameraBehavior {
        grant_delay: Duration::from_millis(500),
        ..MockCameraBehavior::default()
    });
    let sink = Arc::new(MockVideoSink::new());
    let camera = lifecycle(&devices, &sink);
    let mut events = camera.subscribe();

    let pending = {
        let camera = camera.clone();
        tokio::spawn(async move { camera.start().await })
    };
    tokio::time::sleep(Duration::from_millis(1600)).await;
    let status = camera.status();
    assert_eq!(status.state, CaptureReadinessState::Verifying);
    assert!(!status.needs_manual_start);

    let settled = assert_ok!(pending.await.unwrap());
    assert_eq!(settled.state, CaptureReadinessState::Ready);
    assert!(!settled.needs_manual_start);
    assert!(!drain(&mut events)
        .iter()
        .any(|event| matches!(event, CameraEvent::ManualStartAvailable)));
}

#[tokio::test(start_paused = true)]
async fn test_frozen_recovery_never_offers_manual_start_for_fast_grants() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    devices.set_behavior(MockCameraBehavior {
        grant_delay: Duration::from_millis(500),
        ..MockCameraBehavior::default()
    });
    let sink = Arc::new(MockVideoSink::new());
    sink.set_frame_source(VideoResolution::HD, 0.0);
    let camera = lifecycle(&devices, &sink);

    let status = assert_ok!(camera.start().await);
    assert_eq!(status.state, CaptureReadinessState::Frozen);
    assert!(!status.needs_manual_start);
    assert_eq!(devices.request_log().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_recovery_acquisition_offers_manual_start() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    let sink = Arc::new(MockVideoSink::new());
    sink.set_frame_source(VideoResolution::HD, 0.0);
    let camera = lifecycle(&devices, &sink);

    let pending = {
        let camera = camera.clone();
        tokio::spawn(async move { camera.start().await })
    };
    // First grant is instant; the second one hangs after the freeze check
    tokio::time::sleep(Duration::from_millis(100)).await;
    devices.set_behavior(MockCameraBehavior {
        grant_delay: Duration::from_secs(4),
        ..MockCameraBehavior::default()
    });
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(camera.state(), CaptureReadinessState::Acquiring);
    assert!(!camera.status().needs_manual_start);

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert!(camera.status().needs_manual_start);

    let settled = assert_ok!(pending.await.unwrap());
    assert_eq!(settled.state, CaptureReadinessState::Frozen);
    assert!(!settled.needs_manual_start);
}

#[tokio::test(start_paused = true)]
async fn test_fast_acquisition_never_offers_manual_start() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    let sink = Arc::new(MockVideoSink::new());
    let camera = lifecycle(&devices, &sink);

    camera.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!camera.status().needs_manual_start);
}

#[tokio::test(start_paused = true)]
async fn test_autoplay_block_then_resume() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    let sink = Arc::new(MockVideoSink::new());
    sink.push_play_result(Err(PlatformError::not_allowed("play() requires a gesture")));
    let camera = lifecycle(&devices, &sink);

    let status = camera.start().await.unwrap();
    assert!(status.needs_user_gesture);
    assert_eq!(status.state, CaptureReadinessState::Verifying);
    assert!(status.error.is_none());

    let resumed = camera.resume_playback().await.unwrap();
    assert!(!resumed.needs_user_gesture);
    assert_eq!(resumed.state, CaptureReadinessState::Ready);
    assert_eq!(sink.play_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_resume_without_stream_fails() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    let sink = Arc::new(MockVideoSink::new());
    let camera = lifecycle(&devices, &sink);

    assert_eq!(
        camera.resume_playback().await.unwrap_err(),
        MediaError::NoActiveStream
    );
}

#[tokio::test(start_paused = true)]
async fn test_capture_before_frames_is_not_ready() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    let sink = Arc::new(MockVideoSink::new());
    sink.set_frame_source(VideoResolution::new(0, 0), 0.4);
    let camera = lifecycle(&devices, &sink);

    let status = camera.start().await.unwrap();
    assert_eq!(status.state, CaptureReadinessState::Verifying);

    let error = camera.capture().unwrap_err();
    assert_eq!(
        error,
        MediaError::NotReadyForCapture {
            width: 0,
            height: 0
        }
    );
    assert!(camera.has_stream());
}

#[tokio::test(start_paused = true)]
async fn test_capture_after_frames_arrive_promotes_to_ready() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    let sink = Arc::new(MockVideoSink::new());
    sink.set_frame_source(VideoResolution::new(0, 0), 0.4);
    let camera = lifecycle(&devices, &sink);
    let mut events = camera.subscribe();

    let status = assert_ok!(camera.start().await);
    assert_eq!(status.state, CaptureReadinessState::Verifying);
    assert_err!(camera.capture());

    sink.set_frame_source(VideoResolution::new(32, 24), 0.9);
    let still = assert_ok!(camera.capture());
    assert_eq!(still.resolution(), VideoResolution::new(32, 24));

    let status = camera.status();
    assert_eq!(status.state, CaptureReadinessState::Ready);
    assert_eq!(status.resolution, Some(VideoResolution::new(32, 24)));
    assert!(status.error.is_none());
    assert!(reached(&drain(&mut events), CaptureReadinessState::Ready));
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_sink_events_are_logged() {
    let devices = Arc::new(MockMediaDevices::with_default_camera());
    let sink = Arc::new(MockVideoSink::new());
    let log = DiagnosticLog::with_capacity(50);
    let camera = CameraLifecycle::new(
        devices.clone(),
        sink.clone(),
        CameraConfig::default(),
        log.clone(),
    )
    .unwrap();

    camera.start().await.unwrap();
    sink.emit(SinkEvent::Stalled);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let messages: Vec<String> = log.snapshot().into_iter().map(|e| e.message).collect();
    assert!(messages.iter().any(|m| m == "video: loadedmetadata 1280x720"));
    assert!(messages.iter().any(|m| m == "video: playing"));
    assert!(messages.iter().any(|m| m == "video: stalled"));
    assert!(messages.iter().any(|m| m.starts_with("start: session #")));
}
