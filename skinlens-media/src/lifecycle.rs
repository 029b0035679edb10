//! Camera lifecycle management
//!
//! [`CameraLifecycle`] is the single owner of the active
//! [`DeviceStreamHandle`]. It drives acquisition, verification and the one
//! frozen-frame recovery a session is allowed, and it is the only place a
//! stream is ever released.
//!
//! Every `start` bumps a generation counter. Each await point re-checks the
//! generation on resume; a result belonging to an older generation, or
//! arriving after `stop`, is released on the spot and never attached.

use crate::acquire::DeviceAcquirer;
use crate::capture::FrameCapturer;
use crate::config::CameraConfig;
use crate::device::{DeviceStreamHandle, MediaDevices, ReleaseReport, VideoResolution};
use crate::error::{MediaError, MediaResult};
use crate::playback::{plan_recovery, PlaybackVerifier, RecoveryPlan, VerifyOutcome};
use crate::sink::VideoSink;
use crate::still::StillImage;
use parking_lot::Mutex;
use skinlens_diagnostics::DiagnosticLog;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// User-facing message for a stream that stays frozen after recovery
pub const FROZEN_MESSAGE: &str =
    "Camera feed appears frozen. Try another camera or upload a photo instead.";

/// Camera readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureReadinessState {
    /// No session; before start and after stop
    Idle,
    /// Waiting for the platform to grant a stream
    Acquiring,
    /// Stream attached, waiting for frames to flow
    Verifying,
    /// Frames are flowing
    Ready,
    /// Presentation time never advanced
    Frozen,
    /// The last capture found no decoded frame
    CaptureFailed,
    /// Acquisition failed for good
    Failed,
}

impl fmt::Display for CaptureReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureReadinessState::Idle => "idle",
            CaptureReadinessState::Acquiring => "acquiring",
            CaptureReadinessState::Verifying => "verifying",
            CaptureReadinessState::Ready => "ready",
            CaptureReadinessState::Frozen => "frozen",
            CaptureReadinessState::CaptureFailed => "capture failed",
            CaptureReadinessState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of everything a caller renders
#[derive(Debug, Clone, PartialEq)]
pub struct CameraStatus {
    pub state: CaptureReadinessState,
    pub is_loading: bool,
    pub error: Option<String>,
    pub needs_user_gesture: bool,
    pub needs_manual_start: bool,
    pub stream_id: Option<String>,
    pub resolution: Option<VideoResolution>,
}

/// Lifecycle events
#[derive(Debug, Clone, PartialEq)]
pub enum CameraEvent {
    StateChanged {
        from: CaptureReadinessState,
        to: CaptureReadinessState,
    },
    StreamAcquired {
        stream_id: String,
        device_id: Option<String>,
    },
    StreamReleased {
        stream_id: String,
        report: ReleaseReport,
    },
    RecoveryStarted {
        plan: RecoveryPlan,
    },
    UserGestureRequired,
    ManualStartAvailable,
    Error {
        message: String,
    },
}

struct Session {
    handle: Option<DeviceStreamHandle>,
    generation: u64,
    wanted: bool,
    recovery_attempted: bool,
    state: CaptureReadinessState,
    is_loading: bool,
    error: Option<String>,
    needs_user_gesture: bool,
    needs_manual_start: bool,
    resolution: Option<VideoResolution>,
    slow_timer: Option<JoinHandle<()>>,
    sink_listener: Option<JoinHandle<()>>,
}

impl Session {
    fn new() -> Self {
        Self {
            handle: None,
            generation: 0,
            wanted: false,
            recovery_attempted: false,
            state: CaptureReadinessState::Idle,
            is_loading: false,
            error: None,
            needs_user_gesture: false,
            needs_manual_start: false,
            resolution: None,
            slow_timer: None,
            sink_listener: None,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.wanted && self.generation == generation
    }

    fn cancel_slow_timer(&mut self) {
        if let Some(timer) = self.slow_timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    devices: Arc<dyn MediaDevices>,
    sink: Arc<dyn VideoSink>,
    config: CameraConfig,
    acquirer: DeviceAcquirer,
    verifier: PlaybackVerifier,
    capturer: FrameCapturer,
    log: DiagnosticLog,
    session: Mutex<Session>,
    event_tx: broadcast::Sender<CameraEvent>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let session = self.session.get_mut();
        session.cancel_slow_timer();
        if let Some(listener) = session.sink_listener.take() {
            listener.abort();
        }
        if let Some(mut handle) = session.handle.take() {
            handle.release();
        }
    }
}

enum Step {
    Acquire(Option<RecoveryPlan>),
    Resume,
}

enum Settled {
    Done,
    Recover { current_device: Option<String> },
}

/// Owner of the camera stream for one capture screen
#[derive(Clone)]
pub struct CameraLifecycle {
    inner: Arc<Inner>,
}

impl CameraLifecycle {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        sink: Arc<dyn VideoSink>,
        config: CameraConfig,
        log: DiagnosticLog,
    ) -> MediaResult<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(100);

        Ok(Self {
            inner: Arc::new(Inner {
                acquirer: DeviceAcquirer::new(devices.clone(), config.ideal_resolution),
                verifier: PlaybackVerifier::new(config.freeze_check_delay),
                capturer: FrameCapturer::new(config.jpeg_quality),
                devices,
                sink,
                config,
                log,
                session: Mutex::new(Session::new()),
                event_tx,
            }),
        })
    }

    pub fn config(&self) -> &CameraConfig {
        &self.inner.config
    }

    pub fn debug_log(&self) -> &DiagnosticLog {
        &self.inner.log
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn status(&self) -> CameraStatus {
        let session = self.inner.session.lock();
        CameraStatus {
            state: session.state,
            is_loading: session.is_loading,
            error: session.error.clone(),
            needs_user_gesture: session.needs_user_gesture,
            needs_manual_start: session.needs_manual_start,
            stream_id: session.handle.as_ref().map(|h| h.id().to_string()),
            resolution: session.resolution,
        }
    }

    pub fn state(&self) -> CaptureReadinessState {
        self.inner.session.lock().state
    }

    /// Whether a stream is currently owned
    pub fn has_stream(&self) -> bool {
        self.inner.session.lock().handle.is_some()
    }

    /// Start a new session, releasing any current stream first.
    ///
    /// Resolves once the session has settled: ready, awaiting a user gesture,
    /// frozen or failed. Returns `Superseded` if a newer `start` or a `stop`
    /// overtook this one.
    pub async fn start(&self) -> MediaResult<CameraStatus> {
        self.ensure_sink_listener();

        let generation = {
            let mut session = self.inner.session.lock();
            session.generation += 1;
            session.wanted = true;
            session.recovery_attempted = false;
            session.error = None;
            session.needs_user_gesture = false;
            session.needs_manual_start = false;
            session.resolution = None;
            session.is_loading = true;
            self.release_locked(&mut session);
            self.transition_locked(&mut session, CaptureReadinessState::Acquiring);

            session.cancel_slow_timer();
            session.slow_timer = Some(self.spawn_slow_timer(session.generation));
            session.generation
        };

        info!("Starting camera session #{}", generation);
        self.inner
            .log
            .record(format!("start: session #{}", generation));
        self.drive(generation, Step::Acquire(None)).await
    }

    /// Tear down and start again
    pub async fn restart(&self) -> MediaResult<CameraStatus> {
        debug!("Restarting camera");
        self.inner.log.record("restart requested");
        self.teardown();
        self.start().await
    }

    /// Resume playback after the platform demanded a user gesture
    pub async fn resume_playback(&self) -> MediaResult<CameraStatus> {
        let generation = {
            let mut session = self.inner.session.lock();
            if session.handle.is_none() || !session.wanted {
                return Err(MediaError::NoActiveStream);
            }
            session.needs_user_gesture = false;
            session.is_loading = true;
            session.generation
        };

        self.inner.log.record("play() retried after user gesture");
        self.drive(generation, Step::Resume).await
    }

    /// Release the stream and invalidate anything in flight. Idempotent.
    pub fn teardown(&self) -> ReleaseReport {
        let mut session = self.inner.session.lock();
        session.wanted = false;
        session.generation += 1;
        session.cancel_slow_timer();
        session.is_loading = false;
        session.needs_user_gesture = false;
        session.needs_manual_start = false;
        session.error = None;
        session.resolution = None;

        let report = self.release_locked(&mut session);
        self.transition_locked(&mut session, CaptureReadinessState::Idle);
        report
    }

    /// Alias of [`teardown`](Self::teardown) for back navigation
    pub fn stop(&self) -> ReleaseReport {
        self.teardown()
    }

    /// Snapshot the current frame
    pub fn capture(&self) -> MediaResult<StillImage> {
        if !self.has_stream() {
            return Err(MediaError::NoActiveStream);
        }

        let result = self.inner.capturer.capture(&*self.inner.sink);

        let mut session = self.inner.session.lock();
        match &result {
            Ok(still) => {
                // A decoded frame proves playback is flowing once verification settled
                let settled_verifying =
                    session.state == CaptureReadinessState::Verifying && !session.is_loading;
                if session.state == CaptureReadinessState::CaptureFailed || settled_verifying {
                    session.resolution = Some(still.resolution());
                    session.error = None;
                    self.transition_locked(&mut session, CaptureReadinessState::Ready);
                }
                info!("Captured still {}x{}", still.width(), still.height());
                self.inner
                    .log
                    .record(format!("capture: {}x{}", still.width(), still.height()));
            }
            Err(e) => {
                warn!("Capture failed: {}", e);
                self.inner.log.record(format!("capture failed: {}", e));
                if matches!(e, MediaError::NotReadyForCapture { .. })
                    && session.state == CaptureReadinessState::Ready
                {
                    self.transition_locked(&mut session, CaptureReadinessState::CaptureFailed);
                }
                session.error = Some(e.user_message());
            }
        }
        result
    }

    async fn drive(&self, generation: u64, mut step: Step) -> MediaResult<CameraStatus> {
        loop {
            let outcome = match step {
                Step::Acquire(plan) => self.acquire_and_verify(generation, plan).await?,
                Step::Resume => self.inner.verifier.resume(&*self.inner.sink).await,
            };

            match self.settle(generation, outcome)? {
                Settled::Done => return Ok(self.status()),
                Settled::Recover { current_device } => {
                    let plan =
                        plan_recovery(&*self.inner.devices, current_device.as_deref()).await;
                    self.begin_recovery(generation, &plan)?;
                    step = Step::Acquire(Some(plan));
                }
            }
        }
    }

    async fn acquire_and_verify(
        &self,
        generation: u64,
        plan: Option<RecoveryPlan>,
    ) -> MediaResult<VerifyOutcome> {
        let acquired = match &plan {
            None => {
                self.inner
                    .acquirer
                    .acquire(self.inner.config.preferred_facing)
                    .await
            }
            Some(plan) => self.inner.acquirer.acquire_for_recovery(plan).await,
        };

        let view = {
            let mut session = self.inner.session.lock();
            if !session.is_current(generation) {
                if let Ok(mut handle) = acquired {
                    let report = handle.release();
                    debug!("Released late stream {} from session #{}", handle.id(), generation);
                    self.inner.log.record(format!(
                        "late stream {} released ({} tracks)",
                        handle.id(),
                        report.tracks_stopped
                    ));
                }
                return Err(MediaError::Superseded);
            }

            let handle = match acquired {
                Ok(handle) => handle,
                Err(e) => {
                    session.cancel_slow_timer();
                    session.is_loading = false;
                    session.error = Some(e.user_message().to_string());
                    self.transition_locked(&mut session, CaptureReadinessState::Failed);
                    self.inner.log.record(format!("acquisition failed: {}", e));
                    self.emit(CameraEvent::Error {
                        message: e.user_message().to_string(),
                    });
                    return Err(e.into());
                }
            };

            let view = handle.view();
            self.inner.log.record(format!(
                "stream {} acquired with {}",
                handle.id(),
                handle.constraints()
            ));
            self.emit(CameraEvent::StreamAcquired {
                stream_id: handle.id().to_string(),
                device_id: handle.device_id(),
            });
            session.handle = Some(handle);
            session.cancel_slow_timer();
            self.transition_locked(&mut session, CaptureReadinessState::Verifying);
            view
        };

        Ok(self.inner.verifier.verify(&*self.inner.sink, view).await)
    }

    fn settle(&self, generation: u64, outcome: VerifyOutcome) -> MediaResult<Settled> {
        let mut session = self.inner.session.lock();
        if !session.is_current(generation) {
            return Err(MediaError::Superseded);
        }

        self.inner.log.record(format!("playback check: {}", outcome));
        match outcome {
            VerifyOutcome::Verified { resolution } => {
                session.cancel_slow_timer();
                session.is_loading = false;
                session.needs_manual_start = false;
                session.resolution = Some(resolution);
                self.transition_locked(&mut session, CaptureReadinessState::Ready);
                info!("Camera ready at {}", resolution);
                Ok(Settled::Done)
            }
            VerifyOutcome::AwaitingFrames => {
                session.cancel_slow_timer();
                session.is_loading = false;
                session.needs_manual_start = false;
                Ok(Settled::Done)
            }
            VerifyOutcome::NeedsUserGesture => {
                session.cancel_slow_timer();
                session.is_loading = false;
                session.needs_manual_start = false;
                session.needs_user_gesture = true;
                self.emit(CameraEvent::UserGestureRequired);
                Ok(Settled::Done)
            }
            VerifyOutcome::Frozen => {
                self.transition_locked(&mut session, CaptureReadinessState::Frozen);
                if session.recovery_attempted {
                    warn!("Camera still frozen after recovery");
                    session.cancel_slow_timer();
                    session.is_loading = false;
                    session.needs_manual_start = false;
                    session.error = Some(FROZEN_MESSAGE.to_string());
                    self.emit(CameraEvent::Error {
                        message: FROZEN_MESSAGE.to_string(),
                    });
                    return Ok(Settled::Done);
                }

                session.recovery_attempted = true;
                let current_device = session.handle.as_ref().and_then(|h| h.device_id());
                warn!(
                    "Camera frozen on device {}, attempting recovery",
                    current_device.as_deref().unwrap_or("unknown")
                );
                Ok(Settled::Recover { current_device })
            }
        }
    }

    fn begin_recovery(&self, generation: u64, plan: &RecoveryPlan) -> MediaResult<()> {
        let mut session = self.inner.session.lock();
        if !session.is_current(generation) {
            return Err(MediaError::Superseded);
        }

        info!("Frozen-frame recovery: {}", plan);
        self.inner.log.record(format!("recovery: {}", plan));
        self.release_locked(&mut session);
        self.transition_locked(&mut session, CaptureReadinessState::Acquiring);

        // The recovery acquisition gets its own slow threshold
        session.cancel_slow_timer();
        session.slow_timer = Some(self.spawn_slow_timer(generation));
        self.emit(CameraEvent::RecoveryStarted { plan: plan.clone() });
        Ok(())
    }

    fn release_locked(&self, session: &mut Session) -> ReleaseReport {
        self.inner.sink.attach(None);
        let Some(mut handle) = session.handle.take() else {
            return ReleaseReport::default();
        };

        let report = handle.release();
        let stream_id = handle.id().to_string();
        info!("Released camera stream {}", stream_id);
        self.inner.log.record(format!(
            "stream {} released ({} stopped, {} failed)",
            stream_id, report.tracks_stopped, report.stop_failures
        ));
        self.emit(CameraEvent::StreamReleased { stream_id, report });
        report
    }

    fn transition_locked(&self, session: &mut Session, to: CaptureReadinessState) {
        let from = session.state;
        if from == to {
            return;
        }
        session.state = to;
        debug!("Camera state {} -> {}", from, to);
        self.emit(CameraEvent::StateChanged { from, to });
    }

    fn emit(&self, event: CameraEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    fn spawn_slow_timer(&self, generation: u64) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let threshold = self.inner.config.slow_acquisition_threshold;

        tokio::spawn(async move {
            tokio::time::sleep(threshold).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };

            let mut session = inner.session.lock();
            if session.is_current(generation) && session.is_loading {
                session.needs_manual_start = true;
                session.slow_timer = None;
                info!("Camera start is slow, offering manual start");
                inner.log.record("acquisition slow: manual start offered");
                let _ = inner.event_tx.send(CameraEvent::ManualStartAvailable);
            }
        })
    }

    fn ensure_sink_listener(&self) {
        let mut session = self.inner.session.lock();
        if session.sink_listener.is_some() {
            return;
        }

        let mut events = self.inner.sink.subscribe();
        let log = self.inner.log.clone();
        session.sink_listener = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => log.record(format!("video: {}", event)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log.record(format!("video: {} events dropped", skipped))
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }
}
