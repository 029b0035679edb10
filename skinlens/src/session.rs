//! Capture session: the caller-facing photo flow
//!
//! A session owns one camera lifecycle plus the pending still. The still can
//! come from the camera or from a selected file; it is replaced by later
//! captures, dropped by `retake`, and kept when an upload fails so the user
//! can retry.

use crate::event::{Event, EventStream};
use crate::{
    AcceptedProfile, CameraLifecycle, CameraStatus, Category, DemographicReport, InferenceClient,
    ProfileDetails, SkinLensError, StillImage,
};
use bytes::Bytes;
use parking_lot::Mutex;
use skinlens_core::profile_failure_message;
use skinlens_diagnostics::DiagnosticLog;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Default)]
struct SessionState {
    pending: Option<StillImage>,
    report: Option<DemographicReport>,
    error: Option<String>,
    uploading: bool,
}

#[derive(Default)]
struct Subscribers {
    senders: Mutex<Vec<mpsc::UnboundedSender<Event>>>,
}

impl Subscribers {
    fn publish(&self, event: Event) {
        self.senders
            .lock()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}

/// One pass through the capture, upload and review flow
pub struct CaptureSession {
    camera: CameraLifecycle,
    inference: Arc<dyn InferenceClient>,
    max_upload_bytes: usize,
    state: Mutex<SessionState>,
    subscribers: Arc<Subscribers>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureSession {
    pub(crate) fn new(camera: CameraLifecycle, inference: Arc<dyn InferenceClient>) -> Self {
        let max_upload_bytes = camera.config().max_upload_bytes;
        Self {
            camera,
            inference,
            max_upload_bytes,
            state: Mutex::new(SessionState::default()),
            subscribers: Arc::new(Subscribers::default()),
            forwarder: Mutex::new(None),
        }
    }

    /// Subscribe to session events
    pub fn events(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.senders.lock().push(tx);
        EventStream::new(rx)
    }

    /// Camera lifecycle owned by this session
    pub fn camera(&self) -> &CameraLifecycle {
        &self.camera
    }

    /// Start the camera
    pub async fn start_camera(&self) -> Result<CameraStatus, SkinLensError> {
        self.ensure_forwarder();
        self.state.lock().error = None;
        Ok(self.camera.start().await?)
    }

    /// Start playback after a user gesture
    pub async fn resume_playback(&self) -> Result<CameraStatus, SkinLensError> {
        Ok(self.camera.resume_playback().await?)
    }

    /// Release the camera. Safe to call any number of times.
    pub fn stop_camera(&self) {
        self.camera.stop();
    }

    /// Capture the current frame as the pending still
    pub fn capture_photo(&self) -> Result<StillImage, SkinLensError> {
        let still = self.camera.capture()?;
        self.set_pending(still.clone());
        self.subscribers.publish(Event::PhotoCaptured {
            width: still.width(),
            height: still.height(),
        });
        Ok(still)
    }

    /// Use a selected file as the pending still
    pub fn select_photo(&self, bytes: Bytes, mime: &str) -> Result<StillImage, SkinLensError> {
        match StillImage::from_selected_file(bytes, mime, self.max_upload_bytes) {
            Ok(still) => {
                debug!(
                    "Selected {} photo {}x{}",
                    still.mime(),
                    still.width(),
                    still.height()
                );
                self.set_pending(still.clone());
                self.subscribers.publish(Event::PhotoSelected {
                    width: still.width(),
                    height: still.height(),
                });
                Ok(still)
            }
            Err(e) => {
                warn!("Rejected selected photo: {}", e);
                self.state.lock().error = Some(e.user_message());
                Err(e.into())
            }
        }
    }

    /// Discard the pending still and any error
    pub fn retake(&self) {
        let discarded = {
            let mut state = self.state.lock();
            state.error = None;
            state.pending.take().is_some()
        };
        if discarded {
            self.subscribers.publish(Event::PhotoDiscarded);
        }
    }

    /// Pending still, if any
    pub fn pending_photo(&self) -> Option<StillImage> {
        self.state.lock().pending.clone()
    }

    /// Upload the pending still and build the review report.
    ///
    /// On failure the still stays pending and the camera is untouched. On
    /// success the camera is released.
    pub async fn submit(&self) -> Result<DemographicReport, SkinLensError> {
        let still = {
            let mut state = self.state.lock();
            if state.uploading {
                return Err(SkinLensError::InvalidState {
                    expected: "idle session".to_string(),
                    actual: "upload in progress".to_string(),
                });
            }
            let still = state.pending.clone().ok_or_else(|| SkinLensError::InvalidState {
                expected: "pending photo".to_string(),
                actual: "none".to_string(),
            })?;
            state.uploading = true;
            state.error = None;
            still
        };

        self.subscribers.publish(Event::UploadStarted {
            bytes: still.bytes().len(),
        });
        self.camera
            .debug_log()
            .record(format!("upload: {} bytes", still.bytes().len()));

        let result = self.inference.analyze(&still.to_base64()).await;

        let mut state = self.state.lock();
        state.uploading = false;
        match result {
            Ok(response) => {
                let report = DemographicReport::from(&response);
                info!("Analysis completed: {}", response.message);
                state.pending = None;
                state.report = Some(report.clone());
                drop(state);

                self.camera.stop();
                self.subscribers.publish(Event::AnalysisCompleted);
                Ok(report)
            }
            Err(e) => {
                warn!("Upload failed: {}", e);
                state.error = Some(e.user_message());
                drop(state);

                self.camera.debug_log().record(format!("upload failed: {}", e));
                self.subscribers.publish(Event::UploadFailed {
                    error: e.user_message(),
                    retryable: e.is_retryable(),
                });
                Err(e)
            }
        }
    }

    /// Report from the last successful submission
    pub fn report(&self) -> Option<DemographicReport> {
        self.state.lock().report.clone()
    }

    /// Override the reviewed label for one category
    pub fn select_prediction(&self, category: Category, label: &str) -> Result<(), SkinLensError> {
        let mut state = self.state.lock();
        let report = state.report.as_mut().ok_or_else(no_report)?;
        report.select(category, label)
    }

    /// Confirm the reviewed predictions
    pub fn accept(&self) -> Result<AcceptedProfile, SkinLensError> {
        let profile = {
            let state = self.state.lock();
            state.report.as_ref().ok_or_else(no_report)?.accept()?
        };
        info!(
            "Accepted profile: {}, {}, {}",
            profile.race, profile.age, profile.gender
        );
        self.subscribers.publish(Event::ProfileAccepted {
            profile: profile.clone(),
        });
        Ok(profile)
    }

    /// Validate and register the user's name and city
    pub async fn register_profile(
        &self,
        name: &str,
        location: &str,
    ) -> Result<ProfileDetails, SkinLensError> {
        let details = match ProfileDetails::new(name, location) {
            Ok(details) => details,
            Err(e) => {
                self.state.lock().error = Some(e.user_message());
                return Err(e);
            }
        };

        if let Err(e) = self
            .inference
            .register_profile(&details.name, &details.location)
            .await
        {
            warn!("Profile registration failed: {}", e);
            self.state.lock().error = Some(profile_failure_message(&e).to_string());
            return Err(e);
        }

        self.state.lock().error = None;
        self.subscribers.publish(Event::ProfileRegistered);
        Ok(details)
    }

    /// Camera loading or upload in flight
    pub fn is_loading(&self) -> bool {
        self.state.lock().uploading || self.camera.status().is_loading
    }

    /// Current user-facing error, session errors first
    pub fn error(&self) -> Option<String> {
        let session_error = self.state.lock().error.clone();
        session_error.or_else(|| self.camera.status().error)
    }

    /// Playback is waiting for a user gesture
    pub fn needs_user_gesture(&self) -> bool {
        self.camera.status().needs_user_gesture
    }

    /// Acquisition is slow enough to offer a manual start
    pub fn needs_manual_start(&self) -> bool {
        self.camera.status().needs_manual_start
    }

    /// Diagnostic log shared with the camera
    pub fn debug_log(&self) -> &DiagnosticLog {
        self.camera.debug_log()
    }

    fn set_pending(&self, still: StillImage) {
        let mut state = self.state.lock();
        state.pending = Some(still);
        state.error = None;
    }

    fn ensure_forwarder(&self) {
        let mut forwarder = self.forwarder.lock();
        if forwarder.is_some() {
            return;
        }

        let mut camera_events = self.camera.subscribe();
        let subscribers = self.subscribers.clone();
        *forwarder = Some(tokio::spawn(async move {
            loop {
                match camera_events.recv().await {
                    Ok(event) => subscribers.publish(event.into()),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Event forwarder skipped {} camera events", skipped)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.get_mut().take() {
            forwarder.abort();
        }
        self.camera.stop();
    }
}

fn no_report() -> SkinLensError {
    SkinLensError::InvalidState {
        expected: "completed analysis".to_string(),
        actual: "no report".to_string(),
    }
}
