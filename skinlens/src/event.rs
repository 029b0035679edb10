//! Event system for capture session events

use crate::{AcceptedProfile, CameraEvent, CaptureReadinessState};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Events that can occur during a capture session
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Camera readiness changed
    CameraStateChanged {
        /// Previous state
        from: CaptureReadinessState,
        /// New state
        to: CaptureReadinessState,
    },
    /// A camera stream was granted
    CameraStreamAcquired {
        /// Stream ID
        stream_id: String,
        /// Device the stream reads from, if known
        device_id: Option<String>,
    },
    /// The camera stream was released
    CameraStreamReleased {
        /// Stream ID
        stream_id: String,
    },
    /// The feed froze and a different camera is being tried
    CameraRecoveryStarted {
        /// Human-readable recovery plan
        plan: String,
    },
    /// Playback needs a user gesture to start
    UserGestureRequired,
    /// Acquisition is slow; a manual start may be offered
    ManualStartAvailable,
    /// A still was captured from the camera
    PhotoCaptured {
        /// Still width
        width: u32,
        /// Still height
        height: u32,
    },
    /// A still was accepted from a selected file
    PhotoSelected {
        /// Still width
        width: u32,
        /// Still height
        height: u32,
    },
    /// The pending still was discarded
    PhotoDiscarded,
    /// The pending still is being uploaded
    UploadStarted {
        /// Encoded still size in bytes
        bytes: usize,
    },
    /// Predictions arrived for the uploaded still
    AnalysisCompleted,
    /// The upload failed; the still is kept for a retry
    UploadFailed {
        /// User-facing message
        error: String,
        /// Whether retrying can help
        retryable: bool,
    },
    /// Profile details were registered
    ProfileRegistered,
    /// The user accepted the reviewed predictions
    ProfileAccepted {
        /// Accepted labels
        profile: AcceptedProfile,
    },
    /// A camera error occurred
    CameraError {
        /// User-facing message
        error: String,
        /// Whether this error is recoverable
        recoverable: bool,
    },
}

impl Event {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::CameraStateChanged { .. } => "camera_state_changed",
            Event::CameraStreamAcquired { .. } => "camera_stream_acquired",
            Event::CameraStreamReleased { .. } => "camera_stream_released",
            Event::CameraRecoveryStarted { .. } => "camera_recovery_started",
            Event::UserGestureRequired => "user_gesture_required",
            Event::ManualStartAvailable => "manual_start_available",
            Event::PhotoCaptured { .. } => "photo_captured",
            Event::PhotoSelected { .. } => "photo_selected",
            Event::PhotoDiscarded => "photo_discarded",
            Event::UploadStarted { .. } => "upload_started",
            Event::AnalysisCompleted => "analysis_completed",
            Event::UploadFailed { .. } => "upload_failed",
            Event::ProfileRegistered => "profile_registered",
            Event::ProfileAccepted { .. } => "profile_accepted",
            Event::CameraError { .. } => "camera_error",
        }
    }

    /// Check if this is a camera-related event
    pub fn is_camera_event(&self) -> bool {
        matches!(
            self,
            Event::CameraStateChanged { .. }
                | Event::CameraStreamAcquired { .. }
                | Event::CameraStreamReleased { .. }
                | Event::CameraRecoveryStarted { .. }
                | Event::UserGestureRequired
                | Event::ManualStartAvailable
        )
    }

    /// Check if this is a photo-related event
    pub fn is_photo_event(&self) -> bool {
        matches!(
            self,
            Event::PhotoCaptured { .. } | Event::PhotoSelected { .. } | Event::PhotoDiscarded
        )
    }

    /// Check if this is an analysis-related event
    pub fn is_analysis_event(&self) -> bool {
        matches!(
            self,
            Event::UploadStarted { .. }
                | Event::AnalysisCompleted
                | Event::ProfileRegistered
                | Event::ProfileAccepted { .. }
        )
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, Event::CameraError { .. } | Event::UploadFailed { .. })
    }
}

impl From<CameraEvent> for Event {
    fn from(event: CameraEvent) -> Self {
        match event {
            CameraEvent::StateChanged { from, to } => Event::CameraStateChanged { from, to },
            CameraEvent::StreamAcquired {
                stream_id,
                device_id,
            } => Event::CameraStreamAcquired {
                stream_id,
                device_id,
            },
            CameraEvent::StreamReleased { stream_id, .. } => {
                Event::CameraStreamReleased { stream_id }
            }
            CameraEvent::RecoveryStarted { plan } => Event::CameraRecoveryStarted {
                plan: plan.to_string(),
            },
            CameraEvent::UserGestureRequired => Event::UserGestureRequired,
            CameraEvent::ManualStartAvailable => Event::ManualStartAvailable,
            CameraEvent::Error { message } => Event::CameraError {
                error: message,
                recoverable: false,
            },
        }
    }
}

/// Stream of session events for async iteration
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<Event>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.receiver.poll_recv(cx)
    }
}

/// Event filter for selective event processing
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Whether to include camera events
    pub include_camera_events: bool,
    /// Whether to include photo events
    pub include_photo_events: bool,
    /// Whether to include analysis events
    pub include_analysis_events: bool,
    /// Whether to include error events
    pub include_error_events: bool,
    /// Specific event types to include (if specified, overrides other filters)
    pub specific_event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a filter that includes all events
    pub fn all() -> Self {
        Self {
            include_camera_events: true,
            include_photo_events: true,
            include_analysis_events: true,
            include_error_events: true,
            specific_event_types: None,
        }
    }

    /// Create a filter that includes only camera events
    pub fn camera_only() -> Self {
        Self {
            include_camera_events: true,
            include_photo_events: false,
            include_analysis_events: false,
            include_error_events: false,
            specific_event_types: None,
        }
    }

    /// Create a filter for specific event types
    pub fn specific(event_types: Vec<String>) -> Self {
        Self {
            include_camera_events: false,
            include_photo_events: false,
            include_analysis_events: false,
            include_error_events: false,
            specific_event_types: Some(event_types),
        }
    }

    /// Check if an event should be included based on this filter
    pub fn should_include(&self, event: &Event) -> bool {
        if let Some(ref specific_types) = self.specific_event_types {
            return specific_types.iter().any(|t| t == event.event_type());
        }

        (self.include_camera_events && event.is_camera_event())
            || (self.include_photo_events && event.is_photo_event())
            || (self.include_analysis_events && event.is_analysis_event())
            || (self.include_error_events && event.is_error_event())
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Filtered event stream that only yields events matching a filter
#[derive(Debug)]
pub struct FilteredEventStream {
    stream: EventStream,
    filter: EventFilter,
}

impl FilteredEventStream {
    /// Create a new filtered event stream
    pub fn new(stream: EventStream, filter: EventFilter) -> Self {
        Self { stream, filter }
    }

    /// Get the next event that matches the filter
    pub async fn next(&mut self) -> Option<Event> {
        while let Some(event) = self.stream.next().await {
            if self.filter.should_include(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Try to get the next filtered event without blocking
    pub fn try_next(&mut self) -> Result<Option<Event>, mpsc::error::TryRecvError> {
        while let Some(event) = self.stream.try_next()? {
            if self.filter.should_include(&event) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Get the current filter
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}
