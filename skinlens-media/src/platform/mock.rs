//! Scriptable in-memory platform
//!
//! Used by the test suites and by hosts without a camera. Every call is
//! recorded so tests can assert on request order, enumeration count and
//! whether any track was left running.

use crate::device::{
    AcquisitionConstraints, DeviceKind, MediaDeviceInfo, MediaDevices, MediaStream, MediaTrack,
    StreamView, TrackKind, VideoResolution,
};
use crate::error::PlatformError;
use crate::sink::{RasterFrame, SinkEvent, VideoSink};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Knobs applied to every granted request
#[derive(Debug, Clone, Default)]
pub struct MockCameraBehavior {
    /// Time a request stays pending, as if a permission prompt were open
    pub grant_delay: Duration,
    /// Grant streams whose only video track has already ended
    pub grant_without_video: bool,
    /// Make `stop()` fail on every granted track
    pub failing_track_stop: bool,
}

/// Mock track
#[derive(Debug)]
pub struct MockTrack {
    id: String,
    label: String,
    device_id: String,
    live: AtomicBool,
    fail_stop: bool,
    stop_calls: AtomicUsize,
}

impl MockTrack {
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl MediaTrack for MockTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn device_id(&self) -> Option<String> {
        Some(self.device_id.clone())
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn stop(&self) -> Result<(), PlatformError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            return Err(PlatformError::other("mock track refused to stop"));
        }
        self.live.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock stream with a single video track
#[derive(Debug)]
pub struct MockMediaStream {
    id: String,
    track: Arc<MockTrack>,
}

impl MockMediaStream {
    pub fn track(&self) -> &Arc<MockTrack> {
        &self.track
    }
}

impl MediaStream for MockMediaStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        vec![self.track.clone() as Arc<dyn MediaTrack>]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Scriptable `MediaDevices`
pub struct MockMediaDevices {
    cameras: Vec<String>,
    behavior: Mutex<MockCameraBehavior>,
    failures: Mutex<VecDeque<PlatformError>>,
    enumerate_failure: Mutex<Option<PlatformError>>,
    requests: Mutex<Vec<AcquisitionConstraints>>,
    granted: Mutex<Vec<Arc<MockMediaStream>>>,
    enumerate_calls: AtomicUsize,
}

impl MockMediaDevices {
    /// Platform with the given video inputs, first one is the default
    pub fn with_cameras(device_ids: &[&str]) -> Self {
        Self {
            cameras: device_ids.iter().map(|id| id.to_string()).collect(),
            behavior: Mutex::new(MockCameraBehavior::default()),
            failures: Mutex::new(VecDeque::new()),
            enumerate_failure: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            granted: Mutex::new(Vec::new()),
            enumerate_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_default_camera() -> Self {
        Self::with_cameras(&["mock_camera_0"])
    }

    /// Platform without any video input
    pub fn without_cameras() -> Self {
        Self::with_cameras(&[])
    }

    pub fn set_behavior(&self, behavior: MockCameraBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Fail the next request with `error`. Queued failures are consumed in order.
    pub fn push_failure(&self, error: PlatformError) {
        self.failures.lock().push_back(error);
    }

    pub fn fail_enumeration(&self, error: PlatformError) {
        *self.enumerate_failure.lock() = Some(error);
    }

    /// Constraints of every request so far, in order
    pub fn request_log(&self) -> Vec<AcquisitionConstraints> {
        self.requests.lock().clone()
    }

    pub fn enumerate_calls(&self) -> usize {
        self.enumerate_calls.load(Ordering::SeqCst)
    }

    pub fn streams_granted(&self) -> usize {
        self.granted.lock().len()
    }

    /// Granted streams whose track has not been stopped
    pub fn live_streams(&self) -> usize {
        self.granted
            .lock()
            .iter()
            .filter(|stream| stream.track.is_live())
            .count()
    }

    pub fn granted_streams(&self) -> Vec<Arc<MockMediaStream>> {
        self.granted.lock().clone()
    }

    fn select_device(&self, constraints: &AcquisitionConstraints) -> Result<String, PlatformError> {
        if let Some(requested) = &constraints.device_id {
            let id = requested.value();
            if self.cameras.iter().any(|camera| camera == id) {
                return Ok(id.clone());
            }
            if requested.is_exact() {
                return Err(PlatformError::overconstrained("deviceId"));
            }
        }

        self.cameras
            .first()
            .cloned()
            .ok_or_else(|| PlatformError::not_found("Requested device not found"))
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn get_user_media(
        &self,
        constraints: &AcquisitionConstraints,
    ) -> Result<Arc<dyn MediaStream>, PlatformError> {
        self.requests.lock().push(constraints.clone());
        let behavior = self.behavior.lock().clone();

        if !behavior.grant_delay.is_zero() {
            tokio::time::sleep(behavior.grant_delay).await;
        }

        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }

        let device_id = self.select_device(constraints)?;
        let stream = Arc::new(MockMediaStream {
            id: Uuid::new_v4().to_string(),
            track: Arc::new(MockTrack {
                id: Uuid::new_v4().to_string(),
                label: format!("Mock Camera ({})", device_id),
                device_id,
                live: AtomicBool::new(!behavior.grant_without_video),
                fail_stop: behavior.failing_track_stop,
                stop_calls: AtomicUsize::new(0),
            }),
        });
        debug!("Mock granted stream {} for {}", stream.id, constraints);

        self.granted.lock().push(stream.clone());
        Ok(stream)
    }

    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, PlatformError> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.enumerate_failure.lock().clone() {
            return Err(error);
        }

        Ok(self
            .cameras
            .iter()
            .enumerate()
            .map(|(index, id)| MediaDeviceInfo {
                device_id: id.clone(),
                kind: DeviceKind::VideoInput,
                label: format!("Mock Camera {}", index),
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameSource {
    resolution: VideoResolution,
    current_time: f64,
}

/// Scriptable `VideoSink`.
///
/// Reports the configured frame size and presentation time while a live
/// stream is attached, and zeros otherwise. Devices marked frozen keep the
/// clock at zero.
pub struct MockVideoSink {
    attached: Mutex<Option<StreamView>>,
    source: Mutex<FrameSource>,
    frozen_devices: Mutex<HashSet<String>>,
    play_results: Mutex<VecDeque<Result<(), PlatformError>>>,
    play_calls: AtomicUsize,
    short_frames: AtomicBool,
    events: broadcast::Sender<SinkEvent>,
}

impl MockVideoSink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            attached: Mutex::new(None),
            source: Mutex::new(FrameSource {
                resolution: VideoResolution::HD,
                current_time: 0.5,
            }),
            frozen_devices: Mutex::new(HashSet::new()),
            play_results: Mutex::new(VecDeque::new()),
            play_calls: AtomicUsize::new(0),
            short_frames: AtomicBool::new(false),
            events,
        }
    }

    /// Frame size and clock reported for any attached live stream
    pub fn set_frame_source(&self, resolution: VideoResolution, current_time: f64) {
        *self.source.lock() = FrameSource {
            resolution,
            current_time,
        };
    }

    /// Streams from this device never advance
    pub fn freeze_device(&self, device_id: impl Into<String>) {
        self.frozen_devices.lock().insert(device_id.into());
    }

    /// Result of the next `play()`. Unscripted calls succeed.
    pub fn push_play_result(&self, result: Result<(), PlatformError>) {
        self.play_results.lock().push_back(result);
    }

    /// Hand out frames one byte short of their geometry
    pub fn set_short_frames(&self, enabled: bool) {
        self.short_frames.store(enabled, Ordering::SeqCst);
    }

    pub fn play_calls(&self) -> usize {
        self.play_calls.load(Ordering::SeqCst)
    }

    pub fn attached_stream(&self) -> Option<StreamView> {
        self.attached.lock().clone()
    }

    /// Broadcast an event to subscribers
    pub fn emit(&self, event: SinkEvent) {
        let _ = self.events.send(event);
    }

    fn playing_source(&self) -> Option<FrameSource> {
        let attached = self.attached.lock();
        let view = attached.as_ref().filter(|view| view.is_live())?;
        let mut source = *self.source.lock();

        if let Some(device_id) = view.device_id() {
            if self.frozen_devices.lock().contains(&device_id) {
                source.current_time = 0.0;
            }
        }
        Some(source)
    }
}

impl Default for MockVideoSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoSink for MockVideoSink {
    fn attach(&self, stream: Option<StreamView>) {
        let loaded = stream.is_some();
        let previous = std::mem::replace(&mut *self.attached.lock(), stream);
        if loaded {
            let resolution = self.source.lock().resolution;
            self.emit(SinkEvent::LoadedMetadata {
                width: resolution.width,
                height: resolution.height,
            });
            if !resolution.is_empty() {
                self.emit(SinkEvent::CanPlay);
            }
        } else if previous.is_some() {
            self.emit(SinkEvent::Suspend);
        }
    }

    async fn play(&self) -> Result<(), PlatformError> {
        self.play_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.play_results.lock().pop_front().unwrap_or(Ok(()));
        if let Err(e) = &result {
            self.emit(SinkEvent::Error {
                message: e.to_string(),
            });
            self.emit(SinkEvent::Paused);
            return result;
        }

        self.emit(SinkEvent::Playing);
        match self.playing_source() {
            Some(source) if source.resolution.is_empty() => self.emit(SinkEvent::Waiting),
            Some(source) if source.current_time == 0.0 => self.emit(SinkEvent::Stalled),
            _ => {}
        }
        result
    }

    fn video_width(&self) -> u32 {
        self.playing_source()
            .map(|source| source.resolution.width)
            .unwrap_or(0)
    }

    fn video_height(&self) -> u32 {
        self.playing_source()
            .map(|source| source.resolution.height)
            .unwrap_or(0)
    }

    fn current_time(&self) -> f64 {
        self.playing_source()
            .map(|source| source.current_time)
            .unwrap_or(0.0)
    }

    fn draw_frame(&self) -> Result<RasterFrame, PlatformError> {
        let source = self
            .playing_source()
            .ok_or_else(|| PlatformError::other("no stream attached"))?;
        let VideoResolution { width, height } = source.resolution;

        let mut data = Vec::with_capacity(RasterFrame::expected_len(width, height));
        for y in 0..height {
            for x in 0..width {
                data.push((x % 256) as u8);
                data.push((y % 256) as u8);
                data.push(128);
            }
        }
        if self.short_frames.load(Ordering::SeqCst) {
            data.pop();
        }

        Ok(RasterFrame {
            width,
            height,
            data,
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.events.subscribe()
    }
}
