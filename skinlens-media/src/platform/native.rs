//! Native camera platform backed by nokhwa
//!
//! Each granted stream owns a capture thread. The thread opens the camera,
//! reports the open result back to the requesting task, then keeps the
//! latest decoded RGB frame in a shared slot until its track is stopped.
//! Facing hints have no meaning on desktop cameras and are ignored.

use crate::device::{
    AcquisitionConstraints, DeviceKind, MediaDeviceInfo, MediaDevices, MediaStream, MediaTrack,
    StreamView, TrackKind, VideoResolution,
};
use crate::error::PlatformError;
use crate::sink::{RasterFrame, SinkEvent, VideoSink};
use async_trait::async_trait;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A slot that has not advanced for this long is reported as stalled
const STALL_AFTER: Duration = Duration::from_secs(1);

struct LatestFrame {
    frame: RasterFrame,
    first_frame_at: Instant,
    captured_at: Instant,
}

#[derive(Default)]
struct FrameSlot {
    latest: RwLock<Option<LatestFrame>>,
}

impl FrameSlot {
    fn store(&self, frame: RasterFrame) {
        let now = Instant::now();
        let mut latest = self.latest.write();
        let first_frame_at = latest.as_ref().map(|l| l.first_frame_at).unwrap_or(now);
        *latest = Some(LatestFrame {
            frame,
            first_frame_at,
            captured_at: now,
        });
    }
}

/// Track of a native capture thread
#[derive(Debug)]
pub struct NativeTrack {
    id: String,
    label: String,
    device_id: String,
    live: Arc<AtomicBool>,
}

impl MediaTrack for NativeTrack {
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
        self.live.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Stream fed by a native capture thread
pub struct NativeMediaStream {
    id: String,
    track: Arc<NativeTrack>,
    frames: Arc<FrameSlot>,
}

impl std::fmt::Debug for NativeMediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeMediaStream")
            .field("id", &self.id)
            .field("track", &self.track)
            .finish()
    }
}

impl MediaStream for NativeMediaStream {
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

/// `MediaDevices` over the operating system's camera API
#[derive(Debug, Default)]
pub struct NativeMediaDevices;

impl NativeMediaDevices {
    pub fn new() -> Self {
        Self
    }

    fn query() -> Result<Vec<(CameraIndex, String)>, PlatformError> {
        let cameras = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| PlatformError::other(format!("camera query failed: {}", e)))?;
        Ok(cameras
            .into_iter()
            .map(|info| (info.index().clone(), info.human_name()))
            .collect())
    }

    fn select(
        constraints: &AcquisitionConstraints,
    ) -> Result<(CameraIndex, String), PlatformError> {
        let cameras = Self::query()?;

        if let Some(requested) = &constraints.device_id {
            let found = cameras
                .iter()
                .find(|(index, _)| &index.to_string() == requested.value());
            match found {
                Some(camera) => return Ok(camera.clone()),
                None if requested.is_exact() => {
                    return Err(PlatformError::overconstrained("deviceId"))
                }
                None => {}
            }
        }

        cameras
            .into_iter()
            .next()
            .ok_or_else(|| PlatformError::not_found("Requested device not found"))
    }
}

#[async_trait]
impl MediaDevices for NativeMediaDevices {
    async fn get_user_media(
        &self,
        constraints: &AcquisitionConstraints,
    ) -> Result<Arc<dyn MediaStream>, PlatformError> {
        let constraints = constraints.clone();
        let (index, label) = tokio::task::spawn_blocking(move || Self::select(&constraints))
            .await
            .map_err(|e| PlatformError::other(format!("device selection aborted: {}", e)))??;

        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::HighestResolution(
            Resolution::new(VideoResolution::HD.width, VideoResolution::HD.height),
        ));
        let live = Arc::new(AtomicBool::new(true));
        let frames = Arc::new(FrameSlot::default());
        let (opened_tx, opened_rx) = oneshot::channel();

        let device_id = index.to_string();
        {
            let live = live.clone();
            let frames = frames.clone();
            thread::Builder::new()
                .name(format!("camera-{}", device_id))
                .spawn(move || capture_loop(index, requested, live, frames, opened_tx))
                .map_err(|e| PlatformError::other(format!("capture thread: {}", e)))?;
        }

        opened_rx
            .await
            .map_err(|_| PlatformError::other("capture thread exited before opening"))??;

        let stream = NativeMediaStream {
            id: Uuid::new_v4().to_string(),
            track: Arc::new(NativeTrack {
                id: Uuid::new_v4().to_string(),
                label,
                device_id,
                live,
            }),
            frames,
        };
        info!("Opened native camera {} as stream {}", stream.track.device_id, stream.id);
        Ok(Arc::new(stream))
    }

    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, PlatformError> {
        let cameras = tokio::task::spawn_blocking(Self::query)
            .await
            .map_err(|e| PlatformError::other(format!("enumeration aborted: {}", e)))??;

        Ok(cameras
            .into_iter()
            .map(|(index, label)| MediaDeviceInfo {
                device_id: index.to_string(),
                kind: DeviceKind::VideoInput,
                label,
            })
            .collect())
    }
}

fn capture_loop(
    index: CameraIndex,
    requested: RequestedFormat,
    live: Arc<AtomicBool>,
    frames: Arc<FrameSlot>,
    opened: oneshot::Sender<Result<(), PlatformError>>,
) {
    let mut camera = match Camera::new(index, requested).and_then(|mut camera| {
        camera.open_stream()?;
        Ok(camera)
    }) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = opened.send(Err(PlatformError::not_readable(e.to_string())));
            return;
        }
    };

    if opened.send(Ok(())).is_err() {
        let _ = camera.stop_stream();
        return;
    }

    while live.load(Ordering::SeqCst) {
        let decoded = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbFormat>());
        match decoded {
            Ok(image) => {
                let (width, height) = (image.width(), image.height());
                frames.store(RasterFrame {
                    width,
                    height,
                    data: image.into_raw(),
                });
            }
            Err(e) => {
                warn!("Dropping camera frame: {}", e);
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        warn!("Failed to stop camera stream: {}", e);
    }
    debug!("Capture thread exiting");
}

/// `VideoSink` that renders a [`NativeMediaStream`]'s frame slot
pub struct NativeVideoSink {
    attached: Mutex<Option<(Arc<FrameSlot>, Arc<AtomicBool>)>>,
    stalled: AtomicBool,
    events: broadcast::Sender<SinkEvent>,
}

impl NativeVideoSink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            attached: Mutex::new(None),
            stalled: AtomicBool::new(false),
            events,
        }
    }

    fn emit(&self, event: SinkEvent) {
        let _ = self.events.send(event);
    }

    /// Emit `stalled` once when the capture thread stops delivering, and
    /// `playing` when it resumes
    fn track_progress(&self, captured_at: Instant) {
        let stale = captured_at.elapsed() >= STALL_AFTER;
        if stale != self.stalled.swap(stale, Ordering::SeqCst) {
            if stale {
                debug!("Native frame slot stopped advancing");
                self.emit(SinkEvent::Stalled);
            } else {
                self.emit(SinkEvent::Playing);
            }
        }
    }

    fn with_latest<T>(&self, f: impl FnOnce(&LatestFrame) -> T) -> Option<T> {
        let attached = self.attached.lock();
        let (frames, live) = attached.as_ref()?;
        if !live.load(Ordering::SeqCst) {
            return None;
        }
        let latest = frames.latest.read();
        latest.as_ref().map(f)
    }
}

impl Default for NativeVideoSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoSink for NativeVideoSink {
    fn attach(&self, stream: Option<StreamView>) {
        let slot = stream.as_ref().and_then(|view| {
            view.downcast_ref::<NativeMediaStream>()
                .map(|native| (native.frames.clone(), native.track.live.clone()))
        });
        if stream.is_some() && slot.is_none() {
            warn!("Native sink cannot render a non-native stream");
        }
        let attached = slot.is_some();
        let previous = std::mem::replace(&mut *self.attached.lock(), slot);
        self.stalled.store(false, Ordering::SeqCst);

        if attached {
            if let Some((width, height)) = self.with_latest(|l| (l.frame.width, l.frame.height)) {
                self.emit(SinkEvent::LoadedMetadata { width, height });
                self.emit(SinkEvent::CanPlay);
            }
        } else if previous.is_some() {
            self.emit(SinkEvent::Suspend);
        }
    }

    async fn play(&self) -> Result<(), PlatformError> {
        if self.attached.lock().is_none() {
            self.emit(SinkEvent::Paused);
            return Err(PlatformError::other("no stream attached"));
        }
        self.emit(SinkEvent::Playing);
        if self.with_latest(|_| ()).is_none() {
            self.emit(SinkEvent::Waiting);
        }
        Ok(())
    }

    fn video_width(&self) -> u32 {
        self.with_latest(|l| l.frame.width).unwrap_or(0)
    }

    fn video_height(&self) -> u32 {
        self.with_latest(|l| l.frame.height).unwrap_or(0)
    }

    fn current_time(&self) -> f64 {
        let Some((elapsed, captured_at)) = self.with_latest(|l| {
            (
                l.captured_at.duration_since(l.first_frame_at).as_secs_f64(),
                l.captured_at,
            )
        }) else {
            return 0.0;
        };
        self.track_progress(captured_at);
        elapsed
    }

    fn draw_frame(&self) -> Result<RasterFrame, PlatformError> {
        self.with_latest(|l| l.frame.clone())
            .ok_or_else(|| PlatformError::other("no decoded frame"))
    }

    fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceStreamHandle;

    fn stream_with_frame() -> NativeMediaStream {
        let frames = Arc::new(FrameSlot::default());
        frames.store(RasterFrame {
            width: 2,
            height: 1,
            data: vec![0; 6],
        });
        NativeMediaStream {
            id: "native-stream".to_string(),
            track: Arc::new(NativeTrack {
                id: "native-track".to_string(),
                label: "Test Camera".to_string(),
                device_id: "0".to_string(),
                live: Arc::new(AtomicBool::new(true)),
            }),
            frames,
        }
    }

    #[test]
    fn test_stale_slot_reports_stalled_once() {
        let stream = stream_with_frame();
        let frames = stream.frames.clone();
        let handle = DeviceStreamHandle::new(
            Arc::new(stream),
            AcquisitionConstraints::unconstrained(),
        );
        let sink = NativeVideoSink::new();
        let mut events = sink.subscribe();
        sink.attach(Some(handle.view()));

        if let Some(latest) = frames.latest.write().as_mut() {
            latest.captured_at = Instant::now()
                .checked_sub(Duration::from_secs(2))
                .unwrap();
        }
        sink.current_time();
        sink.current_time();

        frames.store(RasterFrame {
            width: 2,
            height: 1,
            data: vec![0; 6],
        });
        sink.current_time();

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.name());
        }
        assert_eq!(names, vec!["loadedmetadata", "canplay", "stalled", "playing"]);
    }
}
