//! Frame capture into JPEG stills

use crate::error::{MediaError, MediaResult};
use crate::sink::VideoSink;
use crate::still::StillImage;
use image::codecs::jpeg::JpegEncoder;
use tracing::debug;

/// Snapshots the sink's current frame
#[derive(Debug, Clone, Copy)]
pub struct FrameCapturer {
    quality: u8,
}

impl FrameCapturer {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Capture at the sink's intrinsic size.
    ///
    /// Fails with `NotReadyForCapture` when either dimension is zero at the
    /// moment of the call.
    pub fn capture(&self, sink: &dyn VideoSink) -> MediaResult<StillImage> {
        let resolution = sink.intrinsic_resolution();
        if resolution.is_empty() {
            return Err(MediaError::NotReadyForCapture {
                width: resolution.width,
                height: resolution.height,
            });
        }

        let frame = sink.draw_frame()?;
        frame.validate()?;

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode(
                &frame.data,
                frame.width,
                frame.height,
                image::ColorType::Rgb8.into(),
            )
            .map_err(|e| MediaError::EncodingFailed {
                reason: e.to_string(),
            })?;

        debug!(
            "Captured {}x{} still ({} bytes, quality {})",
            frame.width,
            frame.height,
            jpeg.len(),
            self.quality
        );
        Ok(StillImage::from_capture(frame.width, frame.height, jpeg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AcquisitionConstraints, DeviceStreamHandle, MediaDevices, VideoResolution};
    use crate::platform::mock::{MockMediaDevices, MockVideoSink};

    async fn attached(devices: &MockMediaDevices, sink: &MockVideoSink) -> DeviceStreamHandle {
        let stream = devices
            .get_user_media(&AcquisitionConstraints::unconstrained())
            .await
            .unwrap();
        let handle = DeviceStreamHandle::new(stream, AcquisitionConstraints::unconstrained());
        sink.attach(Some(handle.view()));
        handle
    }

    #[tokio::test]
    async fn test_capture_at_intrinsic_size() {
        let devices = MockMediaDevices::with_default_camera();
        let sink = MockVideoSink::new();
        sink.set_frame_source(VideoResolution::new(64, 48), 0.4);
        let _handle = attached(&devices, &sink).await;

        let still = FrameCapturer::new(90).capture(&sink).unwrap();
        assert_eq!(still.resolution(), VideoResolution::new(64, 48));
        assert_eq!(&still.bytes()[..2], &[0xff, 0xd8]);

        let decoded = image::load_from_memory(still.bytes()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_not_ready_without_frames() {
        let sink = MockVideoSink::new();
        let error = FrameCapturer::new(90).capture(&sink).unwrap_err();
        assert_eq!(
            error,
            MediaError::NotReadyForCapture {
                width: 0,
                height: 0
            }
        );
        assert!(error.is_recoverable());
    }

    #[tokio::test]
    async fn test_short_frame_is_rejected() {
        let devices = MockMediaDevices::with_default_camera();
        let sink = MockVideoSink::new();
        sink.set_frame_source(VideoResolution::new(4, 4), 0.4);
        sink.set_short_frames(true);
        let _handle = attached(&devices, &sink).await;

        let error = FrameCapturer::new(90).capture(&sink).unwrap_err();
        assert_eq!(
            error,
            MediaError::InvalidFrameData {
                expected: 48,
                actual: 47
            }
        );
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(FrameCapturer::new(0).quality(), 1);
        assert_eq!(FrameCapturer::new(200).quality(), 100);
    }
}
