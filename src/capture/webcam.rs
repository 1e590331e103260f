use super::CaptureSource;
use anyhow::{Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

pub struct WebcamCapture {
    camera: Camera,
    device_index: u32,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    /// Open the camera at `device_index` at its native resolution and start streaming
    pub fn open(device_index: u32) -> Result<Self> {
        tracing::info!("Opening webcam {}", device_index);

        let mut camera = Camera::new(CameraIndex::Index(device_index), Self::requested_format())
            .with_context(|| format!("Failed to open camera {device_index}"))?;

        camera
            .open_stream()
            .with_context(|| format!("Failed to open stream for camera {device_index}"))?;

        let resolution = camera.resolution();
        let (width, height) = (resolution.width(), resolution.height());

        tracing::info!(
            "Webcam {} streaming at {}x{} ({})",
            device_index,
            width,
            height,
            camera.info().human_name()
        );

        Ok(Self {
            camera,
            device_index,
            width,
            height,
        })
    }

    /// Whether the device at `device_index` can be opened and streamed
    pub fn probe(device_index: u32) -> bool {
        let Ok(mut camera) = Camera::new(CameraIndex::Index(device_index), Self::requested_format())
        else {
            return false;
        };

        let opened = camera.open_stream().is_ok();
        if opened {
            let _ = camera.stop_stream();
        }
        tracing::debug!("Probe camera {}: {}", device_index, opened);
        opened
    }

    fn requested_format() -> RequestedFormat<'static> {
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution)
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        let frame = self.camera.frame().context("Failed to capture frame")?;

        frame
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera {}: {}", self.device_index, e);
        }
        tracing::info!("Webcam {} released", self.device_index);
    }
}
