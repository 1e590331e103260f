mod webcam;

pub use webcam::WebcamCapture;

use anyhow::Result;
use image::RgbImage;

/// Highest device index tried when looking for cameras
pub const DEFAULT_PROBE_COUNT: u32 = 10;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame
    fn capture_frame(&mut self) -> Result<RgbImage>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}

/// A camera that answered when probed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
}

impl CameraInfo {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            name: format!("Camera {index}"),
        }
    }
}

/// Probe device indices `0..count` and list the ones that can be opened
pub fn probe_cameras(count: u32) -> Vec<CameraInfo> {
    probe_with(count, WebcamCapture::probe)
}

fn probe_with<F>(count: u32, mut can_open: F) -> Vec<CameraInfo>
where
    F: FnMut(u32) -> bool,
{
    let _span = tracing::debug_span!("probe_cameras", count).entered();

    let cameras: Vec<CameraInfo> = (0..count)
        .filter(|&index| can_open(index))
        .map(CameraInfo::new)
        .collect();

    tracing::info!("Found {} camera(s)", cameras.len());
    cameras
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_keeps_only_devices_that_open() {
        let cameras = probe_with(10, |index| index == 0 || index == 3);

        assert_eq!(cameras, vec![CameraInfo::new(0), CameraInfo::new(3)]);
        assert_eq!(cameras[1].name, "Camera 3");
    }

    #[test]
    fn probe_tries_every_index_in_range() {
        let mut tried = Vec::new();
        let cameras = probe_with(10, |index| {
            tried.push(index);
            false
        });

        assert!(cameras.is_empty());
        assert_eq!(tried, (0..10).collect::<Vec<_>>());
    }
}
