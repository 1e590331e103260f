mod background;
mod blend;
mod blur;

pub use background::BackgroundCache;
pub use blend::blend;
pub use blur::{blur, BlurLevel};

use image::{DynamicImage, RgbImage};
use std::path::PathBuf;

/// User choices that shape the composite, shared between UI and worker
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompositeSettings {
    pub background: Option<PathBuf>,
    pub blur: BlurLevel,
}

impl CompositeSettings {
    /// Selected background, if it names an existing file
    pub fn valid_background(&self) -> Option<&PathBuf> {
        self.background
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty() && path.is_file())
    }
}

/// Puts the model's cutout over the selected background
#[derive(Default)]
pub struct Compositor {
    cache: BackgroundCache,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composite one frame
    ///
    /// Falls back to the raw `frame` when no valid background is selected,
    /// when the background cannot be decoded, or when `cutout` carries no
    /// alpha channel.
    pub fn composite(
        &mut self,
        frame: &RgbImage,
        cutout: &DynamicImage,
        settings: &CompositeSettings,
    ) -> RgbImage {
        let _span = tracing::debug_span!("composite").entered();

        let Some(path) = settings.valid_background() else {
            return frame.clone();
        };

        let Some(foreground) = cutout.as_rgba8() else {
            tracing::debug!("Model output has no alpha channel, passing frame through");
            return frame.clone();
        };

        let Some(background) = self.cache.get(path, frame.dimensions(), settings.blur) else {
            return frame.clone();
        };

        match blend(foreground, background) {
            Ok(composited) => composited,
            Err(e) => {
                tracing::warn!("Blend failed, passing frame through: {}", e);
                frame.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbaImage};
    use std::path::Path;

    fn frame() -> RgbImage {
        RgbImage::from_fn(4, 4, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 77]))
    }

    fn half_cutout(frame: &RgbImage) -> DynamicImage {
        let width = frame.width();
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, frame.height(), |x, y| {
            let [r, g, b] = frame.get_pixel(x, y).0;
            Rgba([r, g, b, if x < width / 2 { 255 } else { 0 }])
        }))
    }

    fn background_file(dir: &Path) -> PathBuf {
        let path = dir.join("beach.png");
        RgbImage::from_pixel(4, 4, Rgb([200, 150, 100]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn no_background_passes_frame_through() {
        let frame = frame();
        let mut compositor = Compositor::new();

        let out = compositor.composite(&frame, &half_cutout(&frame), &CompositeSettings::default());

        assert_eq!(out, frame);
    }

    #[test]
    fn empty_or_missing_path_passes_frame_through() {
        let frame = frame();
        let mut compositor = Compositor::new();

        for path in ["", "no/such/background.png"] {
            let settings = CompositeSettings {
                background: Some(PathBuf::from(path)),
                blur: BlurLevel::NONE,
            };
            assert_eq!(compositor.composite(&frame, &half_cutout(&frame), &settings), frame);
        }
    }

    #[test]
    fn unreadable_background_passes_frame_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.jpg");
        std::fs::write(&path, b"\xff\xd8 not really a jpeg").unwrap();
        let frame = frame();
        let settings = CompositeSettings {
            background: Some(path),
            blur: BlurLevel::new(3).unwrap(),
        };

        let out = Compositor::new().composite(&frame, &half_cutout(&frame), &settings);

        assert_eq!(out, frame);
    }

    #[test]
    fn cutout_without_alpha_passes_frame_through() {
        let dir = tempfile::tempdir().unwrap();
        let frame = frame();
        let settings = CompositeSettings {
            background: Some(background_file(dir.path())),
            blur: BlurLevel::NONE,
        };

        let rgb_only = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let out = Compositor::new().composite(&frame, &rgb_only, &settings);

        assert_eq!(out, frame);
    }

    #[test]
    fn subject_kept_and_background_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let frame = frame();
        let settings = CompositeSettings {
            background: Some(background_file(dir.path())),
            blur: BlurLevel::NONE,
        };

        let out = Compositor::new().composite(&frame, &half_cutout(&frame), &settings);

        assert_eq!(out.get_pixel(0, 2), frame.get_pixel(0, 2));
        assert_eq!(out.get_pixel(1, 3), frame.get_pixel(1, 3));
        assert_eq!(out.get_pixel(2, 0), &Rgb([200, 150, 100]));
        assert_eq!(out.get_pixel(3, 3), &Rgb([200, 150, 100]));
    }
}
