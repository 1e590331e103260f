use super::blur::{blur, BlurLevel};
use image::{imageops, RgbImage};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq)]
struct Key {
    path: PathBuf,
    size: (u32, u32),
    blur: BlurLevel,
}

/// Prepared background for the current (path, frame size, blur) selection
///
/// The file is decoded, resized and blurred once per selection. A file that
/// fails to decode is remembered too, so it is reported once rather than on
/// every frame.
#[derive(Default)]
pub struct BackgroundCache {
    key: Option<Key>,
    image: Option<RgbImage>,
}

impl BackgroundCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Background ready to blend at `size`, or `None` if it cannot be read
    pub fn get(&mut self, path: &Path, size: (u32, u32), blur: BlurLevel) -> Option<&RgbImage> {
        let key = Key {
            path: path.to_path_buf(),
            size,
            blur,
        };

        if self.key.as_ref() != Some(&key) {
            self.image = prepare(path, size, blur);
            self.key = Some(key);
        }

        self.image.as_ref()
    }
}

/// Load `path`, resize it to `size` and apply `blur`
pub fn prepare(path: &Path, (width, height): (u32, u32), level: BlurLevel) -> Option<RgbImage> {
    let _span = tracing::debug_span!("prepare_background").entered();

    let decoded = match image::open(path) {
        Ok(image) => image.to_rgb8(),
        Err(e) => {
            tracing::warn!("Could not read background image '{}': {}", path.display(), e);
            return None;
        }
    };

    let resized = if decoded.dimensions() == (width, height) {
        decoded
    } else {
        imageops::resize(&decoded, width, height, imageops::FilterType::Triangle)
    };

    tracing::info!(
        "Background '{}' prepared at {}x{} (blur: {})",
        path.display(),
        width,
        height,
        level
    );

    Some(blur(&resized, level).unwrap_or(resized))
}
