mod preprocess;
mod types;
mod u2net;

pub use types::{Matte, SegmentationModel};
pub use u2net::{U2Net, DEFAULT_INPUT_SIZE};

use anyhow::Result;
use image::{Rgba, RgbImage, RgbaImage};
use std::path::Path;

/// Load the default background-removal model (U²-Net)
pub fn load_model(model_path: &Path, input_size: u32) -> Result<Box<dyn SegmentationModel>> {
    let model = U2Net::new(model_path, input_size)?;
    let (width, height) = model.input_size();
    tracing::info!("Segmentation model ready ({}x{} input)", width, height);
    Ok(Box::new(model))
}

/// Attach `matte` to `frame` as its alpha channel
///
/// Colour channels are left untouched (straight alpha).
pub fn cutout(frame: &RgbImage, matte: &Matte) -> RgbaImage {
    RgbaImage::from_fn(frame.width(), frame.height(), |x, y| {
        let [r, g, b] = frame.get_pixel(x, y).0;
        let alpha = matte.get_pixel_checked(x, y).map_or(0, |p| p[0]);
        Rgba([r, g, b, alpha])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma, Rgb};

    struct HalfMatte;

    impl SegmentationModel for HalfMatte {
        fn segment(&mut self, frame: &RgbImage) -> Result<Matte> {
            let width = frame.width();
            Ok(GrayImage::from_fn(width, frame.height(), |x, _| {
                Luma([if x < width / 2 { 255 } else { 0 }])
            }))
        }

        fn input_size(&self) -> (u32, u32) {
            (4, 4)
        }
    }

    #[test]
    fn cutout_keeps_colour_and_uses_matte_as_alpha() {
        let frame = RgbImage::from_pixel(2, 1, Rgb([1, 2, 3]));
        let matte = GrayImage::from_raw(2, 1, vec![255, 40]).unwrap();

        let rgba = cutout(&frame, &matte);

        assert_eq!(rgba.get_pixel(0, 0), &Rgba([1, 2, 3, 255]));
        assert_eq!(rgba.get_pixel(1, 0), &Rgba([1, 2, 3, 40]));
    }

    #[test]
    fn remove_background_returns_rgba_cutout() {
        let frame = RgbImage::from_pixel(4, 2, Rgb([9, 9, 9]));

        let removed = HalfMatte.remove_background(&frame).unwrap();

        let DynamicImage::ImageRgba8(rgba) = removed else {
            panic!("expected an RGBA cutout");
        };
        assert_eq!(rgba.get_pixel(0, 1)[3], 255);
        assert_eq!(rgba.get_pixel(3, 1)[3], 0);
    }

    #[test]
    fn load_model_reports_missing_file() {
        let err = load_model(Path::new("does/not/exist.onnx"), DEFAULT_INPUT_SIZE)
            .err()
            .unwrap();

        assert!(err.to_string().contains("not found"));
    }
}
