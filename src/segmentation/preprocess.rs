use super::types::Matte;
use anyhow::{bail, Result};
use image::{imageops, GrayImage, RgbImage};
use ndarray::Array4;

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Converts frames to U²-Net input tensors and model output back to mattes
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Scale by the brightest sample so values land in [0, 1]
    /// 3. Apply ImageNet mean/std per channel
    /// 4. Transpose from HWC to NCHW
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Lanczos3,
            )
        } else {
            image.clone()
        };

        let max = resized.as_raw().iter().copied().max().unwrap_or(0);
        let scale = (max as f32).max(1e-6);

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32 / scale;
                tensor[[0, c, y as usize, x as usize]] = (value - MEAN[c]) / STD[c];
            }
        }

        tensor
    }

    /// Turn the model's raw prediction into a matte at frame resolution
    ///
    /// `prediction` is the first channel of the output, row-major at
    /// `width`x`height`. It is min-max normalized before resizing, so a flat
    /// prediction yields an all-background matte.
    pub fn postprocess(
        prediction: &[f32],
        width: u32,
        height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<Matte> {
        let _span = tracing::debug_span!("postprocess").entered();

        let expected = (width * height) as usize;
        if prediction.len() < expected {
            bail!(
                "Prediction has {} values, expected {}x{}",
                prediction.len(),
                width,
                height
            );
        }
        let prediction = &prediction[..expected];

        let (min, max) = prediction
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        let raw: Vec<u8> = prediction
            .iter()
            .map(|&v| {
                if range > f32::EPSILON {
                    ((v - min) / range * 255.0) as u8
                } else {
                    0
                }
            })
            .collect();

        let Some(matte) = GrayImage::from_raw(width, height, raw) else {
            bail!("Failed to build {}x{} matte", width, height);
        };

        if (width, height) == (target_width, target_height) {
            return Ok(matte);
        }

        Ok(imageops::resize(
            &matte,
            target_width,
            target_height,
            imageops::FilterType::Lanczos3,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn preprocess_produces_nchw_tensor_of_target_size() {
        let pre = Preprocessor::new(8, 4);
        let frame = RgbImage::from_pixel(16, 16, Rgb([10, 20, 30]));

        let tensor = pre.preprocess(&frame);

        assert_eq!(tensor.shape(), &[1, 3, 4, 8]);
    }

    #[test]
    fn preprocess_scales_by_brightest_sample() {
        let pre = Preprocessor::new(2, 2);
        let frame = RgbImage::from_pixel(2, 2, Rgb([100, 50, 0]));

        let tensor = pre.preprocess(&frame);

        let red = tensor[[0, 0, 0, 0]];
        let blue = tensor[[0, 2, 1, 1]];
        assert!((red - (1.0 - MEAN[0]) / STD[0]).abs() < 1e-5);
        assert!((blue - (0.0 - MEAN[2]) / STD[2]).abs() < 1e-5);
    }

    #[test]
    fn postprocess_normalizes_to_full_range() {
        let prediction = [0.2, 0.4, 0.6, 0.2];

        let matte = Preprocessor::postprocess(&prediction, 2, 2, 2, 2).unwrap();

        assert_eq!(matte.get_pixel(0, 0)[0], 0);
        assert_eq!(matte.get_pixel(0, 1)[0], 255);
        assert_eq!(matte.get_pixel(1, 1)[0], 0);
    }

    #[test]
    fn postprocess_flat_prediction_is_background() {
        let prediction = [0.7; 9];

        let matte = Preprocessor::postprocess(&prediction, 3, 3, 6, 6).unwrap();

        assert_eq!(matte.dimensions(), (6, 6));
        assert!(matte.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn postprocess_rejects_short_prediction() {
        assert!(Preprocessor::postprocess(&[0.0; 3], 2, 2, 2, 2).is_err());
    }
}
