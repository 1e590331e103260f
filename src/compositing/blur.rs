use image::RgbImage;
use imageproc::filter::separable_filter_equal;
use std::fmt;

/// Background blur strength offered in the UI
///
/// Level `n` blurs with a `2n+1` Gaussian kernel; level 0 leaves the
/// background untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BlurLevel(u8);

impl BlurLevel {
    pub const MAX: u8 = 5;
    pub const NONE: BlurLevel = BlurLevel(0);

    /// Every selectable level, in dropdown order
    pub const ALL: [BlurLevel; 6] = [
        BlurLevel(0),
        BlurLevel(1),
        BlurLevel(2),
        BlurLevel(3),
        BlurLevel(4),
        BlurLevel(5),
    ];

    /// Returns `None` for levels above [`BlurLevel::MAX`]
    pub fn new(level: u8) -> Option<Self> {
        (level <= Self::MAX).then_some(Self(level))
    }

    /// Side of the Gaussian kernel, or `None` when no blur is applied
    pub fn kernel_size(self) -> Option<u32> {
        (self.0 > 0).then(|| 2 * self.0 as u32 + 1)
    }
}

impl fmt::Display for BlurLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => f.write_str("No Blur"),
            n => write!(f, "{n}"),
        }
    }
}

/// Normalized 1-D Gaussian kernel of odd length `size`
///
/// Sigma follows the usual convention for an unspecified sigma:
/// `0.3 * ((size - 1) / 2 - 1) + 0.8`.
pub fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f32;

    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();

    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Blur `image` at `level`; level 0 returns `None` and does no work
pub fn blur(image: &RgbImage, level: BlurLevel) -> Option<RgbImage> {
    let size = level.kernel_size()?;
    let _span = tracing::debug_span!("blur", size).entered();

    let kernel = gaussian_kernel(size);
    Some(separable_filter_equal(image, &kernel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn kernel_sizes_match_dropdown() {
        let sizes: Vec<Option<u32>> = BlurLevel::ALL.iter().map(|l| l.kernel_size()).collect();

        assert_eq!(
            sizes,
            vec![None, Some(3), Some(5), Some(7), Some(9), Some(11)]
        );
    }

    #[test]
    fn kernel_size_is_odd_and_two_level_plus_one() {
        for level in BlurLevel::ALL.into_iter().skip(1) {
            let size = level.kernel_size().unwrap();
            assert_eq!(size % 2, 1);
            assert_eq!(size, 2 * level.0 as u32 + 1);
        }
    }

    #[test]
    fn labels_match_dropdown() {
        let labels: Vec<String> = BlurLevel::ALL.iter().map(|l| l.to_string()).collect();

        assert_eq!(labels, ["No Blur", "1", "2", "3", "4", "5"]);
    }

    #[test]
    fn level_out_of_range_is_rejected() {
        assert_eq!(BlurLevel::new(5), Some(BlurLevel(5)));
        assert_eq!(BlurLevel::new(6), None);
    }

    #[test]
    fn gaussian_kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(7);

        assert_eq!(kernel.len(), 7);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((kernel[0] - kernel[6]).abs() < 1e-7);
        assert!(kernel[3] > kernel[2]);
    }

    #[test]
    fn no_blur_is_identity() {
        let image = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));

        assert!(blur(&image, BlurLevel::NONE).is_none());
    }

    #[test]
    fn blur_softens_a_hard_edge() {
        let image = RgbImage::from_fn(9, 1, |x, _| {
            if x < 4 {
                Rgb([0, 0, 0])
            } else {
                Rgb([200, 200, 200])
            }
        });

        let blurred = blur(&image, BlurLevel::new(2).unwrap()).unwrap();

        assert_eq!(blurred.dimensions(), (9, 1));
        let edge = blurred.get_pixel(4, 0)[0];
        assert!(edge > 0 && edge < 200, "edge value {edge}");
        assert_eq!(blurred.get_pixel(0, 0)[0], 0);
    }
}
