use anyhow::Result;
use image::{DynamicImage, GrayImage, RgbImage};

/// Alpha matte: 0 = background, 255 = foreground
/// Dimensions match the input frame dimensions
pub type Matte = GrayImage;

/// Trait for background-removal models
pub trait SegmentationModel {
    /// Process a frame and return its alpha matte
    fn segment(&mut self, frame: &RgbImage) -> Result<Matte>;

    /// Get the model's input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);

    /// Remove the background of `frame`
    ///
    /// The result is the frame with the matte as its alpha channel. Callers
    /// must still handle images without alpha, since not every model hands
    /// one back.
    fn remove_background(&mut self, frame: &RgbImage) -> Result<DynamicImage> {
        let matte = self.segment(frame)?;
        Ok(DynamicImage::ImageRgba8(super::cutout(frame, &matte)))
    }
}
