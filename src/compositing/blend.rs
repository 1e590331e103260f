use anyhow::{ensure, Result};
use image::{Rgb, RgbImage, RgbaImage};

/// Blend one channel: `alpha * fg + (1 - alpha) * bg`
///
/// Each term is truncated to 8 bits before the saturating sum, so the result
/// is always a valid byte for `alpha` in [0, 1].
#[inline]
pub fn blend_channel(fg: u8, bg: u8, alpha: f32) -> u8 {
    let fg_part = (alpha * fg as f32) as u8;
    let bg_part = ((1.0 - alpha) * bg as f32) as u8;
    fg_part.saturating_add(bg_part)
}

/// Composite the cutout's colour over `background` using its alpha channel
pub fn blend(foreground: &RgbaImage, background: &RgbImage) -> Result<RgbImage> {
    ensure!(
        foreground.dimensions() == background.dimensions(),
        "Foreground is {:?} but background is {:?}",
        foreground.dimensions(),
        background.dimensions()
    );

    let _span = tracing::debug_span!("blend").entered();

    let mut output = RgbImage::new(foreground.width(), foreground.height());
    for ((out, fg), bg) in output
        .pixels_mut()
        .zip(foreground.pixels())
        .zip(background.pixels())
    {
        let alpha = fg[3] as f32 / 255.0;
        *out = Rgb([
            blend_channel(fg[0], bg[0], alpha),
            blend_channel(fg[1], bg[1], alpha),
            blend_channel(fg[2], bg[2], alpha),
        ]);
    }

    Ok(output)
}
