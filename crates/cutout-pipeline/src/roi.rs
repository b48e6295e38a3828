//! Region-of-interest windowing and luminance extraction.
//!
//! Edge detection operates on a padded window around the resolved pixel
//! bounds rather than the bare bounds: the padding gives the gradient
//! and hysteresis passes context beyond the object so boundaries that
//! touch the box edge still resolve. The window is clamped to the image,
//! so the effective padding shrinks near image borders.

use image::GrayImage;

use crate::types::{Dimensions, ExtractionError, PixelBounds, RgbaImage};

/// A padded working window, in global image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiWindow {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl RoiWindow {
    /// Build the window around `bounds`, expanded by `padding` on every
    /// side and clamped to the image.
    #[must_use]
    pub fn around(bounds: PixelBounds, padding: u32, dims: Dimensions) -> Self {
        let x = bounds.x.saturating_sub(padding);
        let y = bounds.y.saturating_sub(padding);
        let right = bounds.right().saturating_add(padding).min(dims.width);
        let bottom = bounds.bottom().saturating_add(padding).min(dims.height);
        Self {
            x,
            y,
            width: right.saturating_sub(x),
            height: bottom.saturating_sub(y),
        }
    }

    /// One past the right edge.
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// One past the bottom edge.
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Extract the window's luminance channel from the source image.
///
/// Luminance is the plain mean of R, G and B; the gradient stage wants
/// equal channel weighting, not perceptual weighting.
///
/// # Errors
///
/// Returns [`ExtractionError::RegionExtraction`] if the window reaches
/// outside the source buffer. This aborts the invocation: a window that
/// does not fit means the bounds and the image disagree.
pub fn extract_luminance(
    image: &RgbaImage,
    window: RoiWindow,
) -> Result<GrayImage, ExtractionError> {
    if window.right() > image.width() || window.bottom() > image.height() {
        return Err(ExtractionError::RegionExtraction {
            x: window.right().saturating_sub(1),
            y: window.bottom().saturating_sub(1),
        });
    }

    let mut out = GrayImage::new(window.width, window.height);
    for ly in 0..window.height {
        for lx in 0..window.width {
            let p = image.get_pixel(window.x + lx, window.y + ly).0;
            let mean = (u16::from(p[0]) + u16::from(p[1]) + u16::from(p[2])) / 3;
            #[allow(clippy::cast_possible_truncation)]
            out.put_pixel(lx, ly, image::Luma([mean as u8]));
        }
    }
    Ok(out)
}
