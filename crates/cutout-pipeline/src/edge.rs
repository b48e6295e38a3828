//! Multi-stage edge detection over the padded ROI.
//!
//! Gaussian blur, Sobel gradients, non-maximum suppression, and a
//! two-threshold hysteresis pass, producing a raster where 255 marks an
//! edge pixel. The structure follows the classic Canny decomposition;
//! hysteresis here is a scan-and-rescan promotion rather than a BFS
//! flood, so weak pixels promote only when 8-connected to a strong
//! pixel in the first pass or the re-scan.
//!
//! Deterministic for identical input; no randomness anywhere.

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::filter::{filter_clamped, gaussian_blur_f32};
use imageproc::kernel;

use crate::types::{CancelToken, ExtractionError};

/// Raster value for a non-edge pixel.
pub const EDGE_NONE: u8 = 0;
/// Raster value for a weak edge awaiting promotion. Never present in
/// the detector's output; exists only between the hysteresis passes.
pub const EDGE_WEAK: u8 = 128;
/// Raster value written by the contour tracer's gap-fill preprocessing.
pub const EDGE_GAP: u8 = 200;
/// Raster value for a confirmed edge pixel.
pub const EDGE_STRONG: u8 = 255;

/// The four principal gradient orientations used by non-maximum
/// suppression.
#[derive(Clone, Copy)]
enum Orientation {
    Horizontal,
    Diagonal45,
    Vertical,
    Diagonal135,
}

/// Detect edges in the ROI luminance raster.
///
/// `low`/`high` are the hysteresis thresholds on gradient magnitude;
/// `low` is clamped to at most `high`. A non-positive `sigma` skips the
/// blur, mirroring the underlying filter's contract.
///
/// # Errors
///
/// Returns [`ExtractionError::Cancelled`] if the token is cancelled
/// between pixel rows.
pub fn detect(
    luma: &GrayImage,
    sigma: f32,
    low: f32,
    high: f32,
    token: &CancelToken,
) -> Result<GrayImage, ExtractionError> {
    let (w, h) = (luma.width(), luma.height());
    if w < 3 || h < 3 {
        // Too small for a 3x3 gradient; nothing to detect.
        return Ok(GrayImage::new(w, h));
    }
    let low = low.min(high);

    // 1. Noise suppression.
    let blurred = if sigma > 0.0 {
        gaussian_blur_f32(luma, sigma)
    } else {
        luma.clone()
    };

    // 2. Sobel gradients and magnitude.
    let gx: Image<Luma<i16>> = filter_clamped(&blurred, kernel::SOBEL_HORIZONTAL_3X3);
    let gy: Image<Luma<i16>> = filter_clamped(&blurred, kernel::SOBEL_VERTICAL_3X3);
    let mut magnitude: Image<Luma<f32>> = Image::from_pixel(w, h, Luma([0.0]));
    for y in 0..h {
        token.ensure_live()?;
        for x in 0..w {
            let gh = f32::from(gx.get_pixel(x, y).0[0]);
            let gv = f32::from(gy.get_pixel(x, y).0[0]);
            magnitude.put_pixel(x, y, Luma([gh.hypot(gv)]));
        }
    }

    // 3. Non-maximum suppression along the gradient direction.
    let thinned = non_maximum_suppression(&magnitude, &gx, &gy, token)?;

    // 4. Hysteresis thresholding.
    hysteresis(&thinned, low, high, token)
}

/// Keep a pixel only if its magnitude is a local maximum along the
/// perpendicular of its bucketed gradient orientation.
fn non_maximum_suppression(
    magnitude: &Image<Luma<f32>>,
    gx: &Image<Luma<i16>>,
    gy: &Image<Luma<i16>>,
    token: &CancelToken,
) -> Result<Image<Luma<f32>>, ExtractionError> {
    const RADIANS_TO_DEGREES: f32 = 180.0 / std::f32::consts::PI;
    let (w, h) = (magnitude.width(), magnitude.height());
    let mut out = Image::from_pixel(w, h, Luma([0.0]));
    for y in 1..h - 1 {
        token.ensure_live()?;
        for x in 1..w - 1 {
            let x_gradient = f32::from(gx.get_pixel(x, y).0[0]);
            let y_gradient = f32::from(gy.get_pixel(x, y).0[0]);
            let mut angle = y_gradient.atan2(x_gradient) * RADIANS_TO_DEGREES;
            if angle < 0.0 {
                angle += 180.0;
            }
            let orientation = if (22.5..67.5).contains(&angle) {
                Orientation::Diagonal45
            } else if (67.5..112.5).contains(&angle) {
                Orientation::Vertical
            } else if (112.5..157.5).contains(&angle) {
                Orientation::Diagonal135
            } else {
                Orientation::Horizontal
            };

            let (cmp1, cmp2) = match orientation {
                Orientation::Horizontal => {
                    (magnitude.get_pixel(x - 1, y), magnitude.get_pixel(x + 1, y))
                }
                Orientation::Diagonal45 => (
                    magnitude.get_pixel(x + 1, y + 1),
                    magnitude.get_pixel(x - 1, y - 1),
                ),
                Orientation::Vertical => {
                    (magnitude.get_pixel(x, y - 1), magnitude.get_pixel(x, y + 1))
                }
                Orientation::Diagonal135 => (
                    magnitude.get_pixel(x - 1, y + 1),
                    magnitude.get_pixel(x + 1, y - 1),
                ),
            };
            let pixel = *magnitude.get_pixel(x, y);
            if pixel.0[0] >= cmp1.0[0] && pixel.0[0] >= cmp2.0[0] {
                out.put_pixel(x, y, pixel);
            }
        }
    }
    Ok(out)
}

/// Classify thinned magnitudes as strong or weak, promote weak pixels
/// 8-connected to strong ones (one pass plus a re-scan), and zero the
/// rest.
fn hysteresis(
    thinned: &Image<Luma<f32>>,
    low: f32,
    high: f32,
    token: &CancelToken,
) -> Result<GrayImage, ExtractionError> {
    let (w, h) = (thinned.width(), thinned.height());
    let mut raster = GrayImage::new(w, h);
    for y in 0..h {
        token.ensure_live()?;
        for x in 0..w {
            let m = thinned.get_pixel(x, y).0[0];
            if m >= high {
                raster.put_pixel(x, y, Luma([EDGE_STRONG]));
            } else if m >= low {
                raster.put_pixel(x, y, Luma([EDGE_WEAK]));
            }
        }
    }

    for _pass in 0..2 {
        let mut promoted = false;
        for y in 0..h {
            token.ensure_live()?;
            for x in 0..w {
                if raster.get_pixel(x, y).0[0] == EDGE_WEAK
                    && has_strong_neighbor(&raster, x, y)
                {
                    raster.put_pixel(x, y, Luma([EDGE_STRONG]));
                    promoted = true;
                }
            }
        }
        if !promoted {
            break;
        }
    }

    for p in raster.pixels_mut() {
        if p.0[0] == EDGE_WEAK {
            p.0[0] = EDGE_NONE;
        }
    }
    Ok(raster)
}

/// Whether any of the 8 neighbors of `(x, y)` is a strong edge.
fn has_strong_neighbor(raster: &GrayImage, x: u32, y: u32) -> bool {
    let (w, h) = (raster.width(), raster.height());
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = i64::from(x) + dx;
            let ny = i64::from(y) + dy;
            if nx < 0 || ny < 0 || nx >= i64::from(w) || ny >= i64::from(h) {
                continue;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            if raster.get_pixel(nx as u32, ny as u32).0[0] == EDGE_STRONG {
                return true;
            }
        }
    }
    false
}
