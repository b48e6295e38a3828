//! Alpha mask construction: polygon rasterization, feathering, and
//! color-similarity refinement.
//!
//! The simplified contour is rasterized with an even-odd scanline fill,
//! softened with a Gaussian feather so boundaries grade smoothly, and
//! then refined: uncertain edge pixels whose color matches the sampled
//! foreground get an alpha boost. A degenerate contour (fewer than 3
//! points) falls back to a fully opaque mask so the pipeline can keep
//! going at reduced quality.
//!
//! The output mask always has exactly the pixel bounds' dimensions.

use image::{GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;

use crate::types::{
    CancelToken, ContourPath, ExtractionConfig, ExtractionError, PixelBounds, RgbaImage,
};

/// Alpha above which a pixel counts as confident interior.
const CONFIDENT_ALPHA: u8 = 200;
/// Alpha at or below which a pixel is not worth refining.
const UNCERTAIN_FLOOR: u8 = 30;
/// Alpha boost applied to color-matched edge pixels.
const ALPHA_BOOST: u8 = 50;

/// Result of mask construction.
#[derive(Debug, Clone)]
pub struct MaskBuild {
    /// The alpha mask; dimensions equal the pixel bounds.
    pub mask: GrayImage,
    /// Whether the opaque fallback was used (degenerate contour).
    pub fallback: bool,
    /// How many edge pixels the color refinement boosted.
    pub boosted_pixels: u64,
}

/// Build the alpha mask for the resolved bounds from the traced contour.
///
/// # Errors
///
/// Returns [`ExtractionError::Cancelled`] if the token is cancelled
/// between pixel rows.
pub fn build(
    path: &ContourPath,
    bounds: PixelBounds,
    image: &RgbaImage,
    config: &ExtractionConfig,
    token: &CancelToken,
) -> Result<MaskBuild, ExtractionError> {
    if path.len() < 3 {
        // Not enough points for a polygon: keep everything.
        let mask = GrayImage::from_pixel(bounds.width, bounds.height, Luma([255]));
        return Ok(MaskBuild {
            mask,
            fallback: true,
            boosted_pixels: 0,
        });
    }

    let mut mask = rasterize(path, bounds, token)?;

    if config.feather_sigma > 0.0 {
        mask = gaussian_blur_f32(&mask, config.feather_sigma);
    }

    let boosted_pixels = refine_by_color(&mut mask, bounds, image, config, token)?;

    Ok(MaskBuild {
        mask,
        fallback: false,
        boosted_pixels,
    })
}

/// Even-odd scanline fill of the contour polygon into a binary mask.
///
/// For each row, the x-intersections of the polygon edges with the row
/// center are collected, sorted, and filled in successive pairs.
fn rasterize(
    path: &ContourPath,
    bounds: PixelBounds,
    token: &CancelToken,
) -> Result<GrayImage, ExtractionError> {
    let mut mask = GrayImage::new(bounds.width, bounds.height);
    let points = path.points();
    let n = points.len();

    let mut intersections: Vec<f64> = Vec::with_capacity(8);
    for ly in 0..bounds.height {
        token.ensure_live()?;
        let yc = f64::from(bounds.y + ly) + 0.5;

        intersections.clear();
        for i in 0..n {
            let a = points[i].point;
            let b = points[(i + 1) % n].point;
            if (a.y <= yc && b.y > yc) || (b.y <= yc && a.y > yc) {
                let t = (yc - a.y) / (b.y - a.y);
                intersections.push(t.mul_add(b.x - a.x, a.x));
            }
        }
        intersections.sort_unstable_by(f64::total_cmp);

        for pair in intersections.chunks_exact(2) {
            let start = pair[0] - f64::from(bounds.x);
            let end = pair[1] - f64::from(bounds.x);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let lx0 = start.ceil().max(0.0) as u32;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let lx1 = (end.floor().max(-1.0) + 1.0).min(f64::from(bounds.width)) as u32;
            for lx in lx0..lx1 {
                mask.put_pixel(lx, ly, Luma([255]));
            }
        }
    }
    Ok(mask)
}

/// Boost uncertain edge alphas whose source color matches the sampled
/// foreground color.
///
/// The foreground color is the mean RGB over a sparse grid of confident
/// interior pixels. Pixels with alpha strictly between the uncertain
/// floor and the confident level, and within the configured Euclidean
/// RGB distance of that mean, gain [`ALPHA_BOOST`].
fn refine_by_color(
    mask: &mut GrayImage,
    bounds: PixelBounds,
    image: &RgbaImage,
    config: &ExtractionConfig,
    token: &CancelToken,
) -> Result<u64, ExtractionError> {
    let stride = config.sample_stride.max(1);

    let mut sum = [0u64; 3];
    let mut samples = 0u64;
    let mut ly = 0;
    while ly < bounds.height {
        token.ensure_live()?;
        let mut lx = 0;
        while lx < bounds.width {
            if mask.get_pixel(lx, ly).0[0] > CONFIDENT_ALPHA {
                let p = image.get_pixel(bounds.x + lx, bounds.y + ly).0;
                sum[0] += u64::from(p[0]);
                sum[1] += u64::from(p[1]);
                sum[2] += u64::from(p[2]);
                samples += 1;
            }
            lx += stride;
        }
        ly += stride;
    }
    if samples == 0 {
        return Ok(0);
    }
    #[allow(clippy::cast_precision_loss)]
    let foreground = [
        sum[0] as f64 / samples as f64,
        sum[1] as f64 / samples as f64,
        sum[2] as f64 / samples as f64,
    ];

    let mut boosted = 0u64;
    for ly in 0..bounds.height {
        token.ensure_live()?;
        for lx in 0..bounds.width {
            let alpha = mask.get_pixel(lx, ly).0[0];
            if alpha <= UNCERTAIN_FLOOR || alpha >= CONFIDENT_ALPHA {
                continue;
            }
            let p = image.get_pixel(bounds.x + lx, bounds.y + ly).0;
            let dr = f64::from(p[0]) - foreground[0];
            let dg = f64::from(p[1]) - foreground[1];
            let db = f64::from(p[2]) - foreground[2];
            let distance = dr.mul_add(dr, dg.mul_add(dg, db * db)).sqrt();
            if distance < config.color_similarity {
                mask.put_pixel(lx, ly, Luma([alpha.saturating_add(ALPHA_BOOST)]));
                boosted += 1;
            }
        }
    }
    Ok(boosted)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{ContourPoint, Point, PointClass};

    const BOUNDS: PixelBounds = PixelBounds {
        x: 10,
        y: 10,
        width: 40,
        height: 40,
    };

    /// Square contour in global coordinates, inset within BOUNDS.
    fn square_path(x0: f64, y0: f64, x1: f64, y1: f64) -> ContourPath {
        let corners = [(x0, y0), (x1, y0), (x1, y1), (x0, y1)];
        ContourPath::new(
            corners
                .iter()
                .map(|&(x, y)| ContourPoint {
                    point: Point::new(x, y),
                    class: PointClass::Corner,
                })
                .collect(),
        )
    }

    fn flat_image() -> RgbaImage {
        RgbaImage::from_pixel(100, 100, image::Rgba([80, 120, 160, 255]))
    }

    fn no_feather_config() -> ExtractionConfig {
        ExtractionConfig {
            feather_sigma: 0.0,
            ..ExtractionConfig::default()
        }
    }

    #[test]
    fn degenerate_contour_fills_opaque() {
        let path = ContourPath::new(vec![
            ContourPoint {
                point: Point::new(15.0, 15.0),
                class: PointClass::Endpoint,
            },
            ContourPoint {
                point: Point::new(30.0, 30.0),
                class: PointClass::Endpoint,
            },
        ]);
        let built = build(
            &path,
            BOUNDS,
            &flat_image(),
            &ExtractionConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert!(built.fallback);
        assert_eq!(built.mask.width(), BOUNDS.width);
        assert_eq!(built.mask.height(), BOUNDS.height);
        assert!(built.mask.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn square_contour_fills_interior_only() {
        let path = square_path(20.0, 20.0, 40.0, 40.0);
        let built = build(
            &path,
            BOUNDS,
            &flat_image(),
            &no_feather_config(),
            &CancelToken::new(),
        )
        .unwrap();
        assert!(!built.fallback);
        // Interior of the square (global 30,30 -> local 20,20).
        assert_eq!(built.mask.get_pixel(20, 20).0[0], 255);
        // Well outside the square (global 12,12 -> local 2,2).
        assert_eq!(built.mask.get_pixel(2, 2).0[0], 0);
    }

    #[test]
    fn feathering_grades_the_boundary() {
        let path = square_path(20.0, 20.0, 40.0, 40.0);
        let built = build(
            &path,
            BOUNDS,
            &flat_image(),
            &ExtractionConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();
        let partial = built
            .mask
            .pixels()
            .filter(|p| p.0[0] > 0 && p.0[0] < 255)
            .count();
        assert!(partial > 0, "expected graded alpha at the boundary");
    }

    #[test]
    fn uniform_image_boosts_matching_edge_pixels() {
        // On a flat-colored image every uncertain edge pixel matches the
        // interior color exactly, so refinement fires.
        let path = square_path(20.0, 20.0, 40.0, 40.0);
        let built = build(
            &path,
            BOUNDS,
            &flat_image(),
            &ExtractionConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert!(built.boosted_pixels > 0);
    }

    #[test]
    fn mask_dimensions_always_match_bounds() {
        for path in [
            ContourPath::new(Vec::new()),
            square_path(20.0, 20.0, 40.0, 40.0),
        ] {
            let built = build(
                &path,
                BOUNDS,
                &flat_image(),
                &ExtractionConfig::default(),
                &CancelToken::new(),
            )
            .unwrap();
            assert_eq!(built.mask.dimensions(), (BOUNDS.width, BOUNDS.height));
        }
    }

    #[test]
    fn cancelled_token_aborts() {
        let token = CancelToken::new();
        token.cancel();
        let result = build(
            &square_path(20.0, 20.0, 40.0, 40.0),
            BOUNDS,
            &flat_image(),
            &ExtractionConfig::default(),
            &token,
        );
        assert!(matches!(result, Err(ExtractionError::Cancelled)));
    }
}
