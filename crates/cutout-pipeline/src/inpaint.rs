//! Background completion: fill the excised region with plausible
//! content sampled from its surroundings.
//!
//! No generative model here. The surrounding context is clustered into
//! a handful of dominant colors; each fill pixel blends a local patch
//! average with the nearest dominant color, weighted by how strongly
//! the mask says the pixel belonged to the object. The filled region is
//! composited into a copy of the source, so every pixel outside the
//! bounds stays byte-identical.

use image::GrayImage;

use crate::types::{CancelToken, ExtractionConfig, ExtractionError, PixelBounds, RgbaImage};

/// Mask alpha below which a pixel is filled at full strength.
const FILL_FULL_BELOW: u8 = 50;
/// Mask alpha at or above which a pixel is left alone.
const FILL_NONE_FROM: u8 = 200;

/// A running color cluster: component sums and a sample count.
#[derive(Debug, Clone, Copy)]
struct Cluster {
    sum: [f64; 3],
    count: f64,
}

impl Cluster {
    const fn seed(color: [f64; 3]) -> Self {
        Self {
            sum: color,
            count: 1.0,
        }
    }

    fn mean(&self) -> [f64; 3] {
        [
            self.sum[0] / self.count,
            self.sum[1] / self.count,
            self.sum[2] / self.count,
        ]
    }

    fn absorb(&mut self, color: [f64; 3]) {
        self.sum[0] += color[0];
        self.sum[1] += color[1];
        self.sum[2] += color[2];
        self.count += 1.0;
    }
}

fn color_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr.mul_add(dr, dg.mul_add(dg, db * db)).sqrt()
}

/// Result of background completion.
#[derive(Debug, Clone)]
pub struct InpaintBuild {
    /// Full-size copy of the source with the region filled.
    pub background: RgbaImage,
    /// How many dominant context clusters were found.
    pub cluster_count: usize,
    /// How many pixels were (partially) filled.
    pub filled_pixels: u64,
    /// Filled pixels over total bounds pixels.
    pub fill_ratio: f64,
}

/// Per-pixel fill strength derived from the alpha mask.
///
/// Transparent pixels (the background the mask carved away) are filled
/// at full strength; uncertain pixels proportionally; confident object
/// pixels not at all.
fn fill_strength(mask: &GrayImage) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        let alpha = mask.get_pixel(x, y).0[0];
        let strength = if alpha < FILL_FULL_BELOW {
            255
        } else if alpha < FILL_NONE_FROM {
            255 - alpha
        } else {
            0
        };
        image::Luma([strength])
    })
}

/// Cluster the colors surrounding the bounds into dominant colors.
///
/// Samples a window of `context_margin` pixels around the bounds
/// (excluding the bounds themselves) at the configured stride, greedily
/// merging each sample into the nearest cluster within the merge
/// distance. New clusters open until the cap; beyond it, samples merge
/// into whichever cluster is nearest.
fn cluster_context(
    image: &RgbaImage,
    bounds: PixelBounds,
    config: &ExtractionConfig,
    token: &CancelToken,
) -> Result<Vec<Cluster>, ExtractionError> {
    let stride = config.sample_stride.max(1);
    let x0 = bounds.x.saturating_sub(config.context_margin);
    let y0 = bounds.y.saturating_sub(config.context_margin);
    let x1 = bounds
        .right()
        .saturating_add(config.context_margin)
        .min(image.width());
    let y1 = bounds
        .bottom()
        .saturating_add(config.context_margin)
        .min(image.height());

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut y = y0;
    while y < y1 {
        token.ensure_live()?;
        let mut x = x0;
        while x < x1 {
            if !bounds.contains(x, y) {
                let p = image.get_pixel(x, y).0;
                let color = [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])];

                let nearest = clusters
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (i, color_distance(c.mean(), color)))
                    .min_by(|a, b| a.1.total_cmp(&b.1));
                match nearest {
                    Some((i, dist)) if dist < config.cluster_merge_distance => {
                        clusters[i].absorb(color);
                    }
                    // At capacity, the sample merges into whichever
                    // cluster is nearest.
                    Some((i, _)) if clusters.len() >= config.max_clusters => {
                        clusters[i].absorb(color);
                    }
                    _ => clusters.push(Cluster::seed(color)),
                }
            }
            x += stride;
        }
        y += stride;
    }
    Ok(clusters)
}

/// Average color of a patch around a global position, sampled at the
/// configured stride and clamped to the image.
fn patch_average(
    image: &RgbaImage,
    cx: u32,
    cy: u32,
    radius: u32,
    stride: u32,
) -> [f64; 3] {
    let x0 = cx.saturating_sub(radius);
    let y0 = cy.saturating_sub(radius);
    let x1 = cx.saturating_add(radius + 1).min(image.width());
    let y1 = cy.saturating_add(radius + 1).min(image.height());

    let mut sum = [0.0f64; 3];
    let mut count = 0.0f64;
    let mut y = y0;
    while y < y1 {
        let mut x = x0;
        while x < x1 {
            let p = image.get_pixel(x, y).0;
            sum[0] += f64::from(p[0]);
            sum[1] += f64::from(p[1]);
            sum[2] += f64::from(p[2]);
            count += 1.0;
            x += stride;
        }
        y += stride;
    }
    if count == 0.0 {
        return [0.0; 3];
    }
    [sum[0] / count, sum[1] / count, sum[2] / count]
}

/// Complete the background behind the extracted object.
///
/// # Errors
///
/// Returns [`ExtractionError::Cancelled`] if the token is cancelled
/// between pixel rows.
pub fn complete(
    image: &RgbaImage,
    mask: &GrayImage,
    bounds: PixelBounds,
    config: &ExtractionConfig,
    token: &CancelToken,
) -> Result<InpaintBuild, ExtractionError> {
    let strength = fill_strength(mask);
    let clusters = cluster_context(image, bounds, config, token)?;
    let means: Vec<[f64; 3]> = clusters.iter().map(Cluster::mean).collect();
    let stride = config.sample_stride.max(1);

    let mut background = image.clone();
    let mut filled_pixels = 0u64;

    for ly in 0..bounds.height {
        token.ensure_live()?;
        for lx in 0..bounds.width {
            let t = strength.get_pixel(lx, ly).0[0];
            if t == 0 {
                continue;
            }
            filled_pixels += 1;
            let gx = bounds.x + lx;
            let gy = bounds.y + ly;

            let patch = patch_average(image, gx, gy, config.patch_radius, stride);
            let dominant = means
                .iter()
                .min_by(|a, b| {
                    color_distance(**a, patch).total_cmp(&color_distance(**b, patch))
                })
                .copied();
            // Without any context (bounds cover the image), fall back
            // to the patch alone.
            let target = dominant.map_or(patch, |cluster| {
                [
                    (patch[0] + cluster[0]) / 2.0,
                    (patch[1] + cluster[1]) / 2.0,
                    (patch[2] + cluster[2]) / 2.0,
                ]
            });

            let weight = f64::from(t) / 255.0;
            let mut p = *image.get_pixel(gx, gy);
            for c in 0..3 {
                let original = f64::from(p.0[c]);
                let blended = (1.0 - weight).mul_add(original, weight * target[c]);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    p.0[c] = blended.round().clamp(0.0, 255.0) as u8;
                }
            }
            background.put_pixel(gx, gy, p);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let fill_ratio = if bounds.area() == 0 {
        0.0
    } else {
        filled_pixels as f64 / bounds.area() as f64
    };

    Ok(InpaintBuild {
        background,
        cluster_count: clusters.len(),
        filled_pixels,
        fill_ratio,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};

    const BOUNDS: PixelBounds = PixelBounds {
        x: 20,
        y: 20,
        width: 20,
        height: 20,
    };

    /// 64x64 image: blue background with a red block inside BOUNDS.
    fn scene() -> RgbaImage {
        RgbaImage::from_fn(64, 64, |x, y| {
            if BOUNDS.contains(x, y) {
                Rgba([200, 30, 30, 255])
            } else {
                Rgba([30, 60, 200, 255])
            }
        })
    }

    #[test]
    fn fill_strength_bands() {
        let mut mask = GrayImage::new(4, 1);
        mask.put_pixel(0, 0, Luma([0]));
        mask.put_pixel(1, 0, Luma([49]));
        mask.put_pixel(2, 0, Luma([100]));
        mask.put_pixel(3, 0, Luma([220]));
        let strength = fill_strength(&mask);
        assert_eq!(strength.get_pixel(0, 0).0[0], 255);
        assert_eq!(strength.get_pixel(1, 0).0[0], 255);
        assert_eq!(strength.get_pixel(2, 0).0[0], 155);
        assert_eq!(strength.get_pixel(3, 0).0[0], 0);
    }

    #[test]
    fn outside_pixels_stay_byte_identical() {
        let image = scene();
        let mask = GrayImage::new(BOUNDS.width, BOUNDS.height);
        let built = complete(
            &image,
            &mask,
            BOUNDS,
            &ExtractionConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();
        for y in 0..image.height() {
            for x in 0..image.width() {
                if !BOUNDS.contains(x, y) {
                    assert_eq!(
                        image.get_pixel(x, y),
                        built.background.get_pixel(x, y),
                        "pixel ({x}, {y}) changed outside the bounds",
                    );
                }
            }
        }
    }

    #[test]
    fn opaque_mask_fills_nothing() {
        let image = scene();
        let mask = GrayImage::from_pixel(BOUNDS.width, BOUNDS.height, Luma([255]));
        let built = complete(
            &image,
            &mask,
            BOUNDS,
            &ExtractionConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(built.filled_pixels, 0);
        assert!(built.fill_ratio.abs() < f64::EPSILON);
        assert_eq!(image.as_raw(), built.background.as_raw());
    }

    #[test]
    fn transparent_mask_pulls_region_toward_context() {
        let image = scene();
        let mask = GrayImage::new(BOUNDS.width, BOUNDS.height);
        let built = complete(
            &image,
            &mask,
            BOUNDS,
            &ExtractionConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(built.filled_pixels, BOUNDS.area());
        assert!((built.fill_ratio - 1.0).abs() < f64::EPSILON);
        // Center of the excised region should no longer be the pure
        // object red; the blue context pulls it down.
        let p = built.background.get_pixel(30, 30).0;
        assert!(p[0] < 200, "red should drop from 200, got {}", p[0]);
        assert!(p[2] > 30, "blue should rise from 30, got {}", p[2]);
    }

    #[test]
    fn cluster_count_respects_the_cap() {
        // Noisy context with many distinct colors.
        let image = RgbaImage::from_fn(64, 64, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            Rgba([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8, 255])
        });
        let mask = GrayImage::new(BOUNDS.width, BOUNDS.height);
        let config = ExtractionConfig {
            cluster_merge_distance: 10.0,
            ..ExtractionConfig::default()
        };
        let built = complete(&image, &mask, BOUNDS, &config, &CancelToken::new()).unwrap();
        assert!(built.cluster_count <= config.max_clusters);
        assert!(built.cluster_count > 0);
    }

    #[test]
    fn cancelled_token_aborts() {
        let token = CancelToken::new();
        token.cancel();
        let mask = GrayImage::new(BOUNDS.width, BOUNDS.height);
        let result = complete(
            &scene(),
            &mask,
            BOUNDS,
            &ExtractionConfig::default(),
            &token,
        );
        assert!(matches!(result, Err(ExtractionError::Cancelled)));
    }
}
