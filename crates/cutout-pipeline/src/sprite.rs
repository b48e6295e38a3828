//! Sprite compositing: merge source pixels with the alpha mask, clean
//! up the mask edge, and correct color bleed.
//!
//! The alpha channel gets a 3x3 Gaussian anti-alias blended with an
//! unsharp-style sharpening pass so feathered boundaries stay smooth
//! without washing out true edges. Chroma correction then converts
//! skin-tone-like pixels (bleed from a gripping hand) to a metallic
//! tone derived from luminance, and a light unsharp mask restores
//! detail on the visible region.
//!
//! Every pass reads a frozen copy of its input plane and writes a fresh
//! buffer; nothing is mutated in place across passes.

use image::{GrayImage, Luma, Rgba};

use crate::types::{CancelToken, ExtractionError, PixelBounds, RgbaImage};

/// Weight of the smoothed alpha in the anti-alias blend.
const SMOOTH_WEIGHT: f32 = 0.6;
/// Unsharp strength for the alpha sharpening pass.
const ALPHA_SHARPEN: f32 = 0.3;
/// Share of the smoothed result in the final smooth/sharp combination.
const COMBINE_SMOOTH: f32 = 0.7;
/// Unsharp amount for the RGB detail pass.
const RGB_UNSHARP: f32 = 0.3;
/// Minimum alpha for a pixel to receive the RGB unsharp pass.
const UNSHARP_MIN_ALPHA: u8 = 50;
/// Channel spread below which a color counts as balanced/grayish.
const METALLIC_SPREAD: i16 = 30;
/// Luminance contrast gain for already-metallic tones.
const METALLIC_GAIN: f32 = 1.05;

/// 3x3 Gaussian weights, row-major, summing to 16.
const GAUSS_3X3: [f32; 9] = [1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0];

/// Result of sprite compositing.
#[derive(Debug, Clone)]
pub struct SpriteBuild {
    /// The composed sprite; dimensions equal the alpha mask.
    pub sprite: RgbaImage,
    /// Pixels whose skin-like tone was converted to metallic.
    pub skin_converted: u64,
    /// Pixels whose metallic tone was enhanced.
    pub metallic_enhanced: u64,
}

/// Compose the sprite from the source image and the alpha mask.
///
/// # Errors
///
/// Returns [`ExtractionError::Cancelled`] if the token is cancelled
/// between pixel rows.
pub fn compose(
    image: &RgbaImage,
    mask: &GrayImage,
    bounds: PixelBounds,
    token: &CancelToken,
) -> Result<SpriteBuild, ExtractionError> {
    let (w, h) = (bounds.width, bounds.height);

    // RGB from the source at the bounds offset, alpha from the mask.
    let mut sprite = RgbaImage::new(w, h);
    for ly in 0..h {
        token.ensure_live()?;
        for lx in 0..w {
            let src = image.get_pixel(bounds.x + lx, bounds.y + ly).0;
            let alpha = mask.get_pixel(lx, ly).0[0];
            sprite.put_pixel(lx, ly, Rgba([src[0], src[1], src[2], alpha]));
        }
    }

    let refined_alpha = refine_alpha(mask, token)?;
    for (ly, lx) in rows_cols(w, h) {
        let mut p = *sprite.get_pixel(lx, ly);
        p.0[3] = refined_alpha.get_pixel(lx, ly).0[0];
        sprite.put_pixel(lx, ly, p);
    }

    let (skin_converted, metallic_enhanced) = correct_chroma(&mut sprite, token)?;
    let sprite = unsharp_rgb(&sprite, token)?;

    Ok(SpriteBuild {
        sprite,
        skin_converted,
        metallic_enhanced,
    })
}

/// Row-major iteration helper.
fn rows_cols(w: u32, h: u32) -> impl Iterator<Item = (u32, u32)> {
    (0..h).flat_map(move |y| (0..w).map(move |x| (y, x)))
}

/// Anti-alias and sharpen the alpha plane.
///
/// Fully opaque, fully transparent, and border pixels pass through
/// unchanged. Everything else blends a 3x3 Gaussian smoothing with an
/// unsharp sharpening of the original alpha, 70/30.
fn refine_alpha(mask: &GrayImage, token: &CancelToken) -> Result<GrayImage, ExtractionError> {
    let (w, h) = mask.dimensions();
    let mut out = mask.clone();
    if w < 3 || h < 3 {
        return Ok(out);
    }

    for ly in 1..h - 1 {
        token.ensure_live()?;
        for lx in 1..w - 1 {
            let alpha = mask.get_pixel(lx, ly).0[0];
            if alpha == 0 || alpha == 255 {
                continue;
            }
            let original = f32::from(alpha);

            let mut weighted = 0.0;
            let mut plain = 0.0;
            for ky in 0..3u32 {
                for kx in 0..3u32 {
                    let v = f32::from(mask.get_pixel(lx + kx - 1, ly + ky - 1).0[0]);
                    weighted += v * GAUSS_3X3[(ky * 3 + kx) as usize];
                    plain += v;
                }
            }
            let smoothed = weighted / 16.0;
            let average = plain / 9.0;

            let blended = SMOOTH_WEIGHT.mul_add(smoothed, (1.0 - SMOOTH_WEIGHT) * original);
            let sharpened = ALPHA_SHARPEN.mul_add(original - average, original);
            let combined = COMBINE_SMOOTH.mul_add(blended, (1.0 - COMBINE_SMOOTH) * sharpened);

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            out.put_pixel(lx, ly, Luma([combined.round().clamp(0.0, 255.0) as u8]));
        }
    }
    Ok(out)
}

/// Whether a color looks like skin: warm, `r > g > b`, flesh ranges.
const fn is_skin_tone(r: u8, g: u8, b: u8) -> bool {
    r > 95 && g > 40 && b > 20 && r > g && g > b && r - b > 15 && r - g > 10
}

/// Whether a color looks metallic: balanced/grayish or cool-toned.
const fn is_metallic(r: u8, g: u8, b: u8) -> bool {
    let max = if r > g {
        if r > b { r } else { b }
    } else if g > b {
        g
    } else {
        b
    };
    let min = if r < g {
        if r < b { r } else { b }
    } else if g < b {
        g
    } else {
        b
    };
    (max as i16 - min as i16) < METALLIC_SPREAD || b >= r
}

/// Rec. 601 luminance.
fn luminance(r: u8, g: u8, b: u8) -> f32 {
    0.299f32.mul_add(f32::from(r), 0.587f32.mul_add(f32::from(g), 0.114 * f32::from(b)))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Convert skin tones to a metallic tone and slightly enhance existing
/// metallic tones.
///
/// Skin becomes a cool gray built from luminance (red damped, blue
/// boosted); metallic pixels get a small contrast gain around their
/// luminance.
fn correct_chroma(
    sprite: &mut RgbaImage,
    token: &CancelToken,
) -> Result<(u64, u64), ExtractionError> {
    let (w, h) = sprite.dimensions();
    let mut skin = 0u64;
    let mut metallic = 0u64;
    for ly in 0..h {
        token.ensure_live()?;
        for lx in 0..w {
            let mut p = *sprite.get_pixel(lx, ly);
            let [r, g, b, _] = p.0;
            if is_skin_tone(r, g, b) {
                let l = luminance(r, g, b);
                p.0[0] = to_channel(l * 0.92);
                p.0[1] = to_channel(l);
                p.0[2] = to_channel(l * 1.08);
                sprite.put_pixel(lx, ly, p);
                skin += 1;
            } else if is_metallic(r, g, b) {
                let l = luminance(r, g, b);
                p.0[0] = to_channel(METALLIC_GAIN.mul_add(f32::from(r) - l, l));
                p.0[1] = to_channel(METALLIC_GAIN.mul_add(f32::from(g) - l, l));
                p.0[2] = to_channel(METALLIC_GAIN.mul_add(f32::from(b) - l, l));
                sprite.put_pixel(lx, ly, p);
                metallic += 1;
            }
        }
    }
    Ok((skin, metallic))
}

/// Light unsharp mask on RGB, restricted to visible pixels.
///
/// Uses the 3x3 local average (clamped at borders) as the blur
/// reference.
fn unsharp_rgb(sprite: &RgbaImage, token: &CancelToken) -> Result<RgbaImage, ExtractionError> {
    let (w, h) = sprite.dimensions();
    let mut out = sprite.clone();
    for ly in 0..h {
        token.ensure_live()?;
        for lx in 0..w {
            let p = *sprite.get_pixel(lx, ly);
            if p.0[3] <= UNSHARP_MIN_ALPHA {
                continue;
            }

            let mut sums = [0.0f32; 3];
            let mut count = 0.0f32;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let nx = i64::from(lx) + dx;
                    let ny = i64::from(ly) + dy;
                    if nx < 0 || ny < 0 || nx >= i64::from(w) || ny >= i64::from(h) {
                        continue;
                    }
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let q = sprite.get_pixel(nx as u32, ny as u32).0;
                    sums[0] += f32::from(q[0]);
                    sums[1] += f32::from(q[1]);
                    sums[2] += f32::from(q[2]);
                    count += 1.0;
                }
            }

            let mut sharpened = p;
            for c in 0..3 {
                let avg = sums[c] / count;
                let v = f32::from(p.0[c]);
                sharpened.0[c] = to_channel(RGB_UNSHARP.mul_add(v - avg, v));
            }
            out.put_pixel(lx, ly, sharpened);
        }
    }
    Ok(out)
}
