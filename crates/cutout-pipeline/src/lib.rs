//! cutout-pipeline: foreground object extraction (sans-IO).
//!
//! Given a raster image and a rough percentage bounding region, isolates
//! the object inside the region into a transparent sprite and produces a
//! copy of the image with the region plausibly filled in:
//! bounds resolution -> edge detection -> contour tracing ->
//! mask building -> sprite compositing, with background inpainting
//! branching off the mask.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and returns structured data. Callers own presentation
//! and configuration UI.
//!
//! Everything is classical, deterministic image processing: no learned
//! models, no randomness. Objects with ambiguous edges may group or
//! leak, and the inpainting is patch/color-harmony heuristics, not a
//! generative fill; diagnostics report per-stage quality so callers can
//! judge the result.

pub mod bounds;
pub mod codec;
pub mod contour;
pub mod diagnostics;
pub mod edge;
pub mod inpaint;
pub mod mask;
pub mod roi;
pub mod simplify;
pub mod sprite;
pub mod types;

use std::time::Instant;

use tracing::debug;

use crate::diagnostics::{ExtractionDiagnostics, ExtractionSummary, StageDiagnostics, StageMetrics};
use crate::roi::RoiWindow;
pub use crate::types::{
    CancelToken, ContourPath, ContourPoint, Dimensions, Extraction, ExtractionConfig,
    ExtractionError, GrayImage, PercentBounds, PixelBounds, Point, PointClass, RgbaImage,
};

/// Run the full extraction pipeline on encoded image bytes.
///
/// Decodes the image (PNG, JPEG, BMP, WebP), resolves the bounds, and
/// runs every stage to completion. See [`extract_from_image`] for the
/// decoded-input entry point and the stage ordering.
///
/// # Errors
///
/// Returns [`ExtractionError::EmptyInput`] or
/// [`ExtractionError::ImageDecode`] before any stage runs when the
/// bytes cannot be decoded, and any error of [`extract_from_image`]
/// afterwards.
pub fn extract(
    image_bytes: &[u8],
    bounds: PercentBounds,
    config: &ExtractionConfig,
) -> Result<Extraction, ExtractionError> {
    extract_with_cancel(image_bytes, bounds, config, &CancelToken::new())
}

/// [`extract`] with a caller-supplied cancellation token.
///
/// # Errors
///
/// As [`extract`], plus [`ExtractionError::Cancelled`] when the token
/// is cancelled mid-stage.
pub fn extract_with_cancel(
    image_bytes: &[u8],
    bounds: PercentBounds,
    config: &ExtractionConfig,
    token: &CancelToken,
) -> Result<Extraction, ExtractionError> {
    let image = codec::decode_rgba(image_bytes)?;
    extract_from_image(&image, bounds, config, token)
}

/// Run the extraction pipeline on an already-decoded image.
///
/// # Pipeline stages
///
/// 1. Bounds resolution (validation, pixel conversion, grip exclusion)
/// 2. Edge detection over the padded ROI
/// 3. Contour tracing with layered fallbacks, then simplification
/// 4. Alpha mask rasterization, feathering, color refinement
/// 5. Sprite compositing with chroma correction
/// 6. Background inpainting (consumes the mask, not the sprite)
///
/// Each stage consumes only the immutable output of the prior stages;
/// diagnostics are accumulated per invocation and returned by value.
///
/// # Errors
///
/// Returns [`ExtractionError::InvalidBounds`] or
/// [`ExtractionError::OutOfImageBounds`] when the bounds fail
/// validation, [`ExtractionError::RegionExtraction`] on a ROI read
/// outside the image, and [`ExtractionError::Cancelled`] when the
/// token is cancelled. A degenerate contour is NOT an error: mask
/// building falls back to fully opaque and the pipeline completes with
/// reduced quality scores.
#[allow(clippy::too_many_lines, clippy::cast_precision_loss)]
pub fn extract_from_image(
    image: &RgbaImage,
    bounds: PercentBounds,
    config: &ExtractionConfig,
    token: &CancelToken,
) -> Result<Extraction, ExtractionError> {
    let total_start = Instant::now();
    let dims = Dimensions::of(image);

    // 1. Bounds resolution.
    let stage_start = Instant::now();
    let resolved = bounds::resolve(bounds, dims, config)?;
    let pixel = resolved.pixel;
    debug!(
        x = pixel.x,
        y = pixel.y,
        width = pixel.width,
        height = pixel.height,
        "bounds resolved"
    );
    let bounds_diag = StageDiagnostics {
        duration: stage_start.elapsed(),
        metrics: StageMetrics::Bounds {
            percent: bounds,
            pixel,
            grip_axis: resolved.grip_axis,
            trimmed_px: resolved.trimmed_px,
        },
        quality: 100,
    };

    // 2. Edge detection over the padded ROI.
    let stage_start = Instant::now();
    let window = RoiWindow::around(pixel, config.roi_padding, dims);
    let luma = roi::extract_luminance(image, window)?;
    let edges = edge::detect(
        &luma,
        config.blur_sigma,
        config.edge_low,
        config.edge_high,
        token,
    )?;
    let edge_pixel_count = diagnostics::count_edge_pixels(&edges);
    let total_pixel_count = u64::from(edges.width()) * u64::from(edges.height());
    debug!(edge_pixel_count, "edge detection complete");
    let edge_diag = StageDiagnostics {
        duration: stage_start.elapsed(),
        metrics: StageMetrics::EdgeDetection {
            low_threshold: config.edge_low,
            high_threshold: config.edge_high,
            edge_pixel_count,
            total_pixel_count,
        },
        quality: diagnostics::edge_quality(edge_pixel_count, total_pixel_count),
    };

    // 3. Contour tracing and simplification.
    let stage_start = Instant::now();
    let outcome = contour::trace(&edges);
    let path = simplify::simplify_and_classify(
        &outcome.points,
        config.simplify_tolerance,
        (window.x, window.y),
    );
    let contour_valid = contour::validate(&path, outcome.raw_edge_pixels);
    debug!(
        strategy = %outcome.strategy,
        raw = outcome.points.len(),
        simplified = path.len(),
        contour_valid,
        "contour traced"
    );
    let contour_diag = StageDiagnostics {
        duration: stage_start.elapsed(),
        metrics: StageMetrics::ContourTracing {
            strategy: outcome.strategy.to_string(),
            raw_point_count: outcome.points.len(),
            simplified_point_count: path.len(),
            corner_count: path.corner_count(),
            curve_count: path.curve_count(),
            valid: contour_valid,
        },
        quality: diagnostics::contour_quality(contour_valid, path.len()),
    };

    // 4. Alpha mask.
    let stage_start = Instant::now();
    let mask_build = mask::build(&path, pixel, image, config, token)?;
    let (opaque, partial, transparent) = diagnostics::opacity_histogram(&mask_build.mask);
    let mask_area = pixel.area().max(1) as f64;
    let partial_pct = partial as f64 / mask_area * 100.0;
    let mask_diag = StageDiagnostics {
        duration: stage_start.elapsed(),
        metrics: StageMetrics::MaskBuild {
            opaque_count: opaque,
            partial_count: partial,
            transparent_count: transparent,
            opaque_pct: opaque as f64 / mask_area * 100.0,
            partial_pct,
            transparent_pct: transparent as f64 / mask_area * 100.0,
            fallback: mask_build.fallback,
            boosted_pixels: mask_build.boosted_pixels,
        },
        quality: diagnostics::mask_quality(mask_build.fallback, partial_pct),
    };

    // 5. Sprite compositing.
    let stage_start = Instant::now();
    let sprite_build = sprite::compose(image, &mask_build.mask, pixel, token)?;
    let sprite_diag = StageDiagnostics {
        duration: stage_start.elapsed(),
        metrics: StageMetrics::SpriteComposite {
            width: sprite_build.sprite.width(),
            height: sprite_build.sprite.height(),
            skin_converted: sprite_build.skin_converted,
            metallic_enhanced: sprite_build.metallic_enhanced,
        },
        quality: diagnostics::sprite_quality(mask_build.fallback),
    };

    // 6. Background inpainting, independent of the sprite.
    let stage_start = Instant::now();
    let inpaint_build = inpaint::complete(image, &mask_build.mask, pixel, config, token)?;
    debug!(
        clusters = inpaint_build.cluster_count,
        fill_ratio = inpaint_build.fill_ratio,
        "background completed"
    );
    let inpaint_diag = StageDiagnostics {
        duration: stage_start.elapsed(),
        metrics: StageMetrics::Inpaint {
            cluster_count: inpaint_build.cluster_count,
            filled_pixels: inpaint_build.filled_pixels,
            fill_ratio: inpaint_build.fill_ratio,
        },
        quality: diagnostics::inpaint_quality(
            inpaint_build.cluster_count,
            inpaint_build.filled_pixels,
        ),
    };

    let scores = [
        bounds_diag.quality,
        edge_diag.quality,
        contour_diag.quality,
        mask_diag.quality,
        sprite_diag.quality,
        inpaint_diag.quality,
    ];
    let diagnostics = ExtractionDiagnostics {
        bounds: bounds_diag,
        edge_detection: edge_diag,
        contour_tracing: contour_diag,
        mask_build: mask_diag,
        sprite_composite: sprite_diag,
        inpaint: inpaint_diag,
        total_duration: total_start.elapsed(),
        aggregate_quality: diagnostics::aggregate_quality(&scores),
        summary: ExtractionSummary {
            image_width: dims.width,
            image_height: dims.height,
            pixel_bounds: pixel,
            contour_valid,
            mask_fallback: mask_build.fallback,
        },
    };

    Ok(Extraction {
        sprite: sprite_build.sprite,
        background: inpaint_build.background,
        mask: mask_build.mask,
        bounds: pixel,
        diagnostics,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Encode a test scene as PNG: dark disc on a light background.
    fn disc_png(size: u32) -> Vec<u8> {
        let center = f64::from(size) / 2.0;
        let radius = f64::from(size) / 6.0;
        let img = RgbaImage::from_fn(size, size, |x, y| {
            let dx = f64::from(x) - center;
            let dy = f64::from(y) - center;
            if dx.hypot(dy) < radius {
                image::Rgba([40, 40, 45, 255])
            } else {
                image::Rgba([220, 220, 215, 255])
            }
        });
        codec::encode_png(&img).unwrap()
    }

    #[test]
    fn empty_input_fails_before_any_stage() {
        let result = extract(
            &[],
            PercentBounds::new(25.0, 25.0, 50.0, 50.0),
            &ExtractionConfig::default(),
        );
        assert!(matches!(result, Err(ExtractionError::EmptyInput)));
    }

    #[test]
    fn invalid_bounds_fail_before_processing() {
        let png = disc_png(64);
        let result = extract(
            &png,
            PercentBounds::new(90.0, 90.0, 20.0, 20.0),
            &ExtractionConfig::default(),
        );
        assert!(matches!(result, Err(ExtractionError::InvalidBounds(_))));
    }

    #[test]
    fn extraction_produces_consistent_dimensions() {
        let png = disc_png(96);
        let extraction = extract(
            &png,
            PercentBounds::new(20.0, 20.0, 60.0, 60.0),
            &ExtractionConfig::default(),
        )
        .unwrap();
        assert_eq!(
            extraction.sprite.dimensions(),
            extraction.mask.dimensions(),
            "sprite must match the mask exactly",
        );
        assert_eq!(extraction.background.dimensions(), (96, 96));
        assert_eq!(
            (extraction.bounds.width, extraction.bounds.height),
            extraction.mask.dimensions(),
        );
    }

    #[test]
    fn cancelled_before_start_yields_cancelled() {
        let png = disc_png(64);
        let token = CancelToken::new();
        token.cancel();
        let result = extract_with_cancel(
            &png,
            PercentBounds::new(20.0, 20.0, 60.0, 60.0),
            &ExtractionConfig::default(),
            &token,
        );
        assert!(matches!(result, Err(ExtractionError::Cancelled)));
    }

    #[test]
    fn diagnostics_cover_all_stages() {
        let png = disc_png(96);
        let extraction = extract(
            &png,
            PercentBounds::new(20.0, 20.0, 60.0, 60.0),
            &ExtractionConfig::default(),
        )
        .unwrap();
        let diag = &extraction.diagnostics;
        assert!(diag.aggregate_quality > 0);
        assert_eq!(diag.summary.image_width, 96);
        assert_eq!(diag.summary.pixel_bounds, extraction.bounds);
        // The report renders without panicking and names the stages.
        assert!(diag.report().contains("Inpaint"));
    }
}
