//! Extraction diagnostics: per-stage counts, quality scores, and
//! timings.
//!
//! Diagnostics are permanent instrumentation for caller-side QA and
//! parameter tuning. They are built incrementally during a single
//! invocation and returned by value with the extraction result — never
//! shared between invocations or fed back into pipeline decisions.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bounds::GripAxis;
use crate::types::{PercentBounds, PixelBounds};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionDiagnostics {
    /// Stage 1: bounds resolution and grip exclusion.
    pub bounds: StageDiagnostics,
    /// Stage 2: edge detection over the padded ROI.
    pub edge_detection: StageDiagnostics,
    /// Stage 3: contour tracing and simplification.
    pub contour_tracing: StageDiagnostics,
    /// Stage 4: alpha mask rasterization, feathering, refinement.
    pub mask_build: StageDiagnostics,
    /// Stage 5: sprite compositing and chroma correction.
    pub sprite_composite: StageDiagnostics,
    /// Stage 6: background inpainting.
    pub inpaint: StageDiagnostics,
    /// Total wall-clock duration of the invocation (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Mean of the per-stage quality scores.
    pub aggregate_quality: u8,
    /// Summary of the invocation.
    pub summary: ExtractionSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific counts and ratios.
    pub metrics: StageMetrics,
    /// Quality score for this stage, 0-100.
    pub quality: u8,
}

/// Stage-specific metrics.
///
/// Each variant captures the counts meaningful for that processing
/// step. All of it is read-only output: nothing here feeds back into
/// pipeline logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Bounds resolution metrics.
    Bounds {
        /// The caller-supplied percentage bounds.
        percent: PercentBounds,
        /// The resolved pixel bounds every stage operated on.
        pixel: PixelBounds,
        /// Which axis grip exclusion trimmed.
        grip_axis: GripAxis,
        /// Pixels removed along that axis.
        trimmed_px: f64,
    },
    /// Edge detection metrics.
    EdgeDetection {
        /// Hysteresis low threshold.
        low_threshold: f32,
        /// Hysteresis high threshold.
        high_threshold: f32,
        /// Edge pixels in the output raster.
        edge_pixel_count: u64,
        /// Total ROI pixel count, for edge density.
        total_pixel_count: u64,
    },
    /// Contour tracing metrics.
    ContourTracing {
        /// Which strategy produced the outline.
        strategy: String,
        /// Points in the raw traced chain.
        raw_point_count: usize,
        /// Points after Douglas-Peucker simplification.
        simplified_point_count: usize,
        /// Corner points among the survivors.
        corner_count: usize,
        /// Curve points among the survivors.
        curve_count: usize,
        /// Whether the contour passed the plausibility checks.
        valid: bool,
    },
    /// Alpha mask metrics: the opacity histogram.
    MaskBuild {
        /// Pixels with alpha >= 200.
        opaque_count: u64,
        /// Pixels with alpha in (30, 200).
        partial_count: u64,
        /// Pixels with alpha <= 30.
        transparent_count: u64,
        /// Opaque share of the mask, percent.
        opaque_pct: f64,
        /// Partial share of the mask, percent.
        partial_pct: f64,
        /// Transparent share of the mask, percent.
        transparent_pct: f64,
        /// Whether the opaque fallback was used.
        fallback: bool,
        /// Edge pixels boosted by color refinement.
        boosted_pixels: u64,
    },
    /// Sprite compositing metrics.
    SpriteComposite {
        /// Sprite width in pixels.
        width: u32,
        /// Sprite height in pixels.
        height: u32,
        /// Skin-like pixels converted to metallic.
        skin_converted: u64,
        /// Metallic pixels enhanced.
        metallic_enhanced: u64,
    },
    /// Background inpainting metrics.
    Inpaint {
        /// Dominant context clusters found.
        cluster_count: usize,
        /// Pixels at least partially filled.
        filled_pixels: u64,
        /// Filled pixels over total bounds pixels.
        fill_ratio: f64,
    },
}

/// High-level summary of the invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// The pixel bounds used.
    pub pixel_bounds: PixelBounds,
    /// Whether the traced contour passed validation.
    pub contour_valid: bool,
    /// Whether mask building used the opaque fallback.
    pub mask_fallback: bool,
}

/// Edge density band considered healthy, as a fraction of ROI pixels.
const EDGE_DENSITY_LOW: f64 = 0.01;
const EDGE_DENSITY_HIGH: f64 = 0.25;

/// Quality score for the edge detection stage.
///
/// Full marks inside the healthy density band; scaled down toward
/// empty or saturated rasters.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn edge_quality(edge_pixel_count: u64, total_pixel_count: u64) -> u8 {
    if total_pixel_count == 0 || edge_pixel_count == 0 {
        return 0;
    }
    let density = edge_pixel_count as f64 / total_pixel_count as f64;
    if density < EDGE_DENSITY_LOW {
        (density / EDGE_DENSITY_LOW * 100.0).round() as u8
    } else if density <= EDGE_DENSITY_HIGH {
        100
    } else {
        let excess = (density - EDGE_DENSITY_HIGH) * 400.0;
        (100.0 - excess).clamp(20.0, 100.0).round() as u8
    }
}

/// Quality score for the contour tracing stage.
#[must_use]
pub const fn contour_quality(valid: bool, simplified_point_count: usize) -> u8 {
    if valid {
        100
    } else if simplified_point_count >= 8 {
        70
    } else if simplified_point_count >= 3 {
        40
    } else {
        15
    }
}

/// Quality score for the mask stage.
///
/// The fallback caps the score; otherwise a mask dominated by partial
/// alpha (mushy boundary) loses points.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn mask_quality(fallback: bool, partial_pct: f64) -> u8 {
    if fallback {
        return 30;
    }
    if partial_pct <= 50.0 {
        100
    } else {
        (100.0 - (partial_pct - 50.0)).clamp(40.0, 100.0).round() as u8
    }
}

/// Quality score for sprite compositing.
///
/// Compositing itself is deterministic; quality degrades only with the
/// mask it inherited.
#[must_use]
pub const fn sprite_quality(mask_fallback: bool) -> u8 {
    if mask_fallback { 60 } else { 100 }
}

/// Quality score for inpainting.
///
/// A fill with no context clusters had nothing to sample from.
#[must_use]
pub const fn inpaint_quality(cluster_count: usize, filled_pixels: u64) -> u8 {
    if filled_pixels == 0 || cluster_count > 0 {
        100
    } else {
        50
    }
}

/// Mean of the per-stage scores.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn aggregate_quality(scores: &[u8]) -> u8 {
    if scores.is_empty() {
        return 0;
    }
    let sum: u32 = scores.iter().map(|&s| u32::from(s)).sum();
    (sum / scores.len() as u32) as u8
}

/// Count edge pixels (value > 0) in an edge raster.
#[must_use]
pub fn count_edge_pixels(raster: &image::GrayImage) -> u64 {
    raster.pixels().map(|p| u64::from(u8::from(p.0[0] > 0))).sum()
}

/// Opacity histogram of an alpha mask: opaque (>= 200), partial
/// ((30, 200)), transparent (<= 30) counts.
#[must_use]
pub fn opacity_histogram(mask: &image::GrayImage) -> (u64, u64, u64) {
    let mut opaque = 0u64;
    let mut partial = 0u64;
    let mut transparent = 0u64;
    for p in mask.pixels() {
        let a = p.0[0];
        if a >= 200 {
            opaque += 1;
        } else if a > 30 {
            partial += 1;
        } else {
            transparent += 1;
        }
    }
    (opaque, partial, transparent)
}

impl ExtractionDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Extraction Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{}  |  Bounds: {},{} {}x{}",
            self.summary.image_width,
            self.summary.image_height,
            self.summary.pixel_bounds.x,
            self.summary.pixel_bounds.y,
            self.summary.pixel_bounds.width,
            self.summary.pixel_bounds.height,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms  |  Aggregate quality: {}/100",
            duration_ms(self.total_duration),
            self.aggregate_quality,
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<20} {:>10} {:>8}  {}",
            "Stage", "Duration", "Quality", "Details"
        ));
        lines.push("-".repeat(80));

        let stages: [(&str, &StageDiagnostics); 6] = [
            ("Bounds", &self.bounds),
            ("Edge Detection", &self.edge_detection),
            ("Contour Tracing", &self.contour_tracing),
            ("Mask Build", &self.mask_build),
            ("Sprite Composite", &self.sprite_composite),
            ("Inpaint", &self.inpaint),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let details = format_metrics(&diag.metrics);
            lines.push(format!(
                "{name:<20} {ms:>8.3}ms {:>5}/100  {details}",
                diag.quality,
            ));
        }

        lines.push(String::new());
        lines.push(format!(
            "Contour valid: {}  |  Mask fallback: {}",
            self.summary.contour_valid, self.summary.mask_fallback,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Bounds {
            pixel,
            grip_axis,
            trimmed_px,
            ..
        } => format!(
            "{},{} {}x{} (grip {grip_axis}, -{trimmed_px:.1}px)",
            pixel.x, pixel.y, pixel.width, pixel.height,
        ),
        StageMetrics::EdgeDetection {
            low_threshold,
            high_threshold,
            edge_pixel_count,
            total_pixel_count,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixel_count > 0 {
                *edge_pixel_count as f64 / *total_pixel_count as f64 * 100.0
            } else {
                0.0
            };
            format!(
                "low={low_threshold:.0} high={high_threshold:.0} edges={edge_pixel_count} ({density:.1}%)",
            )
        }
        StageMetrics::ContourTracing {
            strategy,
            raw_point_count,
            simplified_point_count,
            corner_count,
            curve_count,
            valid,
        } => format!(
            "{strategy} {raw_point_count}->{simplified_point_count} pts ({corner_count} corners, {curve_count} curves, valid={valid})",
        ),
        StageMetrics::MaskBuild {
            opaque_pct,
            partial_pct,
            transparent_pct,
            fallback,
            boosted_pixels,
            ..
        } => format!(
            "opaque={opaque_pct:.1}% partial={partial_pct:.1}% clear={transparent_pct:.1}% boosted={boosted_pixels} fallback={fallback}",
        ),
        StageMetrics::SpriteComposite {
            width,
            height,
            skin_converted,
            metallic_enhanced,
        } => format!(
            "{width}x{height} skin->metal={skin_converted} enhanced={metallic_enhanced}",
        ),
        StageMetrics::Inpaint {
            cluster_count,
            filled_pixels,
            fill_ratio,
        } => format!(
            "{cluster_count} clusters, {filled_pixels} px filled ({:.1}%)",
            fill_ratio * 100.0,
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn edge_quality_bands() {
        assert_eq!(edge_quality(0, 10_000), 0);
        assert_eq!(edge_quality(500, 10_000), 100); // 5% density
        assert!(edge_quality(50, 10_000) < 100); // 0.5%, sparse
        assert!(edge_quality(5_000, 10_000) < 100); // 50%, saturated
        assert_eq!(edge_quality(10, 0), 0);
    }

    #[test]
    fn contour_quality_tiers() {
        assert_eq!(contour_quality(true, 50), 100);
        assert_eq!(contour_quality(false, 12), 70);
        assert_eq!(contour_quality(false, 5), 40);
        assert_eq!(contour_quality(false, 2), 15);
    }

    #[test]
    fn mask_quality_penalizes_fallback_and_mush() {
        assert_eq!(mask_quality(true, 0.0), 30);
        assert_eq!(mask_quality(false, 20.0), 100);
        assert!(mask_quality(false, 80.0) < 100);
    }

    #[test]
    fn aggregate_is_the_mean() {
        assert_eq!(aggregate_quality(&[100, 50]), 75);
        assert_eq!(aggregate_quality(&[]), 0);
    }

    #[test]
    fn opacity_histogram_bands() {
        let mut mask = image::GrayImage::new(4, 1);
        mask.put_pixel(0, 0, image::Luma([255]));
        mask.put_pixel(1, 0, image::Luma([200]));
        mask.put_pixel(2, 0, image::Luma([100]));
        mask.put_pixel(3, 0, image::Luma([10]));
        assert_eq!(opacity_histogram(&mask), (2, 1, 1));
    }

    #[test]
    fn count_edge_pixels_counts_nonzero() {
        let mut raster = image::GrayImage::new(5, 1);
        raster.put_pixel(0, 0, image::Luma([255]));
        raster.put_pixel(1, 0, image::Luma([200]));
        assert_eq!(count_edge_pixels(&raster), 2);
    }

    #[test]
    fn report_mentions_every_stage() {
        let stage = |metrics| StageDiagnostics {
            duration: Duration::from_millis(2),
            metrics,
            quality: 100,
        };
        let diag = ExtractionDiagnostics {
            bounds: stage(StageMetrics::Bounds {
                percent: PercentBounds::new(10.0, 10.0, 40.0, 40.0),
                pixel: PixelBounds {
                    x: 10,
                    y: 10,
                    width: 40,
                    height: 30,
                },
                grip_axis: GripAxis::Vertical,
                trimmed_px: 10.0,
            }),
            edge_detection: stage(StageMetrics::EdgeDetection {
                low_threshold: 40.0,
                high_threshold: 120.0,
                edge_pixel_count: 300,
                total_pixel_count: 4900,
            }),
            contour_tracing: stage(StageMetrics::ContourTracing {
                strategy: "moore-neighborhood".to_string(),
                raw_point_count: 200,
                simplified_point_count: 24,
                corner_count: 4,
                curve_count: 6,
                valid: true,
            }),
            mask_build: stage(StageMetrics::MaskBuild {
                opaque_count: 900,
                partial_count: 200,
                transparent_count: 100,
                opaque_pct: 75.0,
                partial_pct: 16.7,
                transparent_pct: 8.3,
                fallback: false,
                boosted_pixels: 40,
            }),
            sprite_composite: stage(StageMetrics::SpriteComposite {
                width: 40,
                height: 30,
                skin_converted: 12,
                metallic_enhanced: 340,
            }),
            inpaint: stage(StageMetrics::Inpaint {
                cluster_count: 3,
                filled_pixels: 300,
                fill_ratio: 0.25,
            }),
            total_duration: Duration::from_millis(12),
            aggregate_quality: 100,
            summary: ExtractionSummary {
                image_width: 100,
                image_height: 100,
                pixel_bounds: PixelBounds {
                    x: 10,
                    y: 10,
                    width: 40,
                    height: 30,
                },
                contour_valid: true,
                mask_fallback: false,
            },
        };
        let report = diag.report();
        for needle in [
            "Extraction Diagnostics Report",
            "Edge Detection",
            "Contour Tracing",
            "Mask Build",
            "Sprite Composite",
            "Inpaint",
            "moore-neighborhood",
        ] {
            assert!(report.contains(needle), "report missing {needle}");
        }
    }

    #[test]
    fn diagnostics_serde_round_trip() {
        let diag = StageDiagnostics {
            duration: Duration::from_millis(5),
            metrics: StageMetrics::Inpaint {
                cluster_count: 2,
                filled_pixels: 10,
                fill_ratio: 0.5,
            },
            quality: 90,
        };
        let json = serde_json::to_string(&diag).unwrap();
        let back: StageDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.quality, 90);
        assert_eq!(back.duration, Duration::from_millis(5));
    }
}
