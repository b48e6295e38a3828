//! Shared types for the cutout extraction pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::diagnostics::ExtractionDiagnostics;

/// Re-export `GrayImage` so downstream crates can reference masks and
/// edge rasters without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so downstream crates can reference sprites and
/// completed backgrounds without depending on `image` directly.
pub use image::RgbaImage;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// Classification of a contour point by its local geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointClass {
    /// First or last point of an open path.
    Endpoint,
    /// Turning angle above the corner threshold.
    Corner,
    /// Turning angle above the curve threshold.
    Curve,
    /// Straight-ish run of the boundary.
    Edge,
}

/// A single classified point on a traced boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContourPoint {
    /// Position in image coordinates.
    pub point: Point,
    /// Local geometry classification.
    pub class: PointClass,
}

/// An ordered, classified boundary approximating the detected object.
///
/// Points are in global image coordinates once tracing completes. At
/// least 3 points are needed to form a polygon; mask building falls
/// back to a fully opaque mask below that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourPath(Vec<ContourPoint>);

impl ContourPath {
    /// Create a new contour path from classified points.
    #[must_use]
    pub const fn new(points: Vec<ContourPoint>) -> Self {
        Self(points)
    }

    /// Returns `true` if the path has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the path.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all classified points.
    #[must_use]
    pub fn points(&self) -> &[ContourPoint] {
        &self.0
    }

    /// Number of points classified as [`PointClass::Corner`].
    #[must_use]
    pub fn corner_count(&self) -> usize {
        self.0
            .iter()
            .filter(|p| p.class == PointClass::Corner)
            .count()
    }

    /// Number of points classified as [`PointClass::Curve`].
    #[must_use]
    pub fn curve_count(&self) -> usize {
        self.0
            .iter()
            .filter(|p| p.class == PointClass::Curve)
            .count()
    }

    /// Consumes the path and returns the underlying vector.
    #[must_use]
    pub fn into_points(self) -> Vec<ContourPoint> {
        self.0
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an RGBA image.
    #[must_use]
    pub fn of(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }
}

/// A rough bounding region supplied by the caller, in percentages of the
/// image dimensions.
///
/// All coordinates are in `[0, 100]`; `x + width` and `y + height` must
/// not exceed 100, and both extents must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentBounds {
    /// Left edge as a percentage of image width.
    pub x: f64,
    /// Top edge as a percentage of image height.
    pub y: f64,
    /// Width as a percentage of image width.
    pub width: f64,
    /// Height as a percentage of image height.
    pub height: f64,
}

impl PercentBounds {
    /// Create new percentage bounds.
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A fractional rectangle in pixel space.
///
/// Intermediate form between [`PercentBounds`] and [`PixelBounds`]: the
/// linear scaling of percentages and the grip-exclusion adjustment both
/// operate on fractional coordinates before rounding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionF {
    /// Left edge in pixels.
    pub x: f64,
    /// Top edge in pixels.
    pub y: f64,
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
}

/// An integer pixel rectangle, fully contained within the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBounds {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels (positive).
    pub width: u32,
    /// Height in pixels (positive).
    pub height: u32,
}

impl PixelBounds {
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

    /// Total pixel count.
    #[must_use]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether a global pixel coordinate falls inside the bounds.
    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

/// Configuration for the extraction pipeline.
///
/// Every heuristic the pipeline relies on is exposed as a field with a
/// documented default. The defaults are empirical values tuned on the
/// original product imagery; their sensitivity to other image styles and
/// resolutions is unverified, which is why they are tunable rather than
/// hard-coded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Gaussian blur sigma applied before gradient computation.
    pub blur_sigma: f32,

    /// Hysteresis low threshold. Gradient magnitudes at or above this
    /// become weak edges, kept only when connected to a strong edge.
    pub edge_low: f32,

    /// Hysteresis high threshold. Gradient magnitudes at or above this
    /// become strong edges unconditionally.
    pub edge_high: f32,

    /// Padding added around the pixel bounds to form the working ROI,
    /// clamped to the image edges.
    pub roi_padding: u32,

    /// Fraction of the region height trimmed when the object is taller
    /// than wide (assumed gripping hand at one end).
    pub grip_vertical: f64,

    /// Fraction of the region width trimmed when the object is wider
    /// than tall.
    pub grip_horizontal: f64,

    /// Share of the excluded extent shifted back into the trimmed bound
    /// when recentering.
    pub grip_recenter: f64,

    /// Douglas-Peucker simplification tolerance in pixels.
    pub simplify_tolerance: f64,

    /// Gaussian sigma for mask feathering (≈5 px kernel radius at the
    /// default).
    pub feather_sigma: f32,

    /// Euclidean RGB distance below which an uncertain edge pixel is
    /// considered foreground-colored during mask refinement.
    pub color_similarity: f64,

    /// Context sampling margin around the bounds for inpainting.
    pub context_margin: u32,

    /// Patch radius for local color averaging during fill.
    pub patch_radius: u32,

    /// Stride for sparse sampling loops (context, patch, interior color).
    pub sample_stride: u32,

    /// Maximum number of dominant context color clusters.
    pub max_clusters: usize,

    /// Euclidean RGB distance below which a context sample merges into
    /// an existing cluster.
    pub cluster_merge_distance: f64,
}

impl ExtractionConfig {
    /// Default Gaussian blur sigma.
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.0;
    /// Default hysteresis low threshold.
    pub const DEFAULT_EDGE_LOW: f32 = 40.0;
    /// Default hysteresis high threshold.
    pub const DEFAULT_EDGE_HIGH: f32 = 120.0;
    /// Default ROI padding in pixels.
    pub const DEFAULT_ROI_PADDING: u32 = 20;
    /// Default vertical grip-exclusion ratio.
    pub const DEFAULT_GRIP_VERTICAL: f64 = 0.25;
    /// Default horizontal grip-exclusion ratio.
    pub const DEFAULT_GRIP_HORIZONTAL: f64 = 0.20;
    /// Default recenter share of the excluded extent.
    pub const DEFAULT_GRIP_RECENTER: f64 = 0.3;
    /// Default Douglas-Peucker tolerance in pixels.
    pub const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 2.0;
    /// Default feathering sigma.
    pub const DEFAULT_FEATHER_SIGMA: f32 = 2.5;
    /// Default color-similarity threshold.
    pub const DEFAULT_COLOR_SIMILARITY: f64 = 30.0;
    /// Default inpainting context margin in pixels.
    pub const DEFAULT_CONTEXT_MARGIN: u32 = 50;
    /// Default patch radius in pixels.
    pub const DEFAULT_PATCH_RADIUS: u32 = 15;
    /// Default sparse sampling stride.
    pub const DEFAULT_SAMPLE_STRIDE: u32 = 3;
    /// Default maximum cluster count.
    pub const DEFAULT_MAX_CLUSTERS: usize = 5;
    /// Default cluster merge distance.
    pub const DEFAULT_CLUSTER_MERGE_DISTANCE: f64 = 50.0;
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            edge_low: Self::DEFAULT_EDGE_LOW,
            edge_high: Self::DEFAULT_EDGE_HIGH,
            roi_padding: Self::DEFAULT_ROI_PADDING,
            grip_vertical: Self::DEFAULT_GRIP_VERTICAL,
            grip_horizontal: Self::DEFAULT_GRIP_HORIZONTAL,
            grip_recenter: Self::DEFAULT_GRIP_RECENTER,
            simplify_tolerance: Self::DEFAULT_SIMPLIFY_TOLERANCE,
            feather_sigma: Self::DEFAULT_FEATHER_SIGMA,
            color_similarity: Self::DEFAULT_COLOR_SIMILARITY,
            context_margin: Self::DEFAULT_CONTEXT_MARGIN,
            patch_radius: Self::DEFAULT_PATCH_RADIUS,
            sample_stride: Self::DEFAULT_SAMPLE_STRIDE,
            max_clusters: Self::DEFAULT_MAX_CLUSTERS,
            cluster_merge_distance: Self::DEFAULT_CLUSTER_MERGE_DISTANCE,
        }
    }
}

/// Cooperative cancellation for long-running extractions.
///
/// Cloned tokens share one flag. Each stage checks the token between
/// pixel rows; cancelling yields [`ExtractionError::Cancelled`] from the
/// current stage without altering any work already completed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Error out if cancellation has been requested.
    pub(crate) fn ensure_live(&self) -> Result<(), ExtractionError> {
        if self.is_cancelled() {
            Err(ExtractionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Result of a full extraction: the cutout sprite, the completed
/// background, the alpha mask, and the diagnostics for the invocation.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// RGBA sprite cropped to the resolved pixel bounds, alpha channel
    /// from the enhanced mask.
    pub sprite: RgbaImage,
    /// Full-size copy of the source with the excised region filled in.
    pub background: RgbaImage,
    /// The enhanced alpha mask (same dimensions as the sprite).
    pub mask: GrayImage,
    /// The pixel bounds the pipeline operated on.
    pub bounds: PixelBounds,
    /// Per-stage metrics and quality scores.
    pub diagnostics: ExtractionDiagnostics,
}

impl Extraction {
    /// Encode the sprite as PNG bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PngEncode`] if encoding fails.
    pub fn sprite_png(&self) -> Result<Vec<u8>, ExtractionError> {
        crate::codec::encode_png(&self.sprite)
    }

    /// Encode the completed background as PNG bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PngEncode`] if encoding fails.
    pub fn background_png(&self) -> Result<Vec<u8>, ExtractionError> {
        crate::codec::encode_png(&self.background)
    }
}

/// Errors that can occur during extraction.
///
/// Contour degeneracy is deliberately absent: a degenerate contour
/// downgrades mask building to its opaque fallback and is reported via
/// diagnostics, not as a failure.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Percentage bounds failed range or sum invariants.
    #[error("invalid percentage bounds: {0}")]
    InvalidBounds(String),

    /// Converted/adjusted pixel bounds do not fit the image.
    #[error(
        "pixel bounds {x},{y} {width}x{height} fall outside the {image_width}x{image_height} image"
    )]
    OutOfImageBounds {
        /// Resolved left edge.
        x: u32,
        /// Resolved top edge.
        y: u32,
        /// Resolved width.
        width: u32,
        /// Resolved height.
        height: u32,
        /// Source image width.
        image_width: u32,
        /// Source image height.
        image_height: u32,
    },

    /// A pixel-buffer read or write fell outside the source during ROI
    /// extraction. Fatal: the invocation aborts.
    #[error("region extraction accessed pixel ({x}, {y}) outside the source buffer")]
    RegionExtraction {
        /// Offending x coordinate.
        x: u32,
        /// Offending y coordinate.
        y: u32,
    },

    /// Failed to encode a PNG output.
    #[error("failed to encode PNG output: {0}")]
    PngEncode(#[source] image::ImageError),

    /// The invocation's [`CancelToken`] was cancelled.
    #[error("extraction cancelled")]
    Cancelled,
}
