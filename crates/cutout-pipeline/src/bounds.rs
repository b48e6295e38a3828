//! Bounds resolution: percentage validation, pixel conversion, and the
//! grip-exclusion adjustment.
//!
//! The caller supplies a rough region as percentages of the image
//! dimensions. This module scales it into pixel space, trims the
//! fraction assumed to be a gripping hand or appendage, recenters, and
//! re-validates the result against the image.
//!
//! This is the first pipeline stage; everything downstream consumes the
//! resolved [`PixelBounds`].

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, ExtractionError, PercentBounds, PixelBounds, RegionF};

/// Which axis the grip exclusion trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GripAxis {
    /// Object taller than wide; height was trimmed.
    Vertical,
    /// Object wider than tall; width was trimmed.
    Horizontal,
}

impl std::fmt::Display for GripAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vertical => write!(f, "vertical"),
            Self::Horizontal => write!(f, "horizontal"),
        }
    }
}

/// Output of bounds resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBounds {
    /// The integer bounds every later stage operates on.
    pub pixel: PixelBounds,
    /// The fractional region after grip exclusion, before rounding.
    pub region: RegionF,
    /// Which axis was trimmed.
    pub grip_axis: GripAxis,
    /// How many pixels the grip exclusion removed along that axis.
    pub trimmed_px: f64,
}

/// Scale percentage bounds into fractional pixel space.
///
/// `pixel = percent / 100 * dimension`, per axis. The inverse is
/// [`region_to_percent`]; the pair round-trips within floating-point
/// tolerance for any valid input.
#[must_use]
pub fn percent_to_region(bounds: PercentBounds, dims: Dimensions) -> RegionF {
    let w = f64::from(dims.width);
    let h = f64::from(dims.height);
    RegionF {
        x: bounds.x / 100.0 * w,
        y: bounds.y / 100.0 * h,
        width: bounds.width / 100.0 * w,
        height: bounds.height / 100.0 * h,
    }
}

/// Scale a fractional pixel region back into percentages.
#[must_use]
pub fn region_to_percent(region: RegionF, dims: Dimensions) -> PercentBounds {
    let w = f64::from(dims.width);
    let h = f64::from(dims.height);
    PercentBounds {
        x: region.x / w * 100.0,
        y: region.y / h * 100.0,
        width: region.width / w * 100.0,
        height: region.height / h * 100.0,
    }
}

/// Validate percentage bounds against the range and sum invariants.
///
/// # Errors
///
/// Returns [`ExtractionError::InvalidBounds`] naming the violated
/// invariant.
pub fn validate_percent(bounds: PercentBounds) -> Result<(), ExtractionError> {
    let in_range = |v: f64| (0.0..=100.0).contains(&v);
    if !in_range(bounds.x) || !in_range(bounds.y) {
        return Err(ExtractionError::InvalidBounds(format!(
            "origin ({}, {}) outside [0, 100]",
            bounds.x, bounds.y,
        )));
    }
    if bounds.width <= 0.0 || bounds.height <= 0.0 {
        return Err(ExtractionError::InvalidBounds(format!(
            "extent {}x{} must be positive",
            bounds.width, bounds.height,
        )));
    }
    if !in_range(bounds.width) || !in_range(bounds.height) {
        return Err(ExtractionError::InvalidBounds(format!(
            "extent {}x{} outside [0, 100]",
            bounds.width, bounds.height,
        )));
    }
    if bounds.x + bounds.width > 100.0 {
        return Err(ExtractionError::InvalidBounds(format!(
            "x + width = {} exceeds 100",
            bounds.x + bounds.width,
        )));
    }
    if bounds.y + bounds.height > 100.0 {
        return Err(ExtractionError::InvalidBounds(format!(
            "y + height = {} exceeds 100",
            bounds.y + bounds.height,
        )));
    }
    Ok(())
}

/// Trim the fraction of the region assumed to be a gripping hand and
/// shift part of the excluded extent back into the bound.
///
/// Horizontally-oriented objects (width > height) are trimmed along
/// width; everything else along height.
fn grip_exclusion(
    region: RegionF,
    grip_vertical: f64,
    grip_horizontal: f64,
    recenter: f64,
) -> (RegionF, GripAxis, f64) {
    if region.width > region.height {
        let excluded = region.width * grip_horizontal;
        let trimmed = RegionF {
            x: excluded.mul_add(recenter, region.x),
            y: region.y,
            width: region.width - excluded,
            height: region.height,
        };
        (trimmed, GripAxis::Horizontal, excluded)
    } else {
        let excluded = region.height * grip_vertical;
        let trimmed = RegionF {
            x: region.x,
            y: excluded.mul_add(recenter, region.y),
            width: region.width,
            height: region.height - excluded,
        };
        (trimmed, GripAxis::Vertical, excluded)
    }
}

/// Round a fractional region outward to integer pixel bounds, clamped to
/// the image.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_to_pixels(region: RegionF, dims: Dimensions) -> PixelBounds {
    let x0 = region.x.floor().max(0.0) as u32;
    let y0 = region.y.floor().max(0.0) as u32;
    let x1 = ((region.x + region.width).ceil().max(0.0) as u32).min(dims.width);
    let y1 = ((region.y + region.height).ceil().max(0.0) as u32).min(dims.height);
    PixelBounds {
        x: x0.min(x1),
        y: y0.min(y1),
        width: x1.saturating_sub(x0),
        height: y1.saturating_sub(y0),
    }
}

/// Resolve percentage bounds into validated pixel bounds.
///
/// Validates the percentages, scales them into pixel space, applies the
/// grip-exclusion adjustment, rounds, and re-validates that the result
/// lies inside the image with positive area. Pure; no side effects.
///
/// # Errors
///
/// Returns [`ExtractionError::InvalidBounds`] when the percentages fail
/// their invariants and [`ExtractionError::OutOfImageBounds`] when the
/// adjusted pixel bounds do not fit the image.
pub fn resolve(
    bounds: PercentBounds,
    dims: Dimensions,
    config: &crate::types::ExtractionConfig,
) -> Result<ResolvedBounds, ExtractionError> {
    validate_percent(bounds)?;

    let raw = percent_to_region(bounds, dims);
    let (region, grip_axis, trimmed_px) = grip_exclusion(
        raw,
        config.grip_vertical,
        config.grip_horizontal,
        config.grip_recenter,
    );
    let pixel = round_to_pixels(region, dims);

    if pixel.width == 0
        || pixel.height == 0
        || pixel.right() > dims.width
        || pixel.bottom() > dims.height
    {
        return Err(ExtractionError::OutOfImageBounds {
            x: pixel.x,
            y: pixel.y,
            width: pixel.width,
            height: pixel.height,
            image_width: dims.width,
            image_height: dims.height,
        });
    }

    Ok(ResolvedBounds {
        pixel,
        region,
        grip_axis,
        trimmed_px,
    })
}
