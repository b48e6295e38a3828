//! cutout-bench: CLI tool for extraction parameter experimentation and
//! diagnostics.
//!
//! Runs the extraction pipeline on an image file with configurable
//! parameters, printing detailed per-stage diagnostics. Useful for:
//!
//! - Tuning edge thresholds, blur sigma, and grip-exclusion ratios
//! - Inspecting which contour strategy fires on a given image
//! - Measuring per-stage durations to identify bottlenecks
//! - Writing the sprite and completed background to disk for review
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin cutout-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use cutout_pipeline::{ExtractionConfig, PercentBounds, extract};

/// Extraction parameter experimentation and diagnostics for cutout.
///
/// Runs the extraction pipeline on a given image with configurable
/// parameters and prints detailed per-stage timing, count, and quality
/// diagnostics.
#[derive(Parser)]
#[command(name = "cutout-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Bounding region as `x,y,width,height` percentages of the image.
    #[arg(long, value_parser = parse_bounds, default_value = "25,25,50,50")]
    bounds: PercentBounds,

    /// Gaussian blur sigma before gradient computation.
    #[arg(long, default_value_t = ExtractionConfig::DEFAULT_BLUR_SIGMA)]
    blur_sigma: f32,

    /// Hysteresis low threshold.
    #[arg(long, default_value_t = ExtractionConfig::DEFAULT_EDGE_LOW)]
    edge_low: f32,

    /// Hysteresis high threshold.
    #[arg(long, default_value_t = ExtractionConfig::DEFAULT_EDGE_HIGH)]
    edge_high: f32,

    /// ROI padding in pixels.
    #[arg(long, default_value_t = ExtractionConfig::DEFAULT_ROI_PADDING)]
    roi_padding: u32,

    /// Vertical grip-exclusion ratio.
    #[arg(long, default_value_t = ExtractionConfig::DEFAULT_GRIP_VERTICAL)]
    grip_vertical: f64,

    /// Horizontal grip-exclusion ratio.
    #[arg(long, default_value_t = ExtractionConfig::DEFAULT_GRIP_HORIZONTAL)]
    grip_horizontal: f64,

    /// Douglas-Peucker simplification tolerance in pixels.
    #[arg(long, default_value_t = ExtractionConfig::DEFAULT_SIMPLIFY_TOLERANCE)]
    simplify_tolerance: f64,

    /// Mask feathering sigma.
    #[arg(long, default_value_t = ExtractionConfig::DEFAULT_FEATHER_SIGMA)]
    feather_sigma: f32,

    /// Write the sprite PNG to this path.
    #[arg(long)]
    sprite: Option<PathBuf>,

    /// Write the completed background PNG to this path.
    #[arg(long)]
    background: Option<PathBuf>,

    /// Number of runs for duration averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,
}

/// Parse `x,y,width,height` percentages into bounds.
fn parse_bounds(s: &str) -> Result<PercentBounds, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, width, height] = parts.as_slice() else {
        return Err(format!(
            "expected x,y,width,height (four comma-separated values), got {} value(s)",
            parts.len(),
        ));
    };
    let parse = |name: &str, v: &str| {
        v.parse::<f64>()
            .map_err(|e| format!("invalid {name} {v:?}: {e}"))
    };
    Ok(PercentBounds::new(
        parse("x", x)?,
        parse("y", y)?,
        parse("width", width)?,
        parse("height", height)?,
    ))
}

impl Cli {
    fn config(&self) -> ExtractionConfig {
        ExtractionConfig {
            blur_sigma: self.blur_sigma,
            edge_low: self.edge_low,
            edge_high: self.edge_high,
            roi_padding: self.roi_padding,
            grip_vertical: self.grip_vertical,
            grip_horizontal: self.grip_horizontal,
            simplify_tolerance: self.simplify_tolerance,
            feather_sigma: self.feather_sigma,
            ..ExtractionConfig::default()
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let bytes = std::fs::read(&cli.image_path)
        .map_err(|e| format!("reading {}: {e}", cli.image_path.display()))?;
    let config = cli.config();

    let mut extraction = None;
    let mut total = Duration::ZERO;
    for _ in 0..cli.runs {
        let result = extract(&bytes, cli.bounds, &config).map_err(|e| e.to_string())?;
        total += result.diagnostics.total_duration;
        extraction = Some(result);
    }
    let Some(extraction) = extraction else {
        return Err("no runs executed".to_string());
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&extraction.diagnostics)
            .map_err(|e| format!("serializing diagnostics: {e}"))?;
        println!("{json}");
    } else {
        println!("{}", extraction.diagnostics.report());
        if cli.runs > 1 {
            #[allow(clippy::cast_precision_loss)]
            let mean_ms = total.as_secs_f64() * 1000.0 / cli.runs as f64;
            println!("\nMean duration over {} runs: {mean_ms:.3}ms", cli.runs);
        }
    }

    if let Some(path) = &cli.sprite {
        let png = extraction.sprite_png().map_err(|e| e.to_string())?;
        std::fs::write(path, png).map_err(|e| format!("writing {}: {e}", path.display()))?;
        println!("Sprite written to {}", path.display());
    }
    if let Some(path) = &cli.background {
        let png = extraction.background_png().map_err(|e| e.to_string())?;
        std::fs::write(path, png).map_err(|e| format!("writing {}: {e}", path.display()))?;
        println!("Background written to {}", path.display());
    }
    Ok(())
}
