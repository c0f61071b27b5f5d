//! quasiflat-bench: CLI tool for segmentation parameter experimentation and
//! diagnostics.
//!
//! Loads an image, converts it to a grid in the requested color mode, runs
//! one of the growers, and prints region statistics and grower counters.
//! Useful for:
//!
//! - Comparing growers on the same input
//! - Tuning alpha, omega, and predicates
//! - Measuring the cost of the distance lookup table
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin quasiflat-bench -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Set `RUST_LOG=quasiflat_segment=debug` for per-run tracing output.

#![allow(clippy::print_stdout)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use image::{GrayImage, RgbImage};
use quasiflat_segment::{
    Clock, Connectivity, DistanceKind, Extent, Grid, GrowerKind, LabelImage, LocalRange,
    PredicateKind, SegmentConfig, SegmentDiagnostics, segment_with_diagnostics,
};
use tracing_subscriber::EnvFilter;

/// Constrained-connectivity segmentation experiments.
///
/// Segments an image with configurable parameters and prints region and
/// timing diagnostics.
#[derive(Parser)]
#[command(name = "quasiflat-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Segmentation algorithm.
    #[arg(long, value_enum, default_value_t = Grower::UnionFind)]
    grower: Grower,

    /// Pixel adjacency.
    #[arg(long, value_enum, default_value_t = Adjacency::Four)]
    connectivity: Adjacency,

    /// How image pixels become grid samples.
    #[arg(long, value_enum, default_value_t = Mode::Gray)]
    mode: Mode,

    /// Local range (alpha).
    #[arg(long, default_value_t = SegmentConfig::DEFAULT_ALPHA)]
    alpha: f64,

    /// Per-band local ranges, comma separated (union-find only).
    ///
    /// Overrides `--alpha` when given.
    #[arg(long, value_delimiter = ',')]
    per_band_alpha: Vec<f64>,

    /// Global range (omega).
    #[arg(long)]
    omega: Option<f64>,

    /// Largest region in pixels (adaptive growers, global predicate).
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    max_size: Option<usize>,

    /// Largest per-band variance of a region (adaptive growers, local predicate).
    #[arg(long)]
    variance: Option<f64>,

    /// Back the union-find labeler with a distance lookup table.
    #[arg(long)]
    lut: bool,

    /// Write the mean-value reconstruction of the first run to a PNG.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full segmentation config as a JSON string.
    ///
    /// When provided, all other segmentation parameter flags are ignored.
    /// The JSON must be a valid `SegmentConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Grower selection.
#[derive(Clone, Copy, ValueEnum)]
enum Grower {
    /// Raster-scan union-find labeling.
    UnionFind,
    /// Flood fill with the smooth-path admission test.
    Smooth,
    /// Priority-ordered growth, independent of scan order.
    Soille,
    /// Predicate-driven threshold search per region.
    Adaptive,
    /// Threshold search over the flat-zone adjacency graph.
    AdaptiveRegions,
}

/// Adjacency selection.
#[derive(Clone, Copy, ValueEnum)]
enum Adjacency {
    /// Edge neighbours.
    Four,
    /// Edge and corner neighbours.
    Eight,
}

/// Color mode selection.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// 8-bit luma, absolute difference.
    Gray,
    /// 8-bit RGB, euclidean distance.
    Rgb,
    /// Hue in degrees, circular distance.
    Hue,
}

/// Build a [`SegmentConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.  Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<SegmentConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let local_range = if cli.per_band_alpha.is_empty() {
        LocalRange::Uniform(cli.alpha)
    } else {
        LocalRange::PerBand(cli.per_band_alpha.clone())
    };

    Ok(SegmentConfig {
        grower: match cli.grower {
            Grower::UnionFind => GrowerKind::UnionFind,
            Grower::Smooth => GrowerKind::Smooth,
            Grower::Soille => GrowerKind::Soille,
            Grower::Adaptive => GrowerKind::Adaptive,
            Grower::AdaptiveRegions => GrowerKind::AdaptiveRegions,
        },
        connectivity: match cli.connectivity {
            Adjacency::Four => Connectivity::Four,
            Adjacency::Eight => Connectivity::Eight,
        },
        distance: match cli.mode {
            Mode::Gray => DistanceKind::Absolute,
            Mode::Rgb => DistanceKind::EuclideanColor,
            Mode::Hue => DistanceKind::CircularHue { period: 360.0 },
        },
        local_range,
        global_range: cli.omega,
        local_predicates: cli
            .variance
            .map(|limit| PredicateKind::Variance { limit })
            .into_iter()
            .collect(),
        global_predicates: cli
            .max_size
            .map(|pixels| PredicateKind::MaxSize { pixels })
            .into_iter()
            .collect(),
        use_lut: cli.lut,
    })
}

/// A decoded image in the form the selected mode segments.
enum Input {
    Gray(Grid<u8>),
    Rgb(Grid<u8>),
    Hue(Grid<f32>),
}

impl Input {
    fn load(path: &Path, mode: Mode) -> Result<Self, String> {
        let image = image::open(path).map_err(|e| format!("Error decoding {}: {e}", path.display()))?;
        Ok(match mode {
            Mode::Gray => Self::Gray(Grid::from_gray_image(&image.to_luma8())),
            Mode::Rgb => Self::Rgb(Grid::from_rgb_image(&image.to_rgb8())),
            Mode::Hue => Self::Hue(hue_grid(&image.to_rgb8())?),
        })
    }

    fn describe(&self) -> String {
        let (extent, bands) = match self {
            Self::Gray(g) | Self::Rgb(g) => (g.extent(), g.bands()),
            Self::Hue(g) => (g.extent(), g.bands()),
        };
        format!("{}x{} x {bands} band(s)", extent.x, extent.y)
    }

    fn segment(
        &self,
        config: &SegmentConfig,
    ) -> Result<(LabelImage, SegmentDiagnostics), quasiflat_segment::SegmentError> {
        let (segmentation, diagnostics) = match self {
            Self::Gray(g) | Self::Rgb(g) => segment_with_diagnostics(g, config, &StdClock)?,
            Self::Hue(g) => segment_with_diagnostics(g, config, &StdClock)?,
        };
        Ok((segmentation.labels, diagnostics))
    }

    /// Mean-value reconstruction as an 8-bit image. Hue grids are
    /// reconstructed as gray levels scaled from degrees.
    fn reconstruct(&self, labels: &LabelImage, path: &Path) -> Result<(), String> {
        let width = u32::try_from(labels.extent().x).map_err(|e| e.to_string())?;
        let height = u32::try_from(labels.extent().y).map_err(|e| e.to_string())?;
        let means = match self {
            Self::Gray(g) | Self::Rgb(g) => labels.region_means(g),
            Self::Hue(g) => labels
                .region_means(&g.map(|h| h / 360.0 * 255.0)),
        }
        .map_err(|e| e.to_string())?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let raw: Vec<u8> = means
            .samples()
            .iter()
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        let written = if means.bands() == 3 {
            RgbImage::from_raw(width, height, raw).map(|img| img.save(path))
        } else {
            GrayImage::from_raw(width, height, raw).map(|img| img.save(path))
        };
        match written {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(format!("Error writing {}: {e}", path.display())),
            None => Err("reconstruction does not match the image size".to_owned()),
        }
    }
}

/// Hue of every pixel in degrees; gray pixels get hue 0.
fn hue_grid(image: &RgbImage) -> Result<Grid<f32>, String> {
    let data = image
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0.map(|c| f32::from(c) / 255.0);
            let max = r.max(g).max(b);
            let chroma = max - r.min(g).min(b);
            if chroma <= f32::EPSILON {
                return 0.0;
            }
            let sector = if (max - r).abs() <= f32::EPSILON {
                ((g - b) / chroma).rem_euclid(6.0)
            } else if (max - g).abs() <= f32::EPSILON {
                (b - r) / chroma + 2.0
            } else {
                (r - g) / chroma + 4.0
            };
            sector * 60.0
        })
        .collect();
    let extent = Extent::planar(image.width() as usize, image.height() as usize);
    Grid::new(extent, 1, data).map_err(|e| e.to_string())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            tracing::error!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let input = match Input::load(&cli.image_path, cli.mode) {
        Ok(input) => input,
        Err(msg) => {
            tracing::error!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        image = %cli.image_path.display(),
        shape = %input.describe(),
        runs = cli.runs,
        "starting benchmark"
    );
    tracing::debug!("config: {config:#?}");

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            tracing::info!(run = run + 1, of = cli.runs, "run started");
        }

        match input.segment(&config) {
            Ok((labels, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            tracing::error!(error = %e, "failed to serialize diagnostics");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write the reconstruction on the first run only.
                if run == 0
                    && let Some(ref path) = cli.output
                {
                    match input.reconstruct(&labels, path) {
                        Ok(()) => tracing::info!(path = %path.display(), "reconstruction written"),
                        Err(msg) => tracing::error!("{msg}"),
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                tracing::error!(error = %e, "segmentation failed");
                return ExitCode::FAILURE;
            }
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[SegmentDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| quasiflat_segment::diagnostics::duration_ms(d.duration))
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Growers are deterministic, so every run should agree.
    let counts: Vec<usize> = all_diagnostics.iter().map(|d| d.regions.count).collect();
    if counts.windows(2).any(|w| w[0] != w[1]) {
        println!("Warning: region counts differ between runs: {counts:?}");
    } else {
        println!("Regions: {}", counts[0]);
    }
}
