//! Run diagnostics: timing, region statistics, and grower counters.
//!
//! [`segment_with_diagnostics`] wraps [`segment`](crate::segment) and
//! records how long the run took and what it produced. The kernel never
//! reads a clock itself; callers supply a [`Clock`] so the crate stays
//! platform agnostic (the bench binary uses `std::time::Instant`).
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SegmentError;
use crate::grid::{Extent, Grid, Sample};
use crate::types::{GrowerKind, GrowerMetrics, SegmentConfig, Segmentation};

/// Source of monotonic timestamps.
pub trait Clock {
    /// Opaque timestamp.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

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

/// Diagnostics collected from a single segmentation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDiagnostics {
    /// Which grower ran.
    pub grower: GrowerKind,
    /// Shape of the input grid.
    pub grid: GridSummary,
    /// Region count and sizes.
    pub regions: RegionSummary,
    /// Grower-specific counters.
    pub metrics: GrowerMetrics,
    /// Wall-clock duration of the run, validation included (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Shape of the segmented grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSummary {
    /// Grid extent.
    pub extent: Extent,
    /// Samples per pixel.
    pub bands: usize,
    /// Pixels in the grid.
    pub pixel_count: usize,
    /// Pixels not masked out.
    pub present_count: usize,
}

/// Region statistics of a label image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    /// Number of regions.
    pub count: usize,
    /// Pixels in the smallest region.
    pub min_size: usize,
    /// Pixels in the largest region.
    pub max_size: usize,
    /// Mean pixels per region.
    pub mean_size: f64,
    /// Regions of exactly one pixel.
    pub singletons: usize,
}

impl RegionSummary {
    /// Summarize per-region pixel counts.
    #[must_use]
    pub fn from_sizes(sizes: &[usize]) -> Self {
        let total: usize = sizes.iter().sum();
        #[allow(clippy::cast_precision_loss)]
        let mean_size = if sizes.is_empty() {
            0.0
        } else {
            total as f64 / sizes.len() as f64
        };
        Self {
            count: sizes.len(),
            min_size: sizes.iter().copied().min().unwrap_or(0),
            max_size: sizes.iter().copied().max().unwrap_or(0),
            mean_size,
            singletons: sizes.iter().filter(|&&s| s == 1).count(),
        }
    }
}

/// Run [`segment`](crate::segment) and collect diagnostics.
///
/// # Errors
///
/// Returns the same errors as [`segment`](crate::segment).
pub fn segment_with_diagnostics<T: Sample, C: Clock>(
    grid: &Grid<T>,
    config: &SegmentConfig,
    clock: &C,
) -> Result<(Segmentation, SegmentDiagnostics), SegmentError> {
    let start = clock.now();
    let segmentation = crate::segment(grid, config)?;
    let duration = clock.elapsed(&start);

    let diagnostics = SegmentDiagnostics {
        grower: config.grower,
        grid: GridSummary {
            extent: grid.extent(),
            bands: grid.bands(),
            pixel_count: grid.len(),
            present_count: grid.present_count(),
        },
        regions: RegionSummary::from_sizes(&segmentation.labels.region_sizes()),
        metrics: segmentation.metrics.clone(),
        duration,
    };
    Ok((segmentation, diagnostics))
}

impl SegmentDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        let e = self.grid.extent;

        lines.push(format!("Segmentation Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Grid: {}x{}x{}x{} x {} band(s) ({} pixels, {} present)",
            e.x, e.y, e.z, e.t, self.grid.bands, self.grid.pixel_count, self.grid.present_count,
        ));
        lines.push(format!("Grower: {}", self.grower.name()));
        lines.push(format!("Duration: {:.3}ms", duration_ms(self.duration)));
        lines.push(String::new());

        let r = &self.regions;
        lines.push(format!(
            "Regions: {}  (size min={} max={} mean={:.1}, singletons={})",
            r.count, r.min_size, r.max_size, r.mean_size, r.singletons,
        ));
        lines.push(format!("Counters: {}", format_metrics(&self.metrics)));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format grower counters into a compact detail string.
fn format_metrics(metrics: &GrowerMetrics) -> String {
    match metrics {
        GrowerMetrics::UnionFind {
            provisional_labels,
            unions,
            collapsed_cycles,
        } => format!(
            "{provisional_labels} provisional labels, {unions} unions, {collapsed_cycles} collapsed cycles",
        ),
        GrowerMetrics::Smooth { rejections } => format!("{rejections} rejections"),
        GrowerMetrics::Soille { flushes, aborts } => {
            format!("{flushes} flushes, {aborts} aborts")
        }
        GrowerMetrics::Adaptive {
            resets,
            iterations,
            max_iterations,
        } => format!("{resets} resets, {iterations} attempts (max {max_iterations} per region)"),
    }
}
