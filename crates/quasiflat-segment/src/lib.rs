//! quasiflat-segment: constrained-connectivity segmentation (sans-IO).
//!
//! Partitions a multi-band pixel grid over up to four axes into disjoint
//! regions whose pixels are connected through chains of similar
//! neighbours:
//!
//! - [`UnionFindLabeler`]: alpha-connected components in two raster
//!   passes, optionally with a [`DistanceLut`].
//! - [`SmoothGrower`]: flood fill where a pixel must be within alpha of
//!   every neighbour already in the region, with an optional global range.
//! - [`SoilleGrower`]: the unique (alpha, omega) constrained-connectivity
//!   partition, independent of scan order.
//! - [`AdaptiveGrower`] and [`RegionMergeGrower`]: the largest threshold
//!   at which a zone satisfies a set of logical predicates, found by
//!   bisection over pixels or over a [`RegionAdjacencyGraph`].
//!
//! Each grower is usable on its own with any [`Dissimilarity`];
//! [`segment`] runs one of them from a declarative [`SegmentConfig`].
//!
//! This crate has **no I/O dependencies**: it operates on in-memory grids
//! and returns a [`LabelImage`]. Decoding files and converting colors is
//! the caller's job.

pub mod adaptive;
pub mod context;
pub mod diagnostics;
pub mod distance;
pub mod error;
pub mod grid;
pub mod label;
pub mod neighbourhood;
pub mod predicate;
pub mod rag;
pub mod smooth;
pub mod soille;
pub mod types;
pub mod union_find;

pub use adaptive::AdaptiveGrower;
pub use context::CancelFlag;
pub use diagnostics::{Clock, SegmentDiagnostics, segment_with_diagnostics};
pub use distance::{
    AbsoluteDifference, BandwiseRange, CircularHue, Dissimilarity, DistanceKind, DistanceLut,
    EuclideanColor,
};
pub use error::SegmentError;
pub use grid::{Coord, Extent, Grid, Sample};
pub use label::{Label, LabelImage, PENDING, UNLABELLED};
pub use neighbourhood::{Connectivity, Neighbourhood, Offset};
pub use predicate::{Predicate, PredicateKind, PredicateSet, Scope, ZoneStats};
pub use rag::{RegionAdjacencyGraph, RegionMergeGrower};
pub use smooth::SmoothGrower;
pub use soille::SoilleGrower;
pub use types::{GrowerKind, GrowerMetrics, LocalRange, SegmentConfig, Segmentation};
pub use union_find::UnionFindLabeler;

/// Segment `grid` as described by `config`.
///
/// The configuration is checked against the grid before any label is
/// written: parameter ranges, band counts of the distance and of per-band
/// thresholds, and lookup-table domains.
///
/// # Grower selection
///
/// - [`LocalRange::PerBand`] always runs the union-find labeler with a
///   [`BandwiseRange`] distance; `distance`, `use_lut` and `global_range`
///   are then unused and a debug event says so.
/// - `global_range` bounds the spread of smooth and Soille regions; for
///   the adaptive growers it becomes a local [`PredicateKind::Range`].
/// - [`GrowerKind::AdaptiveRegions`] first labels the flat zones of the
///   grid (union-find at `alpha = 0`) and merges them over their
///   adjacency graph.
/// - `use_lut` replaces the distance by a lookup table for integer
///   samples when the distance has one; otherwise it is ignored with a
///   log event.
///
/// # Errors
///
/// Returns [`SegmentError::InvalidParameter`] or
/// [`SegmentError::BandMismatch`] for a configuration the grid cannot
/// satisfy, and [`SegmentError::TooManyLabels`] if the region count
/// overflows the label type.
pub fn segment<T: Sample>(
    grid: &Grid<T>,
    config: &SegmentConfig,
) -> Result<Segmentation, SegmentError> {
    run(grid, config, None)
}

/// [`segment`] with cooperative cancellation, polled once per region.
///
/// # Errors
///
/// As [`segment`], plus [`SegmentError::Cancelled`] once `cancel` is
/// raised.
pub fn segment_with_cancel<T: Sample>(
    grid: &Grid<T>,
    config: &SegmentConfig,
    cancel: &CancelFlag,
) -> Result<Segmentation, SegmentError> {
    run(grid, config, Some(cancel))
}

fn run<T: Sample>(
    grid: &Grid<T>,
    config: &SegmentConfig,
    cancel: Option<&CancelFlag>,
) -> Result<Segmentation, SegmentError> {
    config.validate()?;
    let neighbourhood = config.connectivity.neighbourhood();
    tracing::debug!(
        grower = config.grower.name(),
        connectivity = ?config.connectivity,
        distance = ?config.distance,
        pixels = grid.len(),
        bands = grid.bands(),
        "segmentation started"
    );

    let alpha = match &config.local_range {
        LocalRange::Uniform(alpha) => *alpha,
        LocalRange::PerBand(thresholds) => {
            if config.distance != DistanceKind::Absolute
                || config.use_lut
                || config.global_range.is_some()
            {
                tracing::debug!(
                    distance = ?config.distance,
                    use_lut = config.use_lut,
                    global_range = ?config.global_range,
                    "per-band alpha replaces the distance; lookup table and global range unused"
                );
            }
            let distance = BandwiseRange::new(thresholds.clone())?;
            return finish(
                config.grower,
                UnionFindLabeler::new(neighbourhood, 1.0)?.segment(grid, &distance, cancel),
            );
        }
    };
    let distance = config.distance;
    distance.validate(grid)?;

    let result = match config.grower {
        GrowerKind::UnionFind => {
            let labeler = UnionFindLabeler::new(neighbourhood, alpha)?;
            match lookup_table(grid, distance, config.use_lut)? {
                Some(lut) => labeler.segment(grid, &lut, cancel),
                None => labeler.segment(grid, &distance, cancel),
            }
        }
        GrowerKind::Smooth => SmoothGrower::new(neighbourhood, alpha, config.global_range)?
            .segment(grid, &distance, cancel),
        GrowerKind::Soille => SoilleGrower::new(neighbourhood, alpha, config.global_range)?
            .segment(grid, &distance, cancel),
        GrowerKind::Adaptive => {
            AdaptiveGrower::new(neighbourhood, alpha, predicate_set(config, grid.bands()))?
                .segment(grid, &distance, cancel)
        }
        GrowerKind::AdaptiveRegions => {
            let merger = RegionMergeGrower::new(alpha, predicate_set(config, grid.bands()))?;
            let zones =
                UnionFindLabeler::new(neighbourhood.clone(), 0.0)?.segment(grid, &distance, cancel)?;
            let graph =
                RegionAdjacencyGraph::build(grid, &zones.labels, &neighbourhood, &distance)?;
            merger.segment(&graph, cancel)
        }
    };
    finish(config.grower, result)
}

fn finish(
    grower: GrowerKind,
    result: Result<Segmentation, SegmentError>,
) -> Result<Segmentation, SegmentError> {
    match &result {
        Ok(seg) => tracing::debug!(
            grower = grower.name(),
            regions = seg.region_count(),
            "segmentation finished"
        ),
        Err(e) => tracing::debug!(grower = grower.name(), error = %e, "segmentation stopped"),
    }
    result
}

/// Predicates configured for the adaptive growers, with `global_range`
/// folded in as a local range predicate.
fn predicate_set(config: &SegmentConfig, bands: usize) -> PredicateSet {
    let mut set = PredicateSet::new(bands);
    if let Some(omega) = config.global_range {
        set = set.with(Scope::Local, PredicateKind::Range { omega });
    }
    for &p in &config.local_predicates {
        set = set.with(Scope::Local, p);
    }
    for &p in &config.global_predicates {
        set = set.with(Scope::Global, p);
    }
    set
}

/// Lookup table replacing `distance` on `grid`, if one applies.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lookup_table<T: Sample>(
    grid: &Grid<T>,
    distance: DistanceKind,
    use_lut: bool,
) -> Result<Option<DistanceLut>, SegmentError> {
    if !use_lut {
        return Ok(None);
    }
    if !T::INTEGRAL {
        tracing::debug!("lookup table skipped: samples are not integral");
        return Ok(None);
    }
    let Some((lo, hi)) = grid.sample_bounds() else {
        return Ok(None);
    };
    let levels = (hi - lo) as usize + 1;
    let table = match distance {
        DistanceKind::Absolute => DistanceLut::chebyshev(levels, grid.bands()),
        DistanceKind::EuclideanColor => DistanceLut::euclidean(levels, 3),
        DistanceKind::CircularHue { .. } => {
            tracing::debug!("lookup table skipped: no table for circular hue distance");
            return Ok(None);
        }
    };
    match table {
        Ok(lut) => {
            lut.validate(grid)?;
            tracing::debug!(levels, entries = lut.len(), "distance lookup table built");
            Ok(Some(lut))
        }
        Err(e) => {
            tracing::warn!(levels, error = %e, "lookup table too large, using direct distance");
            Ok(None)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(grower: GrowerKind, alpha: f64) -> SegmentConfig {
        SegmentConfig {
            grower,
            local_range: LocalRange::Uniform(alpha),
            ..SegmentConfig::default()
        }
    }

    #[test]
    fn every_grower_runs_from_config() {
        let grid = Grid::from_rows(4, 1, vec![0u8, 1, 9, 10]).unwrap();
        for grower in [
            GrowerKind::UnionFind,
            GrowerKind::Smooth,
            GrowerKind::Soille,
            GrowerKind::Adaptive,
            GrowerKind::AdaptiveRegions,
        ] {
            let seg = segment(&grid, &config(grower, 1.0)).unwrap();
            assert_eq!(seg.labels.as_raw(), &[0, 0, 1, 1], "{}", grower.name());
        }
    }

    #[test]
    fn lut_matches_direct_distance() {
        let data: Vec<u8> = (0..30u8).map(|i| i.wrapping_mul(37) % 40).collect();
        let grid = Grid::from_rows(6, 5, data).unwrap();
        let direct = segment(&grid, &config(GrowerKind::UnionFind, 6.0)).unwrap();
        let lut = segment(
            &grid,
            &SegmentConfig {
                use_lut: true,
                ..config(GrowerKind::UnionFind, 6.0)
            },
        )
        .unwrap();
        assert_eq!(direct.labels, lut.labels);
    }

    #[test]
    fn lut_covers_sixteen_bit_samples() {
        let data: Vec<u16> = (0..42u16).map(|i| 1000 + i.wrapping_mul(97) % 600).collect();
        let grid = Grid::from_rows(7, 6, data).unwrap();
        let direct = segment(&grid, &config(GrowerKind::UnionFind, 90.0)).unwrap();
        let lut = segment(
            &grid,
            &SegmentConfig {
                use_lut: true,
                ..config(GrowerKind::UnionFind, 90.0)
            },
        )
        .unwrap();
        assert_eq!(direct.labels, lut.labels);
        assert!(direct.region_count() > 1);
    }

    #[test]
    fn lut_is_skipped_for_float_samples() {
        let grid = Grid::from_rows(3, 1, vec![0.0f32, 0.5, 4.0]).unwrap();
        let seg = segment(
            &grid,
            &SegmentConfig {
                use_lut: true,
                ..config(GrowerKind::UnionFind, 1.0)
            },
        )
        .unwrap();
        assert_eq!(seg.labels.as_raw(), &[0, 0, 1]);
    }

    #[test]
    fn per_band_alpha_runs_union_find() {
        let data = vec![10u8, 10, 10, 12, 30, 10, 40, 30, 10];
        let grid = Grid::new(Extent::planar(3, 1), 3, data).unwrap();
        let config = SegmentConfig {
            local_range: LocalRange::PerBand(vec![5.0, 25.0, 0.0]),
            ..SegmentConfig::default()
        };
        let seg = segment(&grid, &config).unwrap();
        assert_eq!(seg.labels.as_raw(), &[0, 0, 1]);
    }

    #[test]
    fn per_band_alpha_ignores_distance_settings() {
        let data = vec![10u8, 10, 10, 12, 30, 10, 40, 30, 10];
        let grid = Grid::new(Extent::planar(3, 1), 3, data).unwrap();
        let config = SegmentConfig {
            local_range: LocalRange::PerBand(vec![5.0, 25.0, 0.0]),
            distance: DistanceKind::EuclideanColor,
            use_lut: true,
            global_range: Some(1.0),
            ..SegmentConfig::default()
        };
        let seg = segment(&grid, &config).unwrap();
        assert_eq!(seg.labels.as_raw(), &[0, 0, 1]);
    }

    #[test]
    fn per_band_alpha_length_must_match_bands() {
        let grid = Grid::from_rows(2, 1, vec![0u8, 1]).unwrap();
        let config = SegmentConfig {
            local_range: LocalRange::PerBand(vec![1.0, 1.0]),
            ..SegmentConfig::default()
        };
        assert!(matches!(
            segment(&grid, &config),
            Err(SegmentError::BandMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn global_range_becomes_local_predicate() {
        let config = SegmentConfig {
            global_range: Some(3.0),
            global_predicates: vec![PredicateKind::MaxSize { pixels: 9 }],
            ..config(GrowerKind::Adaptive, 4.0)
        };
        let set = predicate_set(&config, 1);
        let scopes: Vec<Scope> = set.predicates().map(|(s, _)| s).collect();
        assert_eq!(scopes, vec![Scope::Local, Scope::Global]);
    }

    #[test]
    fn cancel_flag_stops_configured_run() {
        let grid = Grid::from_rows(2, 1, vec![0u8, 100]).unwrap();
        let flag = CancelFlag::new();
        flag.cancel();
        let result = segment_with_cancel(&grid, &config(GrowerKind::Soille, 1.0), &flag);
        assert_eq!(result, Err(SegmentError::Cancelled));
    }
}
