//! Dissimilarity between two pixel vectors.
//!
//! This module defines the [`Dissimilarity`] trait that every grower is
//! generic over, the concrete distances, and the [`DistanceKind`] enum for
//! selecting one at runtime from a [`SegmentConfig`](crate::SegmentConfig).
//!
//! Every distance is symmetric and non-negative. Distances that only make
//! sense for a particular band layout report it through
//! [`Dissimilarity::required_bands`]; growers validate it before touching
//! the label image.

use serde::{Deserialize, Serialize};

use crate::error::{SegmentError, check_range};
use crate::grid::{Grid, Sample};

/// A symmetric, non-negative distance between two pixel vectors.
pub trait Dissimilarity<T: Sample> {
    /// Distance between `a` and `b`. Both slices have the grid's band count.
    fn distance(&self, a: &[T], b: &[T]) -> f64;

    /// Band count this distance is defined for, or `None` for any.
    fn required_bands(&self) -> Option<usize> {
        None
    }

    /// Human-readable name used in errors and diagnostics.
    fn name(&self) -> &'static str;

    /// Check that the distance can be evaluated on `grid`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::BandMismatch`] when the grid's band count
    /// differs from [`required_bands`](Self::required_bands).
    fn validate(&self, grid: &Grid<T>) -> Result<(), SegmentError> {
        match self.required_bands() {
            Some(expected) if expected != grid.bands() => Err(SegmentError::band_mismatch(
                self.name(),
                expected,
                grid.bands(),
            )),
            _ => Ok(()),
        }
    }
}

/// Largest absolute per-band difference (plain `|a - b|` for one band).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbsoluteDifference;

impl<T: Sample> Dissimilarity<T> for AbsoluteDifference {
    #[inline]
    fn distance(&self, a: &[T], b: &[T]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(&x, &y)| (x.to_f64() - y.to_f64()).abs())
            .fold(0.0, f64::max)
    }

    fn name(&self) -> &'static str {
        "absolute difference"
    }
}

/// Euclidean distance between two three-band colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EuclideanColor;

impl<T: Sample> Dissimilarity<T> for EuclideanColor {
    #[inline]
    fn distance(&self, a: &[T], b: &[T]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(&x, &y)| {
                let d = x.to_f64() - y.to_f64();
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }

    fn required_bands(&self) -> Option<usize> {
        Some(3)
    }

    fn name(&self) -> &'static str {
        "euclidean color distance"
    }
}

/// Shortest distance around a circle of circumference `period` (hue).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularHue {
    period: f64,
}

impl CircularHue {
    /// Default hue period in degrees.
    pub const DEGREES: f64 = 360.0;

    /// Build a circular distance.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] unless `period` is finite
    /// and positive.
    pub fn new(period: f64) -> Result<Self, SegmentError> {
        if period.is_finite() && period > 0.0 {
            Ok(Self { period })
        } else {
            Err(SegmentError::invalid("hue period", period))
        }
    }

    /// Circumference of the hue circle.
    #[must_use]
    pub const fn period(&self) -> f64 {
        self.period
    }
}

impl<T: Sample> Dissimilarity<T> for CircularHue {
    #[inline]
    fn distance(&self, a: &[T], b: &[T]) -> f64 {
        let d = (a[0].to_f64() - b[0].to_f64()).abs().rem_euclid(self.period);
        d.min(self.period - d)
    }

    fn required_bands(&self) -> Option<usize> {
        Some(1)
    }

    fn name(&self) -> &'static str {
        "circular hue distance"
    }
}

/// Per-band thresholds folded into one distance.
///
/// The distance is `max_i |a_i - b_i| / t_i`, so two pixels are within a
/// local range of `1.0` exactly when every band difference is within its
/// own threshold. A zero threshold demands equality in that band.
#[derive(Debug, Clone, PartialEq)]
pub struct BandwiseRange {
    thresholds: Vec<f64>,
}

impl BandwiseRange {
    /// Build from one threshold per band.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] for an empty vector or a
    /// negative / non-finite threshold.
    pub fn new(thresholds: Vec<f64>) -> Result<Self, SegmentError> {
        if thresholds.is_empty() {
            return Err(SegmentError::invalid("per-band alpha length", 0.0));
        }
        for &t in &thresholds {
            check_range("per-band alpha", t)?;
        }
        Ok(Self { thresholds })
    }

    /// The thresholds, one per band.
    #[must_use]
    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }
}

impl<T: Sample> Dissimilarity<T> for BandwiseRange {
    fn distance(&self, a: &[T], b: &[T]) -> f64 {
        a.iter()
            .zip(b)
            .zip(&self.thresholds)
            .map(|((&x, &y), &t)| {
                let d = (x.to_f64() - y.to_f64()).abs();
                if t > 0.0 {
                    d / t
                } else if d > 0.0 {
                    f64::INFINITY
                } else {
                    0.0
                }
            })
            .fold(0.0, f64::max)
    }

    fn required_bands(&self) -> Option<usize> {
        Some(self.thresholds.len())
    }

    fn name(&self) -> &'static str {
        "per-band alpha"
    }
}

/// Selects which distance to use.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum DistanceKind {
    /// [`AbsoluteDifference`]: gray levels, or the worst band of a vector.
    #[default]
    Absolute,
    /// [`EuclideanColor`]: three-band color images.
    EuclideanColor,
    /// [`CircularHue`]: single-band hue images.
    CircularHue {
        /// Circumference of the hue circle (360 for degrees).
        period: f64,
    },
}

impl DistanceKind {
    /// Check the kind's own parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] for a non-positive hue period.
    pub fn check(self) -> Result<(), SegmentError> {
        if let Self::CircularHue { period } = self {
            CircularHue::new(period)?;
        }
        Ok(())
    }
}

impl<T: Sample> Dissimilarity<T> for DistanceKind {
    #[inline]
    fn distance(&self, a: &[T], b: &[T]) -> f64 {
        match *self {
            Self::Absolute => AbsoluteDifference.distance(a, b),
            Self::EuclideanColor => EuclideanColor.distance(a, b),
            Self::CircularHue { period } => CircularHue { period }.distance(a, b),
        }
    }

    fn required_bands(&self) -> Option<usize> {
        match self {
            Self::Absolute => None,
            Self::EuclideanColor => Some(3),
            Self::CircularHue { .. } => Some(1),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Absolute => "absolute difference",
            Self::EuclideanColor => "euclidean color distance",
            Self::CircularHue { .. } => "circular hue distance",
        }
    }
}

// ---------------------------------------------------------------------------
// Lookup table
// ---------------------------------------------------------------------------

/// A precomputed distance table indexed by packed per-band absolute
/// differences.
///
/// The index of a pixel pair is `sum_i |a_i - b_i| * levels^i`, so a lookup
/// costs one pass over the bands and no floating-point work. The table
/// holds `levels^bands` doubles: 128 MiB for 8-bit RGB. That memory is the
/// price of O(1) distances in the union-find labeler; leave the table off
/// when memory matters more than speed.
///
/// Differences are truncated to whole levels, so the table suits integer
/// samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceLut {
    levels: usize,
    bands: usize,
    table: Vec<f64>,
    name: &'static str,
}

impl DistanceLut {
    /// Largest table the constructor will allocate, in entries.
    pub const MAX_ENTRIES: usize = 1 << 25;

    /// Build a table by evaluating `f` on every difference vector.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] if `levels` or `bands` is
    /// zero or the table would exceed [`Self::MAX_ENTRIES`].
    #[allow(clippy::cast_precision_loss)]
    pub fn from_fn(
        levels: usize,
        bands: usize,
        name: &'static str,
        f: impl Fn(&[f64]) -> f64,
    ) -> Result<Self, SegmentError> {
        let size = u32::try_from(bands)
            .ok()
            .and_then(|b| levels.checked_pow(b))
            .filter(|&n| levels > 0 && bands > 0 && n <= Self::MAX_ENTRIES)
            .ok_or_else(|| SegmentError::invalid("lookup table levels", levels as f64))?;

        let mut table = Vec::with_capacity(size);
        let mut deltas = vec![0.0; bands];
        for packed in 0..size {
            let mut rest = packed;
            for d in &mut deltas {
                *d = (rest % levels) as f64;
                rest /= levels;
            }
            table.push(f(&deltas));
        }
        Ok(Self {
            levels,
            bands,
            table,
            name,
        })
    }

    /// Euclidean distance table.
    ///
    /// # Errors
    ///
    /// See [`from_fn`](Self::from_fn).
    pub fn euclidean(levels: usize, bands: usize) -> Result<Self, SegmentError> {
        Self::from_fn(levels, bands, "euclidean lookup table", |d| {
            d.iter().map(|v| v * v).sum::<f64>().sqrt()
        })
    }

    /// Largest-band-difference table.
    ///
    /// # Errors
    ///
    /// See [`from_fn`](Self::from_fn).
    pub fn chebyshev(levels: usize, bands: usize) -> Result<Self, SegmentError> {
        Self::from_fn(levels, bands, "chebyshev lookup table", |d| {
            d.iter().copied().fold(0.0, f64::max)
        })
    }

    /// Number of difference levels per band.
    #[must_use]
    pub const fn levels(&self) -> usize {
        self.levels
    }

    /// Number of entries in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the table is empty (never true for a constructed table).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn packed_index<T: Sample>(&self, a: &[T], b: &[T]) -> usize {
        let mut index = 0;
        let mut stride = 1;
        for (&x, &y) in a.iter().zip(b) {
            let delta = ((x.to_f64() - y.to_f64()).abs() as usize).min(self.levels - 1);
            index += delta * stride;
            stride *= self.levels;
        }
        index
    }
}

impl<T: Sample> Dissimilarity<T> for DistanceLut {
    #[inline]
    fn distance(&self, a: &[T], b: &[T]) -> f64 {
        self.table[self.packed_index(a, b)]
    }

    fn required_bands(&self) -> Option<usize> {
        Some(self.bands)
    }

    fn name(&self) -> &'static str {
        self.name
    }

    /// Besides the band count, every possible difference in `grid` must
    /// fall inside the table.
    fn validate(&self, grid: &Grid<T>) -> Result<(), SegmentError> {
        if self.bands != grid.bands() {
            return Err(SegmentError::band_mismatch(self.name, self.bands, grid.bands()));
        }
        if let Some((lo, hi)) = grid.sample_bounds() {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let span = (hi - lo).ceil() as usize;
            if span >= self.levels {
                return Err(SegmentError::LutOutOfRange {
                    level: span,
                    levels: self.levels,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::grid::Extent;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn absolute_difference_scalar_and_vector() {
        assert!(close(AbsoluteDifference.distance(&[3u8], &[10u8]), 7.0));
        assert!(close(AbsoluteDifference.distance(&[1u8, 9, 4], &[2u8, 3, 4]), 6.0));
    }

    #[test]
    fn euclidean_color_distance() {
        let d = EuclideanColor.distance(&[0u8, 0, 0], &[3u8, 4, 0]);
        assert!(close(d, 5.0));
    }

    #[test]
    fn euclidean_requires_three_bands() {
        let gray = Grid::from_rows(2, 1, vec![0u8, 1]).unwrap();
        let err = Dissimilarity::<u8>::validate(&EuclideanColor, &gray).unwrap_err();
        assert!(matches!(
            err,
            SegmentError::BandMismatch {
                expected: 3,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn hue_wraps_around() {
        let hue = CircularHue::new(360.0).unwrap();
        assert!(close(hue.distance(&[350.0f32], &[10.0f32]), 20.0));
        assert!(close(hue.distance(&[90.0f32], &[270.0f32]), 180.0));
        assert!(close(hue.distance(&[0.0f32], &[0.0f32]), 0.0));
    }

    #[test]
    fn hue_rejects_bad_period() {
        assert!(CircularHue::new(0.0).is_err());
        assert!(CircularHue::new(f64::NAN).is_err());
    }

    #[test]
    fn bandwise_range_normalizes_each_band() {
        let b = BandwiseRange::new(vec![2.0, 10.0, 0.0]).unwrap();
        assert!(close(b.distance(&[0u8, 0, 5], &[2u8, 5, 5]), 1.0));
        assert!(b.distance(&[0u8, 0, 5], &[0u8, 0, 6]).is_infinite());
    }

    #[test]
    fn distance_kind_matches_concrete_types() {
        let a = [10u8, 20, 30];
        let b = [13u8, 24, 30];
        assert!(close(
            DistanceKind::EuclideanColor.distance(&a, &b),
            EuclideanColor.distance(&a, &b)
        ));
        assert!(close(DistanceKind::Absolute.distance(&a, &b), 4.0));
    }

    #[test]
    fn lut_agrees_with_direct_distance() {
        let lut = DistanceLut::euclidean(16, 3).unwrap();
        assert_eq!(lut.len(), 16 * 16 * 16);
        let a = [1u8, 7, 15];
        let b = [4u8, 3, 0];
        assert!(close(lut.distance(&a, &b), EuclideanColor.distance(&a, &b)));
    }

    #[test]
    fn lut_validate_checks_range_and_bands() {
        let lut = DistanceLut::chebyshev(8, 1).unwrap();
        let ok = Grid::from_rows(2, 1, vec![0u8, 7]).unwrap();
        assert!(lut.validate(&ok).is_ok());
        let too_wide = Grid::from_rows(2, 1, vec![0u8, 8]).unwrap();
        assert!(matches!(
            lut.validate(&too_wide),
            Err(SegmentError::LutOutOfRange { level: 8, levels: 8 })
        ));
        let rgb = Grid::new(Extent::planar(1, 1), 3, vec![0u8; 3]).unwrap();
        assert!(matches!(
            lut.validate(&rgb),
            Err(SegmentError::BandMismatch { .. })
        ));
    }

    #[test]
    fn lut_refuses_oversized_tables() {
        assert!(DistanceLut::euclidean(4096, 3).is_err());
        assert!(DistanceLut::euclidean(0, 3).is_err());
    }
}
