//! Logical predicates over a growing zone.
//!
//! The adaptive growers accept any zone for which every predicate holds.
//! Predicates never accumulate anything themselves: a [`PredicateSet`]
//! owns one [`ZoneStats`] accumulator and evaluates each predicate against
//! it, so resetting a zone is a single [`PredicateSet::reset`].
//!
//! # Local and global predicates
//!
//! A [`Scope::Local`] predicate is checked every time a pixel (or region)
//! joins the zone; a failure aborts the current growth attempt at once.
//! A [`Scope::Global`] predicate is checked only when the zone has stopped
//! growing.
//!
//! # Monotonicity
//!
//! The adaptive search bisects the threshold, which is only sound if a
//! predicate that holds for a zone also holds for every zone grown at a
//! smaller threshold. [`Predicate::is_monotone`] declares this; sets
//! containing a non-monotone predicate still run but may settle on a
//! threshold that is not the largest admissible one.

use serde::{Deserialize, Serialize};

use crate::error::{SegmentError, check_range};
use crate::grid::Sample;

/// Order-insensitive running statistics of a zone.
///
/// Every field is a sum, minimum or maximum, so the result does not depend
/// on the order pixels are added or zones are merged.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneStats {
    count: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    min: Vec<f64>,
    max: Vec<f64>,
}

impl ZoneStats {
    /// Empty statistics for `bands`-band pixels.
    #[must_use]
    pub fn new(bands: usize) -> Self {
        Self {
            count: 0,
            sum: vec![0.0; bands],
            sum_sq: vec![0.0; bands],
            min: vec![f64::INFINITY; bands],
            max: vec![f64::NEG_INFINITY; bands],
        }
    }

    /// Forget every pixel.
    pub fn reset(&mut self) {
        self.count = 0;
        self.sum.fill(0.0);
        self.sum_sq.fill(0.0);
        self.min.fill(f64::INFINITY);
        self.max.fill(f64::NEG_INFINITY);
    }

    /// Account for one more pixel.
    pub fn add_pixel<T: Sample>(&mut self, pixel: &[T]) {
        self.count += 1;
        for (b, s) in pixel.iter().enumerate() {
            let v = s.to_f64();
            self.sum[b] += v;
            self.sum_sq[b] += v * v;
            self.min[b] = self.min[b].min(v);
            self.max[b] = self.max[b].max(v);
        }
    }

    /// Account for every pixel of another zone.
    pub fn merge(&mut self, other: &Self) {
        self.count += other.count;
        for b in 0..self.sum.len() {
            self.sum[b] += other.sum[b];
            self.sum_sq[b] += other.sum_sq[b];
            self.min[b] = self.min[b].min(other.min[b]);
            self.max[b] = self.max[b].max(other.max[b]);
        }
    }

    /// Samples per pixel.
    #[must_use]
    pub fn bands(&self) -> usize {
        self.sum.len()
    }

    /// Pixels in the zone.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Largest per-band `max - min`; zero for an empty zone.
    #[must_use]
    pub fn range(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.min
            .iter()
            .zip(&self.max)
            .map(|(lo, hi)| hi - lo)
            .fold(0.0, f64::max)
    }

    /// Per-band mean; empty for an empty zone.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Vec<f64> {
        if self.count == 0 {
            return Vec::new();
        }
        let n = self.count as f64;
        self.sum.iter().map(|s| s / n).collect()
    }

    /// Largest per-band population variance; zero for an empty zone.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        self.sum
            .iter()
            .zip(&self.sum_sq)
            .map(|(s, sq)| {
                let mean = s / n;
                (sq / n - mean * mean).max(0.0)
            })
            .fold(0.0, f64::max)
    }
}

/// When a predicate is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// After every addition.
    Local,
    /// Once the zone stops growing.
    Global,
}

/// A yes/no test on a zone's statistics.
pub trait Predicate {
    /// Whether the zone described by `stats` is acceptable.
    fn check(&self, stats: &ZoneStats) -> bool;

    /// Whether the predicate can only switch from true to false as a zone
    /// grows.
    fn is_monotone(&self) -> bool {
        true
    }

    /// Short name for logs and reports.
    fn name(&self) -> &'static str;
}

/// The built-in predicates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PredicateKind {
    /// Largest per-band spread stays within `omega` (the global range).
    Range {
        /// Maximum `max - min`.
        omega: f64,
    },
    /// Largest per-band variance stays within `limit`.
    ///
    /// Adding a pixel close to the mean lowers the variance, so this
    /// predicate is not monotone.
    Variance {
        /// Maximum population variance.
        limit: f64,
    },
    /// The zone holds at most `pixels` pixels.
    MaxSize {
        /// Maximum pixel count.
        pixels: usize,
    },
}

impl PredicateKind {
    /// Check the predicate's own parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] for a negative or
    /// non-finite bound, or a zero size limit.
    pub fn check(self) -> Result<(), SegmentError> {
        match self {
            Self::Range { omega } => check_range("range predicate omega", omega).map(drop),
            Self::Variance { limit } => check_range("variance limit", limit).map(drop),
            Self::MaxSize { pixels: 0 } => Err(SegmentError::invalid("size limit", 0.0)),
            Self::MaxSize { .. } => Ok(()),
        }
    }
}

impl Predicate for PredicateKind {
    fn check(&self, stats: &ZoneStats) -> bool {
        match *self {
            Self::Range { omega } => stats.range() <= omega,
            Self::Variance { limit } => stats.variance() <= limit,
            Self::MaxSize { pixels } => stats.count() <= pixels,
        }
    }

    fn is_monotone(&self) -> bool {
        !matches!(self, Self::Variance { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Range { .. } => "range",
            Self::Variance { .. } => "variance",
            Self::MaxSize { .. } => "max size",
        }
    }
}

/// Local and global predicates plus the zone accumulator they read.
#[derive(Debug, Clone)]
pub struct PredicateSet<P = PredicateKind> {
    local: Vec<P>,
    global: Vec<P>,
    stats: ZoneStats,
}

impl<P: Predicate> PredicateSet<P> {
    /// An empty set for `bands`-band pixels. An empty set accepts every
    /// zone.
    #[must_use]
    pub fn new(bands: usize) -> Self {
        Self {
            local: Vec::new(),
            global: Vec::new(),
            stats: ZoneStats::new(bands),
        }
    }

    /// Add a predicate with the given scope.
    #[must_use]
    pub fn with(mut self, scope: Scope, predicate: P) -> Self {
        match scope {
            Scope::Local => self.local.push(predicate),
            Scope::Global => self.global.push(predicate),
        }
        self
    }

    /// Every predicate with its scope.
    pub fn predicates(&self) -> impl Iterator<Item = (Scope, &P)> {
        self.local
            .iter()
            .map(|p| (Scope::Local, p))
            .chain(self.global.iter().map(|p| (Scope::Global, p)))
    }

    /// Whether every predicate declares itself monotone.
    #[must_use]
    pub fn is_monotone(&self) -> bool {
        self.predicates().all(|(_, p)| p.is_monotone())
    }

    /// The accumulated zone statistics.
    #[must_use]
    pub const fn stats(&self) -> &ZoneStats {
        &self.stats
    }

    /// Start a new zone.
    pub fn reset(&mut self) {
        self.stats.reset();
    }

    /// A pixel joined the zone.
    pub fn update_on_add<T: Sample>(&mut self, pixel: &[T]) {
        self.stats.add_pixel(pixel);
    }

    /// A whole region joined the zone.
    pub fn update_on_merge(&mut self, region: &ZoneStats) {
        self.stats.merge(region);
    }

    /// Whether every local predicate holds.
    #[must_use]
    pub fn check_local(&self) -> bool {
        self.local.iter().all(|p| p.check(&self.stats))
    }

    /// Whether every global predicate holds.
    #[must_use]
    pub fn check_global(&self) -> bool {
        self.global.iter().all(|p| p.check(&self.stats))
    }

    /// Emit one warning if the bisection cannot be trusted.
    pub(crate) fn warn_if_not_monotone(&self) {
        if let Some((_, p)) = self.predicates().find(|(_, p)| !p.is_monotone()) {
            tracing::warn!(
                predicate = p.name(),
                "non-monotone predicate: adaptive threshold may not be maximal"
            );
        }
    }
}
