//! Shared types: run configuration, grower selection, and results.

use serde::{Deserialize, Serialize};

use crate::distance::DistanceKind;
use crate::error::{SegmentError, check_range};
use crate::label::LabelImage;
use crate::neighbourhood::Connectivity;
use crate::predicate::PredicateKind;

/// Selects which grower partitions the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GrowerKind {
    /// Two-pass union-find labeling of alpha-connected components.
    #[default]
    UnionFind,
    /// FIFO flood fill with the smooth (all labelled neighbours) test and an
    /// optional global range.
    Smooth,
    /// Soille's constrained connectivity: unique maximal (alpha, omega)
    /// partition.
    Soille,
    /// Adaptive-threshold predicate grower over pixels.
    Adaptive,
    /// Adaptive-threshold predicate grower over the adjacency graph of the
    /// grid's flat zones.
    AdaptiveRegions,
}

impl GrowerKind {
    /// Short name for reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UnionFind => "union-find",
            Self::Smooth => "smooth",
            Self::Soille => "soille",
            Self::Adaptive => "adaptive",
            Self::AdaptiveRegions => "adaptive-regions",
        }
    }
}

/// Local range (alpha): one threshold for the whole pixel vector, or one
/// threshold per band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocalRange {
    /// Compare [`SegmentConfig::distance`] against a single alpha.
    Uniform(f64),
    /// Per-band thresholds; every band difference must be within its own
    /// threshold. Only the union-find labeler accepts this form.
    PerBand(Vec<f64>),
}

impl Default for LocalRange {
    fn default() -> Self {
        Self::Uniform(SegmentConfig::DEFAULT_ALPHA)
    }
}

/// Configuration for a segmentation run.
///
/// # Validation
///
/// [`validate`](Self::validate) rejects negative or non-finite ranges and
/// combinations a grower cannot honour. Band-count checks need the grid
/// and happen in [`crate::segment`] before any label is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Which grower to run.
    pub grower: GrowerKind,

    /// Pixel adjacency.
    pub connectivity: Connectivity,

    /// Pixel dissimilarity.
    pub distance: DistanceKind,

    /// Local range (alpha). For the adaptive growers this is the upper end
    /// of the threshold search and is truncated to an integer.
    pub local_range: LocalRange,

    /// Global range (omega). `None` disables the constraint.
    pub global_range: Option<f64>,

    /// Predicates checked every time a pixel joins a zone (adaptive growers).
    pub local_predicates: Vec<PredicateKind>,

    /// Predicates checked once a zone stops growing (adaptive growers).
    pub global_predicates: Vec<PredicateKind>,

    /// Back the union-find labeler with a distance lookup table.
    ///
    /// Only used for integer sample types with the absolute or euclidean
    /// distance, and only while the table for the grid's sample span fits
    /// within [`DistanceLut::MAX_ENTRIES`](crate::DistanceLut::MAX_ENTRIES).
    pub use_lut: bool,
}

impl SegmentConfig {
    /// Default local range.
    pub const DEFAULT_ALPHA: f64 = 8.0;
    /// Default connectivity.
    pub const DEFAULT_CONNECTIVITY: Connectivity = Connectivity::Four;
    /// Default grower.
    pub const DEFAULT_GROWER: GrowerKind = GrowerKind::UnionFind;

    /// Scalar alpha, if the local range is uniform.
    #[must_use]
    pub const fn alpha(&self) -> Option<f64> {
        match self.local_range {
            LocalRange::Uniform(a) => Some(a),
            LocalRange::PerBand(_) => None,
        }
    }

    /// Check parameter ranges and grower compatibility.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] for a negative or
    /// non-finite alpha/omega/threshold or a non-positive hue period, and
    /// [`SegmentError::UnsupportedSetting`] for per-band alpha with a grower
    /// other than union-find.
    pub fn validate(&self) -> Result<(), SegmentError> {
        match &self.local_range {
            LocalRange::Uniform(a) => {
                check_range("alpha", *a)?;
            }
            LocalRange::PerBand(ts) => {
                if self.grower != GrowerKind::UnionFind {
                    return Err(SegmentError::UnsupportedSetting {
                        setting: "per-band alpha".into(),
                        grower: self.grower.name().into(),
                    });
                }
                for &t in ts {
                    check_range("per-band alpha", t)?;
                }
            }
        }
        if let Some(omega) = self.global_range {
            check_range("omega", omega)?;
        }
        self.distance.check()?;
        for p in self.local_predicates.iter().chain(&self.global_predicates) {
            p.check()?;
        }
        Ok(())
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            grower: Self::DEFAULT_GROWER,
            connectivity: Self::DEFAULT_CONNECTIVITY,
            distance: DistanceKind::default(),
            local_range: LocalRange::default(),
            global_range: None,
            local_predicates: Vec::new(),
            global_predicates: Vec::new(),
            use_lut: false,
        }
    }
}

/// Counters describing how a grower reached its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrowerMetrics {
    /// Union-find labeler.
    UnionFind {
        /// Labels allocated during the first pass.
        provisional_labels: usize,
        /// Equivalences recorded between distinct provisional labels.
        unions: usize,
        /// Cycles collapsed while compressing the equivalence table.
        collapsed_cycles: usize,
    },
    /// Smooth flood fill.
    Smooth {
        /// Candidates refused by the local or global range test.
        rejections: usize,
    },
    /// Soille's constrained connectivity.
    Soille {
        /// Stack flushes (range level increases).
        flushes: usize,
        /// Growth aborts caused by omega or a tightened local range.
        aborts: usize,
    },
    /// Adaptive-threshold growers.
    Adaptive {
        /// Zone resets (predicate violations and re-grows).
        resets: usize,
        /// Growth attempts over all zones.
        iterations: usize,
        /// Largest number of attempts spent on one zone.
        max_iterations: usize,
    },
}

/// Result of a segmentation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segmentation {
    /// The label image.
    pub labels: LabelImage,
    /// Grower-specific counters.
    pub metrics: GrowerMetrics,
}

impl Segmentation {
    /// Number of regions.
    #[must_use]
    pub const fn region_count(&self) -> usize {
        self.labels.count()
    }
}
