//! Errors reported by the segmentation kernel.
//!
//! Every variant is a configuration or domain error detected before any
//! label is committed, except [`SegmentError::Cancelled`], which is raised
//! between regions when the caller asks the run to stop. Backtracking inside
//! a grower (predicate resets, Soille range aborts) is ordinary control flow
//! and never produces an error.

use serde::{Deserialize, Serialize};

/// Errors that can occur while configuring or running a segmentation.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum SegmentError {
    /// A distance, threshold vector, or lookup table expects a different
    /// number of bands than the grid provides.
    #[error("{context} expects {expected} band(s) but the grid has {actual}")]
    BandMismatch {
        /// What imposed the band requirement (e.g. `"euclidean color distance"`).
        context: String,
        /// Band count required by `context`.
        expected: usize,
        /// Band count of the grid.
        actual: usize,
    },

    /// A custom neighbourhood contained the zero offset.
    #[error("neighbourhood offsets must not contain the zero offset")]
    ZeroOffset,

    /// A numeric parameter is negative, non-finite, or otherwise out of range.
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter {
        /// Parameter name as it appears in the configuration.
        name: String,
        /// Offending value.
        value: f64,
    },

    /// A setting the selected grower cannot honour.
    #[error("{setting} is not supported by the {grower} grower")]
    UnsupportedSetting {
        /// The offending setting.
        setting: String,
        /// Grower that was selected.
        grower: String,
    },

    /// Grid or label image storage is inconsistent with its declared shape.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// A grid sample falls outside the domain of a distance lookup table.
    #[error("sample level {level} exceeds the lookup table domain of {levels} levels")]
    LutOutOfRange {
        /// Largest sample level found in the grid.
        level: usize,
        /// Number of levels per band covered by the table.
        levels: usize,
    },

    /// The run produced more regions than the label type can represent.
    #[error("region count exceeds the label range")]
    TooManyLabels,

    /// The caller cancelled the run through a [`CancelFlag`](crate::CancelFlag).
    #[error("segmentation cancelled")]
    Cancelled,
}

impl SegmentError {
    /// Shorthand for [`SegmentError::InvalidParameter`].
    pub(crate) fn invalid(name: &str, value: f64) -> Self {
        Self::InvalidParameter {
            name: name.to_owned(),
            value,
        }
    }

    /// Shorthand for [`SegmentError::BandMismatch`].
    pub(crate) fn band_mismatch(context: &str, expected: usize, actual: usize) -> Self {
        Self::BandMismatch {
            context: context.to_owned(),
            expected,
            actual,
        }
    }
}

/// Validate a non-negative, finite range parameter.
pub(crate) fn check_range(name: &str, value: f64) -> Result<f64, SegmentError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(SegmentError::invalid(name, value))
    }
}
