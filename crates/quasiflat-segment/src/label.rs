//! The label image produced by every grower.
//!
//! Labels are non-negative `i32` values in `[0, count)`. Two reserved
//! negative sentinels mark pixels that are not (yet) part of a region:
//! [`UNLABELLED`] for never-visited or absent pixels, [`PENDING`] for
//! pixels a grower has claimed tentatively. Sentinels never survive in a
//! finished image except as [`UNLABELLED`] on absent pixels.

use image::{ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

use crate::error::SegmentError;
use crate::grid::{Extent, Grid, Sample};

/// A region label or one of the sentinels.
pub type Label = i32;

/// Pixel has not been assigned to any region.
pub const UNLABELLED: Label = -1;

/// Pixel is claimed by the region currently growing but not committed.
pub const PENDING: Label = -2;

/// Label of the `index`-th region, keeping the count representable too.
pub(crate) fn region_label(index: usize) -> Result<Label, SegmentError> {
    Label::try_from(index)
        .ok()
        .filter(|&l| l < Label::MAX)
        .ok_or(SegmentError::TooManyLabels)
}

/// Integer grid of region labels plus the region count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelImage {
    extent: Extent,
    labels: Vec<Label>,
    count: usize,
}

impl LabelImage {
    /// An image with every pixel [`UNLABELLED`].
    #[must_use]
    pub fn unlabelled(extent: Extent) -> Self {
        Self {
            extent,
            labels: vec![UNLABELLED; extent.len()],
            count: 0,
        }
    }

    /// Wrap existing labels, e.g. a segmentation produced elsewhere.
    ///
    /// Labels must be [`UNLABELLED`] or in `[0, count)` where `count` is
    /// one more than the largest label.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidGrid`] on a length mismatch, a label
    /// below [`UNLABELLED`], or a label of `i32::MAX` (the count would not
    /// fit).
    pub fn from_raw(extent: Extent, labels: Vec<Label>) -> Result<Self, SegmentError> {
        if labels.len() != extent.len() {
            return Err(SegmentError::InvalidGrid(format!(
                "{} labels for {} pixels",
                labels.len(),
                extent.len()
            )));
        }
        if labels.iter().any(|&l| l < UNLABELLED) {
            return Err(SegmentError::InvalidGrid(
                "labels must be non-negative or UNLABELLED".into(),
            ));
        }
        let count = match labels.iter().copied().max() {
            Some(m) => m.checked_add(1).ok_or_else(|| {
                SegmentError::InvalidGrid("largest label leaves no room for the count".into())
            })?,
            None => 0,
        };
        let count = usize::try_from(count).unwrap_or(0);
        Ok(Self {
            extent,
            labels,
            count,
        })
    }

    /// Extent of the labelled grid.
    #[must_use]
    pub const fn extent(&self) -> Extent {
        self.extent
    }

    /// Number of regions.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Raw labels in raster order, sentinels included.
    #[must_use]
    pub fn as_raw(&self) -> &[Label] {
        &self.labels
    }

    /// Region of the pixel at `index`, or `None` if it carries a sentinel.
    #[must_use]
    pub fn region(&self, index: usize) -> Option<usize> {
        usize::try_from(self.labels[index]).ok()
    }

    #[inline]
    pub(crate) fn get(&self, index: usize) -> Label {
        self.labels[index]
    }

    #[inline]
    pub(crate) fn set(&mut self, index: usize, label: Label) {
        self.labels[index] = label;
    }

    pub(crate) const fn set_count(&mut self, count: usize) {
        self.count = count;
    }

    /// Pixel count of every region.
    #[must_use]
    pub fn region_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.count];
        for r in (0..self.labels.len()).filter_map(|i| self.region(i)) {
            sizes[r] += 1;
        }
        sizes
    }

    /// The same partition renumbered by order of first appearance in the
    /// raster scan.
    #[must_use]
    pub fn canonical(&self) -> Self {
        let mut map = vec![UNLABELLED; self.count];
        let mut next: Label = 0;
        let labels = self
            .labels
            .iter()
            .map(|&l| match usize::try_from(l) {
                Ok(r) => {
                    if map[r] == UNLABELLED {
                        map[r] = next;
                        next += 1;
                    }
                    map[r]
                }
                Err(_) => UNLABELLED,
            })
            .collect();
        Self {
            extent: self.extent,
            labels,
            count: usize::try_from(next).unwrap_or(0),
        }
    }

    /// Whether both images describe the same partition up to renaming.
    #[must_use]
    pub fn same_partition(&self, other: &Self) -> bool {
        self.extent == other.extent && self.canonical().labels == other.canonical().labels
    }

    /// The image with its raster order reversed along every axis, matching
    /// [`Grid::reversed`].
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            extent: self.extent,
            labels: self.labels.iter().rev().copied().collect(),
            count: self.count,
        }
    }

    /// Mean-value reconstruction: every labelled pixel takes its region's
    /// per-band mean. Unlabelled pixels keep their own values.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidGrid`] if `grid` has a different extent.
    #[allow(clippy::cast_precision_loss)]
    pub fn region_means<T: Sample>(&self, grid: &Grid<T>) -> Result<Grid<f64>, SegmentError> {
        if grid.extent() != self.extent {
            return Err(SegmentError::InvalidGrid(
                "label image and grid extents differ".into(),
            ));
        }
        let bands = grid.bands();
        let mut sums = vec![0.0; self.count * bands];
        let sizes = self.region_sizes();
        for i in 0..self.labels.len() {
            if let Some(r) = self.region(i) {
                for (b, s) in grid.pixel(i).iter().enumerate() {
                    sums[r * bands + b] += s.to_f64();
                }
            }
        }
        let mut data = Vec::with_capacity(grid.samples().len());
        for i in 0..self.labels.len() {
            match self.region(i) {
                Some(r) => data.extend(
                    (0..bands).map(|b| sums[r * bands + b] / sizes[r] as f64),
                ),
                None => data.extend(grid.pixel(i).iter().map(|s| s.to_f64())),
            }
        }
        let mask = (0..grid.len()).map(|i| grid.is_present(i)).collect();
        Grid::new(self.extent, bands, data)?.with_mask(mask)
    }

    /// Convert a planar label image into an `image` buffer: background 0,
    /// region `r` stored as `r + 1`. `None` for volumes or sequences.
    #[must_use]
    pub fn to_luma32(&self) -> Option<ImageBuffer<Luma<u32>, Vec<u32>>> {
        if self.extent.z != 1 || self.extent.t != 1 {
            return None;
        }
        let width = u32::try_from(self.extent.x).ok()?;
        let height = u32::try_from(self.extent.y).ok()?;
        let raw = self
            .labels
            .iter()
            .map(|&l| u32::try_from(l).map_or(0, |v| v + 1))
            .collect();
        ImageBuffer::from_raw(width, height, raw)
    }
}
