//! Flood-fill growth with the smooth local-range test.
//!
//! Regions grow one at a time from the first unlabelled pixel in raster
//! order. A pixel reached from the region is admitted only if it is within
//! `alpha` of *every* neighbour already carrying the region's label, not
//! just the pixel that discovered it, and if the region's spread stays
//! within the optional `omega`.
//!
//! A refused pixel is never offered to the same region again, but it stays
//! unlabelled and can seed or join a later region.

use std::collections::VecDeque;

use crate::context::{CancelFlag, GrowthContext, RunningRange};
use crate::distance::Dissimilarity;
use crate::error::{SegmentError, check_range};
use crate::grid::{Grid, Sample};
use crate::label::{Label, PENDING, UNLABELLED};
use crate::neighbourhood::Neighbourhood;
use crate::types::{GrowerMetrics, Segmentation};

/// Smooth-connectivity flood fill with an optional global range.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothGrower {
    neighbourhood: Neighbourhood,
    alpha: f64,
    omega: Option<f64>,
}

impl SmoothGrower {
    /// Build a grower.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] for a negative or
    /// non-finite `alpha` or `omega`.
    pub fn new(
        neighbourhood: Neighbourhood,
        alpha: f64,
        omega: Option<f64>,
    ) -> Result<Self, SegmentError> {
        Ok(Self {
            neighbourhood,
            alpha: check_range("alpha", alpha)?,
            omega: omega.map(|w| check_range("omega", w)).transpose()?,
        })
    }

    /// Segment `grid`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `distance` cannot be evaluated on
    /// `grid`, [`SegmentError::Cancelled`] if `cancel` is raised, or
    /// [`SegmentError::TooManyLabels`].
    pub fn segment<T: Sample, D: Dissimilarity<T>>(
        &self,
        grid: &Grid<T>,
        distance: &D,
        cancel: Option<&CancelFlag>,
    ) -> Result<Segmentation, SegmentError> {
        distance.validate(grid)?;

        let mut ctx = GrowthContext::new(grid.extent(), cancel);
        let mut range = RunningRange::new(grid.bands());
        let mut queue = VecDeque::new();
        // Last region that refused each pixel.
        let mut refused_by: Vec<Label> = vec![UNLABELLED; grid.len()];
        let mut rejections = 0;

        for seed in 0..grid.len() {
            if !grid.is_present(seed) || ctx.labels.get(seed) != UNLABELLED {
                continue;
            }
            let label = ctx.open_region()?;
            ctx.labels.set(seed, label);
            range.reset();
            range.include(grid.pixel(seed));
            let mut size = 1;
            self.discover(grid, distance, seed, label, &refused_by, &mut ctx, &mut queue);

            while let Some(p) = queue.pop_front() {
                if self.admits(grid, distance, p, label, &ctx, &range) {
                    ctx.labels.set(p, label);
                    range.include(grid.pixel(p));
                    size += 1;
                    self.discover(grid, distance, p, label, &refused_by, &mut ctx, &mut queue);
                } else {
                    ctx.labels.set(p, UNLABELLED);
                    refused_by[p] = label;
                    rejections += 1;
                }
            }
            ctx.commit_region(label, size)?;
        }

        let labels = ctx.finish();
        tracing::debug!(regions = labels.count(), rejections, "smooth growth finished");
        Ok(Segmentation {
            labels,
            metrics: GrowerMetrics::Smooth { rejections },
        })
    }

    /// Queue the unlabelled neighbours of `p` within `alpha` of it.
    #[allow(clippy::too_many_arguments)]
    fn discover<T: Sample, D: Dissimilarity<T>>(
        &self,
        grid: &Grid<T>,
        distance: &D,
        p: usize,
        label: Label,
        refused_by: &[Label],
        ctx: &mut GrowthContext<'_>,
        queue: &mut VecDeque<usize>,
    ) {
        let value = grid.pixel(p);
        for q in self.neighbourhood.neighbours(grid, p) {
            if ctx.labels.get(q) == UNLABELLED
                && refused_by[q] != label
                && distance.distance(value, grid.pixel(q)) <= self.alpha
            {
                ctx.labels.set(q, PENDING);
                queue.push_back(q);
            }
        }
    }

    /// The smooth test: within `alpha` of every labelled neighbour and
    /// within `omega` of the region's extremes.
    fn admits<T: Sample, D: Dissimilarity<T>>(
        &self,
        grid: &Grid<T>,
        distance: &D,
        p: usize,
        label: Label,
        ctx: &GrowthContext<'_>,
        range: &RunningRange,
    ) -> bool {
        let value = grid.pixel(p);
        if self.omega.is_some_and(|w| range.span_with(value) > w) {
            return false;
        }
        self.neighbourhood
            .neighbours(grid, p)
            .filter(|&q| ctx.labels.get(q) == label)
            .all(|q| distance.distance(value, grid.pixel(q)) <= self.alpha)
    }
}
