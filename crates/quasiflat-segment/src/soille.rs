//! Soille's constrained connectivity.
//!
//! The region of a pixel is the largest `alpha'`-connected component
//! containing it, over all `alpha' <= alpha`, whose spread stays within
//! `omega` and which does not reach into a region labelled earlier. That
//! component does not depend on which of its pixels seeds it, so the
//! partition is the same for every scan order.
//!
//! # Algorithm
//!
//! Per unlabelled seed:
//!
//! 1. Label the seed and queue its neighbours keyed by their distance to
//!    it. A neighbour that already belongs to another region lowers the
//!    local-range limit below its distance instead.
//! 2. Pop the nearest candidate. When its distance exceeds the level
//!    reached so far, every pixel on the stack is final at that level:
//!    flush them to the label and raise the level.
//! 3. Push the candidate on the stack. If the spread now exceeds `omega`,
//!    or the limit no longer admits the current level, the component at
//!    this level is not admissible: drop the stack and the queue and keep
//!    only what was flushed.
//! 4. Scan the candidate's neighbours as in step 1; a pixel is queued
//!    again only if its new distance improves on the one it was queued
//!    with. The limit may have dropped, so step 3's check runs again.
//! 5. An empty queue flushes the stack.
//!
//! The local-range limit only ever decreases while a region grows.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::context::{CancelFlag, GrowthContext, RunningRange};
use crate::distance::Dissimilarity;
use crate::error::{SegmentError, check_range};
use crate::grid::{Grid, Sample};
use crate::label::{Label, PENDING, UNLABELLED};
use crate::neighbourhood::Neighbourhood;
use crate::types::{GrowerMetrics, Segmentation};

/// Upper bound on the local range of the region being grown.
///
/// Starts inclusive at `alpha`. Meeting another region at distance `d`
/// makes it exclusive at `d`: the region may only use steps strictly
/// smaller than `d`. For integer-valued distances this is `d - 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RangeLimit {
    value: f64,
    inclusive: bool,
}

impl RangeLimit {
    const fn new(alpha: f64) -> Self {
        Self {
            value: alpha,
            inclusive: true,
        }
    }

    fn admits(self, d: f64) -> bool {
        if self.inclusive {
            d <= self.value
        } else {
            d < self.value
        }
    }

    /// Forbid `d` and everything above it. Only called with admitted `d`,
    /// so the limit never rises.
    const fn tighten(&mut self, d: f64) {
        self.value = d;
        self.inclusive = false;
    }
}

/// Queue entry: nearest distance first, ties by raster index.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Reversed so `BinaryHeap` pops the smallest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Scratch buffers reused across seeds.
struct Frontier {
    heap: BinaryHeap<Candidate>,
    stack: Vec<usize>,
    /// Best distance each pixel was queued with for the current region.
    queued_at: Vec<f64>,
    touched: Vec<usize>,
}

impl Frontier {
    fn new(len: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            stack: Vec::new(),
            queued_at: vec![f64::INFINITY; len],
            touched: Vec::new(),
        }
    }

    fn offer(&mut self, index: usize, distance: f64) {
        if distance < self.queued_at[index] {
            if self.queued_at[index].is_infinite() {
                self.touched.push(index);
            }
            self.queued_at[index] = distance;
            self.heap.push(Candidate { distance, index });
        }
    }

    fn clear(&mut self) {
        self.heap.clear();
        self.stack.clear();
        for &i in &self.touched {
            self.queued_at[i] = f64::INFINITY;
        }
        self.touched.clear();
    }
}

/// The (alpha, omega) constrained-connectivity grower.
#[derive(Debug, Clone, PartialEq)]
pub struct SoilleGrower {
    neighbourhood: Neighbourhood,
    alpha: f64,
    omega: Option<f64>,
}

impl SoilleGrower {
    /// Build a grower. `omega = None` leaves the spread unbounded.
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
        let mut frontier = Frontier::new(grid.len());
        let mut range = RunningRange::new(grid.bands());
        let mut flushes = 0;
        let mut aborts = 0;

        for seed in 0..grid.len() {
            if !grid.is_present(seed) || ctx.labels.get(seed) != UNLABELLED {
                continue;
            }
            let label = ctx.open_region()?;
            ctx.labels.set(seed, label);
            range.reset();
            range.include(grid.pixel(seed));
            let mut limit = RangeLimit::new(self.alpha);
            let mut level = 0.0;
            let mut size = 1;

            self.scan(grid, distance, seed, label, &ctx, &mut limit, &mut frontier);

            let mut aborted = false;
            while let Some(Candidate { distance: d, index: q }) = frontier.heap.pop() {
                if ctx.labels.get(q) != UNLABELLED {
                    continue;
                }
                if d > level {
                    size += flush(&mut frontier.stack, &mut ctx, label);
                    flushes += 1;
                    level = d;
                }

                ctx.labels.set(q, PENDING);
                frontier.stack.push(q);
                range.include(grid.pixel(q));
                if self.exceeds(&range, limit, level) {
                    aborted = true;
                    break;
                }

                self.scan(grid, distance, q, label, &ctx, &mut limit, &mut frontier);
                if !limit.admits(level) {
                    aborted = true;
                    break;
                }
            }

            if aborted {
                for &p in &frontier.stack {
                    ctx.labels.set(p, UNLABELLED);
                }
                aborts += 1;
            } else {
                size += flush(&mut frontier.stack, &mut ctx, label);
            }
            frontier.clear();
            ctx.commit_region(label, size)?;
        }

        let labels = ctx.finish();
        tracing::debug!(regions = labels.count(), flushes, aborts, "soille growth finished");
        Ok(Segmentation {
            labels,
            metrics: GrowerMetrics::Soille { flushes, aborts },
        })
    }

    fn exceeds(&self, range: &RunningRange, limit: RangeLimit, level: f64) -> bool {
        self.omega.is_some_and(|w| range.span() > w) || !limit.admits(level)
    }

    /// Queue the unlabelled neighbours of `p` and tighten the limit on
    /// neighbours owned by other regions.
    #[allow(clippy::too_many_arguments)]
    fn scan<T: Sample, D: Dissimilarity<T>>(
        &self,
        grid: &Grid<T>,
        distance: &D,
        p: usize,
        label: Label,
        ctx: &GrowthContext<'_>,
        limit: &mut RangeLimit,
        frontier: &mut Frontier,
    ) {
        let value = grid.pixel(p);
        for q in self.neighbourhood.neighbours(grid, p) {
            let owner = ctx.labels.get(q);
            let d = distance.distance(value, grid.pixel(q));
            if owner == UNLABELLED {
                if limit.admits(d) {
                    frontier.offer(q, d);
                }
            } else if owner >= 0 && owner != label && limit.admits(d) {
                limit.tighten(d);
            }
        }
    }
}

/// Give every stacked pixel its final label; returns how many there were.
fn flush(stack: &mut Vec<usize>, ctx: &mut GrowthContext<'_>, label: Label) -> usize {
    let n = stack.len();
    for p in stack.drain(..) {
        ctx.labels.set(p, label);
    }
    n
}
