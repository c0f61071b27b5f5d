//! Adaptive-threshold growth under logical predicates.
//!
//! For each seed the grower looks for the largest integer threshold
//! `alpha' <= alpha` at which the zone grown from the seed satisfies every
//! predicate. Instead of deriving that threshold it bisects it:
//!
//! - Growth at the trial threshold adds a neighbour when it is within the
//!   threshold of the pixel that reached it. Local predicates are checked
//!   after every addition and a failure ends the attempt at once.
//! - When the zone stops growing the global predicates are checked.
//! - A failed attempt lowers the upper end of the bracket to the trial
//!   threshold; a successful one raises the lower end. The next trial is
//!   the midpoint.
//! - The search stops after a success one below the upper end, which
//!   commits the zone. A failure one above the lower end regrows the zone
//!   once at the lower end and commits it. When nothing was proven
//!   admissible the seed is committed alone.
//!
//! Every attempt starts from the seed alone: zone members go back to
//! unlabelled and the predicate accumulators are reset.
//!
//! The bisection assumes that predicates are monotone (see
//! [`crate::predicate`]); a non-monotone set is accepted with a warning.

use crate::context::{CancelFlag, GrowthContext};
use crate::distance::Dissimilarity;
use crate::error::{SegmentError, check_range};
use crate::grid::{Grid, Sample};
use crate::label::{LabelImage, PENDING, UNLABELLED};
use crate::neighbourhood::Neighbourhood;
use crate::predicate::{Predicate, PredicateKind, PredicateSet};
use crate::types::{GrowerMetrics, Segmentation};

/// Largest threshold the bisection works with.
const MAX_THRESHOLD: i64 = 1 << 52;

// ---------------------------------------------------------------------------
// Threshold bracket and per-zone state machine
// ---------------------------------------------------------------------------

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Grow again at the new trial threshold.
    Retry,
    /// The last attempt is the largest admissible zone.
    Converged,
    /// The lower end is the largest admissible threshold; regrow there and
    /// commit.
    Restore,
    /// No threshold is admissible; keep the seed alone.
    Exhausted,
}

/// Integer bisection bracket `min < current < max`.
///
/// `min` starts at `-1` (nothing proven admissible) and `max` one above the
/// configured threshold, so the first trial is the configured threshold
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AlphaBracket {
    min: i64,
    current: i64,
    max: i64,
}

impl AlphaBracket {
    pub(crate) const fn new(upper: i64) -> Self {
        Self {
            min: -1,
            current: upper,
            max: upper + 1,
        }
    }

    pub(crate) const fn current(self) -> i64 {
        self.current
    }

    pub(crate) const fn width(self) -> i64 {
        self.max - self.min
    }

    /// The attempt at `current` broke a predicate.
    const fn violated(&mut self) -> Step {
        self.max = self.current;
        if self.max - self.min == 1 {
            // No untried threshold is left between the ends.
            self.current = self.min;
            return if self.min < 0 {
                Step::Exhausted
            } else {
                Step::Restore
            };
        }
        self.current = (self.min + self.max).div_euclid(2);
        Step::Retry
    }

    /// The attempt at `current` satisfied every predicate.
    const fn validated(&mut self) -> Step {
        self.min = self.current;
        if self.current + 1 == self.max {
            Step::Converged
        } else {
            self.current = (self.min + self.max).div_euclid(2);
            Step::Retry
        }
    }
}

/// Lifecycle of one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZoneState {
    Growing,
    Reset,
    Restoring,
    Committed,
}

/// A zone the bracket search can regrow.
pub(crate) trait Zone {
    /// Grow from the seed alone at `threshold`; whether every predicate
    /// held.
    fn grow(&mut self, threshold: f64) -> bool;

    /// Release every member back to unlabelled.
    fn release(&mut self);

    /// Release everything, then claim the seed alone.
    fn isolate_seed(&mut self);
}

/// Attempts spent settling one zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Settled {
    pub attempts: usize,
    pub resets: usize,
}

/// Run the bracket search for one seed. On return the zone holds the
/// members to commit.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn settle<Z: Zone>(zone: &mut Z, upper: i64) -> Settled {
    let mut bracket = AlphaBracket::new(upper);
    let mut settled = Settled::default();
    let mut state = ZoneState::Growing;
    loop {
        state = match state {
            ZoneState::Growing => {
                settled.attempts += 1;
                let held = zone.grow(bracket.current() as f64);
                let before = bracket.width();
                let step = if held {
                    bracket.validated()
                } else {
                    bracket.violated()
                };
                debug_assert!(bracket.width() < before);
                match step {
                    Step::Retry => ZoneState::Reset,
                    Step::Converged => ZoneState::Committed,
                    Step::Restore => ZoneState::Restoring,
                    Step::Exhausted => {
                        zone.isolate_seed();
                        ZoneState::Committed
                    }
                }
            }
            ZoneState::Reset => {
                settled.resets += 1;
                zone.release();
                ZoneState::Growing
            }
            ZoneState::Restoring => {
                // Already validated at this threshold; the result is known.
                settled.resets += 1;
                settled.attempts += 1;
                zone.release();
                zone.grow(bracket.current() as f64);
                ZoneState::Committed
            }
            ZoneState::Committed => return settled,
        }
    }
}

/// Integer upper end of the search for a validated `alpha`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn upper_threshold(alpha: f64) -> i64 {
    (alpha.floor() as i64).min(MAX_THRESHOLD)
}

/// Running totals over all zones.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SearchTotals {
    resets: usize,
    iterations: usize,
    max_iterations: usize,
}

impl SearchTotals {
    pub(crate) fn add(&mut self, settled: Settled) {
        self.resets += settled.resets;
        self.iterations += settled.attempts;
        self.max_iterations = self.max_iterations.max(settled.attempts);
    }

    pub(crate) const fn metrics(self) -> GrowerMetrics {
        GrowerMetrics::Adaptive {
            resets: self.resets,
            iterations: self.iterations,
            max_iterations: self.max_iterations,
        }
    }
}

// ---------------------------------------------------------------------------
// Pixel-level grower
// ---------------------------------------------------------------------------

/// Adaptive-threshold grower over pixels.
#[derive(Debug, Clone)]
pub struct AdaptiveGrower<P = PredicateKind> {
    neighbourhood: Neighbourhood,
    alpha: f64,
    predicates: PredicateSet<P>,
}

impl<P: Predicate + Clone> AdaptiveGrower<P> {
    /// Build a grower searching thresholds in `[0, floor(alpha)]`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] for a negative or
    /// non-finite `alpha`.
    pub fn new(
        neighbourhood: Neighbourhood,
        alpha: f64,
        predicates: PredicateSet<P>,
    ) -> Result<Self, SegmentError> {
        Ok(Self {
            neighbourhood,
            alpha: check_range("alpha", alpha)?,
            predicates,
        })
    }

    /// Segment `grid`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::BandMismatch`] if the distance or the
    /// predicate set was built for another band count,
    /// [`SegmentError::Cancelled`] if `cancel` is raised, or
    /// [`SegmentError::TooManyLabels`].
    pub fn segment<T: Sample, D: Dissimilarity<T>>(
        &self,
        grid: &Grid<T>,
        distance: &D,
        cancel: Option<&CancelFlag>,
    ) -> Result<Segmentation, SegmentError> {
        distance.validate(grid)?;
        if self.predicates.stats().bands() != grid.bands() {
            return Err(SegmentError::band_mismatch(
                "predicate set",
                self.predicates.stats().bands(),
                grid.bands(),
            ));
        }
        self.predicates.warn_if_not_monotone();

        let upper = upper_threshold(self.alpha);
        let mut ctx = GrowthContext::new(grid.extent(), cancel);
        let mut predicates = self.predicates.clone();
        let mut members = Vec::new();
        let mut totals = SearchTotals::default();

        for seed in 0..grid.len() {
            if !grid.is_present(seed) || ctx.labels.get(seed) != UNLABELLED {
                continue;
            }
            let mut zone = PixelZone {
                grid,
                distance,
                neighbourhood: &self.neighbourhood,
                labels: &mut ctx.labels,
                predicates: &mut predicates,
                members: &mut members,
                seed,
            };
            totals.add(settle(&mut zone, upper));

            let label = ctx.open_region()?;
            let size = members.len();
            for p in members.drain(..) {
                ctx.labels.set(p, label);
            }
            ctx.commit_region(label, size)?;
        }

        let labels = ctx.finish();
        let metrics = totals.metrics();
        tracing::debug!(regions = labels.count(), ?metrics, "adaptive growth finished");
        Ok(Segmentation { labels, metrics })
    }
}

/// The zone of one seed during pixel-level growth.
struct PixelZone<'a, T, D, P> {
    grid: &'a Grid<T>,
    distance: &'a D,
    neighbourhood: &'a Neighbourhood,
    labels: &'a mut LabelImage,
    predicates: &'a mut PredicateSet<P>,
    /// Members in discovery order; doubles as the FIFO frontier.
    members: &'a mut Vec<usize>,
    seed: usize,
}

impl<T: Sample, D: Dissimilarity<T>, P: Predicate> PixelZone<'_, T, D, P> {
    fn claim(&mut self, p: usize) {
        self.labels.set(p, PENDING);
        self.members.push(p);
        self.predicates.update_on_add(self.grid.pixel(p));
    }
}

impl<T: Sample, D: Dissimilarity<T>, P: Predicate> Zone for PixelZone<'_, T, D, P> {
    fn grow(&mut self, threshold: f64) -> bool {
        let (grid, distance, neighbourhood) = (self.grid, self.distance, self.neighbourhood);
        self.release();
        self.predicates.reset();
        self.claim(self.seed);
        if !self.predicates.check_local() {
            return false;
        }
        let mut head = 0;
        let mut found = Vec::new();
        while head < self.members.len() {
            let p = self.members[head];
            head += 1;
            let value = grid.pixel(p);
            found.clear();
            found.extend(neighbourhood.neighbours(grid, p).filter(|&q| {
                self.labels.get(q) == UNLABELLED
                    && distance.distance(value, grid.pixel(q)) <= threshold
            }));
            for &q in &found {
                if self.labels.get(q) != UNLABELLED {
                    continue;
                }
                self.claim(q);
                if !self.predicates.check_local() {
                    return false;
                }
            }
        }
        self.predicates.check_global()
    }

    fn release(&mut self) {
        for p in self.members.drain(..) {
            self.labels.set(p, UNLABELLED);
        }
    }

    fn isolate_seed(&mut self) {
        self.release();
        self.predicates.reset();
        self.claim(self.seed);
    }
}
