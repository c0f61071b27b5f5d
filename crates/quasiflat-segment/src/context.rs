//! Per-run growth state shared by the growers.
//!
//! Each grower call owns exactly one [`GrowthContext`]: the label image it
//! fills, the next free label, and an optional cancellation flag that is
//! polled once per committed region. Nothing here is global.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::SegmentError;
use crate::grid::{Extent, Sample};
use crate::label::{Label, LabelImage};

/// Cooperative cancellation token.
///
/// Clones share the same flag. Growers check it after every committed
/// region and stop with [`SegmentError::Cancelled`]; no partial label image
/// is returned.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, un-cancelled flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Label image under construction plus label allocation.
pub(crate) struct GrowthContext<'a> {
    pub labels: LabelImage,
    next: Label,
    cancel: Option<&'a CancelFlag>,
}

impl<'a> GrowthContext<'a> {
    pub fn new(extent: Extent, cancel: Option<&'a CancelFlag>) -> Self {
        Self {
            labels: LabelImage::unlabelled(extent),
            next: 0,
            cancel,
        }
    }

    /// Allocate the label for a new region.
    pub fn open_region(&mut self) -> Result<Label, SegmentError> {
        let label = self.next;
        self.next = self.next.checked_add(1).ok_or(SegmentError::TooManyLabels)?;
        Ok(label)
    }

    /// Finish the region opened last; this is the cancellation point.
    pub fn commit_region(&mut self, label: Label, size: usize) -> Result<(), SegmentError> {
        tracing::trace!(label, size, "region committed");
        if self.cancel.is_some_and(CancelFlag::is_cancelled) {
            return Err(SegmentError::Cancelled);
        }
        Ok(())
    }

    pub fn finish(mut self) -> LabelImage {
        self.labels
            .set_count(usize::try_from(self.next).unwrap_or_default());
        self.labels
    }
}

/// Running per-band minimum and maximum of a growing region.
///
/// Min/max accumulation is commutative and associative, so the span does
/// not depend on the order pixels join.
#[derive(Debug, Clone)]
pub(crate) struct RunningRange {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl RunningRange {
    pub fn new(bands: usize) -> Self {
        Self {
            min: vec![f64::INFINITY; bands],
            max: vec![f64::NEG_INFINITY; bands],
        }
    }

    pub fn reset(&mut self) {
        self.min.fill(f64::INFINITY);
        self.max.fill(f64::NEG_INFINITY);
    }

    pub fn include<T: Sample>(&mut self, pixel: &[T]) {
        for ((lo, hi), s) in self.min.iter_mut().zip(&mut self.max).zip(pixel) {
            let v = s.to_f64();
            *lo = lo.min(v);
            *hi = hi.max(v);
        }
    }

    /// Largest per-band `max - min`; zero for an empty range.
    pub fn span(&self) -> f64 {
        self.min
            .iter()
            .zip(&self.max)
            .map(|(lo, hi)| hi - lo)
            .filter(|d| d.is_finite())
            .fold(0.0, f64::max)
    }

    /// Span the range would have after including `pixel`.
    pub fn span_with<T: Sample>(&self, pixel: &[T]) -> f64 {
        self.min
            .iter()
            .zip(&self.max)
            .zip(pixel)
            .map(|((lo, hi), s)| {
                let v = s.to_f64();
                hi.max(v) - lo.min(v)
            })
            .fold(0.0, f64::max)
    }
}
