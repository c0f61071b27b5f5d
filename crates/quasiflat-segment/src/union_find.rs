//! Two-pass union-find labeling of alpha-connected components.
//!
//! Two present pixels share a label iff a chain of neighbours joins them in
//! which every step is within `alpha`.
//!
//! # Algorithm
//!
//! 1. **Forward pass:** visit pixels in raster order and look only at the
//!    causal half of the neighbourhood (neighbours already visited). The
//!    pixel adopts the smallest root label among its within-`alpha` causal
//!    neighbours and every other such root is merged into it. Without a
//!    match the pixel opens a fresh provisional label.
//! 2. **Compression:** resolve labels from highest to lowest, following
//!    each chain to its root and flattening it. A chain that loops back on
//!    itself is collapsed onto its smallest member instead of being followed
//!    forever.
//! 3. **Renumbering:** surviving roots become the dense range
//!    `[0, count)` in increasing provisional order, which is the order of
//!    first appearance in the scan.
//! 4. **Rewrite pass:** every pixel takes the final label of its
//!    provisional label.
//!
//! Distances are evaluated through any [`Dissimilarity`]; a
//! [`DistanceLut`](crate::DistanceLut) makes each test a table lookup.

use crate::context::CancelFlag;
use crate::distance::Dissimilarity;
use crate::error::{SegmentError, check_range};
use crate::grid::{Grid, Sample};
use crate::label::{Label, LabelImage, region_label};
use crate::neighbourhood::Neighbourhood;
use crate::types::{GrowerMetrics, Segmentation};

/// Marker for pixels without a provisional label (absent pixels).
const NO_LABEL: usize = usize::MAX;

/// Union-find connected-component labeler.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionFindLabeler {
    neighbourhood: Neighbourhood,
    alpha: f64,
}

impl UnionFindLabeler {
    /// Build a labeler.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] for a negative or
    /// non-finite `alpha`.
    pub fn new(neighbourhood: Neighbourhood, alpha: f64) -> Result<Self, SegmentError> {
        Ok(Self {
            neighbourhood,
            alpha: check_range("alpha", alpha)?,
        })
    }

    /// Label `grid`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::BandMismatch`] / [`SegmentError::LutOutOfRange`]
    /// if `distance` cannot be evaluated on `grid`, and
    /// [`SegmentError::Cancelled`] if `cancel` is raised during the forward
    /// pass, or [`SegmentError::TooManyLabels`] if the components outnumber
    /// the label range.
    pub fn segment<T: Sample, D: Dissimilarity<T>>(
        &self,
        grid: &Grid<T>,
        distance: &D,
        cancel: Option<&CancelFlag>,
    ) -> Result<Segmentation, SegmentError> {
        distance.validate(grid)?;

        let causal = self.neighbourhood.causal();
        if !self.neighbourhood.is_symmetric() {
            tracing::warn!("asymmetric neighbourhood: only preceding offsets link pixels");
        }

        let n = grid.len();
        let mut provisional = vec![NO_LABEL; n];
        let mut table = EquivalenceTable::default();
        let mut unions = 0;
        let mut roots: Vec<usize> = Vec::with_capacity(causal.len());

        for p in 0..n {
            if !grid.is_present(p) {
                continue;
            }
            let value = grid.pixel(p);
            roots.clear();
            for q in causal.neighbours(grid, p) {
                if distance.distance(value, grid.pixel(q)) <= self.alpha {
                    roots.push(table.root(provisional[q]));
                }
            }

            provisional[p] = match roots.iter().copied().min() {
                Some(min) => {
                    for &r in &roots {
                        if r != min && table.root(r) != min {
                            table.set_table_min(r, min);
                            unions += 1;
                        }
                    }
                    min
                }
                None => {
                    if cancel.is_some_and(CancelFlag::is_cancelled) {
                        return Err(SegmentError::Cancelled);
                    }
                    table.push()
                }
            };
        }

        let resolved = table.resolve()?;
        let mut labels = LabelImage::unlabelled(grid.extent());
        for (p, &l) in provisional.iter().enumerate() {
            if l != NO_LABEL {
                labels.set(p, resolved.labels[l]);
            }
        }
        labels.set_count(resolved.count);

        tracing::debug!(
            regions = resolved.count,
            provisional = table.len(),
            unions,
            collapsed_cycles = resolved.collapsed_cycles,
            "union-find labeling finished"
        );

        Ok(Segmentation {
            labels,
            metrics: GrowerMetrics::UnionFind {
                provisional_labels: table.len(),
                unions,
                collapsed_cycles: resolved.collapsed_cycles,
            },
        })
    }
}

/// Provisional-label equivalence table.
///
/// `parent[i] == i` marks a root. Unions always point the larger root at
/// the smaller one, so a well-formed table has `parent[i] <= i`.
#[derive(Debug, Clone, Default)]
struct EquivalenceTable {
    parent: Vec<usize>,
}

/// Outcome of [`EquivalenceTable::resolve`].
struct Resolved {
    /// Final label of every provisional label.
    labels: Vec<Label>,
    count: usize,
    collapsed_cycles: usize,
}

impl EquivalenceTable {
    fn len(&self) -> usize {
        self.parent.len()
    }

    /// Open a new provisional label.
    fn push(&mut self) -> usize {
        let label = self.parent.len();
        self.parent.push(label);
        label
    }

    /// Follow `label` to its root. The walk is bounded by the table size.
    fn root(&self, label: usize) -> usize {
        let mut u = label;
        for _ in 0..self.parent.len() {
            let p = self.parent[u];
            if p == u {
                break;
            }
            u = p;
        }
        u
    }

    /// Point every label on `label`'s chain, root included, at `target`.
    fn point_chain(&mut self, label: usize, target: usize) {
        let mut u = label;
        for _ in 0..self.parent.len() {
            let next = self.parent[u];
            self.parent[u] = target;
            if next == u || u == target {
                break;
            }
            u = next;
        }
    }

    /// Merge the sets of `a` and `b` under the smaller of their roots and
    /// flatten both chains onto it.
    fn set_table_min(&mut self, a: usize, b: usize) -> usize {
        let min = self.root(a).min(self.root(b));
        self.point_chain(a, min);
        self.point_chain(b, min);
        min
    }

    /// Flatten every chain, collapse cycles, and renumber roots densely.
    fn resolve(&mut self) -> Result<Resolved, SegmentError> {
        let n = self.parent.len();
        let mut stamp = vec![usize::MAX; n];
        let mut collapsed_cycles = 0;

        for start in (0..n).rev() {
            let mut u = start;
            let root = loop {
                let p = self.parent[u];
                if p == u {
                    break u;
                }
                if stamp[u] == start {
                    // Back on a node of this walk: the chain is a cycle.
                    let root = self.collapse_cycle(u);
                    collapsed_cycles += 1;
                    tracing::debug!(root, "collapsed cyclic equivalence chain");
                    break root;
                }
                stamp[u] = start;
                u = p;
            };
            self.point_chain(start, root);
        }

        let mut labels = vec![0; n];
        let mut count = 0;
        for i in 0..n {
            if self.parent[i] == i {
                labels[i] = region_label(count)?;
                count += 1;
            }
        }
        for i in 0..n {
            labels[i] = labels[self.parent[i]];
        }

        Ok(Resolved {
            labels,
            count,
            collapsed_cycles,
        })
    }

    /// Make the smallest member of the cycle through `entry` its root.
    fn collapse_cycle(&mut self, entry: usize) -> usize {
        let mut min = entry;
        let mut u = self.parent[entry];
        for _ in 0..self.parent.len() {
            if u == entry {
                break;
            }
            min = min.min(u);
            u = self.parent[u];
        }
        self.parent[min] = min;
        min
    }
}
