//! Region adjacency graph and adaptive-threshold region merging.
//!
//! The graph is built once from an existing partition: one node per
//! region carrying the region's [`ZoneStats`], one edge per pair of
//! touching regions weighted by the smallest distance between two
//! neighbouring pixels across their common boundary.
//!
//! [`RegionMergeGrower`] runs the same bracket search as
//! [`AdaptiveGrower`](crate::AdaptiveGrower), but a zone grows by whole
//! regions along edges instead of pixel by pixel. Built on the flat zones
//! of a grid (union-find at `alpha = 0`) it reproduces the pixel-level
//! result while scanning each boundary only once.

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::adaptive::{SearchTotals, Zone, settle, upper_threshold};
use crate::context::{CancelFlag, GrowthContext};
use crate::distance::Dissimilarity;
use crate::error::{SegmentError, check_range};
use crate::grid::{Grid, Sample};
use crate::label::{Label, LabelImage, PENDING, UNLABELLED};
use crate::neighbourhood::Neighbourhood;
use crate::predicate::{Predicate, PredicateKind, PredicateSet, ZoneStats};
use crate::types::Segmentation;

/// Regions of a partition and their boundaries.
#[derive(Debug, Clone)]
pub struct RegionAdjacencyGraph {
    graph: UnGraph<ZoneStats, f64>,
    base: LabelImage,
}

impl RegionAdjacencyGraph {
    /// Build the graph of `labels` over `grid`.
    ///
    /// Node `r` is region `r` of `labels`. Unlabelled pixels belong to no
    /// node.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidGrid`] if `labels` and `grid` differ
    /// in extent, or a configuration error if `distance` cannot be
    /// evaluated on `grid`.
    pub fn build<T: Sample, D: Dissimilarity<T>>(
        grid: &Grid<T>,
        labels: &LabelImage,
        neighbourhood: &Neighbourhood,
        distance: &D,
    ) -> Result<Self, SegmentError> {
        if grid.extent() != labels.extent() {
            return Err(SegmentError::InvalidGrid(
                "label image and grid extents differ".into(),
            ));
        }
        distance.validate(grid)?;

        let mut graph: UnGraph<ZoneStats, f64> =
            UnGraph::with_capacity(labels.count(), labels.count() * 2);
        for _ in 0..labels.count() {
            graph.add_node(ZoneStats::new(grid.bands()));
        }

        for p in 0..grid.len() {
            let Some(a) = labels.region(p) else {
                continue;
            };
            let value = grid.pixel(p);
            graph[NodeIndex::new(a)].add_pixel(value);
            for q in neighbourhood.neighbours(grid, p) {
                let Some(b) = labels.region(q) else {
                    continue;
                };
                if a == b {
                    continue;
                }
                let d = distance.distance(value, grid.pixel(q));
                let (na, nb) = (NodeIndex::new(a), NodeIndex::new(b));
                match graph.find_edge(na, nb) {
                    Some(e) => {
                        let w = &mut graph[e];
                        *w = w.min(d);
                    }
                    None => {
                        graph.add_edge(na, nb, d);
                    }
                }
            }
        }

        tracing::debug!(
            regions = graph.node_count(),
            boundaries = graph.edge_count(),
            "region adjacency graph built"
        );
        Ok(Self {
            graph,
            base: labels.clone(),
        })
    }

    /// Number of regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of touching region pairs.
    #[must_use]
    pub fn boundary_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Statistics of region `r`.
    #[must_use]
    pub fn stats(&self, r: usize) -> &ZoneStats {
        &self.graph[NodeIndex::new(r)]
    }

    /// Regions touching `r`, with the boundary distance to each.
    pub fn neighbours(&self, r: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let n = NodeIndex::new(r);
        self.graph.edges(n).map(move |e| {
            let other = if e.source() == n {
                e.target()
            } else {
                e.source()
            };
            (other.index(), *e.weight())
        })
    }

    /// Boundary distance between `a` and `b`, if they touch.
    #[must_use]
    pub fn boundary_distance(&self, a: usize, b: usize) -> Option<f64> {
        self.graph
            .find_edge(NodeIndex::new(a), NodeIndex::new(b))
            .map(|e| self.graph[e])
    }

    /// The partition the graph was built from.
    #[must_use]
    pub const fn base(&self) -> &LabelImage {
        &self.base
    }

    fn bands(&self) -> Option<usize> {
        self.graph.node_weights().next().map(ZoneStats::bands)
    }
}

/// Adaptive-threshold grower over a [`RegionAdjacencyGraph`].
#[derive(Debug, Clone)]
pub struct RegionMergeGrower<P = PredicateKind> {
    alpha: f64,
    predicates: PredicateSet<P>,
}

impl<P: Predicate + Clone> RegionMergeGrower<P> {
    /// Build a grower searching thresholds in `[0, floor(alpha)]`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] for a negative or
    /// non-finite `alpha`.
    pub fn new(alpha: f64, predicates: PredicateSet<P>) -> Result<Self, SegmentError> {
        Ok(Self {
            alpha: check_range("alpha", alpha)?,
            predicates,
        })
    }

    /// Merge the regions of `graph` and relabel its base partition.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::BandMismatch`] if the predicate set was
    /// built for another band count, [`SegmentError::Cancelled`] if
    /// `cancel` is raised, or [`SegmentError::TooManyLabels`].
    pub fn segment(
        &self,
        graph: &RegionAdjacencyGraph,
        cancel: Option<&CancelFlag>,
    ) -> Result<Segmentation, SegmentError> {
        let bands = self.predicates.stats().bands();
        if let Some(actual) = graph.bands().filter(|&b| b != bands) {
            return Err(SegmentError::band_mismatch("predicate set", bands, actual));
        }
        self.predicates.warn_if_not_monotone();

        let upper = upper_threshold(self.alpha);
        let base = graph.base();
        let mut ctx = GrowthContext::new(base.extent(), cancel);
        let mut predicates = self.predicates.clone();
        let mut assigned: Vec<Label> = vec![UNLABELLED; graph.region_count()];
        let mut members = Vec::new();
        let mut totals = SearchTotals::default();

        for seed in 0..graph.region_count() {
            if assigned[seed] != UNLABELLED {
                continue;
            }
            let mut zone = RegionZone {
                graph,
                assigned: &mut assigned,
                predicates: &mut predicates,
                members: &mut members,
                seed,
            };
            totals.add(settle(&mut zone, upper));

            let label = ctx.open_region()?;
            let size: usize = members.iter().map(|&r| graph.stats(r).count()).sum();
            for r in members.drain(..) {
                assigned[r] = label;
            }
            ctx.commit_region(label, size)?;
        }

        for p in 0..base.extent().len() {
            if let Some(r) = base.region(p) {
                ctx.labels.set(p, assigned[r]);
            }
        }
        let labels = ctx.finish();
        let metrics = totals.metrics();
        tracing::debug!(
            regions = labels.count(),
            merged_from = graph.region_count(),
            ?metrics,
            "region merging finished"
        );
        Ok(Segmentation { labels, metrics })
    }
}

/// The zone of one seed region during merging.
struct RegionZone<'a, P> {
    graph: &'a RegionAdjacencyGraph,
    assigned: &'a mut [Label],
    predicates: &'a mut PredicateSet<P>,
    members: &'a mut Vec<usize>,
    seed: usize,
}

impl<P: Predicate> RegionZone<'_, P> {
    fn claim(&mut self, r: usize) {
        self.assigned[r] = PENDING;
        self.members.push(r);
        self.predicates.update_on_merge(self.graph.stats(r));
    }
}

impl<P: Predicate> Zone for RegionZone<'_, P> {
    fn grow(&mut self, threshold: f64) -> bool {
        let graph = self.graph;
        self.release();
        self.predicates.reset();
        self.claim(self.seed);
        if !self.predicates.check_local() {
            return false;
        }
        let mut head = 0;
        while head < self.members.len() {
            let r = self.members[head];
            head += 1;
            for (s, w) in graph.neighbours(r) {
                if w > threshold || self.assigned[s] != UNLABELLED {
                    continue;
                }
                self.claim(s);
                if !self.predicates.check_local() {
                    return false;
                }
            }
        }
        self.predicates.check_global()
    }

    fn release(&mut self) {
        for r in self.members.drain(..) {
            self.assigned[r] = UNLABELLED;
        }
    }

    fn isolate_seed(&mut self) {
        self.release();
        self.predicates.reset();
        self.claim(self.seed);
    }
}
