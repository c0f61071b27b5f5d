//! Neighbourhoods: fixed sets of relative offsets between pixels.
//!
//! A [`Neighbourhood`] is an immutable ordered list of non-zero offsets.
//! The presets mirror the usual connectivities: 4 and 8 in the XY plane,
//! and their temporal extensions 6 (4 + previous/next frame) and 10
//! (8 + previous/next frame).

use serde::{Deserialize, Serialize};

use crate::error::SegmentError;
use crate::grid::{Coord, Extent, Grid, Sample};

/// A relative pixel offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Offset {
    /// Column delta.
    pub dx: isize,
    /// Row delta.
    pub dy: isize,
    /// Depth delta.
    pub dz: isize,
    /// Time delta.
    pub dt: isize,
}

impl Offset {
    /// A planar offset.
    #[must_use]
    pub const fn planar(dx: isize, dy: isize) -> Self {
        Self {
            dx,
            dy,
            dz: 0,
            dt: 0,
        }
    }

    /// A temporal offset (same XY position, `dt` frames away).
    #[must_use]
    pub const fn temporal(dt: isize) -> Self {
        Self {
            dx: 0,
            dy: 0,
            dz: 0,
            dt,
        }
    }

    /// Whether every component is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.dx == 0 && self.dy == 0 && self.dz == 0 && self.dt == 0
    }

    /// Whether a pixel at `p + self` is visited before `p` in X-fastest
    /// raster order.
    #[must_use]
    pub const fn precedes(self) -> bool {
        if self.dt != 0 {
            return self.dt < 0;
        }
        if self.dz != 0 {
            return self.dz < 0;
        }
        if self.dy != 0 {
            return self.dy < 0;
        }
        self.dx < 0
    }

    /// The opposite offset.
    #[must_use]
    pub const fn negated(self) -> Self {
        Self {
            dx: -self.dx,
            dy: -self.dy,
            dz: -self.dz,
            dt: -self.dt,
        }
    }

    /// Apply the offset to `coord`, returning the target if it lies inside
    /// `extent`.
    #[must_use]
    pub fn apply(self, coord: Coord, extent: Extent) -> Option<Coord> {
        let step = |v: usize, d: isize, len: usize| {
            v.checked_add_signed(d).filter(|&n| n < len)
        };
        Some(Coord {
            x: step(coord.x, self.dx, extent.x)?,
            y: step(coord.y, self.dy, extent.y)?,
            z: step(coord.z, self.dz, extent.z)?,
            t: step(coord.t, self.dt, extent.t)?,
        })
    }
}

/// Selects a preset neighbourhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Connectivity {
    /// North, south, east, west.
    #[default]
    Four,
    /// All eight planar neighbours.
    Eight,
    /// `Four` plus the same pixel in the previous and next time step.
    SixTemporal,
    /// `Eight` plus the same pixel in the previous and next time step.
    TenTemporal,
}

impl Connectivity {
    /// Build the neighbourhood for this connectivity.
    #[must_use]
    pub fn neighbourhood(self) -> Neighbourhood {
        let four = [
            Offset::planar(-1, 0),
            Offset::planar(0, -1),
            Offset::planar(1, 0),
            Offset::planar(0, 1),
        ];
        let diagonals = [
            Offset::planar(-1, -1),
            Offset::planar(1, -1),
            Offset::planar(-1, 1),
            Offset::planar(1, 1),
        ];
        let temporal = [Offset::temporal(-1), Offset::temporal(1)];

        let mut offsets = four.to_vec();
        if matches!(self, Self::Eight | Self::TenTemporal) {
            offsets.extend_from_slice(&diagonals);
        }
        if matches!(self, Self::SixTemporal | Self::TenTemporal) {
            offsets.extend_from_slice(&temporal);
        }
        Neighbourhood { offsets }
    }
}

/// An immutable, ordered list of non-zero offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbourhood {
    offsets: Vec<Offset>,
}

impl Neighbourhood {
    /// Build a custom neighbourhood.
    ///
    /// Duplicate offsets are kept once, in first-seen order.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::ZeroOffset`] if any offset is zero.
    pub fn new(offsets: impl IntoIterator<Item = Offset>) -> Result<Self, SegmentError> {
        let mut unique: Vec<Offset> = Vec::new();
        for offset in offsets {
            if offset.is_zero() {
                return Err(SegmentError::ZeroOffset);
            }
            if !unique.contains(&offset) {
                unique.push(offset);
            }
        }
        Ok(Self { offsets: unique })
    }

    /// The offsets in order.
    #[must_use]
    pub fn offsets(&self) -> &[Offset] {
        &self.offsets
    }

    /// Number of offsets.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether the neighbourhood has no offsets.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// The half of the neighbourhood that is already visited during a
    /// forward raster scan.
    ///
    /// Offsets whose opposite is missing are still included when they
    /// precede, so asymmetric neighbourhoods stay usable by the labeler.
    #[must_use]
    pub fn causal(&self) -> Self {
        Self {
            offsets: self
                .offsets
                .iter()
                .copied()
                .filter(|o| o.precedes())
                .collect(),
        }
    }

    /// Whether every offset's opposite is also in the neighbourhood.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.offsets
            .iter()
            .all(|o| self.offsets.contains(&o.negated()))
    }

    /// In-bounds, present neighbours of the pixel at `index`, as linear
    /// indices.
    pub fn neighbours<'a, T: Sample>(
        &'a self,
        grid: &'a Grid<T>,
        index: usize,
    ) -> impl Iterator<Item = usize> + 'a {
        let extent = grid.extent();
        let coord = extent.coord_of(index);
        self.offsets.iter().filter_map(move |o| {
            let target = o.apply(coord, extent)?;
            let n = extent.index_of(target)?;
            grid.is_present(n).then_some(n)
        })
    }
}

impl Default for Neighbourhood {
    fn default() -> Self {
        Connectivity::default().neighbourhood()
    }
}

impl From<Connectivity> for Neighbourhood {
    fn from(value: Connectivity) -> Self {
        value.neighbourhood()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn preset_sizes() {
        assert_eq!(Connectivity::Four.neighbourhood().len(), 4);
        assert_eq!(Connectivity::Eight.neighbourhood().len(), 8);
        assert_eq!(Connectivity::SixTemporal.neighbourhood().len(), 6);
        assert_eq!(Connectivity::TenTemporal.neighbourhood().len(), 10);
    }

    #[test]
    fn presets_are_symmetric_and_nonzero() {
        for c in [
            Connectivity::Four,
            Connectivity::Eight,
            Connectivity::SixTemporal,
            Connectivity::TenTemporal,
        ] {
            let n = c.neighbourhood();
            assert!(n.is_symmetric(), "{c:?} should be symmetric");
            assert!(n.offsets().iter().all(|o| !o.is_zero()));
        }
    }

    #[test]
    fn causal_half_is_exactly_half_for_symmetric_sets() {
        let n = Connectivity::TenTemporal.neighbourhood();
        assert_eq!(n.causal().len(), 5);
        assert!(n.causal().offsets().iter().all(|o| o.precedes()));
    }

    #[test]
    fn zero_offset_is_rejected() {
        let result = Neighbourhood::new([Offset::planar(1, 0), Offset::planar(0, 0)]);
        assert_eq!(result, Err(SegmentError::ZeroOffset));
    }

    #[test]
    fn duplicates_are_collapsed() {
        let n = Neighbourhood::new([Offset::planar(1, 0), Offset::planar(1, 0)]).unwrap();
        assert_eq!(n.len(), 1);
    }

    #[test]
    fn neighbours_clip_to_bounds() {
        let grid = Grid::from_rows(3, 3, vec![0u8; 9]).unwrap();
        let n = Connectivity::Eight.neighbourhood();
        assert_eq!(n.neighbours(&grid, 0).count(), 3);
        assert_eq!(n.neighbours(&grid, 4).count(), 8);
    }

    #[test]
    fn neighbours_skip_absent_pixels() {
        let grid = Grid::from_rows(3, 1, vec![0u8; 3])
            .unwrap()
            .with_mask(vec![true, true, false])
            .unwrap();
        let n = Connectivity::Four.neighbourhood();
        let found: Vec<usize> = n.neighbours(&grid, 1).collect();
        assert_eq!(found, vec![0]);
    }

    #[test]
    fn temporal_neighbours_cross_frames() {
        let grid = Grid::new(Extent::new(2, 2, 1, 3), 1, vec![0u8; 12]).unwrap();
        let n = Connectivity::SixTemporal.neighbourhood();
        // Middle frame, pixel (0, 0): right, down, previous and next frame.
        let index = grid.extent().index_of(Coord { x: 0, y: 0, z: 0, t: 1 }).unwrap();
        assert_eq!(n.neighbours(&grid, index).count(), 4);
    }
}
