//! Band-interleaved pixel grids over up to four spatial/temporal axes.
//!
//! A [`Grid`] stores `bands` samples per pixel in X-fastest raster order
//! (X, then Y, then Z, then T). Pixels may be marked absent through an
//! optional presence mask; absent pixels never join a region and keep the
//! `UNLABELLED` sentinel in every output.
//!
//! Band conversion (RGB to gray, hue extraction, ...) is the caller's job.
//! The `from_*_image` constructors only copy samples out of the `image`
//! crate's buffers.

use std::fmt;

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::SegmentError;

/// A scalar sample type that can be stored in a [`Grid`].
///
/// Distances and running statistics are evaluated in `f64`, so every
/// sample type only needs a lossless (or documented lossy) widening.
pub trait Sample: Copy + PartialOrd + fmt::Debug + Send + Sync + 'static {
    /// Whether samples only take integer values (lookup tables need this).
    const INTEGRAL: bool;

    /// Widen the sample to `f64`.
    fn to_f64(self) -> f64;
}

macro_rules! impl_sample {
    ($integral:literal: $($t:ty),*) => {
        $(impl Sample for $t {
            const INTEGRAL: bool = $integral;

            #[inline]
            fn to_f64(self) -> f64 {
                f64::from(self)
            }
        })*
    };
}

impl_sample!(true: u8, u16, u32, i8, i16, i32);
impl_sample!(false: f32, f64);

/// Size of a grid along each axis. Unused axes have length 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    /// Columns.
    pub x: usize,
    /// Rows.
    pub y: usize,
    /// Depth slices.
    pub z: usize,
    /// Time steps.
    pub t: usize,
}

impl Extent {
    /// A 2-D extent (`z = t = 1`).
    #[must_use]
    pub const fn planar(x: usize, y: usize) -> Self {
        Self { x, y, z: 1, t: 1 }
    }

    /// A full 4-D extent.
    #[must_use]
    pub const fn new(x: usize, y: usize, z: usize, t: usize) -> Self {
        Self { x, y, z, t }
    }

    /// Total number of pixels, or `None` on overflow.
    #[must_use]
    pub fn checked_len(self) -> Option<usize> {
        self.x
            .checked_mul(self.y)?
            .checked_mul(self.z)?
            .checked_mul(self.t)
    }

    /// Total number of pixels.
    #[must_use]
    pub const fn len(self) -> usize {
        self.x * self.y * self.z * self.t
    }

    /// Whether the extent covers no pixels.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Linear raster index of `coord`, or `None` when it lies outside.
    #[must_use]
    pub const fn index_of(self, coord: Coord) -> Option<usize> {
        if coord.x >= self.x || coord.y >= self.y || coord.z >= self.z || coord.t >= self.t {
            return None;
        }
        Some(((coord.t * self.z + coord.z) * self.y + coord.y) * self.x + coord.x)
    }

    /// Coordinate of a linear raster index. The index must be in range.
    #[must_use]
    pub const fn coord_of(self, index: usize) -> Coord {
        let x = index % self.x;
        let rest = index / self.x;
        let y = rest % self.y;
        let rest = rest / self.y;
        let z = rest % self.z;
        let t = rest / self.z;
        Coord { x, y, z, t }
    }
}

/// A pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coord {
    /// Column.
    pub x: usize,
    /// Row.
    pub y: usize,
    /// Depth slice.
    pub z: usize,
    /// Time step.
    pub t: usize,
}

impl Coord {
    /// A 2-D coordinate.
    #[must_use]
    pub const fn planar(x: usize, y: usize) -> Self {
        Self { x, y, z: 0, t: 0 }
    }
}

/// Dense pixel container with an optional presence mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    extent: Extent,
    bands: usize,
    data: Vec<T>,
    mask: Option<Vec<bool>>,
}

impl<T: Sample> Grid<T> {
    /// Build a grid from band-interleaved samples.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidGrid`] if `bands` is zero or
    /// `data.len()` differs from `extent.len() * bands`.
    pub fn new(extent: Extent, bands: usize, data: Vec<T>) -> Result<Self, SegmentError> {
        if bands == 0 {
            return Err(SegmentError::InvalidGrid("band count must be at least 1".into()));
        }
        let expected = extent
            .checked_len()
            .and_then(|n| n.checked_mul(bands))
            .ok_or_else(|| SegmentError::InvalidGrid("extent overflows usize".into()))?;
        if data.len() != expected {
            return Err(SegmentError::InvalidGrid(format!(
                "expected {expected} samples for {extent:?} x {bands} band(s), got {}",
                data.len()
            )));
        }
        Ok(Self {
            extent,
            bands,
            data,
            mask: None,
        })
    }

    /// Build a single-band 2-D grid from row-major samples.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidGrid`] if `data.len() != width * height`.
    pub fn from_rows(width: usize, height: usize, data: Vec<T>) -> Result<Self, SegmentError> {
        Self::new(Extent::planar(width, height), 1, data)
    }

    /// Attach a presence mask (`true` = present).
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidGrid`] if the mask length differs
    /// from the pixel count.
    pub fn with_mask(mut self, mask: Vec<bool>) -> Result<Self, SegmentError> {
        if mask.len() != self.extent.len() {
            return Err(SegmentError::InvalidGrid(format!(
                "mask has {} entries for {} pixels",
                mask.len(),
                self.extent.len()
            )));
        }
        self.mask = Some(mask);
        Ok(self)
    }

    /// Grid extent.
    #[must_use]
    pub const fn extent(&self) -> Extent {
        self.extent
    }

    /// Samples per pixel.
    #[must_use]
    pub const fn bands(&self) -> usize {
        self.bands
    }

    /// Number of pixels (present or not).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.extent.len()
    }

    /// Whether the grid has no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.extent.is_empty()
    }

    /// Band-interleaved sample storage.
    #[must_use]
    pub fn samples(&self) -> &[T] {
        &self.data
    }

    /// Whether the pixel at `index` participates in segmentation.
    #[must_use]
    pub fn is_present(&self, index: usize) -> bool {
        self.mask.as_ref().is_none_or(|m| m[index])
    }

    /// Number of present pixels.
    #[must_use]
    pub fn present_count(&self) -> usize {
        self.mask
            .as_ref()
            .map_or(self.len(), |m| m.iter().filter(|&&p| p).count())
    }

    /// The pixel vector at a linear index. The index must be in range.
    #[must_use]
    pub fn pixel(&self, index: usize) -> &[T] {
        let start = index * self.bands;
        &self.data[start..start + self.bands]
    }

    /// Bounds-checked pixel access: `None` outside the grid or for an
    /// absent pixel.
    #[must_use]
    pub fn get(&self, coord: Coord) -> Option<&[T]> {
        let index = self.extent.index_of(coord)?;
        self.is_present(index).then(|| self.pixel(index))
    }

    /// Smallest and largest sample widened to `f64`, ignoring absent
    /// pixels. `None` when no pixel is present.
    #[must_use]
    pub fn sample_bounds(&self) -> Option<(f64, f64)> {
        (0..self.len())
            .filter(|&i| self.is_present(i))
            .flat_map(|i| self.pixel(i).iter().map(|s| s.to_f64()))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
            })
    }

    /// Map every sample through `f`, keeping shape and mask.
    #[must_use]
    pub fn map<U: Sample>(&self, f: impl Fn(T) -> U) -> Grid<U> {
        Grid {
            extent: self.extent,
            bands: self.bands,
            data: self.data.iter().copied().map(f).collect(),
            mask: self.mask.clone(),
        }
    }

    /// The grid with its raster order reversed along every axis.
    ///
    /// Used to check that a grower's output does not depend on scan order.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let n = self.len();
        let mut data = Vec::with_capacity(self.data.len());
        for i in (0..n).rev() {
            data.extend_from_slice(self.pixel(i));
        }
        Self {
            extent: self.extent,
            bands: self.bands,
            data,
            mask: self.mask.as_ref().map(|m| m.iter().rev().copied().collect()),
        }
    }
}

impl Grid<u8> {
    /// Copy a grayscale image into a single-band grid.
    #[must_use]
    pub fn from_gray_image(image: &GrayImage) -> Self {
        Self {
            extent: Extent::planar(image.width() as usize, image.height() as usize),
            bands: 1,
            data: image.as_raw().clone(),
            mask: None,
        }
    }

    /// Copy an RGB image into a three-band grid.
    #[must_use]
    pub fn from_rgb_image(image: &RgbImage) -> Self {
        Self {
            extent: Extent::planar(image.width() as usize, image.height() as usize),
            bands: 3,
            data: image.as_raw().clone(),
            mask: None,
        }
    }
}

impl Grid<u16> {
    /// Copy a 16-bit grayscale image into a single-band grid.
    #[must_use]
    pub fn from_gray16_image(image: &ImageBuffer<Luma<u16>, Vec<u16>>) -> Self {
        Self {
            extent: Extent::planar(image.width() as usize, image.height() as usize),
            bands: 1,
            data: image.as_raw().clone(),
            mask: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn index_and_coord_are_inverse() {
        let extent = Extent::new(3, 4, 2, 5);
        for i in 0..extent.len() {
            let c = extent.coord_of(i);
            assert_eq!(extent.index_of(c), Some(i));
        }
    }

    #[test]
    fn index_of_rejects_out_of_bounds() {
        let extent = Extent::planar(3, 2);
        assert_eq!(extent.index_of(Coord::planar(3, 0)), None);
        assert_eq!(extent.index_of(Coord::planar(0, 2)), None);
        assert_eq!(extent.index_of(Coord { x: 0, y: 0, z: 1, t: 0 }), None);
    }

    #[test]
    fn new_rejects_wrong_length() {
        let result = Grid::new(Extent::planar(2, 2), 3, vec![0u8; 11]);
        assert!(matches!(result, Err(SegmentError::InvalidGrid(_))));
    }

    #[test]
    fn new_rejects_zero_bands() {
        let result = Grid::<u8>::new(Extent::planar(2, 2), 0, Vec::new());
        assert!(matches!(result, Err(SegmentError::InvalidGrid(_))));
    }

    #[test]
    fn pixel_returns_band_vector() {
        let grid = Grid::new(Extent::planar(2, 1), 3, vec![1u8, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(grid.pixel(1), &[4, 5, 6]);
    }

    #[test]
    fn get_honours_mask_and_bounds() {
        let grid = Grid::from_rows(2, 1, vec![7u8, 9])
            .unwrap()
            .with_mask(vec![true, false])
            .unwrap();
        assert_eq!(grid.get(Coord::planar(0, 0)), Some(&[7u8][..]));
        assert_eq!(grid.get(Coord::planar(1, 0)), None);
        assert_eq!(grid.get(Coord::planar(2, 0)), None);
        assert_eq!(grid.present_count(), 1);
    }

    #[test]
    fn with_mask_rejects_wrong_length() {
        let result = Grid::from_rows(2, 1, vec![0u8, 0]).unwrap().with_mask(vec![true]);
        assert!(result.is_err());
    }

    #[test]
    fn reversed_flips_raster_order() {
        let grid = Grid::from_rows(3, 1, vec![1u8, 2, 3]).unwrap();
        assert_eq!(grid.reversed().samples(), &[3, 2, 1]);
    }

    #[test]
    fn from_rgb_image_keeps_interleaving() {
        let img = RgbImage::from_fn(2, 1, |x, _| image::Rgb([x as u8, 10, 20]));
        let grid = Grid::from_rgb_image(&img);
        assert_eq!(grid.bands(), 3);
        assert_eq!(grid.pixel(1), &[1, 10, 20]);
    }

    #[test]
    fn from_gray16_image_keeps_depth() {
        let img = ImageBuffer::from_raw(2, 2, vec![0u16, 1000, 65_535, 7]).unwrap();
        let grid = Grid::from_gray16_image(&img);
        assert_eq!(grid.extent(), Extent::planar(2, 2));
        assert_eq!(grid.pixel(2), &[65_535]);
    }

    #[test]
    fn sample_bounds_skip_absent_pixels() {
        let grid = Grid::from_rows(3, 1, vec![1u8, 200, 3])
            .unwrap()
            .with_mask(vec![true, false, true])
            .unwrap();
        assert_eq!(grid.sample_bounds(), Some((1.0, 3.0)));
    }
}
