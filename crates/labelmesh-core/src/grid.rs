//! Regular voxel grid geometry.

use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

/// Geometry of a regular 3D voxel grid.
///
/// Voxel `(i, j, k)` is centered at `origin + direction * (i * sx, j * sy, k * sz)`.
/// The direction matrix stores the axis cosines as columns.
///
/// Stages copy the grid verbatim from input to output, so spacing, origin and
/// direction survive the pipeline bit-for-bit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    /// Number of voxels along each axis.
    pub dims: [usize; 3],
    /// Physical voxel size along each axis.
    pub spacing: DVec3,
    /// World position of voxel `(0, 0, 0)`.
    pub origin: DVec3,
    /// Axis direction cosines (columns).
    pub direction: DMat3,
}

impl Grid {
    /// Creates an axis-aligned grid with unit spacing at the origin.
    #[must_use]
    pub fn new(dims: [usize; 3]) -> Self {
        Self {
            dims,
            spacing: DVec3::ONE,
            origin: DVec3::ZERO,
            direction: DMat3::IDENTITY,
        }
    }

    /// Sets the voxel spacing.
    #[must_use]
    pub fn with_spacing(mut self, spacing: DVec3) -> Self {
        self.spacing = spacing;
        self
    }

    /// Sets the world origin.
    #[must_use]
    pub fn with_origin(mut self, origin: DVec3) -> Self {
        self.origin = origin;
        self
    }

    /// Sets the direction cosine matrix.
    #[must_use]
    pub fn with_direction(mut self, direction: DMat3) -> Self {
        self.direction = direction;
        self
    }

    /// Total number of voxels.
    #[must_use]
    pub fn num_voxels(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Total number of voxels, or `None` if it does not fit in `usize`.
    ///
    /// Readers call this on header-supplied dimensions before allocating.
    #[must_use]
    pub fn checked_num_voxels(&self) -> Option<usize> {
        self.dims[0]
            .checked_mul(self.dims[1])?
            .checked_mul(self.dims[2])
    }

    /// Linear index of voxel `(i, j, k)` (x varies fastest).
    #[inline]
    #[must_use]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.dims[1] + j) * self.dims[0] + i
    }

    /// Inverse of [`Grid::index`].
    #[inline]
    #[must_use]
    pub fn coords(&self, index: usize) -> [usize; 3] {
        let i = index % self.dims[0];
        let rest = index / self.dims[0];
        [i, rest % self.dims[1], rest / self.dims[1]]
    }

    /// Maps a (possibly fractional) index-space position to world space.
    #[must_use]
    pub fn index_to_world(&self, p: DVec3) -> DVec3 {
        self.origin + self.direction * (p * self.spacing)
    }

    /// Returns a grid with `pad` extra voxels on every side and the origin moved so
    /// that existing voxels keep their world positions.
    #[must_use]
    pub fn padded(&self, pad: usize) -> Self {
        let shift = DVec3::splat(pad as f64);
        Self {
            dims: [
                self.dims[0] + 2 * pad,
                self.dims[1] + 2 * pad,
                self.dims[2] + 2 * pad,
            ],
            origin: self.index_to_world(-shift),
            ..*self
        }
    }

    /// Whether the direction matrix flips handedness.
    #[must_use]
    pub fn is_left_handed(&self) -> bool {
        self.direction.determinant() < 0.0
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new([0, 0, 0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        let grid = Grid::new([4, 3, 5]);
        for index in 0..grid.num_voxels() {
            let [i, j, k] = grid.coords(index);
            assert_eq!(grid.index(i, j, k), index);
        }
        assert_eq!(grid.index(1, 0, 0), 1);
        assert_eq!(grid.index(0, 1, 0), 4);
        assert_eq!(grid.index(0, 0, 1), 12);
    }

    #[test]
    fn test_checked_num_voxels() {
        assert_eq!(Grid::new([4, 3, 2]).checked_num_voxels(), Some(24));
        assert_eq!(Grid::new([0, 3, 2]).checked_num_voxels(), Some(0));
        assert_eq!(Grid::new([usize::MAX, 2, 1]).checked_num_voxels(), None);
        assert_eq!(Grid::new([usize::MAX / 2, 1, 3]).checked_num_voxels(), None);
    }

    #[test]
    fn test_index_to_world() {
        let grid = Grid::new([2, 2, 2])
            .with_spacing(DVec3::new(0.5, 2.0, 1.0))
            .with_origin(DVec3::new(10.0, 0.0, -1.0))
            .with_direction(DMat3::from_diagonal(DVec3::new(-1.0, -1.0, 1.0)));
        let w = grid.index_to_world(DVec3::new(1.0, 1.0, 1.0));
        assert_eq!(w, DVec3::new(9.5, -2.0, 0.0));
        assert!(!grid.is_left_handed());
    }

    #[test]
    fn test_padded_keeps_world_positions() {
        let grid = Grid::new([3, 3, 3]).with_spacing(DVec3::new(0.5, 0.5, 2.0));
        let padded = grid.padded(1);
        assert_eq!(padded.dims, [5, 5, 5]);
        let a = grid.index_to_world(DVec3::ZERO);
        let b = padded.index_to_world(DVec3::ONE);
        assert!((a - b).length() < 1e-12);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn index_and_coords_are_inverse(
                dims in prop::array::uniform3(1_usize..12),
                seed in 0_usize..10_000,
            ) {
                let grid = Grid::new(dims);
                let index = seed % grid.num_voxels();
                let [i, j, k] = grid.coords(index);
                prop_assert!(i < dims[0] && j < dims[1] && k < dims[2]);
                prop_assert_eq!(grid.index(i, j, k), index);
            }
        }
    }
}
