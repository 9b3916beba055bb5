//! Voxel volumes on a regular grid.

use crate::error::{LabelMeshError, Result};
use crate::grid::Grid;

/// Scalar types that can be stored in a [`Volume`].
pub trait Voxel: Copy + Default + PartialEq + Send + Sync + 'static {
    /// Converts to `f64` for arithmetic and serialization.
    fn to_f64(self) -> f64;

    /// Converts from `f64`, saturating at the type's range.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_voxel_int {
    ($($t:ty),*) => {$(
        impl Voxel for $t {
            #[inline]
            #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            fn from_f64(value: f64) -> Self {
                value.round() as $t
            }
        }
    )*};
}

impl_voxel_int!(u8, i8, u16, i16, u32, i32, u64, i64);

impl Voxel for f32 {
    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Voxel for f64 {
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// A dense 3D scalar field on a [`Grid`].
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    grid: Grid,
    data: Vec<T>,
}

/// Segmentation label map.
pub type LabelVolume = Volume<u16>;

/// Binary component mask (1 inside, 0 outside).
pub type MaskVolume = Volume<u8>;

/// Floating-point intensity field.
pub type ScalarVolume = Volume<f32>;

impl<T: Voxel> Volume<T> {
    /// Wraps a voxel buffer, checking it matches the grid.
    pub fn new(grid: Grid, data: Vec<T>) -> Result<Self> {
        if data.len() != grid.num_voxels() {
            return Err(LabelMeshError::ShapeMismatch {
                stage: None,
                path: None,
                expected: grid.num_voxels(),
                actual: data.len(),
            });
        }
        Ok(Self { grid, data })
    }

    /// Creates a volume with every voxel set to `value`.
    #[must_use]
    pub fn filled(grid: Grid, value: T) -> Self {
        Self {
            data: vec![value; grid.num_voxels()],
            grid,
        }
    }

    /// Returns the grid geometry.
    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Returns the grid dimensions.
    #[must_use]
    pub fn dims(&self) -> [usize; 3] {
        self.grid.dims
    }

    /// Returns the voxel buffer (x fastest).
    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Returns the voxel buffer mutably.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consumes the volume, returning grid and buffer.
    #[must_use]
    pub fn into_parts(self) -> (Grid, Vec<T>) {
        (self.grid, self.data)
    }

    /// Value at voxel `(i, j, k)`.
    #[inline]
    #[must_use]
    pub fn get(&self, i: usize, j: usize, k: usize) -> T {
        self.data[self.grid.index(i, j, k)]
    }

    /// Sets the value at voxel `(i, j, k)`.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: T) {
        let index = self.grid.index(i, j, k);
        self.data[index] = value;
    }

    /// Converts every voxel to another scalar type on the same grid.
    #[must_use]
    pub fn cast<U: Voxel>(&self) -> Volume<U> {
        Volume {
            grid: self.grid,
            data: self.data.iter().map(|v| U::from_f64(v.to_f64())).collect(),
        }
    }

    /// Minimum and maximum voxel value, or `None` for an empty volume.
    #[must_use]
    pub fn range(&self) -> Option<(f64, f64)> {
        self.data.iter().fold(None, |acc, v| {
            let v = v.to_f64();
            Some(match acc {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            })
        })
    }

    /// Returns a copy with `pad` voxels of `fill` added on every side.
    #[must_use]
    pub fn padded(&self, pad: usize, fill: T) -> Self {
        let grid = self.grid.padded(pad);
        let mut out = Self::filled(grid, fill);
        let [nx, ny, nz] = self.grid.dims;
        for k in 0..nz {
            for j in 0..ny {
                let src = self.grid.index(0, j, k);
                let dst = grid.index(pad, j + pad, k + pad);
                out.data[dst..dst + nx].copy_from_slice(&self.data[src..src + nx]);
            }
        }
        out
    }
}
