//! Gradient-weighted anisotropic diffusion (Perona-Malik).
//!
//! Each iteration applies
//!
//! ```text
//! I <- I + dt * sum_d (c(f_d) * f_d - c(b_d) * b_d) / h_d
//! ```
//!
//! where `f_d` and `b_d` are the forward and backward differences along axis `d`
//! (zero across the volume border) and `c(x) = exp(-x^2 / (2 K^2 m))`, with `m` the
//! mean squared gradient magnitude of the current image. Normalising by `m` makes
//! the conductance `K` independent of the intensity scale.

use std::path::{Path, PathBuf};

use labelmesh_core::{
    DiffusionParams, Grid, LabelMeshError, Result, ScalarVolume, Stage, Volume,
};
use rayon::prelude::*;

use crate::{ensure_output_dir, file_stem, output_path, SMOOTHED_SUFFIX};

/// Runs `params.iterations` diffusion steps on `volume`.
///
/// The grid is copied unchanged. No stability check is made on the time step.
pub fn diffuse(volume: &ScalarVolume, params: &DiffusionParams) -> Result<ScalarVolume> {
    params.validate()?;
    let grid = *volume.grid();
    let spacing = grid.spacing.to_array();
    if spacing.iter().any(|&h| !(h.is_finite() && h > 0.0)) {
        return Err(LabelMeshError::invalid(
            "spacing",
            format!("voxel spacing must be positive, got {:?}", grid.spacing),
        ));
    }

    let mut current: Vec<f32> = volume.data().to_vec();
    let mut next = vec![0.0_f32; current.len()];
    for iteration in 0..params.iterations {
        let m = mean_squared_gradient(&grid, &current);
        if m <= 0.0 {
            log::debug!("image is flat after {iteration} iterations");
            break;
        }
        let scale = 2.0 * params.conductance * params.conductance * m;
        step(&grid, &current, &mut next, params.time_step, scale);
        std::mem::swap(&mut current, &mut next);
    }
    Volume::new(grid, current).map_err(|e| e.in_stage(Stage::Filter, None))
}

/// Sample at `index + stride`, if `pos + 1` is still inside an axis of length `n`.
#[inline]
fn forward(data: &[f32], index: usize, stride: usize, pos: usize, n: usize) -> Option<f64> {
    (pos + 1 < n).then(|| f64::from(data[index + stride]))
}

#[inline]
fn backward(data: &[f32], index: usize, stride: usize, pos: usize) -> Option<f64> {
    (pos > 0).then(|| f64::from(data[index - stride]))
}

fn strides(grid: &Grid) -> [usize; 3] {
    [1, grid.dims[0], grid.dims[0] * grid.dims[1]]
}

fn mean_squared_gradient(grid: &Grid, data: &[f32]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let strides = strides(grid);
    let spacing = grid.spacing.to_array();
    let sum: f64 = (0..data.len())
        .into_par_iter()
        .map(|index| {
            let pos = grid.coords(index);
            let here = f64::from(data[index]);
            (0..3)
                .filter_map(|d| {
                    forward(data, index, strides[d], pos[d], grid.dims[d])
                        .map(|v| ((v - here) / spacing[d]).powi(2))
                })
                .sum::<f64>()
        })
        .sum();
    sum / data.len() as f64
}

#[allow(clippy::cast_possible_truncation)]
fn step(grid: &Grid, current: &[f32], next: &mut [f32], dt: f64, scale: f64) {
    let [nx, ny, _] = grid.dims;
    let strides = strides(grid);
    let spacing = grid.spacing.to_array();
    let flux = |delta: f64| (-delta * delta / scale).exp() * delta;

    next.par_chunks_mut(nx * ny)
        .enumerate()
        .for_each(|(k, slice)| {
            for j in 0..ny {
                for i in 0..nx {
                    let index = grid.index(i, j, k);
                    let pos = [i, j, k];
                    let here = f64::from(current[index]);
                    let mut update = 0.0;
                    for d in 0..3 {
                        let h = spacing[d];
                        let f = forward(current, index, strides[d], pos[d], grid.dims[d])
                            .map_or(0.0, |v| (v - here) / h);
                        let b = backward(current, index, strides[d], pos[d])
                            .map_or(0.0, |v| (here - v) / h);
                        update += (flux(f) - flux(b)) / h;
                    }
                    slice[j * nx + i] = (here + dt * update) as f32;
                }
            }
        });
}

/// Name of the filtered volume for a mask: `<stem>_smoothed.mha`.
pub fn smoothed_path(input: &Path, output_dir: &Path) -> PathBuf {
    output_path(output_dir, &file_stem(input), SMOOTHED_SUFFIX, "mha")
}

/// Reads a mask or intensity volume, diffuses it and writes
/// `<stem>_smoothed.mha` into `output_dir`.
pub fn filter_file(
    input: &Path,
    output_dir: &Path,
    params: &DiffusionParams,
) -> Result<(ScalarVolume, PathBuf)> {
    ensure_output_dir(output_dir, Stage::Filter)?;
    let volume = labelmesh_io::read_scalar_volume(input, Stage::Filter)?;
    let smoothed =
        diffuse(&volume, params).map_err(|e| e.in_stage(Stage::Filter, Some(input)))?;
    let output = smoothed_path(input, output_dir);
    labelmesh_io::write_volume(&smoothed, &output, Stage::Filter)?;
    log::info!("filtered {} -> {}", input.display(), output.display());
    Ok((smoothed, output))
}
