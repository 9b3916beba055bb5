//! Iso-surface (TIN) extraction from filtered volumes.

use std::path::{Path, PathBuf};

use labelmesh_core::topology::orient_outward;
use labelmesh_core::{marching_cubes, LabelMeshError, Result, ScalarVolume, Stage, TriMesh};

use crate::{ensure_output_dir, file_stem, output_path, SMOOTHED_SUFFIX};

/// Extracts the `contour` level set of `volume` as a world-space mesh.
///
/// The volume is padded by one voxel that lies below `contour`, so shapes that
/// touch the border still produce closed surfaces. Voxels with a value of at
/// least `contour` are inside; triangles face outward.
///
/// # Errors
/// [`LabelMeshError::EmptyGeometry`] when no voxel edge crosses `contour`.
pub fn extract_surface(volume: &ScalarVolume, contour: f32) -> Result<TriMesh> {
    if !contour.is_finite() {
        return Err(LabelMeshError::invalid(
            "contour",
            format!("must be finite, got {contour}"),
        ));
    }
    let outside = contour - contour.abs().max(1.0);
    let padded = volume.padded(1, outside);
    let grid = *padded.grid();

    let mut mesh = marching_cubes(padded.data(), contour, grid.dims)
        .map_err(|e| e.in_stage(Stage::Isosurface, None))?;
    if mesh.is_empty() {
        return Err(LabelMeshError::EmptyGeometry {
            stage: Stage::Isosurface,
            contour,
        });
    }
    for v in &mut mesh.vertices {
        *v = grid.index_to_world(*v);
    }
    let flipped = orient_outward(&mut mesh);
    log::debug!(
        "marching cubes: {} vertices, {} triangles, {flipped} shells flipped",
        mesh.num_vertices(),
        mesh.num_triangles()
    );
    Ok(mesh)
}

/// Name of the raw mesh for a filtered volume: the `_smoothed` suffix is dropped.
pub fn raw_mesh_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = file_stem(input);
    let stem = stem.strip_suffix(SMOOTHED_SUFFIX).unwrap_or(&stem);
    output_path(output_dir, stem, "", "vtk")
}

/// Reads a filtered volume, extracts its surface and writes `<stem>.vtk`.
pub fn isosurface_file(
    input: &Path,
    output_dir: &Path,
    contour: f32,
) -> Result<(TriMesh, PathBuf)> {
    ensure_output_dir(output_dir, Stage::Isosurface)?;
    let volume = labelmesh_io::read_scalar_volume(input, Stage::Isosurface)?;
    let mesh = extract_surface(&volume, contour)
        .map_err(|e| e.in_stage(Stage::Isosurface, Some(input)))?;
    let output = raw_mesh_path(input, output_dir);
    labelmesh_io::vtk::write(&mesh, &output, Stage::Isosurface)?;
    log::info!(
        "extracted {} triangles from {} -> {}",
        mesh.num_triangles(),
        input.display(),
        output.display()
    );
    Ok((mesh, output))
}
