//! File formats for labelmesh.
//!
//! Volumes:
//! - [`nifti`] reads and writes single-file NIfTI-1 (`.nii`)
//! - [`metaimage`] reads and writes MetaImage (`.mha`, `.mhd`)
//!
//! Meshes:
//! - [`vtk`] reads and writes legacy VTK polydata (`.vtk`)
//! - [`ply`] reads and writes Stanford PLY (`.ply`)
//!
//! The `read_*` / `write_*` functions pick the format from the file extension.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

pub mod element;
pub mod metaimage;
pub mod nifti;
pub mod ply;
pub mod vtk;

use std::path::Path;

use labelmesh_core::{
    LabelMeshError, LabelVolume, MeshFormat, Result, ScalarVolume, Stage, TriMesh, Volume,
};

pub use element::{Element, ScalarKind};

/// Volume file extensions accepted by [`read_volume`].
pub const VOLUME_EXTENSIONS: &[&str] = &["nii", "mha", "mhd"];

/// Mesh file extensions accepted by [`read_mesh`].
pub const MESH_EXTENSIONS: &[&str] = &["vtk", "ply"];

/// A volume as decoded from disk, with its on-disk element type.
#[derive(Debug, Clone)]
pub struct Image {
    /// Voxel values widened to `f64`, after any intensity scaling.
    pub volume: Volume<f64>,
    /// Element type stored in the file.
    pub kind: ScalarKind,
}

impl Image {
    /// Converts to a 16-bit label map.
    ///
    /// Fails if any voxel is not a whole number in `0..=65535`.
    pub fn into_labels(self, stage: Stage, path: &Path) -> Result<LabelVolume> {
        let max = f64::from(u16::MAX);
        if let Some(bad) = self
            .volume
            .data()
            .iter()
            .find(|&&v| !(v.fract() == 0.0 && (0.0..=max).contains(&v)))
        {
            return Err(LabelMeshError::parse(
                stage,
                path,
                format!("voxel value {bad} is not a label in 0..={}", u16::MAX),
            ));
        }
        Ok(self.volume.cast())
    }

    /// Converts to a single-precision intensity volume.
    pub fn into_scalar(self) -> ScalarVolume {
        self.volume.cast()
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Reads a volume, choosing the format from the extension.
pub fn read_volume(path: &Path, stage: Stage) -> Result<Image> {
    match extension(path).as_str() {
        "nii" => nifti::read(path, stage),
        "mha" | "mhd" => metaimage::read(path, stage),
        "gz" => Err(LabelMeshError::parse(
            stage,
            path,
            "compressed volumes are not supported",
        )),
        other => Err(LabelMeshError::parse(
            stage,
            path,
            format!("unsupported volume extension '{other}'"),
        )),
    }
}

/// Reads a volume and converts it to a label map.
pub fn read_label_volume(path: &Path, stage: Stage) -> Result<LabelVolume> {
    read_volume(path, stage)?.into_labels(stage, path)
}

/// Reads a volume as single-precision intensities.
pub fn read_scalar_volume(path: &Path, stage: Stage) -> Result<ScalarVolume> {
    Ok(read_volume(path, stage)?.into_scalar())
}

/// Writes a volume, choosing the format from the extension.
pub fn write_volume<T: Element>(volume: &Volume<T>, path: &Path, stage: Stage) -> Result<()> {
    match extension(path).as_str() {
        "nii" => nifti::write(volume, path, stage),
        "mha" | "mhd" => metaimage::write(volume, path, stage),
        other => Err(LabelMeshError::invalid(
            "output path",
            format!("unsupported volume extension '{other}' for {}", path.display()),
        )),
    }
}

/// Reads a mesh, choosing the format from the extension.
pub fn read_mesh(path: &Path, stage: Stage) -> Result<TriMesh> {
    match MeshFormat::from_path(path) {
        Some(MeshFormat::Vtk) => vtk::read(path, stage),
        Some(MeshFormat::Ply) => ply::read(path, stage),
        None => Err(LabelMeshError::parse(
            stage,
            path,
            format!("unsupported mesh extension '{}'", extension(path)),
        )),
    }
}

/// Writes a mesh in the given format.
pub fn write_mesh(mesh: &TriMesh, format: MeshFormat, path: &Path, stage: Stage) -> Result<()> {
    match format {
        MeshFormat::Vtk => vtk::write(mesh, path, stage),
        MeshFormat::Ply => ply::write(mesh, path, stage),
    }
}
