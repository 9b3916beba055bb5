//! The five processing stages of labelmesh.
//!
//! Each stage is usable on its own, either on in-memory values or on files:
//!
//! | Stage | In memory | On files |
//! |-------|-----------|----------|
//! | [`convert`] | [`convert::convert`] | same |
//! | [`segment`] | [`segment::segment`] | [`segment::segment_file`] |
//! | [`diffusion`] | [`diffusion::diffuse`] | [`diffusion::filter_file`] |
//! | [`isosurface`] | [`isosurface::extract_surface`] | [`isosurface::isosurface_file`] |
//! | [`optimize`] | [`optimize::MeshOptimizer::optimize`] | [`optimize::optimize_file`] |
//!
//! File outputs are written into a caller-supplied directory, named after the
//! input: `<stem>.mha`, `Component<label>_<n>.mha`, `<stem>_smoothed.mha`,
//! `<stem>.vtk` and `<stem>_optimized.<vtk|ply>`.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

pub mod convert;
pub mod diffusion;
pub mod isosurface;
pub mod optimize;
pub mod segment;

use std::path::{Path, PathBuf};

use labelmesh_core::{LabelMeshError, Result, Stage};

pub use convert::convert;
pub use diffusion::diffuse;
pub use isosurface::extract_surface;
pub use optimize::{MeshOptimizer, OptimizeReport};
pub use segment::{segment, Component, Segmentation};

/// Suffix appended to the stem of diffused volumes.
pub const SMOOTHED_SUFFIX: &str = "_smoothed";

/// Suffix appended to the stem of optimized meshes.
pub const OPTIMIZED_SUFFIX: &str = "_optimized";

/// File name of `path` without its volume or mesh extension.
///
/// `scan.nii` and `scan.mha` both give `scan`.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Builds `<dir>/<stem><suffix>.<extension>`.
pub fn output_path(dir: &Path, stem: &str, suffix: &str, extension: &str) -> PathBuf {
    dir.join(format!("{stem}{suffix}.{extension}"))
}

/// Fails with a write error unless `dir` is an existing directory.
pub fn ensure_output_dir(dir: &Path, stage: Stage) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    let kind = if dir.exists() {
        std::io::ErrorKind::InvalidInput
    } else {
        std::io::ErrorKind::NotFound
    };
    Err(LabelMeshError::Write {
        stage,
        path: dir.to_path_buf(),
        source: std::io::Error::new(kind, "output directory does not exist"),
    })
}
