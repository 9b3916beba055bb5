//! Error types for labelmesh.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Processing stage that raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Label volume to intensity volume conversion.
    Convert,
    /// Connected-component extraction and pruning.
    Segment,
    /// Anisotropic diffusion.
    Filter,
    /// Iso-surface extraction.
    Isosurface,
    /// Mesh cleaning, decimation, smoothing and hole filling.
    Optimize,
    /// Pipeline setup (parameter validation, path resolution).
    Pipeline,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Convert => "convert",
            Self::Segment => "segment",
            Self::Filter => "filter",
            Self::Isosurface => "isosurface",
            Self::Optimize => "optimize",
            Self::Pipeline => "pipeline",
        };
        f.write_str(name)
    }
}

/// The main error type for labelmesh operations.
#[derive(Error, Debug)]
pub enum LabelMeshError {
    /// A parameter or path argument is malformed or out of range.
    #[error("invalid {parameter}: {reason}")]
    InputValidation {
        /// Parameter or argument name.
        parameter: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An input file could not be read.
    #[error("[{stage}] cannot read '{}': {source}", path.display())]
    Io {
        /// Stage that attempted the read.
        stage: Stage,
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An input file was read but is not a valid volume or mesh.
    #[error("[{stage}] cannot parse '{}': {reason}", path.display())]
    Parse {
        /// Stage that attempted the parse.
        stage: Stage,
        /// Offending path.
        path: PathBuf,
        /// What is wrong with the content.
        reason: String,
    },

    /// An output file or directory could not be written.
    #[error("[{stage}] cannot write '{}': {source}", path.display())]
    Write {
        /// Stage that attempted the write.
        stage: Stage,
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Volume buffer size does not match the grid.
    ///
    /// Raised without context by core constructors; stages attach theirs with
    /// [`LabelMeshError::in_stage`].
    #[error(
        "{}data size mismatch{}: expected {expected} voxels, got {actual}",
        stage_prefix(.stage),
        in_file(.path)
    )]
    ShapeMismatch {
        /// Stage working on the buffer, once known.
        stage: Option<Stage>,
        /// File the buffer came from or goes to, once known.
        path: Option<PathBuf>,
        /// Voxel count of the grid.
        expected: usize,
        /// Length of the buffer.
        actual: usize,
    },

    /// Segmentation left nothing to process.
    #[error("[{stage}] no component reaches component_size = {component_size} voxels")]
    EmptyResult {
        /// Stage that produced the empty result.
        stage: Stage,
        /// Voxel-count floor in effect.
        component_size: usize,
    },

    /// Iso-surfacing found no crossing of the contour value.
    #[error("[{stage}] no voxel crosses contour = {contour}")]
    EmptyGeometry {
        /// Stage that produced the empty surface.
        stage: Stage,
        /// Iso-value in effect.
        contour: f32,
    },

    /// Mesh optimization removed every triangle.
    #[error("[{stage}] mesh collapsed to zero triangles during {step}")]
    GeometryCollapse {
        /// Stage in which the mesh collapsed.
        stage: Stage,
        /// Optimizer step (e.g. "clean", "decimate").
        step: &'static str,
    },

    /// A mesh or label table outgrew 32-bit indices.
    #[error("{}{count} elements exceed the u32 index range", stage_prefix(.stage))]
    IndexOverflow {
        /// Stage building the mesh or table, once known.
        stage: Option<Stage>,
        /// Element count that did not fit.
        count: usize,
    },

    /// Parameter file or run report could not be (de)serialized.
    #[error("[{stage}] JSON error{}: {source}", in_file(.path))]
    Json {
        /// Stage that handled the JSON.
        stage: Stage,
        /// JSON file, when there is one.
        path: Option<PathBuf>,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

fn stage_prefix(stage: &Option<Stage>) -> String {
    stage.map(|stage| format!("[{stage}] ")).unwrap_or_default()
}

fn in_file(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|path| format!(" in '{}'", path.display()))
        .unwrap_or_default()
}

impl LabelMeshError {
    /// Shorthand for an [`LabelMeshError::InputValidation`] error.
    pub fn invalid(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InputValidation {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`LabelMeshError::Parse`] error.
    pub fn parse(stage: Stage, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            stage,
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns the stage the error belongs to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Io { stage, .. }
            | Self::Parse { stage, .. }
            | Self::Write { stage, .. }
            | Self::EmptyResult { stage, .. }
            | Self::EmptyGeometry { stage, .. }
            | Self::GeometryCollapse { stage, .. }
            | Self::Json { stage, .. } => Some(*stage),
            Self::InputValidation { .. } => Some(Stage::Pipeline),
            Self::ShapeMismatch { stage, .. } | Self::IndexOverflow { stage, .. } => *stage,
        }
    }

    /// Fills in the stage and file of a context-free error.
    ///
    /// Only [`ShapeMismatch`](Self::ShapeMismatch),
    /// [`IndexOverflow`](Self::IndexOverflow) and [`Json`](Self::Json) carry
    /// optional context; context already present is kept. Other variants are
    /// returned unchanged.
    #[must_use]
    pub fn in_stage(self, stage: Stage, path: Option<&Path>) -> Self {
        match self {
            Self::ShapeMismatch {
                stage: known,
                path: known_path,
                expected,
                actual,
            } => Self::ShapeMismatch {
                stage: known.or(Some(stage)),
                path: known_path.or_else(|| path.map(Path::to_path_buf)),
                expected,
                actual,
            },
            Self::IndexOverflow {
                stage: known,
                count,
            } => Self::IndexOverflow {
                stage: known.or(Some(stage)),
                count,
            },
            Self::Json {
                stage: known,
                path: known_path,
                source,
            } => Self::Json {
                stage: known,
                path: known_path.or_else(|| path.map(Path::to_path_buf)),
                source,
            },
            other => other,
        }
    }
}

/// A specialized Result type for labelmesh operations.
pub type Result<T> = std::result::Result<T, LabelMeshError>;
