//! Pipeline parameters.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LabelMeshError, Result, Stage};

/// How the artifact filter measures a connected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactMeasure {
    /// Number of triangles in the region.
    #[default]
    TriangleCount,
    /// Surface area of the region in world units.
    SurfaceArea,
}

/// File format for written meshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MeshFormat {
    /// Legacy VTK polydata (ASCII).
    #[default]
    Vtk,
    /// Stanford PLY (ASCII).
    Ply,
}

impl MeshFormat {
    /// File extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Vtk => "vtk",
            Self::Ply => "ply",
        }
    }

    /// Picks the format from a path's extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "vtk" => Some(Self::Vtk),
            "ply" => Some(Self::Ply),
            _ => None,
        }
    }
}

/// The full numeric parameter set of the pipeline.
///
/// Missing fields in a JSON config take their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    /// Components with fewer voxels than this are discarded.
    pub component_size: usize,

    /// Diffusion time step.
    pub time_step: f64,

    /// Diffusion conductance (edge sensitivity).
    pub conductance: f64,

    /// Number of diffusion iterations.
    pub iterations: usize,

    /// Iso-value of the extracted surface.
    pub contour: f32,

    /// Vertices closer than this are welded.
    pub cleaning_tolerance: f64,

    /// Connected regions smaller than this are removed.
    pub artifact_tolerance: f64,

    /// How region size is measured for `artifact_tolerance`.
    pub artifact_measure: ArtifactMeasure,

    /// Fraction of triangles removed by decimation, in `[0, 1)`.
    pub target_reduction: f64,

    /// Laplacian smoothing factor.
    pub relaxation: f64,

    /// Number of Laplacian smoothing passes.
    pub tin_iterations: usize,

    /// Holes up to this radius are filled.
    pub hole_tolerance: f64,

    /// Output format of the optimized meshes.
    pub mesh_format: MeshFormat,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            component_size: 50,
            time_step: 0.0025,
            conductance: 2.0,
            iterations: 16,
            contour: 0.5,
            cleaning_tolerance: 0.00025,
            artifact_tolerance: 150.0,
            artifact_measure: ArtifactMeasure::TriangleCount,
            target_reduction: 0.01,
            relaxation: 0.1,
            tin_iterations: 40,
            hole_tolerance: 10.0,
            mesh_format: MeshFormat::Vtk,
        }
    }
}

/// Parameters of the anisotropic diffusion filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffusionParams {
    pub time_step: f64,
    pub conductance: f64,
    pub iterations: usize,
}

impl Default for DiffusionParams {
    fn default() -> Self {
        PipelineParams::default().diffusion()
    }
}

impl DiffusionParams {
    /// Checks that time step and conductance are positive.
    pub fn validate(&self) -> Result<()> {
        positive("time_step", self.time_step)?;
        positive("conductance", self.conductance)
    }
}

/// Parameters of the mesh optimizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizeParams {
    pub cleaning_tolerance: f64,
    pub target_reduction: f64,
    pub artifact_tolerance: f64,
    pub artifact_measure: ArtifactMeasure,
    pub relaxation: f64,
    pub tin_iterations: usize,
    pub hole_tolerance: f64,
}

impl Default for OptimizeParams {
    fn default() -> Self {
        PipelineParams::default().optimize()
    }
}

impl OptimizeParams {
    /// Checks tolerances, relaxation and the reduction fraction.
    pub fn validate(&self) -> Result<()> {
        finite("cleaning_tolerance", self.cleaning_tolerance)?;
        non_negative("artifact_tolerance", self.artifact_tolerance)?;
        non_negative("relaxation", self.relaxation)?;
        non_negative("hole_tolerance", self.hole_tolerance)?;
        finite("target_reduction", self.target_reduction)?;
        if !(0.0..1.0).contains(&self.target_reduction) {
            return Err(LabelMeshError::invalid(
                "target_reduction",
                format!("must be in [0, 1), got {}", self.target_reduction),
            ));
        }
        Ok(())
    }
}

impl PipelineParams {
    /// Loads parameters from a JSON file and validates them.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| LabelMeshError::Io {
            stage: Stage::Pipeline,
            path: path.to_path_buf(),
            source,
        })?;
        let params: Self =
            serde_json::from_str(&text).map_err(|source| LabelMeshError::Json {
                stage: Stage::Pipeline,
                path: Some(path.to_path_buf()),
                source,
            })?;
        params.validate()?;
        Ok(params)
    }

    /// Checks every value is in its domain.
    pub fn validate(&self) -> Result<()> {
        self.diffusion().validate()?;
        finite("contour", f64::from(self.contour))?;
        self.optimize().validate()
    }

    /// The diffusion filter's view of the parameters.
    #[must_use]
    pub fn diffusion(&self) -> DiffusionParams {
        DiffusionParams {
            time_step: self.time_step,
            conductance: self.conductance,
            iterations: self.iterations,
        }
    }

    /// The mesh optimizer's view of the parameters.
    #[must_use]
    pub fn optimize(&self) -> OptimizeParams {
        OptimizeParams {
            cleaning_tolerance: self.cleaning_tolerance,
            target_reduction: self.target_reduction,
            artifact_tolerance: self.artifact_tolerance,
            artifact_measure: self.artifact_measure,
            relaxation: self.relaxation,
            tin_iterations: self.tin_iterations,
            hole_tolerance: self.hole_tolerance,
        }
    }
}

fn finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(LabelMeshError::invalid(name, format!("must be finite, got {value}")))
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(LabelMeshError::invalid(name, format!("must be positive, got {value}")))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    finite(name, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(LabelMeshError::invalid(name, format!("must not be negative, got {value}")))
    }
}
