//! The five-stage driver.
//!
//! [`Pipeline::run`] converts the input, segments it, filters every retained
//! component, extracts each component's surface and optimizes it. Stages hand
//! their results to the next stage in memory and write every intermediate file
//! along the way, so a failed run leaves everything up to the failing stage on
//! disk.

use std::path::{Path, PathBuf};

use labelmesh_core::{LabelMeshError, PipelineParams, Result, ScalarVolume, Stage, TriMesh};
use labelmesh_stages::diffusion::smoothed_path;
use labelmesh_stages::isosurface::raw_mesh_path;
use labelmesh_stages::optimize::optimized_mesh_path;
use labelmesh_stages::segment::write_masks;
use labelmesh_stages::{
    convert, diffuse, extract_surface, segment, Component, MeshOptimizer, OptimizeReport,
};
use serde::Serialize;

use crate::resolve::PathResolver;

/// The three locations a run works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelinePaths {
    /// Labeled volume (`.nii`, `.mha` or `.mhd`).
    pub input: PathBuf,
    /// Directory for the converted volume.
    pub volume_dir: PathBuf,
    /// Directory for masks, filtered volumes and meshes.
    pub output_dir: PathBuf,
}

impl PipelinePaths {
    /// Resolves the three path arguments with `resolver`.
    pub fn resolve(
        resolver: &dyn PathResolver,
        input: &str,
        volume_dir: &str,
        output_dir: &str,
    ) -> Result<Self> {
        Ok(Self {
            input: resolver.resolve_file(input, labelmesh_io::VOLUME_EXTENSIONS)?,
            volume_dir: resolver.resolve_dir(volume_dir)?,
            output_dir: resolver.resolve_dir(output_dir)?,
        })
    }
}

/// Files and statistics for one retained component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    /// `Component<label>_<ordinal>`.
    pub name: String,
    /// The component as found by the segmenter.
    pub component: Component,
    /// Binary mask volume.
    pub mask: PathBuf,
    /// Filtered volume.
    pub smoothed: PathBuf,
    /// Raw iso-surface.
    pub raw_mesh: PathBuf,
    /// Optimized mesh.
    pub mesh: PathBuf,
    /// What the optimizer did.
    pub optimize: OptimizeReport,
}

/// Summary of a completed run, written by `labelmesh run --report`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Resolved paths of the run.
    pub paths: PipelinePaths,
    /// Parameters in effect.
    pub params: PipelineParams,
    /// Converted volume.
    pub converted: PathBuf,
    /// Components discarded by the size filter.
    pub pruned: Vec<Component>,
    /// One entry per retained component, in label order.
    pub components: Vec<ComponentReport>,
}

impl RunReport {
    /// Serializes the report as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|source| LabelMeshError::Json {
            stage: Stage::Pipeline,
            path: None,
            source,
        })
    }

    /// Writes the report as JSON to `path`.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self
            .to_json()
            .map_err(|e| e.in_stage(Stage::Pipeline, Some(path)))?;
        std::fs::write(path, json).map_err(|source| LabelMeshError::Write {
            stage: Stage::Pipeline,
            path: path.to_path_buf(),
            source,
        })
    }
}

/// A validated parameter set, ready to process volumes.
#[derive(Debug, Clone)]
pub struct Pipeline {
    params: PipelineParams,
    optimizer: MeshOptimizer,
}

impl Pipeline {
    /// Validates `params` before anything runs.
    pub fn new(params: PipelineParams) -> Result<Self> {
        params.validate()?;
        let optimizer = MeshOptimizer::new(params.optimize())?;
        Ok(Self { params, optimizer })
    }

    /// The parameters in effect.
    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Runs all five stages on one input volume.
    ///
    /// # Errors
    /// The first failing stage aborts the run; its error names the stage.
    pub fn run(&self, paths: &PipelinePaths) -> Result<RunReport> {
        let p = &self.params;
        log::info!("labelmesh: processing {}", paths.input.display());

        log::info!("[1/5] convert");
        let (labels, converted) = convert(&paths.input, &paths.volume_dir)?;

        log::info!("[2/5] segment (component_size = {})", p.component_size);
        let segmentation = segment(&labels, p.component_size)?;
        let masks = write_masks(labels.grid(), &segmentation.retained, &paths.output_dir)?;

        log::info!(
            "[3/5] filter {} components ({} iterations)",
            segmentation.retained.len(),
            p.iterations
        );
        let diffusion = p.diffusion();
        let mut smoothed: Vec<(ScalarVolume, PathBuf)> = Vec::with_capacity(masks.len());
        for (component, mask) in segmentation.retained.iter().zip(&masks) {
            let volume = diffuse(&component.mask(labels.grid()).cast(), &diffusion)?;
            let path = smoothed_path(mask, &paths.output_dir);
            labelmesh_io::write_volume(&volume, &path, Stage::Filter)?;
            log::debug!("wrote {}", path.display());
            smoothed.push((volume, path));
        }

        log::info!("[4/5] isosurface (contour = {})", p.contour);
        let mut raw: Vec<(TriMesh, PathBuf)> = Vec::with_capacity(smoothed.len());
        for (volume, smoothed_file) in &smoothed {
            let mesh = extract_surface(volume, p.contour)?;
            let path = raw_mesh_path(smoothed_file, &paths.output_dir);
            labelmesh_io::vtk::write(&mesh, &path, Stage::Isosurface)?;
            log::debug!("wrote {} ({} triangles)", path.display(), mesh.num_triangles());
            raw.push((mesh, path));
        }

        log::info!("[5/5] optimize");
        let mut components = Vec::with_capacity(raw.len());
        let parts = segmentation
            .retained
            .into_iter()
            .zip(masks)
            .zip(smoothed.into_iter().map(|(_, path)| path))
            .zip(raw);
        for (((component, mask), smoothed), (mesh, raw_mesh)) in parts {
            let (mesh, optimize) = self.optimizer.optimize(mesh)?;
            let path = optimized_mesh_path(&raw_mesh, &paths.output_dir, p.mesh_format);
            labelmesh_io::write_mesh(&mesh, p.mesh_format, &path, Stage::Optimize)?;
            log::info!("{}: {optimize}", component.name());
            components.push(ComponentReport {
                name: component.name(),
                component,
                mask,
                smoothed,
                raw_mesh,
                mesh: path,
                optimize,
            });
        }

        log::info!(
            "labelmesh: {} meshes written to {}",
            components.len(),
            paths.output_dir.display()
        );
        Ok(RunReport {
            paths: paths.clone(),
            params: p.clone(),
            converted,
            pruned: segmentation.pruned,
            components,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_params_rejected_before_running() {
        let params = PipelineParams {
            conductance: 0.0,
            ..Default::default()
        };
        match Pipeline::new(params) {
            Err(LabelMeshError::InputValidation { parameter, .. }) => {
                assert_eq!(parameter, "conductance");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_report_serializes() {
        let report = RunReport {
            paths: PipelinePaths {
                input: PathBuf::from("/in/scan.nii"),
                volume_dir: PathBuf::from("/vol"),
                output_dir: PathBuf::from("/out"),
            },
            params: PipelineParams::default(),
            converted: PathBuf::from("/vol/scan.mha"),
            pruned: Vec::new(),
            components: Vec::new(),
        };
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["params"]["component_size"], 50);
        assert_eq!(json["converted"], "/vol/scan.mha");
        assert!(json["components"].as_array().unwrap().is_empty());
    }
}
