//! labelmesh: surface meshes from labeled medical volumes.
//!
//! A label map (typically a CT segmentation) goes through five stages:
//!
//! 1. **convert** the input (`.nii`, `.mha`, `.mhd`) to MetaImage
//! 2. **segment** it into 26-connected components per label, dropping small ones
//! 3. **filter** each component mask with anisotropic diffusion
//! 4. **isosurface** each filtered volume with marching cubes
//! 5. **optimize** each mesh: clean, decimate, remove artifacts, smooth, fill
//!    holes and orient normals
//!
//! # Quick Start
//!
//! ```no_run
//! use labelmesh::*;
//!
//! fn main() -> Result<()> {
//!     init_logging(None)?;
//!
//!     let paths = PipelinePaths::resolve(&DirectPaths, "scan.nii", "volumes", "meshes")?;
//!     let pipeline = Pipeline::new(PipelineParams::default())?;
//!     let report = pipeline.run(&paths)?;
//!     for component in &report.components {
//!         println!("{} -> {}", component.name, component.mesh.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Each stage is also available on its own in [`stages`], working on in-memory
//! values or on files.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod pipeline;
pub mod resolve;

use std::path::Path;

use log::{LevelFilter, Log, Metadata, Record};

pub use labelmesh_core::{
    ArtifactMeasure, DiffusionParams, Grid, LabelMeshError, LabelVolume, MaskVolume, MeshFormat,
    OptimizeParams, PipelineParams, Result, ScalarVolume, Stage, TriMesh, Volume,
};
pub use labelmesh_io as io;
pub use labelmesh_stages as stages;
pub use labelmesh_stages::{MeshOptimizer, OptimizeReport};
pub use pipeline::{ComponentReport, Pipeline, PipelinePaths, RunReport};
pub use resolve::{DirectPaths, PathResolver, RecursiveSearch};

/// Log sink for a run: stderr, plus an optional log file.
///
/// Each side is its own `env_logger` logger. Stderr follows `RUST_LOG` and
/// defaults to `info`; the file records everything from `debug` up.
pub struct RunLogger {
    console: env_logger::Logger,
    file: Option<env_logger::Logger>,
}

impl RunLogger {
    /// Builds the sinks. `log_file` is created (truncated) up front.
    pub fn new(log_file: Option<&Path>) -> Result<Self> {
        Self::with_env(env_logger::Env::default(), log_file)
    }

    fn with_env(env: env_logger::Env<'_>, log_file: Option<&Path>) -> Result<Self> {
        let console = env_logger::Builder::from_env(env.default_filter_or("info"))
            .target(env_logger::Target::Stderr)
            .build();
        let file = match log_file {
            Some(path) => {
                let file = std::fs::File::create(path).map_err(|source| LabelMeshError::Write {
                    stage: Stage::Pipeline,
                    path: path.to_path_buf(),
                    source,
                })?;
                Some(
                    env_logger::Builder::new()
                        .filter_level(LevelFilter::Debug)
                        .write_style(env_logger::WriteStyle::Never)
                        .target(env_logger::Target::Pipe(Box::new(file)))
                        .build(),
                )
            }
            None => None,
        };
        Ok(Self { console, file })
    }

    /// Most verbose level either sink accepts.
    pub fn max_level(&self) -> LevelFilter {
        let console = self.console.filter();
        self.file
            .as_ref()
            .map_or(console, |file| console.max(file.filter()))
    }
}

impl Log for RunLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.console.enabled(metadata)
            || self.file.as_ref().is_some_and(|file| file.enabled(metadata))
    }

    fn log(&self, record: &Record<'_>) {
        self.console.log(record);
        if let Some(file) = &self.file {
            file.log(record);
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Some(file) = &self.file {
            file.flush();
        }
    }
}

/// Installs a [`RunLogger`] as the global logger.
///
/// Calling this again after a logger is installed does nothing.
pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let logger = RunLogger::new(log_file)?;
    let max_level = logger.max_level();
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(max_level);
    }
    Ok(())
}
