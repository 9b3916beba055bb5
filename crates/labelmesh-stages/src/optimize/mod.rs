//! Mesh optimization: the sixth and last stage of a component's surface.
//!
//! [`MeshOptimizer::optimize`] runs a fixed sequence of steps on a raw
//! iso-surface:
//!
//! 1. [`clean`] welds vertices closer than `cleaning_tolerance`
//! 2. [`decimate`] collapses edges until `target_reduction` is met
//! 3. [`remove_artifacts`] drops regions below `artifact_tolerance`
//! 4. [`laplacian_smooth`] relaxes positions `tin_iterations` times
//! 5. [`fill_holes`] closes boundary loops up to `hole_tolerance`
//! 6. [`orient_normals`] makes every shell face outward
//!
//! # Example
//!
//! ```no_run
//! use labelmesh_core::{OptimizeParams, TriMesh};
//! use labelmesh_stages::MeshOptimizer;
//!
//! # fn run(raw: TriMesh) -> labelmesh_core::Result<()> {
//! let optimizer = MeshOptimizer::new(OptimizeParams::default())?;
//! let (mesh, report) = optimizer.optimize(raw)?;
//! println!("{report}: {} vertices", mesh.num_vertices());
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod clean;
pub mod decimate;
pub mod holes;
pub mod normals;
pub mod quadric;
pub mod smooth;

use std::fmt;
use std::path::{Path, PathBuf};

use labelmesh_core::{LabelMeshError, MeshFormat, OptimizeParams, Result, Stage, TriMesh};
use serde::Serialize;

pub use artifacts::remove_artifacts;
pub use clean::clean;
pub use decimate::{decimate, DecimateStats};
pub use holes::{fill_holes, HoleStats};
pub use normals::{orient_normals, NormalStats};
pub use smooth::{laplacian_smooth, RELAXATION_WARN_LIMIT};

use crate::{ensure_output_dir, file_stem, output_path, OPTIMIZED_SUFFIX};

/// What each optimizer step did to one mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptimizeReport {
    /// Triangles in the raw mesh.
    pub input_triangles: usize,
    /// Vertices merged away by cleaning.
    pub welded_vertices: usize,
    /// Triangles after cleaning.
    pub after_clean: usize,
    /// Edge collapses performed by decimation.
    pub collapses: usize,
    /// Triangles after decimation.
    pub after_decimate: usize,
    /// Connected regions removed as artifacts.
    pub regions_removed: usize,
    /// Triangles after artifact removal.
    pub after_artifacts: usize,
    /// Whether the relaxation factor was above [`RELAXATION_WARN_LIMIT`].
    pub relaxation_flagged: bool,
    /// Holes closed.
    pub holes_filled: usize,
    /// Holes left open.
    pub holes_open: usize,
    /// Whole shells flipped to face outward.
    pub shells_flipped: usize,
    /// Triangles in the optimized mesh.
    pub output_triangles: usize,
}

impl OptimizeReport {
    /// Fraction of the raw triangles that survived, or 1 for an empty input.
    #[must_use]
    pub fn triangle_ratio(&self) -> f64 {
        if self.input_triangles == 0 {
            return 1.0;
        }
        self.output_triangles as f64 / self.input_triangles as f64
    }

    /// Whether any step other than smoothing changed the topology.
    #[must_use]
    pub fn had_changes(&self) -> bool {
        self.output_triangles != self.input_triangles
            || self.welded_vertices > 0
            || self.collapses > 0
            || self.regions_removed > 0
            || self.holes_filled > 0
            || self.shells_flipped > 0
    }
}

impl fmt::Display for OptimizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Optimize: {} -> {} triangles ({} welded, {} collapses, {} artifacts, \
             {} holes filled, {} open)",
            self.input_triangles,
            self.output_triangles,
            self.welded_vertices,
            self.collapses,
            self.regions_removed,
            self.holes_filled,
            self.holes_open
        )?;
        if self.relaxation_flagged {
            write!(f, " [relaxation above {RELAXATION_WARN_LIMIT}]")?;
        }
        Ok(())
    }
}

/// Runs the optimization steps with one validated parameter set.
#[derive(Debug, Clone, Copy)]
pub struct MeshOptimizer {
    params: OptimizeParams,
}

impl MeshOptimizer {
    /// Creates an optimizer, rejecting out-of-range parameters.
    pub fn new(params: OptimizeParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The parameters in effect.
    pub fn params(&self) -> &OptimizeParams {
        &self.params
    }

    /// Optimizes `mesh` and reports what each step did.
    ///
    /// # Errors
    /// - [`LabelMeshError::InputValidation`] for out-of-range indices or
    ///   triangles that repeat a vertex.
    /// - [`LabelMeshError::GeometryCollapse`] when cleaning, decimation or artifact
    ///   removal leaves no triangles. The error names the step.
    pub fn optimize(&self, mut mesh: TriMesh) -> Result<(TriMesh, OptimizeReport)> {
        mesh.validate()?;
        let p = &self.params;
        let mut report = OptimizeReport {
            input_triangles: mesh.num_triangles(),
            ..Default::default()
        };

        report.welded_vertices = clean(&mut mesh, p.cleaning_tolerance);
        report.after_clean = non_empty(&mesh, "clean")?;

        report.collapses = decimate(&mut mesh, p.target_reduction).collapses;
        report.after_decimate = non_empty(&mesh, "decimate")?;

        report.regions_removed =
            remove_artifacts(&mut mesh, p.artifact_tolerance, p.artifact_measure);
        report.after_artifacts = non_empty(&mesh, "remove artifacts")?;

        report.relaxation_flagged = laplacian_smooth(&mut mesh, p.relaxation, p.tin_iterations);

        let holes = fill_holes(&mut mesh, p.hole_tolerance);
        report.holes_filled = holes.filled;
        report.holes_open = holes.open;

        report.shells_flipped = orient_normals(&mut mesh).shells_flipped;
        report.output_triangles = mesh.num_triangles();

        log::debug!("{report}");
        Ok((mesh, report))
    }
}

fn non_empty(mesh: &TriMesh, step: &'static str) -> Result<usize> {
    if mesh.is_empty() {
        return Err(LabelMeshError::GeometryCollapse {
            stage: Stage::Optimize,
            step,
        });
    }
    Ok(mesh.num_triangles())
}

/// Name of the optimized mesh for a raw mesh: `<stem>_optimized.<ext>`.
pub fn optimized_mesh_path(input: &Path, output_dir: &Path, format: MeshFormat) -> PathBuf {
    output_path(
        output_dir,
        &file_stem(input),
        OPTIMIZED_SUFFIX,
        format.extension(),
    )
}

/// Reads a raw mesh, optimizes it and writes `<stem>_optimized.<ext>`.
pub fn optimize_file(
    input: &Path,
    output_dir: &Path,
    params: &OptimizeParams,
    format: MeshFormat,
) -> Result<(OptimizeReport, PathBuf)> {
    let optimizer = MeshOptimizer::new(*params)?;
    ensure_output_dir(output_dir, Stage::Optimize)?;
    let raw = labelmesh_io::read_mesh(input, Stage::Optimize)?;
    let (mesh, report) = optimizer.optimize(raw)?;
    let output = optimized_mesh_path(input, output_dir, format);
    labelmesh_io::write_mesh(&mesh, format, &output, Stage::Optimize)?;
    log::info!("{} -> {}: {report}", input.display(), output.display());
    Ok((report, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isosurface::extract_surface;
    use labelmesh_core::topology::is_watertight;
    use labelmesh_core::{DVec3, Grid, ScalarVolume, Volume};

    fn ball_surface(dims: usize, radius: f64) -> TriMesh {
        let mut volume: ScalarVolume = Volume::filled(Grid::new([dims; 3]), 0.0);
        let center = (dims as f64 - 1.0) / 2.0;
        for k in 0..dims {
            for j in 0..dims {
                for i in 0..dims {
                    let d = DVec3::new(i as f64, j as f64, k as f64) - DVec3::splat(center);
                    if d.length() <= radius {
                        volume.set(i, j, k, 1.0);
                    }
                }
            }
        }
        extract_surface(&volume, 0.5).unwrap()
    }

    #[test]
    fn test_ball_stays_closed_with_defaults() {
        let raw = ball_surface(16, 6.0);
        let optimizer = MeshOptimizer::new(OptimizeParams::default()).unwrap();
        let (mesh, report) = optimizer.optimize(raw.clone()).unwrap();

        assert!(is_watertight(&mesh));
        assert!(mesh.signed_volume() > 0.0);
        assert_eq!(report.input_triangles, raw.num_triangles());
        assert_eq!(report.output_triangles, mesh.num_triangles());
        assert_eq!(report.regions_removed, 0);
        assert_eq!(report.holes_open, 0);
        assert!(!report.relaxation_flagged);
        assert!(report.collapses > 0);
        let ratio = report.triangle_ratio();
        assert!((0.5..1.0).contains(&ratio), "ratio {ratio}");
    }

    #[test]
    fn test_identity_settings_keep_triangles() {
        let raw = ball_surface(10, 3.0);
        let params = OptimizeParams {
            cleaning_tolerance: 0.0,
            target_reduction: 0.0,
            artifact_tolerance: 0.0,
            relaxation: 0.0,
            ..Default::default()
        };
        let (mesh, report) = MeshOptimizer::new(params).unwrap().optimize(raw.clone()).unwrap();
        assert_eq!(mesh, raw);
        assert!(!report.had_changes());
        assert!((report.triangle_ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_collapse_names_the_step() {
        let raw = ball_surface(10, 3.0);
        let params = OptimizeParams {
            artifact_tolerance: 1e9,
            ..Default::default()
        };
        match MeshOptimizer::new(params).unwrap().optimize(raw) {
            Err(LabelMeshError::GeometryCollapse { stage, step }) => {
                assert_eq!(stage, Stage::Optimize);
                assert_eq!(step, "remove artifacts");
            }
            other => panic!("unexpected result {other:?}"),
        }

        let tiny = TriMesh::new(
            vec![DVec3::ZERO, DVec3::new(1e-3, 0.0, 0.0), DVec3::new(0.0, 1e-3, 0.0)],
            vec![[0, 1, 2]],
        );
        let params = OptimizeParams {
            cleaning_tolerance: 0.01,
            ..Default::default()
        };
        let err = MeshOptimizer::new(params).unwrap().optimize(tiny).unwrap_err();
        assert!(err.to_string().contains("during clean"), "{err}");
    }

    #[test]
    fn test_rejects_invalid_input() {
        let params = OptimizeParams {
            target_reduction: 1.5,
            ..Default::default()
        };
        assert!(MeshOptimizer::new(params).is_err());

        let optimizer = MeshOptimizer::new(OptimizeParams::default()).unwrap();
        let broken = TriMesh::new(vec![DVec3::ZERO], vec![[0, 1, 2]]);
        assert!(matches!(
            optimizer.optimize(broken),
            Err(LabelMeshError::InputValidation { .. })
        ));
    }

    #[test]
    fn test_relaxation_is_flagged_in_report() {
        let raw = ball_surface(10, 3.0);
        let params = OptimizeParams {
            relaxation: 0.7,
            tin_iterations: 2,
            artifact_tolerance: 0.0,
            ..Default::default()
        };
        let (_, report) = MeshOptimizer::new(params).unwrap().optimize(raw).unwrap();
        assert!(report.relaxation_flagged);
        assert!(report.to_string().contains("relaxation above"));
    }

    #[test]
    fn test_optimize_file_writes_ply() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Component1_1.vtk");
        labelmesh_io::vtk::write(&ball_surface(16, 6.0), &input, Stage::Isosurface).unwrap();

        let (report, path) = optimize_file(
            &input,
            dir.path(),
            &OptimizeParams::default(),
            MeshFormat::Ply,
        )
        .unwrap();
        assert_eq!(path, dir.path().join("Component1_1_optimized.ply"));
        let mesh = labelmesh_io::read_mesh(&path, Stage::Optimize).unwrap();
        assert_eq!(mesh.num_triangles(), report.output_triangles);
    }
}
