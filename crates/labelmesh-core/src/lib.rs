//! Core types for labelmesh.
//!
//! This crate provides the data model shared by the I/O layer and the stages:
//! - [`Grid`] and [`Volume`] for voxel data
//! - [`TriMesh`] and the [`topology`] queries on it
//! - [`PipelineParams`] with its validated defaults
//! - [`marching_cubes`] iso-surface extraction
//! - [`LabelMeshError`] and the crate-wide [`Result`]

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// Voxel indices and counts are routinely converted to coordinates
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod grid;
pub mod marching_cubes;
pub mod mesh;
pub mod params;
pub mod topology;
pub mod union_find;
pub mod volume;

pub use error::{LabelMeshError, Result, Stage};
pub use grid::Grid;
pub use marching_cubes::marching_cubes;
pub use mesh::TriMesh;
pub use params::{ArtifactMeasure, DiffusionParams, MeshFormat, OptimizeParams, PipelineParams};
pub use union_find::UnionFind;
pub use volume::{LabelVolume, MaskVolume, ScalarVolume, Volume, Voxel};

// Re-export glam types for convenience
pub use glam::{DMat3, DVec3};
