//! Removal of small disconnected fragments.

use labelmesh_core::topology::connected_regions;
use labelmesh_core::{ArtifactMeasure, TriMesh};

/// Discards vertex-connected regions smaller than `tolerance`.
///
/// Region size is its triangle count or its surface area, depending on
/// `measure`. Surviving triangles keep their relative order. Returns the number
/// of regions removed.
pub fn remove_artifacts(mesh: &mut TriMesh, tolerance: f64, measure: ArtifactMeasure) -> usize {
    let regions = connected_regions(mesh);
    let mut keep: Vec<usize> = Vec::with_capacity(mesh.num_triangles());
    let mut removed = 0;
    for region in &regions {
        let size = match measure {
            ArtifactMeasure::TriangleCount => region.len() as f64,
            ArtifactMeasure::SurfaceArea => region.iter().map(|&t| mesh.triangle_area(t)).sum(),
        };
        if size < tolerance {
            log::debug!(
                "removing artifact of {} triangles (size {size:.3} < {tolerance})",
                region.len()
            );
            removed += 1;
        } else {
            keep.extend_from_slice(region);
        }
    }

    if removed > 0 {
        keep.sort_unstable();
        *mesh = mesh.submesh(&keep);
    }
    log::debug!(
        "artifacts: {removed} of {} regions removed, {} triangles left",
        regions.len(),
        mesh.num_triangles()
    );
    removed
}
