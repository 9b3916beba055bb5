//! Laplacian smoothing.

use labelmesh_core::topology::vertex_neighbors;
use labelmesh_core::{DVec3, TriMesh};
use rayon::prelude::*;

/// Relaxation factors above this are allowed but shrink the surface noticeably.
pub const RELAXATION_WARN_LIMIT: f64 = 0.5;

/// Runs `iterations` passes of `v <- v + relaxation * (centroid(neighbours) - v)`.
///
/// Each pass reads the previous positions only. Vertices without neighbours stay
/// put. With `relaxation == 0` or `iterations == 0` the mesh is not touched.
///
/// Returns `true` if the relaxation exceeds [`RELAXATION_WARN_LIMIT`].
pub fn laplacian_smooth(mesh: &mut TriMesh, relaxation: f64, iterations: usize) -> bool {
    let flagged = relaxation > RELAXATION_WARN_LIMIT;
    if flagged {
        log::warn!(
            "relaxation {relaxation} is above {RELAXATION_WARN_LIMIT}; \
             the surface may shrink or become unstable"
        );
    }
    if relaxation == 0.0 || iterations == 0 {
        return flagged;
    }

    let neighbors = vertex_neighbors(mesh);
    for _ in 0..iterations {
        let current = &mesh.vertices;
        let next: Vec<DVec3> = (0..current.len())
            .into_par_iter()
            .map(|v| {
                let p = current[v];
                let ring = &neighbors[v];
                if ring.is_empty() {
                    return p;
                }
                let centroid = ring
                    .iter()
                    .map(|&u| current[u as usize])
                    .sum::<DVec3>()
                    / ring.len() as f64;
                p + relaxation * (centroid - p)
            })
            .collect();
        mesh.vertices = next;
    }
    flagged
}
