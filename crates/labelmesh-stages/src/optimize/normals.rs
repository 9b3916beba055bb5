//! Consistent, outward-facing triangle orientation.

use std::collections::VecDeque;

use labelmesh_core::topology::{edge_faces, edge_key, orient_outward};
use labelmesh_core::TriMesh;

/// Outcome of [`orient_normals`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalStats {
    /// Triangles flipped to agree with their edge neighbours.
    pub reoriented: usize,
    /// Shells flipped as a whole because they faced inward.
    pub shells_flipped: usize,
}

/// Makes winding consistent across manifold edges, then flips every shell with
/// negative signed volume.
///
/// Each edge-connected patch takes the winding of its lowest-index triangle.
/// Edges shared by more than two triangles do not propagate orientation.
pub fn orient_normals(mesh: &mut TriMesh) -> NormalStats {
    let reoriented = make_consistent(mesh);
    let shells_flipped = orient_outward(mesh);
    log::debug!("normals: {reoriented} triangles reoriented, {shells_flipped} shells flipped");
    NormalStats {
        reoriented,
        shells_flipped,
    }
}

fn make_consistent(mesh: &mut TriMesh) -> usize {
    let edges = edge_faces(mesh);
    let mut visited = vec![false; mesh.num_triangles()];
    let mut queue = VecDeque::new();
    let mut flipped = 0;

    for seed in 0..mesh.num_triangles() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        queue.push_back(seed);
        while let Some(t) = queue.pop_front() {
            let tri = mesh.triangles[t];
            for i in 0..3 {
                let (a, b) = (tri[i], tri[(i + 1) % 3]);
                let Some(faces) = edges.get(&edge_key(a, b)) else {
                    continue;
                };
                let &[f0, f1] = faces.as_slice() else {
                    continue;
                };
                let other = if f0 == t { f1 } else { f0 };
                if visited[other] {
                    continue;
                }
                visited[other] = true;
                // A consistent neighbour runs the shared edge as b -> a.
                if runs_edge(&mesh.triangles[other], a, b) {
                    mesh.flip_triangle(other);
                    flipped += 1;
                }
                queue.push_back(other);
            }
        }
    }
    flipped
}

fn runs_edge(tri: &[u32; 3], a: u32, b: u32) -> bool {
    (0..3).any(|i| tri[i] == a && tri[(i + 1) % 3] == b)
}
