//! Connectivity queries on [`TriMesh`]: edges, neighbours, regions, boundary loops.

use std::collections::{HashMap, HashSet};

use glam::DVec3;

use crate::mesh::TriMesh;
use crate::union_find::UnionFind;

/// Orders an undirected edge as `(min, max)`.
#[inline]
#[must_use]
pub const fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Maps every undirected edge to the triangles that use it.
#[must_use]
pub fn edge_faces(mesh: &TriMesh) -> HashMap<(u32, u32), Vec<usize>> {
    let mut map: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
    for (t, tri) in mesh.triangles.iter().enumerate() {
        for i in 0..3 {
            map.entry(edge_key(tri[i], tri[(i + 1) % 3]))
                .or_default()
                .push(t);
        }
    }
    map
}

/// Triangles incident to each vertex.
#[must_use]
pub fn vertex_faces(mesh: &TriMesh) -> Vec<Vec<usize>> {
    let mut faces = vec![Vec::new(); mesh.vertices.len()];
    for (t, tri) in mesh.triangles.iter().enumerate() {
        for &v in tri {
            faces[v as usize].push(t);
        }
    }
    faces
}

/// Sorted, de-duplicated edge neighbours of each vertex.
#[must_use]
pub fn vertex_neighbors(mesh: &TriMesh) -> Vec<Vec<u32>> {
    let mut neighbors = vec![Vec::new(); mesh.vertices.len()];
    for tri in &mesh.triangles {
        for i in 0..3 {
            let a = tri[i];
            let b = tri[(i + 1) % 3];
            neighbors[a as usize].push(b);
            neighbors[b as usize].push(a);
        }
    }
    for list in &mut neighbors {
        list.sort_unstable();
        list.dedup();
    }
    neighbors
}

/// Whether every edge is shared by exactly two triangles.
#[must_use]
pub fn is_watertight(mesh: &TriMesh) -> bool {
    !mesh.is_empty() && edge_faces(mesh).values().all(|faces| faces.len() == 2)
}

/// Groups triangles into regions connected through shared vertices.
///
/// Regions are ordered by their lowest triangle index; triangles inside a region
/// keep ascending order.
#[must_use]
pub fn connected_regions(mesh: &TriMesh) -> Vec<Vec<usize>> {
    let mut uf = UnionFind::new(mesh.vertices.len());
    for &[a, b, c] in &mesh.triangles {
        uf.union(a as usize, b as usize);
        uf.union(a as usize, c as usize);
    }

    let mut region_of_root: HashMap<usize, usize> = HashMap::new();
    let mut regions: Vec<Vec<usize>> = Vec::new();
    for (t, tri) in mesh.triangles.iter().enumerate() {
        let root = uf.find(tri[0] as usize);
        let region = *region_of_root.entry(root).or_insert_with(|| {
            regions.push(Vec::new());
            regions.len() - 1
        });
        regions[region].push(t);
    }
    regions
}

/// Flips every vertex-connected shell whose signed volume is negative, so closed
/// surfaces end up with outward-facing triangles.
///
/// Returns the number of shells flipped.
pub fn orient_outward(mesh: &mut TriMesh) -> usize {
    let mut flipped = 0;
    for region in connected_regions(mesh) {
        if mesh.signed_volume_of(region.iter().copied()) < 0.0 {
            for &t in &region {
                mesh.flip_triangle(t);
            }
            flipped += 1;
        }
    }
    flipped
}

/// A closed loop of boundary edges.
///
/// Vertices follow the winding of the triangles along the boundary, so a patch
/// that closes the hole must traverse them in reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryLoop {
    /// Ordered vertex indices; the last connects back to the first.
    pub vertices: Vec<u32>,
}

impl BoundaryLoop {
    /// Number of edges (and vertices) in the loop.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Returns true for an empty loop.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Mean position of the loop vertices.
    #[must_use]
    pub fn centroid(&self, mesh: &TriMesh) -> DVec3 {
        if self.vertices.is_empty() {
            return DVec3::ZERO;
        }
        let sum: DVec3 = self
            .vertices
            .iter()
            .map(|&v| mesh.vertices[v as usize])
            .sum();
        sum / self.vertices.len() as f64
    }

    /// Largest distance from the centroid to a loop vertex.
    #[must_use]
    pub fn radius(&self, mesh: &TriMesh) -> f64 {
        let c = self.centroid(mesh);
        self.vertices
            .iter()
            .map(|&v| mesh.vertices[v as usize].distance(c))
            .fold(0.0, f64::max)
    }
}

/// Traces all boundary loops (holes) of the mesh.
///
/// A directed edge `a -> b` is on the boundary when no triangle contains `b -> a`.
/// Open chains that cannot be closed are skipped.
#[must_use]
pub fn boundary_loops(mesh: &TriMesh) -> Vec<BoundaryLoop> {
    let directed: HashSet<(u32, u32)> = mesh
        .triangles
        .iter()
        .flat_map(|tri| (0..3).map(move |i| (tri[i], tri[(i + 1) % 3])))
        .collect();

    let mut boundary: Vec<(u32, u32)> = Vec::new();
    let mut outgoing: HashMap<u32, Vec<u32>> = HashMap::new();
    for tri in &mesh.triangles {
        for i in 0..3 {
            let (a, b) = (tri[i], tri[(i + 1) % 3]);
            if !directed.contains(&(b, a)) {
                boundary.push((a, b));
                outgoing.entry(a).or_default().push(b);
            }
        }
    }
    if boundary.is_empty() {
        return Vec::new();
    }
    // Pop from the back; reverse so earlier triangles are consumed first.
    for targets in outgoing.values_mut() {
        targets.reverse();
    }

    let mut used: HashSet<(u32, u32)> = HashSet::new();
    let mut loops = Vec::new();
    for &(start, first) in &boundary {
        if used.contains(&(start, first)) {
            continue;
        }
        if let Some(targets) = outgoing.get_mut(&start) {
            if let Some(pos) = targets.iter().position(|&b| b == first) {
                targets.remove(pos);
            }
        }
        used.insert((start, first));

        let mut vertices = vec![start];
        let mut current = first;
        let mut closed = false;
        while vertices.len() <= boundary.len() {
            if current == start {
                closed = true;
                break;
            }
            vertices.push(current);
            let Some(next) = outgoing.get_mut(&current).and_then(Vec::pop) else {
                break;
            };
            used.insert((current, next));
            current = next;
        }

        if closed && vertices.len() >= 3 {
            loops.push(BoundaryLoop { vertices });
        } else {
            log::debug!("skipping open boundary chain starting at vertex {start}");
        }
    }
    loops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::unit_cube;

    #[test]
    fn test_cube_is_closed() {
        let cube = unit_cube();
        assert!(is_watertight(&cube));
        assert!(boundary_loops(&cube).is_empty());
        assert_eq!(connected_regions(&cube).len(), 1);
    }

    #[test]
    fn test_open_cube_has_one_loop() {
        let mut cube = unit_cube();
        // Remove the top face (z = 1).
        cube.triangles.retain(|t| *t != [4, 5, 6] && *t != [4, 6, 7]);
        assert!(!is_watertight(&cube));

        let loops = boundary_loops(&cube);
        assert_eq!(loops.len(), 1);
        let hole = &loops[0];
        assert_eq!(hole.len(), 4);
        let mut sorted = hole.vertices.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![4, 5, 6, 7]);
        assert!((hole.centroid(&cube) - DVec3::new(0.5, 0.5, 1.0)).length() < 1e-12);
        assert!((hole.radius(&cube) - 0.5_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_boundary_loop_follows_triangle_winding() {
        let mesh = TriMesh::new(
            vec![DVec3::ZERO, DVec3::X, DVec3::Y],
            vec![[0, 1, 2]],
        );
        let loops = boundary_loops(&mesh);
        assert_eq!(loops, vec![BoundaryLoop { vertices: vec![0, 1, 2] }]);
    }

    #[test]
    fn test_orient_outward_flips_inverted_shell() {
        let mut mesh = unit_cube();
        for t in 0..mesh.num_triangles() {
            mesh.flip_triangle(t);
        }
        assert!(mesh.signed_volume() < 0.0);
        assert_eq!(orient_outward(&mut mesh), 1);
        assert!((mesh.signed_volume() - 1.0).abs() < 1e-12);
        assert_eq!(orient_outward(&mut mesh), 0);
    }

    #[test]
    fn test_regions_and_neighbors() {
        let mut mesh = unit_cube();
        let offset = mesh.vertices.len() as u32;
        let shifted: Vec<DVec3> = mesh.vertices.iter().map(|v| *v + DVec3::X * 5.0).collect();
        let tris: Vec<[u32; 3]> = mesh
            .triangles
            .iter()
            .map(|t| [t[0] + offset, t[1] + offset, t[2] + offset])
            .collect();
        mesh.vertices.extend(shifted);
        mesh.triangles.extend(tris);

        let regions = connected_regions(&mesh);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0], (0..12).collect::<Vec<_>>());

        let neighbors = vertex_neighbors(&mesh);
        assert!(neighbors[0].iter().all(|&n| n < offset));
        assert_eq!(vertex_faces(&mesh)[0].len(), 6);
    }
}
