//! Topology-preserving decimation by quadric-error edge collapse.
//!
//! Every interior edge gets a collapse cost from the summed quadrics of its two
//! vertices. Edges are collapsed cheapest first until the triangle count reaches
//! the target. A collapse is rejected when it would
//! - touch a boundary edge, or join two boundary vertices through the interior,
//! - violate the link condition (the endpoints share more than the two opposite
//!   vertices, which would pinch the surface),
//! - leave a vertex with fewer than three neighbours,
//! - flip or flatten any surviving triangle.
//!
//! Costs are refreshed lazily: each heap entry records the edit versions of its
//! endpoints and is skipped once either vertex has changed. Rejected edges are
//! parked and re-queued when a collapse reshapes the 1-ring around them.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use labelmesh_core::topology::edge_faces;
use labelmesh_core::{DVec3, TriMesh};

use super::quadric::Quadric;

/// Statistics from [`decimate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecimateStats {
    /// Edges collapsed.
    pub collapses: usize,
    /// Candidate collapses rejected by the topology or flip checks.
    pub rejected: usize,
}

/// Triangle count to reach for a given reduction fraction.
pub fn target_triangle_count(triangles: usize, target_reduction: f64) -> usize {
    if target_reduction <= 0.0 {
        return triangles;
    }
    let target = (triangles as f64 * (1.0 - target_reduction)).ceil();
    (target.max(0.0) as usize).min(triangles)
}

/// Collapses edges until at most `ceil(n * (1 - target_reduction))` triangles
/// remain, or no valid collapse is left.
///
/// Equal costs are resolved by the lower `(v1, v2)` vertex pair, so the result
/// depends only on the input. A reduction of zero leaves the mesh untouched.
pub fn decimate(mesh: &mut TriMesh, target_reduction: f64) -> DecimateStats {
    let target = target_triangle_count(mesh.num_triangles(), target_reduction);
    if target >= mesh.num_triangles() {
        return DecimateStats::default();
    }

    let mut state = CollapseState::new(mesh);
    let heap = interior_candidates(mesh, &state);
    let stats = collapse_until(&mut state, heap, target);

    log::debug!(
        "decimate: {} -> {} triangles (target {target}), {} collapses, {} rejected",
        mesh.num_triangles(),
        state.live_faces,
        stats.collapses,
        stats.rejected
    );
    state.write_back(mesh);
    stats
}

fn interior_candidates(mesh: &TriMesh, state: &CollapseState) -> BinaryHeap<Candidate> {
    edge_faces(mesh)
        .into_iter()
        .filter(|(_, faces)| faces.len() == 2)
        .filter_map(|((v1, v2), _)| state.candidate(v1, v2))
        .collect()
}

/// Pops candidates until `target` faces remain or the heap runs dry.
///
/// When it runs dry, no live edge is a valid collapse of the final state.
fn collapse_until(
    state: &mut CollapseState,
    mut heap: BinaryHeap<Candidate>,
    target: usize,
) -> DecimateStats {
    let mut stats = DecimateStats::default();
    let mut parked = Parked::default();
    while state.live_faces > target {
        let Some(candidate) = heap.pop() else {
            break;
        };
        if !state.is_current(&candidate) {
            continue;
        }
        if !state.is_valid(&candidate) {
            stats.rejected += 1;
            parked.insert(candidate.v1, candidate.v2);
            continue;
        }
        state.collapse(&candidate);
        stats.collapses += 1;

        let (v1, v2) = (candidate.v1, candidate.v2);
        let ring = state.neighbors(v1);
        let mut edges: Vec<(u32, u32)> = ring
            .iter()
            .map(|&n| if v1 < n { (v1, n) } else { (n, v1) })
            .collect();
        // Rejections only depend on the endpoints' 1-rings, and those just changed.
        for v in [v1, v2].into_iter().chain(ring.iter().copied()) {
            edges.extend(
                parked
                    .take(v)
                    .into_iter()
                    .filter(|&(a, b)| state.neighbors(a).binary_search(&b).is_ok()),
            );
        }
        edges.sort_unstable();
        edges.dedup();
        for (a, b) in edges {
            heap.extend(state.candidate(a, b));
        }
    }
    stats
}

/// Rejected edges, stored in both orientations so either endpoint finds them.
#[derive(Debug, Default)]
struct Parked(BTreeSet<(u32, u32)>);

impl Parked {
    fn insert(&mut self, a: u32, b: u32) {
        self.0.insert((a, b));
        self.0.insert((b, a));
    }

    /// Removes every parked edge at `v`, returned as `(low, high)` pairs.
    fn take(&mut self, v: u32) -> Vec<(u32, u32)> {
        let partners: Vec<u32> = self.0.range((v, 0)..=(v, u32::MAX)).map(|&(_, u)| u).collect();
        partners
            .into_iter()
            .map(|u| {
                self.0.remove(&(v, u));
                self.0.remove(&(u, v));
                if v < u { (v, u) } else { (u, v) }
            })
            .collect()
    }
}

/// A proposed collapse of edge `(v1, v2)` into `v1` at `position`.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    cost: f64,
    v1: u32,
    v2: u32,
    position: DVec3,
    versions: (u32, u32),
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Reversed so the max-heap pops the cheapest, lowest-indexed edge first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| (other.v1, other.v2).cmp(&(self.v1, self.v2)))
    }
}

struct CollapseState {
    positions: Vec<DVec3>,
    faces: Vec<[u32; 3]>,
    alive: Vec<bool>,
    vertex_faces: Vec<Vec<usize>>,
    quadrics: Vec<Quadric>,
    boundary: Vec<bool>,
    versions: Vec<u32>,
    live_faces: usize,
}

impl CollapseState {
    fn new(mesh: &TriMesh) -> Self {
        let n = mesh.num_vertices();
        let mut vertex_faces = vec![Vec::new(); n];
        let mut quadrics = vec![Quadric::ZERO; n];
        for (t, tri) in mesh.triangles.iter().enumerate() {
            let q = Quadric::from_triangle(mesh.corners(t));
            for &v in tri {
                vertex_faces[v as usize].push(t);
                quadrics[v as usize] += q;
            }
        }

        let mut boundary = vec![false; n];
        for ((a, b), faces) in edge_faces(mesh) {
            if faces.len() != 2 {
                boundary[a as usize] = true;
                boundary[b as usize] = true;
            }
        }

        Self {
            positions: mesh.vertices.clone(),
            faces: mesh.triangles.clone(),
            alive: vec![true; mesh.num_triangles()],
            vertex_faces,
            quadrics,
            boundary,
            versions: vec![0; n],
            live_faces: mesh.num_triangles(),
        }
    }

    fn faces_of(&self, v: u32) -> impl Iterator<Item = usize> + '_ {
        self.vertex_faces[v as usize]
            .iter()
            .copied()
            .filter(|&f| self.alive[f])
    }

    fn neighbors(&self, v: u32) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .faces_of(v)
            .flat_map(|f| self.faces[f])
            .filter(|&u| u != v)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn candidate(&self, v1: u32, v2: u32) -> Option<Candidate> {
        let (b1, b2) = (self.boundary[v1 as usize], self.boundary[v2 as usize]);
        if b1 && b2 {
            return None;
        }
        let p1 = self.positions[v1 as usize];
        let p2 = self.positions[v2 as usize];
        let q = self.quadrics[v1 as usize] + self.quadrics[v2 as usize];

        let position = if b1 {
            p1
        } else if b2 {
            p2
        } else {
            let mid = (p1 + p2) * 0.5;
            q.optimal_point()
                .filter(|p| p.distance(mid) <= p1.distance(p2))
                .unwrap_or_else(|| {
                    [p1, p2, mid]
                        .into_iter()
                        .min_by(|a, b| q.evaluate(*a).total_cmp(&q.evaluate(*b)))
                        .unwrap_or(mid)
                })
        };

        Some(Candidate {
            cost: q.evaluate(position),
            v1,
            v2,
            position,
            versions: (self.versions[v1 as usize], self.versions[v2 as usize]),
        })
    }

    fn is_current(&self, c: &Candidate) -> bool {
        c.versions == (self.versions[c.v1 as usize], self.versions[c.v2 as usize])
    }

    fn is_valid(&self, c: &Candidate) -> bool {
        let (v1, v2) = (c.v1, c.v2);
        let shared: Vec<usize> = self
            .faces_of(v1)
            .filter(|&f| self.faces[f].contains(&v2))
            .collect();
        if shared.len() != 2 {
            return false;
        }

        let n1 = self.neighbors(v1);
        let n2 = self.neighbors(v2);
        let common: Vec<u32> = n1
            .iter()
            .copied()
            .filter(|u| n2.binary_search(u).is_ok())
            .collect();
        if common.len() != 2 {
            return false;
        }
        if common.iter().any(|&o| self.neighbors(o).len() <= 3) {
            return false;
        }
        if n1.len() + n2.len() < 7 {
            return false;
        }

        for v in [v1, v2] {
            for f in self.faces_of(v).filter(|f| !shared.contains(f)) {
                let tri = self.faces[f];
                let before = self.face_normal(tri, None);
                let after = self.face_normal(tri, Some((v, c.position)));
                if after.dot(before) <= 0.0
                    || after.length_squared() <= 1e-12 * before.length_squared()
                {
                    return false;
                }
            }
        }
        true
    }

    fn face_normal(&self, tri: [u32; 3], moved: Option<(u32, DVec3)>) -> DVec3 {
        let p = |v: u32| match moved {
            Some((m, position)) if m == v => position,
            _ => self.positions[v as usize],
        };
        let [a, b, c] = tri.map(p);
        (b - a).cross(c - a)
    }

    fn collapse(&mut self, c: &Candidate) {
        let (v1, v2) = (c.v1, c.v2);
        let mut touched: Vec<usize> = self.faces_of(v1).chain(self.faces_of(v2)).collect();
        touched.sort_unstable();
        touched.dedup();

        let mut merged: Vec<usize> = Vec::with_capacity(touched.len());
        for f in touched {
            if self.faces[f].contains(&v1) && self.faces[f].contains(&v2) {
                self.alive[f] = false;
                self.live_faces -= 1;
                continue;
            }
            for v in &mut self.faces[f] {
                if *v == v2 {
                    *v = v1;
                }
            }
            merged.push(f);
        }

        let (i1, i2) = (v1 as usize, v2 as usize);
        self.vertex_faces[i1] = merged;
        self.vertex_faces[i2].clear();
        self.positions[i1] = c.position;
        let q2 = self.quadrics[i2];
        self.quadrics[i1] += q2;
        self.boundary[i1] |= self.boundary[i2];
        self.versions[i1] += 1;
        self.versions[i2] += 1;
    }

    fn write_back(self, mesh: &mut TriMesh) {
        mesh.vertices = self.positions;
        mesh.triangles = self
            .faces
            .into_iter()
            .zip(self.alive)
            .filter_map(|(tri, alive)| alive.then_some(tri))
            .collect();
        mesh.remove_unreferenced_vertices();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelmesh_core::topology::{boundary_loops, is_watertight};

    /// UV sphere with `rings` latitude bands and `segments` longitude slices.
    fn uv_sphere(rings: u32, segments: u32) -> TriMesh {
        let mut vertices = vec![DVec3::Z];
        for r in 1..rings {
            let theta = std::f64::consts::PI * f64::from(r) / f64::from(rings);
            for s in 0..segments {
                let phi = std::f64::consts::TAU * f64::from(s) / f64::from(segments);
                vertices.push(DVec3::new(
                    theta.sin() * phi.cos(),
                    theta.sin() * phi.sin(),
                    theta.cos(),
                ));
            }
        }
        vertices.push(-DVec3::Z);
        let south = vertices.len() as u32 - 1;
        let ring = |r: u32, s: u32| 1 + (r - 1) * segments + s % segments;

        let mut triangles = Vec::new();
        for s in 0..segments {
            triangles.push([0, ring(1, s), ring(1, s + 1)]);
            triangles.push([south, ring(rings - 1, s + 1), ring(rings - 1, s)]);
        }
        for r in 1..rings - 1 {
            for s in 0..segments {
                let (a, b) = (ring(r, s), ring(r, s + 1));
                let (c, d) = (ring(r + 1, s), ring(r + 1, s + 1));
                triangles.push([a, c, d]);
                triangles.push([a, d, b]);
            }
        }
        TriMesh::new(vertices, triangles)
    }

    /// Flat `n x n` grid of unit squares in the z = 0 plane.
    fn plane(n: u32) -> TriMesh {
        let mut vertices = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                vertices.push(DVec3::new(f64::from(i), f64::from(j), 0.0));
            }
        }
        let id = |i: u32, j: u32| j * (n + 1) + i;
        let mut triangles = Vec::new();
        for j in 0..n {
            for i in 0..n {
                triangles.push([id(i, j), id(i + 1, j), id(i + 1, j + 1)]);
                triangles.push([id(i, j), id(i + 1, j + 1), id(i, j + 1)]);
            }
        }
        TriMesh::new(vertices, triangles)
    }

    #[test]
    fn test_target_count() {
        assert_eq!(target_triangle_count(1000, 0.0), 1000);
        assert_eq!(target_triangle_count(1000, 0.01), 990);
        assert_eq!(target_triangle_count(1000, 0.5), 500);
        assert_eq!(target_triangle_count(7, 0.5), 4);
    }

    #[test]
    fn test_zero_reduction_is_identity() {
        let mut mesh = uv_sphere(8, 12);
        let original = mesh.clone();
        assert_eq!(decimate(&mut mesh, 0.0), DecimateStats::default());
        assert_eq!(mesh, original);
    }

    #[test]
    fn test_sphere_stays_closed() {
        let mut mesh = uv_sphere(12, 16);
        assert!(is_watertight(&mesh));
        let before = mesh.num_triangles();

        let stats = decimate(&mut mesh, 0.5);
        assert!(stats.collapses > 0);
        assert!(mesh.num_triangles() <= before * 6 / 10, "{}", mesh.num_triangles());
        assert!(is_watertight(&mesh));
        assert!(mesh.validate().is_ok());
        assert!(mesh.signed_volume() > 0.0);
        // Euler characteristic of a sphere.
        let edges = edge_faces(&mesh).len();
        assert_eq!(mesh.num_vertices() + mesh.num_triangles(), edges + 2);
    }

    #[test]
    fn test_open_boundary_is_preserved() {
        let mut mesh = plane(6);
        let boundary_points = |mesh: &TriMesh| {
            let loops = boundary_loops(mesh);
            assert_eq!(loops.len(), 1);
            let mut points: Vec<[f64; 3]> = loops[0]
                .vertices
                .iter()
                .map(|&v| mesh.vertices[v as usize].to_array())
                .collect();
            points.sort_by(|a, b| a.partial_cmp(b).unwrap());
            points
        };
        let before = boundary_points(&mesh);

        let stats = decimate(&mut mesh, 0.6);
        assert!(stats.collapses > 0);
        assert_eq!(boundary_points(&mesh), before);
        // Everything stays in the plane.
        assert!(mesh.vertices.iter().all(|v| v.z.abs() < 1e-9));
    }

    #[test]
    fn test_deterministic() {
        let mut a = uv_sphere(10, 14);
        let mut b = a.clone();
        decimate(&mut a, 0.3);
        decimate(&mut b, 0.3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_parked_edges_are_found_from_either_end() {
        let mut parked = Parked::default();
        parked.insert(7, 3);
        parked.insert(3, 9);
        parked.insert(4, 5);

        assert_eq!(parked.take(3), vec![(3, 7), (3, 9)]);
        assert!(parked.take(7).is_empty());
        assert_eq!(parked.take(5), vec![(4, 5)]);
        assert!(parked.0.is_empty());
    }

    #[test]
    fn test_exhausted_heap_leaves_no_valid_collapse() {
        let mesh = uv_sphere(10, 14);
        let mut state = CollapseState::new(&mesh);
        let heap = interior_candidates(&mesh, &state);
        let stats = collapse_until(&mut state, heap, 0);
        assert!(stats.collapses > 0);
        assert!(stats.rejected > 0);

        // Every edge still alive has been rejected against its current neighbourhood.
        let mut edges: Vec<(u32, u32)> = (0..state.faces.len())
            .filter(|&f| state.alive[f])
            .flat_map(|f| {
                let [a, b, c] = state.faces[f];
                [(a, b), (b, c), (c, a)]
            })
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect();
        edges.sort_unstable();
        edges.dedup();
        assert!(!edges.is_empty());
        for (a, b) in edges {
            if let Some(candidate) = state.candidate(a, b) {
                assert!(!state.is_valid(&candidate), "edge ({a}, {b}) can still collapse");
            }
        }
    }

    #[test]
    fn test_tetrahedron_cannot_collapse() {
        let mut mesh = TriMesh::new(
            vec![
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
                DVec3::new(0.0, 0.0, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]],
        );
        let stats = decimate(&mut mesh, 0.9);
        assert_eq!(stats.collapses, 0);
        assert_eq!(mesh.num_triangles(), 4);
    }
}
