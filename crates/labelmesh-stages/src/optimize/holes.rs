//! Hole filling by ear clipping.

use labelmesh_core::topology::{boundary_loops, BoundaryLoop};
use labelmesh_core::{DVec3, TriMesh};

/// Outcome of [`fill_holes`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoleStats {
    /// Holes closed with a patch.
    pub filled: usize,
    /// Holes left open because they are too large or pass a vertex twice.
    pub open: usize,
}

/// Closes every boundary loop whose radius is at most `max_radius`.
///
/// The radius of a loop is the largest distance from its centroid to one of its
/// vertices. Patches are wound against the loop direction, so they face the same
/// way as the surrounding surface. No vertices are added.
pub fn fill_holes(mesh: &mut TriMesh, max_radius: f64) -> HoleStats {
    let mut stats = HoleStats::default();
    for hole in boundary_loops(mesh) {
        let radius = hole.radius(mesh);
        if radius > max_radius || !is_simple(&hole) {
            log::debug!("leaving hole of {} edges open (radius {radius:.3})", hole.len());
            stats.open += 1;
            continue;
        }
        let patch = triangulate_hole(mesh, &hole);
        log::debug!(
            "filling hole of {} edges (radius {radius:.3}) with {} triangles",
            hole.len(),
            patch.len()
        );
        mesh.triangles.extend(patch);
        stats.filled += 1;
    }
    if stats.open > 0 {
        log::info!("{} holes left open (hole_tolerance {max_radius})", stats.open);
    }
    stats
}

fn is_simple(hole: &BoundaryLoop) -> bool {
    let mut sorted = hole.vertices.clone();
    sorted.sort_unstable();
    sorted.windows(2).all(|w| w[0] != w[1])
}

/// Triangulates a boundary loop in its best-fit plane.
///
/// Falls back to a fan from the first remaining vertex when no ear is found.
pub fn triangulate_hole(mesh: &TriMesh, hole: &BoundaryLoop) -> Vec<[u32; 3]> {
    // Reverse so the patch's edges pair up with the boundary edges.
    let ring: Vec<u32> = hole.vertices.iter().rev().copied().collect();
    if ring.len() < 3 {
        return Vec::new();
    }
    let points = project(mesh, &ring);

    let mut remaining: Vec<usize> = (0..ring.len()).collect();
    let mut triangles = Vec::with_capacity(ring.len() - 2);
    while remaining.len() > 3 {
        let n = remaining.len();
        let ear = (0..n).find(|&i| {
            let (a, b, c) = (remaining[(i + n - 1) % n], remaining[i], remaining[(i + 1) % n]);
            is_ear(&points, &remaining, a, b, c)
        });
        let Some(i) = ear else {
            break;
        };
        let (a, b, c) = (remaining[(i + n - 1) % n], remaining[i], remaining[(i + 1) % n]);
        triangles.push([ring[a], ring[b], ring[c]]);
        remaining.remove(i);
    }

    if remaining.len() > 3 {
        log::debug!("ear clipping stuck with {} vertices, using a fan", remaining.len());
    }
    for i in 1..remaining.len() - 1 {
        triangles.push([ring[remaining[0]], ring[remaining[i]], ring[remaining[i + 1]]]);
    }
    triangles
}

/// Projects the ring onto the plane of its Newell normal, counter-clockwise.
fn project(mesh: &TriMesh, ring: &[u32]) -> Vec<[f64; 2]> {
    let positions: Vec<DVec3> = ring.iter().map(|&v| mesh.vertices[v as usize]).collect();
    let centroid = positions.iter().copied().sum::<DVec3>() / positions.len() as f64;
    let normal = positions
        .iter()
        .zip(positions.iter().cycle().skip(1))
        .map(|(&p, &q)| (p - centroid).cross(q - centroid))
        .sum::<DVec3>()
        .normalize_or_zero();
    let normal = if normal == DVec3::ZERO { DVec3::Z } else { normal };
    let u = normal.any_orthonormal_vector();
    let v = normal.cross(u);
    positions
        .iter()
        .map(|&p| [(p - centroid).dot(u), (p - centroid).dot(v)])
        .collect()
}

fn cross2(o: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

fn is_ear(points: &[[f64; 2]], remaining: &[usize], a: usize, b: usize, c: usize) -> bool {
    let (pa, pb, pc) = (points[a], points[b], points[c]);
    if cross2(pa, pb, pc) <= 0.0 {
        return false;
    }
    remaining
        .iter()
        .filter(|&&i| i != a && i != b && i != c)
        .all(|&i| {
            let p = points[i];
            !(cross2(pa, pb, p) >= 0.0 && cross2(pb, pc, p) >= 0.0 && cross2(pc, pa, p) >= 0.0)
        })
}
