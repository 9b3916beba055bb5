//! Vertex welding.

#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;

use labelmesh_core::{DVec3, TriMesh};

/// Welds vertices closer than `tolerance`, then drops triangles the weld made
/// degenerate and vertices nothing references.
///
/// The lowest-index vertex of each cluster survives and keeps its position. Every
/// other vertex within `tolerance` of a survivor is merged into it, so survivors
/// are at least `tolerance` apart and a second pass welds nothing. A
/// non-positive tolerance merges exact duplicates only.
///
/// Returns the number of vertices merged away.
pub fn clean(mesh: &mut TriMesh, tolerance: f64) -> usize {
    let remap = if tolerance > 0.0 {
        weld_within(&mesh.vertices, tolerance)
    } else {
        weld_exact(&mesh.vertices)
    };
    let welded = remap
        .iter()
        .enumerate()
        .filter(|&(i, &target)| target as usize != i)
        .count();

    for tri in &mut mesh.triangles {
        for v in tri.iter_mut() {
            *v = remap[*v as usize];
        }
    }
    let degenerate = mesh.remove_degenerate_triangles();
    let unreferenced = mesh.remove_unreferenced_vertices();
    log::debug!(
        "clean: {welded} vertices welded, {degenerate} degenerate triangles, \
         {unreferenced} unreferenced vertices removed"
    );
    welded
}

/// Spatial-hash weld: each unmerged vertex absorbs later vertices within `eps`.
fn weld_within(vertices: &[DVec3], eps: f64) -> Vec<u32> {
    let cell_of = |p: DVec3| {
        let c = (p / eps).floor();
        (c.x as i64, c.y as i64, c.z as i64)
    };

    // Triangles index with u32, so vertices past that range are never looked up.
    let indexed = || (0..=u32::MAX).zip(vertices.iter().copied());

    let mut cells: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
    for (i, p) in indexed() {
        cells.entry(cell_of(p)).or_default().push(i);
    }

    let mut remap: Vec<u32> = indexed().map(|(i, _)| i).collect();
    for (i, p) in indexed() {
        if remap[i as usize] != i {
            continue;
        }
        let (cx, cy, cz) = cell_of(p);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = (
                        cx.saturating_add(dx),
                        cy.saturating_add(dy),
                        cz.saturating_add(dz),
                    );
                    let Some(bucket) = cells.get(&key) else {
                        continue;
                    };
                    for &other in bucket {
                        let o = other as usize;
                        if other > i && remap[o] == other && p.distance(vertices[o]) < eps {
                            remap[o] = i;
                        }
                    }
                }
            }
        }
    }
    remap
}

/// Merges vertices with bit-identical coordinates.
fn weld_exact(vertices: &[DVec3]) -> Vec<u32> {
    let mut first: HashMap<[u64; 3], u32> = HashMap::new();
    (0..=u32::MAX)
        .zip(vertices)
        .map(|(i, p)| {
            // `+ 0.0` folds -0.0 into 0.0.
            let key = [(p.x + 0.0).to_bits(), (p.y + 0.0).to_bits(), (p.z + 0.0).to_bits()];
            *first.entry(key).or_insert(i)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip() -> TriMesh {
        // Two triangles that share an edge, but with duplicated edge vertices.
        TriMesh::new(
            vec![
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
                DVec3::new(1.0 + 1e-5, 0.0, 0.0),
                DVec3::new(1.0, 1.0, 0.0),
                DVec3::new(0.0, 1.0 - 1e-5, 0.0),
            ],
            vec![[0, 1, 2], [3, 4, 5]],
        )
    }

    #[test]
    fn test_weld_within_tolerance() {
        let mut mesh = strip();
        assert_eq!(clean(&mut mesh, 1e-4), 2);
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [1, 3, 2]]);
        // Survivors keep their own position.
        assert_eq!(mesh.vertices[1], DVec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_tolerance_too_small_keeps_vertices() {
        let mut mesh = strip();
        assert_eq!(clean(&mut mesh, 1e-6), 0);
        assert_eq!(mesh.num_vertices(), 6);
    }

    #[test]
    fn test_zero_tolerance_merges_exact_duplicates() {
        let mut mesh = TriMesh::new(
            vec![
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
                DVec3::new(-0.0, 1.0, 0.0),
                DVec3::new(1.0, 1.0, 0.0),
                DVec3::new(1.0, 1e-12, 0.0),
            ],
            vec![[0, 1, 2], [5, 4, 3]],
        );
        assert_eq!(clean(&mut mesh, 0.0), 1);
        assert_eq!(mesh.num_vertices(), 5);
    }

    #[test]
    fn test_weld_drops_collapsed_triangles() {
        let mut mesh = TriMesh::new(
            vec![
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
                DVec3::new(0.0, 1e-3, 0.0),
            ],
            vec![[0, 1, 2], [0, 1, 3]],
        );
        assert_eq!(clean(&mut mesh, 0.01), 1);
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
        assert_eq!(mesh.num_vertices(), 3);
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        // A chain of points 0.6 apart: with tolerance 1.0, vertex 0 absorbs 1 only,
        // and survivors end up at least 1.0 apart.
        let vertices: Vec<DVec3> = (0..6)
            .map(|i| DVec3::new(0.6 * f64::from(i), 0.0, 0.0))
            .collect();
        let mut mesh = TriMesh::new(vertices, Vec::new());
        mesh.vertices.push(DVec3::new(0.0, 5.0, 0.0));
        mesh.triangles = (0..6).map(|i| [i, (i + 1) % 6, 6]).collect();

        let first = clean(&mut mesh, 1.0);
        assert!(first > 0);
        let snapshot = mesh.clone();
        assert_eq!(clean(&mut mesh, 1.0), 0);
        assert_eq!(mesh, snapshot);
    }
}
