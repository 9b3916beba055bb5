//! Triangle mesh (TIN) type and geometry helpers.

use glam::DVec3;

use crate::error::{LabelMeshError, Result};

/// A triangulated surface: vertex positions plus index triples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriMesh {
    /// Vertex positions in world coordinates.
    pub vertices: Vec<DVec3>,
    /// Triangles as vertex index triples.
    pub triangles: Vec<[u32; 3]>,
}

impl TriMesh {
    /// Creates a mesh from vertices and triangles.
    #[must_use]
    pub fn new(vertices: Vec<DVec3>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            triangles,
        }
    }

    /// Returns the number of vertices.
    #[must_use]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Returns the number of triangles.
    #[must_use]
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Returns true if the mesh has no triangles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Checks that every index is in range and no triangle repeats a vertex.
    pub fn validate(&self) -> Result<()> {
        let n = self.vertices.len();
        for (t, tri) in self.triangles.iter().enumerate() {
            if let Some(&bad) = tri.iter().find(|&&v| v as usize >= n) {
                return Err(LabelMeshError::invalid(
                    "mesh",
                    format!("triangle {t} references vertex {bad} (mesh has {n} vertices)"),
                ));
            }
            if is_degenerate(tri) {
                return Err(LabelMeshError::invalid(
                    "mesh",
                    format!("triangle {t} repeats a vertex: {tri:?}"),
                ));
            }
        }
        Ok(())
    }

    /// Corner positions of triangle `t`.
    #[inline]
    #[must_use]
    pub fn corners(&self, t: usize) -> [DVec3; 3] {
        let [a, b, c] = self.triangles[t];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    /// Unnormalized normal of triangle `t` (length is twice the area).
    #[must_use]
    pub fn triangle_cross(&self, t: usize) -> DVec3 {
        let [a, b, c] = self.corners(t);
        (b - a).cross(c - a)
    }

    /// Area of triangle `t`.
    #[must_use]
    pub fn triangle_area(&self, t: usize) -> f64 {
        self.triangle_cross(t).length() * 0.5
    }

    /// Total surface area.
    #[must_use]
    pub fn area(&self) -> f64 {
        (0..self.triangles.len()).map(|t| self.triangle_area(t)).sum()
    }

    /// Signed enclosed volume (positive when a closed surface is oriented outward).
    #[must_use]
    pub fn signed_volume(&self) -> f64 {
        self.signed_volume_of(0..self.triangles.len())
    }

    /// Signed volume contribution of a subset of triangles.
    #[must_use]
    pub fn signed_volume_of(&self, triangles: impl IntoIterator<Item = usize>) -> f64 {
        triangles
            .into_iter()
            .map(|t| {
                let [a, b, c] = self.corners(t);
                a.dot(b.cross(c))
            })
            .sum::<f64>()
            / 6.0
    }

    /// Area-weighted per-vertex normals.
    #[must_use]
    pub fn vertex_normals(&self) -> Vec<DVec3> {
        let mut normals = vec![DVec3::ZERO; self.vertices.len()];
        for (t, tri) in self.triangles.iter().enumerate() {
            let n = self.triangle_cross(t);
            for &v in tri {
                normals[v as usize] += n;
            }
        }
        for n in &mut normals {
            *n = n.normalize_or_zero();
        }
        normals
    }

    /// Axis-aligned bounds, or `None` without vertices.
    #[must_use]
    pub fn bounds(&self) -> Option<(DVec3, DVec3)> {
        let first = *self.vertices.first()?;
        Some(
            self.vertices
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }

    /// Reverses the winding of triangle `t`.
    pub fn flip_triangle(&mut self, t: usize) {
        self.triangles[t].swap(1, 2);
    }

    /// Drops triangles that repeat a vertex index, returning how many were removed.
    pub fn remove_degenerate_triangles(&mut self) -> usize {
        let before = self.triangles.len();
        self.triangles.retain(|tri| !is_degenerate(tri));
        before - self.triangles.len()
    }

    /// Drops vertices no triangle references and compacts indices.
    ///
    /// Returns the number of vertices removed.
    pub fn remove_unreferenced_vertices(&mut self) -> usize {
        let mut used = vec![false; self.vertices.len()];
        for tri in &self.triangles {
            for &v in tri {
                used[v as usize] = true;
            }
        }
        let removed = used.iter().filter(|&&u| !u).count();
        if removed == 0 {
            return 0;
        }

        // Used vertices are named by u32 indices, so they never outnumber the range.
        let mut remap = vec![u32::MAX; self.vertices.len()];
        let mut kept = Vec::with_capacity(self.vertices.len() - removed);
        let used_indices = used
            .iter()
            .enumerate()
            .filter_map(|(old, &u)| u.then_some(old));
        for (old, new) in used_indices.zip(0..=u32::MAX) {
            remap[old] = new;
            kept.push(self.vertices[old]);
        }
        for tri in &mut self.triangles {
            for v in tri.iter_mut() {
                *v = remap[*v as usize];
            }
        }
        self.vertices = kept;
        removed
    }

    /// Keeps only the listed triangles (in the given order), then compacts vertices.
    #[must_use]
    pub fn submesh(&self, triangles: &[usize]) -> Self {
        let mut out = Self {
            vertices: self.vertices.clone(),
            triangles: triangles.iter().map(|&t| self.triangles[t]).collect(),
        };
        out.remove_unreferenced_vertices();
        out
    }
}

/// Whether a triangle repeats a vertex index.
#[inline]
#[must_use]
pub fn is_degenerate(tri: &[u32; 3]) -> bool {
    tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2]
}

/// Converts a vertex count to a `u32` index.
///
/// # Errors
/// [`LabelMeshError::IndexOverflow`] once the mesh outgrows `u32` indexing.
#[inline]
pub fn index_u32(i: usize) -> Result<u32> {
    u32::try_from(i).map_err(|_| LabelMeshError::IndexOverflow {
        stage: None,
        count: i,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Axis-aligned unit cube, 12 outward-facing triangles.
    pub fn unit_cube() -> TriMesh {
        let vertices = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::new(1.0, 0.0, 1.0),
            DVec3::new(1.0, 1.0, 1.0),
            DVec3::new(0.0, 1.0, 1.0),
        ];
        let triangles = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [2, 3, 7],
            [2, 7, 6],
            [1, 2, 6],
            [1, 6, 5],
            [0, 4, 7],
            [0, 7, 3],
        ];
        TriMesh::new(vertices, triangles)
    }
}
