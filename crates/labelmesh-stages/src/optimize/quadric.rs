//! Quadric error metrics for edge collapse.
//!
//! A quadric stores the sum of squared distances to a set of planes as
//! `Q(v) = v^T A v + 2 b^T v + c`. Summing the planes of the triangles around a
//! vertex gives the error of moving that vertex anywhere in space.

use std::ops::{Add, AddAssign};

use labelmesh_core::{DMat3, DVec3};

/// Symmetric quadric `(A, b, c)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric {
    a: DMat3,
    b: DVec3,
    c: f64,
}

impl Quadric {
    /// The quadric of no planes.
    pub const ZERO: Self = Self {
        a: DMat3::ZERO,
        b: DVec3::ZERO,
        c: 0.0,
    };

    /// Squared distance to the plane `n . v + d = 0` (`n` of unit length).
    #[must_use]
    pub fn from_plane(n: DVec3, d: f64) -> Self {
        Self {
            a: DMat3::from_cols(n * n.x, n * n.y, n * n.z),
            b: n * d,
            c: d * d,
        }
    }

    /// Quadric of the plane through a triangle, or [`Quadric::ZERO`] if the
    /// triangle has no area.
    #[must_use]
    pub fn from_triangle([p0, p1, p2]: [DVec3; 3]) -> Self {
        let n = (p1 - p0).cross(p2 - p0).normalize_or_zero();
        if n == DVec3::ZERO {
            return Self::ZERO;
        }
        Self::from_plane(n, -n.dot(p0))
    }

    /// Evaluates the error at `v`, clamped at zero against round-off.
    #[must_use]
    pub fn evaluate(&self, v: DVec3) -> f64 {
        (v.dot(self.a * v) + 2.0 * self.b.dot(v) + self.c).max(0.0)
    }

    /// Position minimising the error, if `A` is well conditioned.
    #[must_use]
    pub fn optimal_point(&self) -> Option<DVec3> {
        let scale = self.a.x_axis.x + self.a.y_axis.y + self.a.z_axis.z;
        if scale <= 0.0 {
            return None;
        }
        let det = self.a.determinant();
        if det.abs() < 1e-10 * scale * scale * scale {
            return None;
        }
        let v = self.a.inverse() * -self.b;
        v.is_finite().then_some(v)
    }
}

impl Default for Quadric {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for Quadric {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            a: self.a + other.a,
            b: self.b + other.b,
            c: self.c + other.c,
        }
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_distance() {
        let q = Quadric::from_plane(DVec3::Z, -2.0);
        assert!(q.evaluate(DVec3::new(5.0, -3.0, 2.0)).abs() < 1e-12);
        assert!((q.evaluate(DVec3::new(0.0, 0.0, 5.0)) - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_three_planes_meet_at_corner() {
        let q = Quadric::from_plane(DVec3::X, -1.0)
            + Quadric::from_plane(DVec3::Y, -2.0)
            + Quadric::from_plane(DVec3::Z, -3.0);
        let p = q.optimal_point().unwrap();
        assert!((p - DVec3::new(1.0, 2.0, 3.0)).length() < 1e-9);
        assert!(q.evaluate(p) < 1e-12);
    }

    #[test]
    fn test_coplanar_planes_have_no_unique_minimum() {
        let mut q = Quadric::ZERO;
        q += Quadric::from_triangle([DVec3::ZERO, DVec3::X, DVec3::Y]);
        q += Quadric::from_triangle([DVec3::X, DVec3::new(1.0, 1.0, 0.0), DVec3::Y]);
        assert!(q.optimal_point().is_none());
        assert!(Quadric::ZERO.optimal_point().is_none());
    }

    #[test]
    fn test_degenerate_triangle() {
        let q = Quadric::from_triangle([DVec3::ZERO, DVec3::X, DVec3::X * 2.0]);
        assert_eq!(q, Quadric::ZERO);
    }
}
