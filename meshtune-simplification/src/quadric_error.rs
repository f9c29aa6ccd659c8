//! Quadric error metric
//!
//! A quadric is the symmetric 4x4 matrix `Q = sum(p * p^T)` over the planes
//! `p = (a, b, c, d)` adjacent to a vertex. `v^T Q v` is the sum of squared
//! distances from `v` to those planes. Only the 10 unique coefficients are
//! stored:
//!
//! ```text
//! | q0 q1 q2 q3 |
//! | q1 q4 q5 q6 |
//! | q2 q5 q7 q8 |
//! | q3 q6 q8 q9 |
//! ```

use meshtune_core::{Point3d, Point3f};
use nalgebra::{Matrix3, Vector3};
use std::ops::{Add, AddAssign};

/// Determinant below which the 3x3 part is treated as singular
const SINGULAR_EPSILON: f64 = 1e-10;

/// Symmetric error quadric stored as its 10 independent coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quadric {
    data: [f64; 10],
}

impl Quadric {
    pub fn zero() -> Self {
        Self { data: [0.0; 10] }
    }

    /// Fundamental quadric of the plane `ax + by + cz + d = 0` with a unit normal.
    pub fn from_plane(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self {
            data: [
                a * a,
                a * b,
                a * c,
                a * d,
                b * b,
                b * c,
                b * d,
                c * c,
                c * d,
                d * d,
            ],
        }
    }

    /// Quadric of the plane through a triangle. Returns `None` for a
    /// zero-area triangle, which has no plane.
    pub fn from_triangle(v0: &Point3f, v1: &Point3f, v2: &Point3f) -> Option<Self> {
        let p0 = v0.cast::<f64>();
        let n = (v1.cast::<f64>() - p0).cross(&(v2.cast::<f64>() - p0));
        let len = n.norm();
        if !(len > f64::EPSILON) || !len.is_finite() {
            return None;
        }
        let n = n / len;
        let d = -n.dot(&p0.coords);
        Some(Self::from_plane(n.x, n.y, n.z, d))
    }

    /// Scale every coefficient, used to weight constraint planes.
    pub fn scaled(&self, weight: f64) -> Self {
        let mut data = self.data;
        for c in data.iter_mut() {
            *c *= weight;
        }
        Self { data }
    }

    /// Evaluate `v^T Q v` for `v = (x, y, z, 1)`.
    pub fn evaluate(&self, p: &Point3d) -> f64 {
        let q = &self.data;
        let (x, y, z) = (p.x, p.y, p.z);
        q[0] * x * x
            + 2.0 * q[1] * x * y
            + 2.0 * q[2] * x * z
            + 2.0 * q[3] * x
            + q[4] * y * y
            + 2.0 * q[5] * y * z
            + 2.0 * q[6] * y
            + q[7] * z * z
            + 2.0 * q[8] * z
            + q[9]
    }

    /// Position minimizing the quadric, from setting the gradient to zero.
    /// Returns `None` when the system is singular or ill-conditioned.
    pub fn minimizer(&self) -> Option<Point3d> {
        let q = &self.data;
        let a = Matrix3::new(
            q[0], q[1], q[2],
            q[1], q[4], q[5],
            q[2], q[5], q[7],
        );
        if a.determinant().abs() < SINGULAR_EPSILON {
            return None;
        }
        let b = Vector3::new(q[3], q[6], q[8]);
        let x = a.try_inverse()? * -b;
        if x.iter().all(|c| c.is_finite()) {
            Some(Point3d::from(x))
        } else {
            None
        }
    }
}

impl Add for Quadric {
    type Output = Quadric;

    fn add(mut self, other: Quadric) -> Quadric {
        self += other;
        self
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, other: Quadric) {
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
    }
}
