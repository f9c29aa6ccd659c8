//! Mesh simplification
//!
//! This crate reduces the vertex count of indexed triangle meshes with
//! quadric error metric (QEM) edge collapse:
//! - Symmetric error quadrics
//! - Priority-queue driven edge contraction with topology and flip checks
//! - Boundary-aware costs

pub mod quadric_error;
pub mod edge_collapse;

pub use quadric_error::*;
pub use edge_collapse::*;

use meshtune_core::{Result, TriangleMesh};

/// Reduce the number of vertices in a mesh
pub trait MeshSimplifier {
    /// Return a new mesh with `vertices_to_remove` fewer vertices.
    ///
    /// `vertices_to_remove` must be in `1..mesh.vertex_count()`; callers treat
    /// a zero target as "keep the original mesh" and skip the call.
    fn simplify(&self, mesh: &TriangleMesh, vertices_to_remove: usize) -> Result<TriangleMesh>;
}

/// Number of vertices to remove for a reduction ratio in `[0, 1)`.
///
/// Ratios outside the range are clamped; zero means "use the original".
pub fn vertices_to_remove_for_ratio(vertex_count: usize, ratio: f32) -> usize {
    if !ratio.is_finite() || ratio <= 0.0 || vertex_count == 0 {
        return 0;
    }
    let target = (vertex_count as f64 * ratio.min(1.0) as f64).floor() as usize;
    target.min(vertex_count - 1)
}
