//! Core data structures and traits for meshtune
//!
//! This crate provides the shared types used by the simplification and
//! telemetry crates: indexed triangle meshes, the interleaved GPU vertex
//! layout, node transforms, and the common error type.

pub mod point;
pub mod mesh;
pub mod traits;
pub mod transform;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use traits::*;
pub use transform::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3, Matrix4, UnitQuaternion};

// Type aliases for easier imports
pub type Point = Point3f;
pub type Mesh = TriangleMesh;
