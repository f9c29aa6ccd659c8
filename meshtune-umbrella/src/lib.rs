//! # meshtune
//!
//! Progressive mesh simplification under a quadric error metric, together
//! with a per-frame rendering telemetry pipeline.
//!
//! This is the umbrella crate that re-exports the individual meshtune crates.
//! Use the individual crates directly for finer control over dependencies.
//!
//! ## Features
//!
//! - **Core**: Triangle meshes, GPU vertex layout, transforms, errors
//! - **Simplification**: QEM edge-collapse simplifier
//! - **Telemetry**: CPU/GPU frame timing, aggregation and frame pacing
//! - **Scene**: Scene session with debounced, optionally backgrounded reduction
//!
//! ## Quick Start
//!
//! ```rust
//! use meshtune::prelude::*;
//!
//! let mesh = TriangleMesh::from_vertices_and_faces(
//!     vec![
//!         Point3f::new(0.0, 0.0, 0.0),
//!         Point3f::new(1.0, 0.0, 0.0),
//!         Point3f::new(1.0, 1.0, 0.0),
//!         Point3f::new(0.0, 1.0, 0.0),
//!         Point3f::new(0.5, 0.5, 0.1),
//!     ],
//!     vec![[0, 1, 4], [1, 2, 4], [2, 3, 4], [3, 0, 4]],
//! );
//!
//! let simplified = QemSimplifier::new().simplify(&mesh, 1)?;
//! assert!(simplified.vertex_count() < mesh.vertex_count());
//! # Ok::<(), meshtune::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: simplification and telemetry
//! - `simplification`: mesh simplification
//! - `telemetry`: frame timing and aggregation
//! - `scene`: scene session (pulls in simplification and telemetry)
//! - `all`: enables all features

// Re-export core functionality
pub use meshtune_core::*;

// Re-export sub-crates
#[cfg(feature = "simplification")]
pub use meshtune_simplification as simplification;

#[cfg(feature = "telemetry")]
pub use meshtune_telemetry as telemetry;

#[cfg(feature = "scene")]
pub use meshtune_scene as scene;

/// Convenient imports for common use cases
pub mod prelude {
    pub use meshtune_core::*;

    #[cfg(feature = "simplification")]
    pub use meshtune_simplification::*;

    #[cfg(feature = "telemetry")]
    pub use meshtune_telemetry::*;

    #[cfg(feature = "scene")]
    pub use meshtune_scene::*;
}
