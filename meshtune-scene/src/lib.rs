//! Scene session
//!
//! Owns the scene graph and the original/working mesh pairs, turns debounced
//! reduction requests into simplification runs, and reports renderer
//! counters to the telemetry sampler.

pub mod node;
pub mod debounce;
pub mod worker;
pub mod session;

pub use node::*;
pub use debounce::*;
pub use worker::*;
pub use session::*;
