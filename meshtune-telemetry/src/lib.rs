//! Rendering telemetry
//!
//! This crate measures what each rendered frame costs without stalling it:
//! - CPU wall-clock time per frame
//! - Asynchronous GPU timer queries, polled on later frames
//! - Draw call, triangle and video memory counters from the renderer
//! - Fixed-cadence aggregation into a rolling history for charts
//! - Capped and uncapped frame pacing

pub mod clock;
pub mod gpu_timer;
pub mod aggregator;
pub mod sampler;
pub mod pacing;

pub use clock::*;
pub use gpu_timer::*;
pub use aggregator::*;
pub use sampler::*;
pub use pacing::*;
