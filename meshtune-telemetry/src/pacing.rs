//! Frame pacing for capped and uncapped rendering

use serde::{Deserialize, Serialize};

/// Remaining waits below this count as elapsed, absorbing float rounding
const TICK_EPSILON_MS: f64 = 1e-6;

/// Whether frames are limited to the display refresh rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrameRateMode {
    /// At most one frame per refresh interval
    #[default]
    Capped,
    /// Render as fast as possible, for measuring raw throughput
    Uncapped,
}

impl FrameRateMode {
    pub fn from_capped(capped: bool) -> Self {
        if capped {
            FrameRateMode::Capped
        } else {
            FrameRateMode::Uncapped
        }
    }
}

/// Decides when the next frame may run. Aggregation does not depend on the
/// mode; it only changes how many samples land in a window.
#[derive(Debug, Clone)]
pub struct FramePacer {
    mode: FrameRateMode,
    interval_ms: f64,
    last_tick_ms: Option<f64>,
}

impl FramePacer {
    pub fn new(mode: FrameRateMode, refresh_hz: f64) -> Self {
        let refresh_hz = if refresh_hz.is_finite() && refresh_hz > 0.0 {
            refresh_hz
        } else {
            60.0
        };
        Self {
            mode,
            interval_ms: 1000.0 / refresh_hz,
            last_tick_ms: None,
        }
    }

    pub fn mode(&self) -> FrameRateMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: FrameRateMode) {
        if mode != self.mode {
            log::debug!("Frame rate mode changed to {:?}", mode);
        }
        self.mode = mode;
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    pub fn should_tick(&self, now_ms: f64) -> bool {
        self.time_until_next_tick(now_ms) <= TICK_EPSILON_MS
    }

    /// Milliseconds until the next frame may run, 0 if it may run now
    pub fn time_until_next_tick(&self, now_ms: f64) -> f64 {
        match (self.mode, self.last_tick_ms) {
            (FrameRateMode::Uncapped, _) | (_, None) => 0.0,
            (FrameRateMode::Capped, Some(last)) => (last + self.interval_ms - now_ms).max(0.0),
        }
    }

    pub fn mark_tick(&mut self, now_ms: f64) {
        self.last_tick_ms = Some(now_ms);
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new(FrameRateMode::Capped, 60.0)
    }
}
