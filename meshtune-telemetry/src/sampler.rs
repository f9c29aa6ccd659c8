//! Per-frame sampling of CPU/GPU time and renderer counters

use crate::aggregator::{AggregatedRecord, RollingHistory, TelemetryAggregator, TelemetryConfig};
use crate::clock::{Clock, SystemClock};
use crate::gpu_timer::{GpuQueryQueue, GpuTimer, NullGpuTimer, QueryHandle};
use meshtune_core::Error;
use serde::{Deserialize, Serialize};

/// Counters the renderer exposes after drawing a frame
pub trait RenderCounters {
    fn draw_calls(&self) -> u32;
    fn triangles(&self) -> u64;
    /// Estimated bytes of vertex and index buffers resident on the GPU
    fn gpu_bytes(&self) -> u64 {
        0
    }
}

/// Plain counter snapshot for renderers that report by value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderInfo {
    pub draw_calls: u32,
    pub triangles: u64,
    pub gpu_bytes: u64,
}

impl RenderCounters for RenderInfo {
    fn draw_calls(&self) -> u32 {
        self.draw_calls
    }

    fn triangles(&self) -> u64 {
        self.triangles
    }

    fn gpu_bytes(&self) -> u64 {
        self.gpu_bytes
    }
}

/// Measurements for one rendered frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    pub frame: u64,
    pub cpu_ms: f64,
    /// GPU time of the most recent query that completed this frame. This is
    /// usually an earlier frame's work.
    pub gpu_ms: Option<f64>,
    pub draw_calls: u32,
    pub triangles: u64,
    pub gpu_bytes: u64,
}

/// Brackets each frame with `begin_frame`/`end_frame` and feeds the
/// aggregator. GPU timing failures never interrupt a frame; they degrade the
/// sample to CPU-only.
pub struct TelemetrySampler<C: Clock = SystemClock, G: GpuTimer = NullGpuTimer> {
    clock: C,
    timer: G,
    queries: GpuQueryQueue,
    aggregator: TelemetryAggregator,
    frame: u64,
    frame_start_ms: Option<f64>,
    open_query: Option<QueryHandle>,
    warned: bool,
}

impl TelemetrySampler {
    /// Wall-clock sampler without GPU timing
    pub fn new(config: TelemetryConfig) -> Self {
        Self::with_parts(SystemClock::new(), NullGpuTimer, config)
    }
}

impl<C: Clock, G: GpuTimer> TelemetrySampler<C, G> {
    pub fn with_parts(clock: C, timer: G, config: TelemetryConfig) -> Self {
        let start = clock.now_ms();
        if !timer.is_supported() {
            log::info!("GPU timer queries unsupported, reporting CPU timing only");
        }
        Self {
            queries: GpuQueryQueue::new(config.gpu_query_capacity, config.gpu_query_max_age),
            aggregator: TelemetryAggregator::new(&config, start),
            clock,
            timer,
            frame: 0,
            frame_start_ms: None,
            open_query: None,
            warned: false,
        }
    }

    fn warn_once(&mut self, context: &str, err: &Error) {
        if !self.warned {
            log::warn!("GPU timing disabled for this frame ({}): {}", context, err);
            self.warned = true;
        }
    }

    /// Mark the start of a frame.
    pub fn begin_frame(&mut self) {
        self.frame_start_ms = Some(self.clock.now_ms());

        if self.open_query.is_some() || !self.timer.is_supported() {
            return;
        }
        match self.timer.begin_query() {
            Ok(handle) => self.open_query = Some(handle),
            Err(err) => self.warn_once("begin", &err),
        }
    }

    /// Mark the end of a frame, read the renderer counters and hand the
    /// sample to the aggregator.
    pub fn end_frame<R: RenderCounters + ?Sized>(&mut self, counters: &R) -> FrameSample {
        let now = self.clock.now_ms();
        let cpu_ms = self
            .frame_start_ms
            .take()
            .map(|start| (now - start).max(0.0))
            .unwrap_or(0.0);

        if let Some(handle) = self.open_query.take() {
            match self.timer.end_query(handle) {
                Ok(()) => {
                    if let Some(evicted) = self.queries.push(handle, self.frame) {
                        log::debug!("GPU query {:?} evicted: {}", evicted, Error::GpuQueryLost);
                        self.timer.release(evicted);
                    }
                }
                Err(err) => {
                    self.warn_once("end", &err);
                    self.timer.release(handle);
                }
            }
        }

        let mut gpu_ms = None;
        for done in self.queries.poll(&mut self.timer, self.frame) {
            match done.gpu_ms {
                Some(ms) => gpu_ms = Some(ms),
                None => log::debug!("GPU query {:?} dropped: {}", done.handle, Error::GpuQueryLost),
            }
            self.timer.release(done.handle);
        }

        let sample = FrameSample {
            frame: self.frame,
            cpu_ms,
            gpu_ms,
            draw_calls: counters.draw_calls(),
            triangles: counters.triangles(),
            gpu_bytes: counters.gpu_bytes(),
        };
        self.aggregator.record(sample);
        self.frame += 1;
        sample
    }

    /// Emit an aggregated record if the report interval has elapsed
    pub fn aggregate(&mut self) -> Option<AggregatedRecord> {
        let now = self.clock.now_ms();
        self.aggregator.aggregate(now)
    }

    pub fn history(&self) -> &RollingHistory<AggregatedRecord> {
        self.aggregator.history()
    }

    pub fn gpu_timing_available(&self) -> bool {
        self.timer.is_supported()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn in_flight_queries(&self) -> usize {
        self.queries.len()
    }

    pub fn lost_gpu_queries(&self) -> u64 {
        self.queries.lost_count()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
