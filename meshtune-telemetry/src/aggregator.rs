//! Fixed-cadence reduction of frame samples into aggregated records

use crate::sampler::FrameSample;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Telemetry configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Minimum window length before a record is emitted
    pub report_interval_ms: f64,
    /// Number of aggregated records kept for charts
    pub history_len: usize,
    /// Maximum GPU queries waiting for results
    pub gpu_query_capacity: usize,
    /// Frames after which a pending GPU query is abandoned
    pub gpu_query_max_age: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            report_interval_ms: 500.0,
            history_len: 60,
            gpu_query_capacity: 8,
            gpu_query_max_age: 16,
        }
    }
}

impl TelemetryConfig {
    pub fn with_report_interval(mut self, interval_ms: f64) -> Self {
        self.report_interval_ms = interval_ms;
        self
    }

    pub fn with_history_len(mut self, len: usize) -> Self {
        self.history_len = len;
        self
    }
}

/// One report-interval summary, as shown on the stats panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    /// Clock time at which the window closed
    pub timestamp_ms: f64,
    pub fps: u32,
    pub avg_frame_time_ms: f64,
    pub avg_cpu_ms: f64,
    /// `None` when no sample in the window carried GPU timing
    pub avg_gpu_ms: Option<f64>,
    pub draw_calls: u32,
    pub triangles: u64,
    pub gpu_bytes: u64,
    pub sample_count: usize,
}

impl fmt::Display for AggregatedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FPS: {} | Frame: {:.2} ms | CPU: {:.2} ms | GPU: ",
            self.fps, self.avg_frame_time_ms, self.avg_cpu_ms
        )?;
        match self.avg_gpu_ms {
            Some(ms) => write!(f, "{:.2} ms", ms)?,
            None => write!(f, "unavailable")?,
        }
        write!(
            f,
            " | Draw calls: {} | Triangles: {} | VRAM: {:.2} MB",
            self.draw_calls,
            self.triangles,
            self.gpu_bytes as f64 / (1024.0 * 1024.0)
        )
    }
}

/// Reduce one window of samples.
///
/// Returns `None` for an empty window or a non-positive elapsed time.
/// Counters are taken from the most recent sample.
pub fn aggregate_window(
    samples: &[FrameSample],
    elapsed_ms: f64,
    timestamp_ms: f64,
) -> Option<AggregatedRecord> {
    let last = samples.last()?;
    if !(elapsed_ms > 0.0) {
        return None;
    }
    let n = samples.len() as f64;

    let avg_cpu_ms = samples.iter().map(|s| s.cpu_ms).sum::<f64>() / n;
    let gpu: Vec<f64> = samples.iter().filter_map(|s| s.gpu_ms).collect();
    let avg_gpu_ms = if gpu.is_empty() {
        None
    } else {
        Some(gpu.iter().sum::<f64>() / gpu.len() as f64)
    };

    Some(AggregatedRecord {
        timestamp_ms,
        fps: (n * 1000.0 / elapsed_ms).round() as u32,
        avg_frame_time_ms: elapsed_ms / n,
        avg_cpu_ms,
        avg_gpu_ms,
        draw_calls: last.draw_calls,
        triangles: last.triangles,
        gpu_bytes: last.gpu_bytes,
        sample_count: samples.len(),
    })
}

/// Fixed-size history; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct RollingHistory<T> {
    entries: VecDeque<T>,
    cap: usize,
}

impl<T> RollingHistory<T> {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.entries.len() == self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Collects samples for the current window and emits a record once the
/// report interval has passed.
#[derive(Debug, Clone)]
pub struct TelemetryAggregator {
    interval_ms: f64,
    window_start_ms: f64,
    window: Vec<FrameSample>,
    history: RollingHistory<AggregatedRecord>,
}

impl TelemetryAggregator {
    pub fn new(config: &TelemetryConfig, start_ms: f64) -> Self {
        Self {
            interval_ms: config.report_interval_ms,
            window_start_ms: start_ms,
            window: Vec::new(),
            history: RollingHistory::new(config.history_len),
        }
    }

    pub fn record(&mut self, sample: FrameSample) {
        self.window.push(sample);
    }

    /// Close the window if the interval elapsed. An empty window restarts
    /// without emitting.
    pub fn aggregate(&mut self, now_ms: f64) -> Option<AggregatedRecord> {
        let elapsed = now_ms - self.window_start_ms;
        if elapsed < self.interval_ms {
            return None;
        }
        let record = aggregate_window(&self.window, elapsed, now_ms);
        self.window.clear();
        self.window_start_ms = now_ms;

        let record = record?;
        self.history.push(record.clone());
        Some(record)
    }

    pub fn pending_samples(&self) -> usize {
        self.window.len()
    }

    pub fn history(&self) -> &RollingHistory<AggregatedRecord> {
        &self.history
    }
}
