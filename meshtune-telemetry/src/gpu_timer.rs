//! GPU timer query contract and the in-flight query queue
//!
//! Timer results are written by the driver some frames after the query ends,
//! so queries are queued and polled in issue order on later frames. A query
//! whose result never arrives is abandoned rather than retried.

use meshtune_core::{Error, Result};
use std::collections::VecDeque;

/// Opaque identifier for one GPU timer query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(pub u64);

/// State of a GPU timer query as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryState {
    /// Result not written yet
    Pending,
    /// Elapsed GPU time in milliseconds
    Ready(f64),
    /// Result will never arrive (device reset, context loss)
    Lost,
}

/// Platform GPU timer, e.g. a timestamp or elapsed-time query extension.
pub trait GpuTimer {
    /// Whether the device exposes timer queries at all
    fn is_supported(&self) -> bool;

    /// Start timing the GPU work submitted from now on
    fn begin_query(&mut self) -> Result<QueryHandle>;

    /// Stop timing; the result becomes available asynchronously
    fn end_query(&mut self, handle: QueryHandle) -> Result<()>;

    /// Non-blocking read of a query result
    fn poll(&mut self, handle: QueryHandle) -> QueryState;

    /// Free the driver object behind a query that is no longer needed
    fn release(&mut self, _handle: QueryHandle) {}
}

/// Timer for devices without timer query support
#[derive(Debug, Clone, Copy, Default)]
pub struct NullGpuTimer;

impl GpuTimer for NullGpuTimer {
    fn is_supported(&self) -> bool {
        false
    }

    fn begin_query(&mut self) -> Result<QueryHandle> {
        Err(Error::GpuTimerUnavailable)
    }

    fn end_query(&mut self, _handle: QueryHandle) -> Result<()> {
        Err(Error::GpuTimerUnavailable)
    }

    fn poll(&mut self, _handle: QueryHandle) -> QueryState {
        QueryState::Lost
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct InFlightQuery {
    handle: QueryHandle,
    issued_frame: u64,
}

/// A query that left the queue, either with a result or abandoned
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletedQuery {
    pub handle: QueryHandle,
    pub issued_frame: u64,
    /// `Some` with the GPU milliseconds, `None` if the query was lost
    pub gpu_ms: Option<f64>,
}

/// Bounded FIFO of ended queries waiting for their results.
#[derive(Debug, Clone)]
pub struct GpuQueryQueue {
    in_flight: VecDeque<InFlightQuery>,
    capacity: usize,
    max_age_frames: u64,
    lost: u64,
}

impl GpuQueryQueue {
    pub fn new(capacity: usize, max_age_frames: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            in_flight: VecDeque::with_capacity(capacity),
            capacity,
            max_age_frames,
            lost: 0,
        }
    }

    /// Queue an ended query. When the queue is full the oldest query is
    /// abandoned and returned so its driver object can be released.
    pub fn push(&mut self, handle: QueryHandle, frame: u64) -> Option<QueryHandle> {
        let evicted = if self.in_flight.len() >= self.capacity {
            self.lost += 1;
            self.in_flight.pop_front().map(|q| q.handle)
        } else {
            None
        };
        self.in_flight.push_back(InFlightQuery {
            handle,
            issued_frame: frame,
        });
        evicted
    }

    /// Pop finished queries from the front, in issue order.
    ///
    /// Stops at the first query that is still pending and young enough;
    /// pending queries older than the max age are abandoned as lost.
    pub fn poll<G: GpuTimer + ?Sized>(&mut self, timer: &mut G, frame: u64) -> Vec<CompletedQuery> {
        let mut completed = Vec::new();
        while let Some(front) = self.in_flight.front().copied() {
            let gpu_ms = match timer.poll(front.handle) {
                QueryState::Ready(ms) => Some(ms),
                QueryState::Lost => None,
                QueryState::Pending => {
                    if frame.saturating_sub(front.issued_frame) > self.max_age_frames {
                        None
                    } else {
                        break;
                    }
                }
            };
            self.in_flight.pop_front();
            if gpu_ms.is_none() {
                self.lost += 1;
            }
            completed.push(CompletedQuery {
                handle: front.handle,
                issued_frame: front.issued_frame,
                gpu_ms,
            });
        }
        completed
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Total queries abandoned since creation
    pub fn lost_count(&self) -> u64 {
        self.lost
    }
}
