//! Background simplification worker
//!
//! Runs the simplifier on a dedicated thread so the render loop keeps
//! drawing the previous mesh while a reduction is computed. Jobs and results
//! travel over `flume` channels; results are tagged with the node and the
//! generation they were requested for.

use crate::node::NodeId;
use meshtune_core::{Error, Result, TriangleMesh};
use meshtune_simplification::MeshSimplifier;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// One reduction to compute
#[derive(Debug, Clone)]
pub struct SimplifyJob {
    pub node: NodeId,
    pub generation: u64,
    pub source: Arc<TriangleMesh>,
    pub vertices_to_remove: usize,
}

/// Result of a job, delivered in submission order
#[derive(Debug, Clone)]
pub struct SimplifyOutcome {
    pub node: NodeId,
    pub generation: u64,
    pub result: Result<TriangleMesh>,
}

pub struct SimplifyWorker {
    jobs: Option<flume::Sender<SimplifyJob>>,
    results: flume::Receiver<SimplifyOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl SimplifyWorker {
    pub fn new<S>(simplifier: S) -> Result<Self>
    where
        S: MeshSimplifier + Send + 'static,
    {
        let (job_tx, job_rx) = flume::unbounded::<SimplifyJob>();
        let (result_tx, result_rx) = flume::unbounded::<SimplifyOutcome>();

        let handle = std::thread::Builder::new()
            .name("meshtune-simplify".to_string())
            .spawn(move || {
                log::debug!("Simplification worker started");
                while let Ok(job) = job_rx.recv() {
                    let result = simplifier.simplify(&job.source, job.vertices_to_remove);
                    let outcome = SimplifyOutcome {
                        node: job.node,
                        generation: job.generation,
                        result,
                    };
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
                log::debug!("Simplification worker stopped");
            })
            .map_err(|e| Error::Worker(format!("failed to spawn worker thread: {}", e)))?;

        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            handle: Some(handle),
        })
    }

    pub fn submit(&self, job: SimplifyJob) -> Result<()> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| Error::Worker("worker is shut down".to_string()))?;
        jobs.send(job)
            .map_err(|_| Error::Worker("worker thread has exited".to_string()))
    }

    /// Results that have arrived so far, without blocking
    pub fn poll_results(&self) -> Vec<SimplifyOutcome> {
        self.results.try_iter().collect()
    }

    /// Block for the next result, up to `timeout`
    pub fn wait_result(&self, timeout: Duration) -> Option<SimplifyOutcome> {
        self.results.recv_timeout(timeout).ok()
    }
}

impl Drop for SimplifyWorker {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
