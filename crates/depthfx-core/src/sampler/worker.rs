use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use super::{DepthSample, DepthSampler, SamplerOptions, TemporalDepthSampler};
use crate::depth::DepthKeyframeSet;
use crate::error::{DepthFxError, DepthFxResult};

/// How long spawning waits for the worker's first sample.
const READY_TIMEOUT: Duration = Duration::from_secs(5);

enum WorkerRequest {
    Sample(f64),
    Shutdown,
}

/// Sampler that computes on a dedicated thread.
///
/// `sample` never blocks: it returns the most recently completed buffer and
/// queues the requested time. The result for a new time therefore shows up
/// one call later. The worker coalesces queued requests and only computes
/// the newest one.
pub struct WorkerDepthSampler {
    requests: Sender<WorkerRequest>,
    results: Receiver<Arc<DepthSample>>,
    latest: Arc<DepthSample>,
    last_dispatched: Option<f64>,
    target: (u32, u32),
    handle: Option<JoinHandle<()>>,
}

impl WorkerDepthSampler {
    /// Start the worker and wait for its first sample (at time zero).
    pub async fn spawn(keyframes: DepthKeyframeSet, options: SamplerOptions) -> DepthFxResult<Self> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

        let handle = std::thread::Builder::new()
            .name("depthfx-sampler".into())
            .spawn(move || {
                let mut sampler = match TemporalDepthSampler::new(keyframes, options) {
                    Ok(sampler) => sampler,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if ready_tx.send(Ok(sampler.sample(0.0))).is_err() {
                    return;
                }
                run_worker(&mut sampler, &request_rx, &result_tx);
                tracing::debug!("Depth worker stopped");
            })
            .map_err(|e| DepthFxError::WorkerUnavailable(e.to_string()))?;

        let first = match tokio::time::timeout(READY_TIMEOUT, ready_rx).await {
            Ok(Ok(Ok(sample))) => sample,
            Ok(Ok(Err(e))) => {
                let _ = handle.join();
                return Err(e);
            }
            Ok(Err(_)) => {
                let _ = handle.join();
                return Err(DepthFxError::WorkerUnavailable(
                    "worker exited before producing a sample".into(),
                ));
            }
            Err(_) => {
                // Dropping the request sender lets the worker exit on its own.
                return Err(DepthFxError::WorkerUnavailable(format!(
                    "worker did not respond within {READY_TIMEOUT:?}"
                )));
            }
        };

        Ok(Self {
            requests: request_tx,
            results: result_rx,
            latest: first,
            last_dispatched: Some(0.0),
            target: (options.target_width, options.target_height),
            handle: Some(handle),
        })
    }

    /// Whether the worker thread is still attached.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    fn drain_results(&mut self) {
        loop {
            match self.results.try_recv() {
                Ok(sample) => self.latest = sample,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.handle.is_some() {
                        tracing::warn!("Depth worker disconnected, holding last sample");
                        self.handle = None;
                    }
                    break;
                }
            }
        }
    }
}

fn run_worker(
    sampler: &mut TemporalDepthSampler,
    requests: &Receiver<WorkerRequest>,
    results: &Sender<Arc<DepthSample>>,
) {
    while let Ok(request) = requests.recv() {
        let mut newest = request;
        for queued in requests.try_iter() {
            newest = queued;
            if matches!(newest, WorkerRequest::Shutdown) {
                break;
            }
        }
        match newest {
            WorkerRequest::Sample(time) => {
                if results.send(sampler.sample(time)).is_err() {
                    return;
                }
            }
            WorkerRequest::Shutdown => return,
        }
    }
}

impl DepthSampler for WorkerDepthSampler {
    fn sample(&mut self, time_seconds: f64) -> Arc<DepthSample> {
        self.drain_results();
        if self.handle.is_some() && self.last_dispatched != Some(time_seconds) {
            if self.requests.send(WorkerRequest::Sample(time_seconds)).is_ok() {
                self.last_dispatched = Some(time_seconds);
            }
        }
        Arc::clone(&self.latest)
    }

    fn target_size(&self) -> (u32, u32) {
        self.target
    }

    fn strategy(&self) -> &'static str {
        "worker"
    }

    fn dispose(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.requests.send(WorkerRequest::Shutdown);
        if handle.join().is_err() {
            tracing::warn!("Depth worker panicked during shutdown");
        }
        while self.results.try_recv().is_ok() {}
        tracing::debug!("Depth worker disposed");
    }
}

impl Drop for WorkerDepthSampler {
    fn drop(&mut self) {
        self.dispose();
    }
}
