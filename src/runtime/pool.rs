use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::PoolError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A named, fixed-size pool of OS threads fed by a bounded queue.
///
/// Stages of the pipeline each own one pool; the queue bound is the
/// backpressure policy. `submit` never blocks: a full queue is reported to
/// the caller, which decides whether to drop or retry.
pub struct WorkerPool {
    name: &'static str,
    job_tx: Option<Sender<Job>>,
    done_rx: Receiver<()>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        name: &'static str,
        workers: usize,
        queue_depth: usize,
    ) -> Result<Self, PoolError> {
        let (job_tx, job_rx) = bounded::<Job>(queue_depth);
        let (done_tx, done_rx) = bounded::<()>(workers);
        let mut handles = Vec::with_capacity(workers);

        for index in 0..workers {
            let thread_name = format!("{name}-{index}");
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    debug!("worker '{}' started", thread_name);
                    while let Ok(job) = job_rx.recv() {
                        job();
                    }
                    debug!("worker '{}' stopped", thread_name);
                    let _ = done_tx.send(());
                })
                .map_err(|e| PoolError::Spawn(format!("{name}-{index}"), e))?;
            handles.push(handle);
        }

        Ok(Self {
            name,
            job_tx: Some(job_tx),
            done_rx,
            handles,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueue a job without blocking. A full queue is the caller's signal
    /// to shed load (the inference stage drops the frame and counts it).
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let tx = self.job_tx.as_ref().ok_or(PoolError::ShutDown(self.name))?;
        match tx.try_send(Box::new(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PoolError::QueueFull(self.name)),
            Err(TrySendError::Disconnected(_)) => Err(PoolError::ShutDown(self.name)),
        }
    }

    pub fn queued(&self) -> usize {
        self.job_tx.as_ref().map_or(0, Sender::len)
    }

    /// Close the queue and wait up to `grace` for workers to drain. Workers
    /// still busy after the grace window are abandoned, not interrupted;
    /// their join handles are dropped and the threads detach.
    pub fn shutdown(&mut self, grace: Duration) {
        let Some(tx) = self.job_tx.take() else {
            return;
        };
        drop(tx);

        let deadline = Instant::now() + grace;
        let mut finished = 0usize;
        let total = self.handles.len();
        while finished < total {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.done_rx.recv_timeout(remaining) {
                Ok(()) => finished += 1,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "pool '{}': {} worker(s) still busy after grace window, abandoning",
                        self.name,
                        total - finished
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Workers that signalled are exiting on their own; dropping the
        // handles detaches any still-busy thread instead of blocking on it.
        self.handles.clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.job_tx.is_none()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown(Duration::from_millis(0));
    }
}
