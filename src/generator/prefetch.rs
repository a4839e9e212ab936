//! Background batch evaluation with in-order delivery.
//!
//! Because `get_batch(i)` is a pure function of the index, parallelism
//! needs no coordination beyond routing: batch `i` always goes to worker
//! `i % n`, so the set of batches each worker computes is fixed and the
//! output is bit-identical to single-threaded evaluation. A reorder
//! buffer on the consuming side restores index order.

use crate::generator::batch::Batch;
use crate::generator::BatchGenerator;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Generous bound; hitting it means workers are wedged, not slow.
const RECV_TIMEOUT: Duration = Duration::from_secs(300);

/// Evaluates batches of a [`BatchGenerator`] on background threads.
///
/// With `num_workers == 0` iteration is plain synchronous evaluation on
/// the calling thread. Otherwise each `iter()` call spins up a fresh
/// worker team for one pass over the epoch; the team shuts down when the
/// iterator is dropped, finished or not.
pub struct Prefetcher {
    generator: Arc<dyn BatchGenerator>,
    num_workers: usize,
    prefetch_factor: usize,
}

impl Prefetcher {
    pub fn new(
        generator: Arc<dyn BatchGenerator>,
        num_workers: usize,
        prefetch_factor: usize,
    ) -> Result<Self> {
        if num_workers > 0 && prefetch_factor == 0 {
            return Err(anyhow!(
                "Prefetch factor must be > 0 when workers are enabled"
            ));
        }

        Ok(Self {
            generator,
            num_workers,
            prefetch_factor,
        })
    }

    pub fn generator(&self) -> &Arc<dyn BatchGenerator> {
        &self.generator
    }

    pub fn len(&self) -> usize {
        self.generator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generator.is_empty()
    }

    /// Starts one in-order pass over all batches.
    pub fn iter(&self) -> Result<PrefetchIter> {
        if self.num_workers == 0 {
            return Ok(PrefetchIter::Sync {
                generator: self.generator.clone(),
                next: 0,
            });
        }

        Ok(PrefetchIter::Threaded(ThreadedIter::spawn(
            self.generator.clone(),
            self.num_workers,
            self.prefetch_factor,
        )?))
    }
}

pub enum PrefetchIter {
    Sync {
        generator: Arc<dyn BatchGenerator>,
        next: usize,
    },
    Threaded(ThreadedIter),
}

impl Iterator for PrefetchIter {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            PrefetchIter::Sync { generator, next } => {
                if *next >= generator.len() {
                    return None;
                }
                let batch = generator.get_batch(*next);
                *next += 1;
                Some(batch)
            }
            PrefetchIter::Threaded(iter) => iter.next_batch(),
        }
    }
}

pub struct ThreadedIter {
    workers: Vec<thread::JoinHandle<()>>,
    task_txs: Vec<Sender<usize>>,
    output_rx: Option<Receiver<(usize, Result<Batch>)>>,
    shutdown: Arc<AtomicBool>,
    reorder: BTreeMap<usize, Result<Batch>>,
    n_batches: usize,
    next_to_send: usize,
    next_to_yield: usize,
}

impl ThreadedIter {
    fn spawn(
        generator: Arc<dyn BatchGenerator>,
        num_workers: usize,
        prefetch_factor: usize,
    ) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (output_tx, output_rx) = bounded(num_workers * prefetch_factor);

        let mut task_txs = Vec::with_capacity(num_workers);
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (task_tx, task_rx) = bounded::<usize>(prefetch_factor);
            task_txs.push(task_tx);

            let generator = generator.clone();
            let output_tx = output_tx.clone();
            let shutdown = shutdown.clone();

            let handle = thread::Builder::new()
                .name(format!("prefetch-worker-{}", worker_id))
                .spawn(move || {
                    while !shutdown.load(Ordering::Relaxed) {
                        let index = match task_rx.recv_timeout(Duration::from_millis(100)) {
                            Ok(index) => index,
                            Err(RecvTimeoutError::Timeout) => continue,
                            Err(RecvTimeoutError::Disconnected) => break,
                        };

                        let result = generator
                            .get_batch(index)
                            .with_context(|| format!("Worker failed on batch {}", index));
                        if output_tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                })
                .with_context(|| format!("Failed to spawn prefetch worker {}", worker_id))?;

            workers.push(handle);
        }

        Ok(Self {
            workers,
            task_txs,
            output_rx: Some(output_rx),
            shutdown,
            reorder: BTreeMap::new(),
            n_batches: generator.len(),
            next_to_send: 0,
            next_to_yield: 0,
        })
    }

    // Non-blocking feed: fill each worker's queue as far as it will go.
    fn feed(&mut self) {
        while self.next_to_send < self.n_batches {
            let worker = self.next_to_send % self.task_txs.len();
            match self.task_txs[worker].try_send(self.next_to_send) {
                Ok(()) => self.next_to_send += 1,
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => break,
            }
        }
    }

    fn next_batch(&mut self) -> Option<Result<Batch>> {
        if self.next_to_yield >= self.n_batches {
            return None;
        }

        loop {
            self.feed();

            if let Some(result) = self.reorder.remove(&self.next_to_yield) {
                self.next_to_yield += 1;
                return Some(result);
            }

            let output_rx = match &self.output_rx {
                Some(rx) => rx,
                None => return None,
            };

            match output_rx.recv_timeout(RECV_TIMEOUT) {
                Ok((index, result)) => {
                    self.reorder.insert(index, result);
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Some(Err(anyhow!(
                        "Prefetch workers produced nothing for {:?}; assuming they are wedged",
                        RECV_TIMEOUT
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Some(Err(anyhow!("Prefetch workers disconnected unexpectedly")));
                }
            }
        }
    }
}

impl Drop for ThreadedIter {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.task_txs.clear();

        // Unblock workers stuck sending into a full output channel.
        self.output_rx.take();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
