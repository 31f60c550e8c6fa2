//! Thumbnail worker queue for concurrent grid requests.
//!
//! - Bounded worker pool pulling requests from a flume channel
//! - One pending entry per key; repeat requests are dropped until it completes
//! - Results come back on a channel for the caller to poll

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use flume::{Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, error, trace, warn};

use super::buffer::ThumbnailBuffer;
use super::cache::ThumbnailCacheManager;
use super::key::ThumbnailKey;
use crate::error::ThumbnailError;
use crate::models::{Photo, SourceDescriptor};

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 2;

/// Maximum number of worker threads.
const MAX_WORKERS: usize = 8;

/// Maximum number of pending requests in the queue.
const MAX_QUEUE_SIZE: usize = 256;

/// How often idle workers check for shutdown.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// A request to produce a thumbnail.
#[derive(Debug, Clone)]
pub struct ThumbnailRequest {
    pub key: ThumbnailKey,
    pub source: SourceDescriptor,
    enqueued_at: Instant,
}

impl ThumbnailRequest {
    pub fn new(key: ThumbnailKey, source: SourceDescriptor) -> Self {
        Self {
            key,
            source,
            enqueued_at: Instant::now(),
        }
    }
}

impl From<&Photo> for ThumbnailRequest {
    fn from(photo: &Photo) -> Self {
        Self::new(photo.key(), photo.source())
    }
}

/// Outcome of a request, delivered on the result channel.
#[derive(Debug, Clone)]
pub struct ThumbnailResult {
    pub key: ThumbnailKey,
    pub outcome: Result<ThumbnailBuffer, ThumbnailError>,
    /// Time spent waiting for a worker.
    pub queue_wait: Duration,
    /// Time the worker spent producing the thumbnail.
    pub work_time: Duration,
}

impl ThumbnailResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Worker queue for thumbnail requests.
pub struct ThumbnailQueue {
    request_tx: Option<Sender<ThumbnailRequest>>,
    result_rx: Receiver<ThumbnailResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    active_workers: Arc<AtomicUsize>,
    /// Keys queued or being processed.
    pending: Arc<RwLock<HashSet<ThumbnailKey>>>,
    cache: ThumbnailCacheManager,
}

impl ThumbnailQueue {
    /// Create a new queue with the specified number of workers over `cache`.
    pub fn new(workers: usize, cache: ThumbnailCacheManager) -> Result<Self> {
        let num_workers = workers.clamp(1, MAX_WORKERS);

        let (request_tx, request_rx) = flume::bounded(MAX_QUEUE_SIZE);
        let (result_tx, result_rx) = flume::unbounded();

        let shutdown = Arc::new(AtomicBool::new(false));
        let active_workers = Arc::new(AtomicUsize::new(0));
        let pending = Arc::new(RwLock::new(HashSet::new()));

        let mut worker_handles = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let ctx = WorkerContext {
                worker_id,
                rx: request_rx.clone(),
                tx: result_tx.clone(),
                shutdown: Arc::clone(&shutdown),
                active: Arc::clone(&active_workers),
                pending: Arc::clone(&pending),
                cache: cache.clone(),
            };

            let handle = thread::Builder::new()
                .name(format!("thumb-worker-{}", worker_id))
                .spawn(move || worker_loop(ctx))
                .context("Failed to spawn thumbnail worker")?;

            worker_handles.push(handle);
        }

        debug!(num_workers, "Started thumbnail worker queue");

        Ok(Self {
            request_tx: Some(request_tx),
            result_rx,
            workers: worker_handles,
            shutdown,
            active_workers,
            pending,
            cache,
        })
    }

    /// Submit a request.
    ///
    /// Returns false if the queue is full, shut down, or the key is already pending.
    pub fn request(&self, req: ThumbnailRequest) -> bool {
        let Some(request_tx) = &self.request_tx else {
            return false;
        };

        if !self.pending.write().insert(req.key) {
            trace!(key = %req.key, "Request already pending");
            return false;
        }

        match request_tx.try_send(req) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(req)) => {
                warn!("Thumbnail queue full, dropping request");
                self.pending.write().remove(&req.key);
                false
            }
            Err(flume::TrySendError::Disconnected(req)) => {
                error!("Thumbnail queue disconnected");
                self.pending.write().remove(&req.key);
                false
            }
        }
    }

    /// Request thumbnails for multiple items. Returns how many were accepted.
    pub fn request_batch(&self, requests: impl IntoIterator<Item = ThumbnailRequest>) -> usize {
        requests.into_iter().filter(|req| self.request(req.clone())).count()
    }

    /// Poll for completed thumbnails (non-blocking).
    pub fn poll_results(&self) -> Vec<ThumbnailResult> {
        self.result_rx.try_iter().collect()
    }

    /// Wait up to `timeout` for the next completed thumbnail.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ThumbnailResult> {
        self.result_rx.recv_timeout(timeout).ok()
    }

    /// Get the thumbnail cache.
    pub fn cache(&self) -> &ThumbnailCacheManager {
        &self.cache
    }

    /// Get the number of pending requests.
    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }

    /// Get the number of active workers currently processing.
    pub fn active_worker_count(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    /// Check if there is work in progress.
    pub fn is_busy(&self) -> bool {
        !self.pending.read().is_empty() || self.active_worker_count() > 0
    }

    /// Shutdown the worker queue. Requests not yet picked up are dropped.
    pub fn shutdown(&mut self) {
        debug!("Shutting down thumbnail queue");

        self.shutdown.store(true, Ordering::SeqCst);
        self.request_tx.take();

        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        self.pending.write().clear();

        debug!("Thumbnail queue shutdown complete");
    }
}

impl Drop for ThumbnailQueue {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
        }
    }
}

struct WorkerContext {
    worker_id: usize,
    rx: Receiver<ThumbnailRequest>,
    tx: Sender<ThumbnailResult>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    pending: Arc<RwLock<HashSet<ThumbnailKey>>>,
    cache: ThumbnailCacheManager,
}

/// Worker thread loop.
fn worker_loop(ctx: WorkerContext) {
    let worker_id = ctx.worker_id;
    debug!(worker_id, "Thumbnail worker started");

    while !ctx.shutdown.load(Ordering::Relaxed) {
        match ctx.rx.recv_timeout(IDLE_POLL) {
            Ok(req) => {
                ctx.active.fetch_add(1, Ordering::Relaxed);

                let result = process_request(&req, &ctx.cache);
                ctx.pending.write().remove(&req.key);

                if let Err(e) = ctx.tx.send(result) {
                    warn!(worker_id, error = ?e, "Failed to send thumbnail result");
                }

                ctx.active.fetch_sub(1, Ordering::Relaxed);
            }
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(worker_id, "Thumbnail worker stopped");
}

/// Process a single thumbnail request.
fn process_request(req: &ThumbnailRequest, cache: &ThumbnailCacheManager) -> ThumbnailResult {
    let started = Instant::now();
    let queue_wait = started.duration_since(req.enqueued_at);
    trace!(key = %req.key, "Processing thumbnail request");

    let outcome = cache.get_thumbnail(req.key, &req.source);
    if let Err(e) = &outcome {
        debug!(key = %req.key, error = %e, "Thumbnail unavailable, cell keeps its placeholder");
    }

    ThumbnailResult {
        key: req.key,
        outcome,
        queue_wait,
        work_time: started.elapsed(),
    }
}
