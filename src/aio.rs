//! Asynchronous I/O dispatch
//!
//! Requests run on the blocking pool of a dedicated tokio runtime, which
//! bounds how many execute at once. Each request finishes with exactly one
//! call on its [`AioCompletion`], carrying the byte count or a negative
//! error code in [`Aio::result`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::{Condvar, Mutex};
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::Result;

/// One asynchronous request
#[derive(Debug)]
pub struct Aio {
    pub offset: u64,
    /// Destination of a read, sized to the requested length; source of a write
    pub buffer: BytesMut,
    /// Bytes transferred, or a negative error code
    pub result: i64,
}

impl Aio {
    /// A read of `len` bytes at `offset`
    pub fn read(offset: u64, len: usize) -> Self {
        Self {
            offset,
            buffer: BytesMut::zeroed(len),
            result: 0,
        }
    }

    /// A write of `data` at `offset`
    pub fn write(offset: u64, data: &[u8]) -> Self {
        Self {
            offset,
            buffer: BytesMut::from(data),
            result: 0,
        }
    }

    /// The bytes a completed read produced
    pub fn data(&self) -> &[u8] {
        match usize::try_from(self.result) {
            Ok(n) => &self.buffer[..n.min(self.buffer.len())],
            Err(_) => &[],
        }
    }
}

/// Completion notification, consumed by its single call
pub trait AioCompletion: Send + 'static {
    fn done_read(self: Box<Self>, aio: Aio);
    fn done_write(self: Box<Self>, aio: Aio);
}

impl AioCompletion for oneshot::Sender<Aio> {
    fn done_read(self: Box<Self>, aio: Aio) {
        let _ = self.send(aio);
    }

    fn done_write(self: Box<Self>, aio: Aio) {
        let _ = self.send(aio);
    }
}

/// Adapts a closure into a completion
pub struct OnComplete<F>(pub F);

impl<F> AioCompletion for OnComplete<F>
where
    F: FnOnce(Aio) + Send + 'static,
{
    fn done_read(self: Box<Self>, aio: Aio) {
        let OnComplete(f) = *self;
        f(aio)
    }

    fn done_write(self: Box<Self>, aio: Aio) {
        let OnComplete(f) = *self;
        f(aio)
    }
}

/// A completion paired with the receiver that observes it
pub fn completion() -> (Box<dyn AioCompletion>, oneshot::Receiver<Aio>) {
    let (tx, rx) = oneshot::channel();
    (Box::new(tx), rx)
}

/// Requests queued or running on a dispatcher
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    drained: Condvar,
}

/// Decrements the pending count when a job ends, even by panic
struct PendingGuard(Arc<Pending>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count -= 1;
        if *count == 0 {
            self.0.drained.notify_all();
        }
    }
}

/// Bounded pool executing asynchronous requests
///
/// Dropping the dispatcher waits for every accepted request to complete.
pub struct AioDispatcher {
    runtime: Option<Runtime>,
    workers: usize,
    submitted: AtomicU64,
    pending: Arc<Pending>,
}

impl AioDispatcher {
    /// Create a pool running at most `workers` requests at a time
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name("oss-aio")
            .build()?;

        debug!("aio pool started with {} workers", workers);
        Ok(Self {
            runtime: Some(runtime),
            workers,
            submitted: AtomicU64::new(0),
            pending: Arc::default(),
        })
    }

    /// Queue `job`; it runs once a worker is free
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(runtime) = &self.runtime else {
            return;
        };

        *self.pending.count.lock() += 1;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        let guard = PendingGuard(self.pending.clone());
        drop(runtime.spawn_blocking(move || {
            let _guard = guard;
            job()
        }));
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Requests accepted since the pool started
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Requests queued or running
    pub fn pending(&self) -> usize {
        *self.pending.count.lock()
    }
}

impl Drop for AioDispatcher {
    fn drop(&mut self) {
        let mut count = self.pending.count.lock();
        while *count > 0 {
            self.pending.drained.wait(&mut count);
        }
        drop(count);

        if let Some(runtime) = self.runtime.take() {
            // nothing is left to wait for, and this may run inside async code
            runtime.shutdown_background();
        }
        debug!("aio pool stopped");
    }
}
