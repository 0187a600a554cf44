//! The coalescing worker and its submission handle.
//!
//! [`Batcher::new`] spawns a single background task that owns the executor,
//! the batch under construction and its flush timer. Callers only ever touch
//! the bounded intake channel and the shutdown latch, both held by the
//! cloneable [`Batcher`] handle.
//!
//! ## Lifecycle
//!
//! - Items flow through intake into the current batch.
//! - A batch is flushed when it holds `max_batch` items or when `wait` has
//!   elapsed since its first item.
//! - The first failed flush (or cancellation) is recorded in the latch and
//!   intake is closed. From then on every queued, blocked and future item is
//!   notified with that cause.
//! - When every handle is dropped the worker flushes what it holds and exits.

mod coalesce;

use crate::{
    BatchConfig, Batchable, Executor, Operation, Result,
    item::{FnBatchable, Pending},
    latch::Latch,
};
use coalesce::worker_loop;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) type Item<E> = Box<dyn Batchable<E>>;

/// Handle used to submit items to a coalescing worker.
///
/// Cloning the handle is cheap; every clone feeds the same worker.
pub struct Batcher<E: Executor> {
    items: mpsc::Sender<Item<E>>,
    latch: Arc<Latch>,
}

impl<E: Executor> Clone for Batcher<E> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            latch: Arc::clone(&self.latch),
        }
    }
}

impl<E: Executor> core::fmt::Debug for Batcher<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Batcher")
            .field("capacity", &self.items.max_capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<E: Executor> Batcher<E> {
    /// Spawns the worker task on the current Tokio runtime and returns a
    /// handle to it.
    ///
    /// The worker runs until a flush fails, `cancel` fires, or every handle is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if
    /// `config` does not validate. Nothing is spawned in that case.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new(executor: E, config: BatchConfig, cancel: CancellationToken) -> Result<Self> {
        config.validate()?;
        Ok(Self::spawn(executor, config, cancel))
    }

    /// Same as [`Batcher::new`] with [`BatchConfig::default`].
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn with_defaults(executor: E, cancel: CancellationToken) -> Self {
        Self::spawn(executor, BatchConfig::default(), cancel)
    }

    fn spawn(executor: E, config: BatchConfig, cancel: CancellationToken) -> Self {
        // Intake holds at most one full batch so a submitter never has to wait
        // on anything but the batch in flight.
        let (tx, rx) = mpsc::channel(config.max_batch);
        let latch = Arc::new(Latch::new());

        tokio::spawn(worker_loop(
            executor,
            rx,
            Arc::clone(&latch),
            config,
            cancel,
        ));

        Self { items: tx, latch }
    }

    /// Hands `item` to the worker.
    ///
    /// Waits only while intake is full. If the worker has already stopped, or
    /// stops while this call waits, the item is notified with the recorded
    /// cause instead of being queued. Either way the item is notified exactly
    /// once.
    pub async fn batch<B>(&self, item: B)
    where
        B: Batchable<E>,
    {
        self.batch_boxed(Box::new(item)).await;
    }

    /// Boxed form of [`Batcher::batch`].
    pub async fn batch_boxed(&self, item: Item<E>) {
        if self.latch.is_fired() {
            item.done(Err(self.latch.cause_or_shutdown()));
            return;
        }

        // The worker closes intake right after latching, which wakes every
        // blocked sender and hands its item back.
        if let Err(mpsc::error::SendError(item)) = self.items.send(item).await {
            item.done(Err(self.latch.cause_or_shutdown()));
        }
    }

    /// Callback-style submission: `queue` adds the operation to the batch,
    /// `done` receives the results (or the failure) once.
    pub async fn batch_fn<Q, D>(&self, queue: Q, done: D)
    where
        Q: FnMut(&mut E::Batch) + Send + 'static,
        D: FnOnce(Result<&mut E::Results>) + Send + 'static,
    {
        self.batch(FnBatchable::new(queue, done)).await;
    }

    /// Submits `op` and waits for its output.
    ///
    /// # Errors
    ///
    /// Returns the item-level error produced by `op`, or the batch/worker-level
    /// cause if the batch containing `op` (or the worker) failed.
    pub async fn call<O>(&self, op: O) -> Result<O::Output>
    where
        O: Operation<E>,
    {
        let (pending, rx) = Pending::new(op);
        self.batch(pending).await;
        rx.await.unwrap_or(Err(crate::Error::Dropped))
    }

    /// Returns `true` once the worker has recorded a terminal failure.
    pub fn is_closed(&self) -> bool {
        self.latch.is_fired()
    }

    /// The recorded terminal failure, if any.
    pub fn error(&self) -> Option<crate::Error> {
        self.latch.cause()
    }

    /// Resolves with the terminal failure once the worker records one.
    pub async fn closed(&self) -> crate::Error {
        self.latch.fired().await
    }
}
