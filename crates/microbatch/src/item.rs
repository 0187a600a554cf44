//! The unit of work a caller hands to a [`Batcher`](crate::Batcher).
//!
//! The worker never looks inside an item. It only asks it to queue itself into
//! the batch under construction and, once the batch has run, tells it where to
//! read its outcome from. Concrete operation kinds are adapters over
//! [`Batchable`]:
//!
//! - [`Operation`]: typed request/response, awaited by the caller through
//!   [`Batcher::call`](crate::Batcher::call).
//! - [`FnBatchable`]: a pair of closures, for callback-style submission.

use crate::{Error, Executor, Result};
use tokio::sync::oneshot;

/// An item that can be coalesced into a batch.
pub trait Batchable<E: Executor>: Send + 'static {
    /// Queues exactly one operation into `batch`.
    fn queue(&mut self, batch: &mut E::Batch);

    /// Delivers the item's outcome. Called exactly once.
    ///
    /// On success the item must read its own result from `results`; items are
    /// notified in the order they were queued, so each read lines up with the
    /// operation this item queued. On failure `results` carries the batch- or
    /// worker-level cause.
    fn done(self: Box<Self>, results: Result<&mut E::Results>);
}

/// A typed request whose response is read back from the batch results.
pub trait Operation<E: Executor>: Send + 'static {
    type Output: Send + 'static;

    /// Queues the request into `batch`.
    fn queue(&mut self, batch: &mut E::Batch);

    /// Reads this operation's response.
    ///
    /// # Errors
    ///
    /// Returns an item-level error (usually [`Error::Item`]) when the
    /// operation itself failed. This never stops the worker.
    fn read(self, results: &mut E::Results) -> Result<Self::Output>;
}

/// Adapter that turns an [`Operation`] into a [`Batchable`] and reports the
/// outcome over a oneshot channel.
pub(crate) struct Pending<O, T> {
    op: O,
    tx: oneshot::Sender<Result<T>>,
}

impl<O, T> Pending<O, T> {
    pub(crate) fn new(op: O) -> (Self, oneshot::Receiver<Result<T>>) {
        let (tx, rx) = oneshot::channel();
        (Self { op, tx }, rx)
    }
}

impl<E, O> Batchable<E> for Pending<O, O::Output>
where
    E: Executor,
    O: Operation<E>,
{
    fn queue(&mut self, batch: &mut E::Batch) {
        self.op.queue(batch);
    }

    fn done(self: Box<Self>, results: Result<&mut E::Results>) {
        let Self { op, tx } = *self;
        let outcome = results.and_then(|results| op.read(results));
        // The caller may have stopped waiting.
        let _ = tx.send(outcome);
    }
}

/// A [`Batchable`] built from two closures.
///
/// `queue` is called once when the item joins a batch; `done` is called once
/// with the batch results or the failure.
pub struct FnBatchable<Q, D> {
    queue: Q,
    done: D,
}

impl<Q, D> FnBatchable<Q, D> {
    pub const fn new(queue: Q, done: D) -> Self {
        Self { queue, done }
    }
}

impl<E, Q, D> Batchable<E> for FnBatchable<Q, D>
where
    E: Executor,
    Q: FnMut(&mut E::Batch) + Send + 'static,
    D: FnOnce(Result<&mut E::Results>) + Send + 'static,
{
    fn queue(&mut self, batch: &mut E::Batch) {
        (self.queue)(batch);
    }

    fn done(self: Box<Self>, results: Result<&mut E::Results>) {
        (self.done)(results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Get, MemoryBatch, MemoryError, MemoryResults, MemoryStore, Put};

    #[tokio::test]
    async fn pending_reads_its_own_reply() {
        let mut store = MemoryStore::with_rows([(1, "one".to_string())]);
        let mut batch = MemoryBatch::default();

        let (mut put, put_rx) = Pending::new(Put::new(2, "two"));
        let (mut get, get_rx) = Pending::new(Get::new(1));
        Batchable::<MemoryStore>::queue(&mut put, &mut batch);
        Batchable::<MemoryStore>::queue(&mut get, &mut batch);

        let mut results = store.submit(batch).await.unwrap();
        Batchable::<MemoryStore>::done(Box::new(put), Ok(&mut results));
        Batchable::<MemoryStore>::done(Box::new(get), Ok(&mut results));

        assert_eq!(put_rx.await.unwrap().unwrap(), 1);
        assert_eq!(get_rx.await.unwrap().unwrap(), "one");
    }

    #[tokio::test]
    async fn pending_forwards_batch_failure() {
        let (pending, rx) = Pending::new(Get::new(7));
        Batchable::<MemoryStore>::done(Box::new(pending), Err(Error::Cancelled));
        assert!(matches!(rx.await.unwrap(), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn fn_batchable_runs_both_closures() {
        let mut store = MemoryStore::default();
        let mut batch = MemoryBatch::default();
        let (tx, rx) = oneshot::channel();

        let mut item = FnBatchable::new(
            |batch: &mut MemoryBatch| batch.put(5, "five"),
            move |results: Result<&mut MemoryResults>| {
                let reply = results.and_then(|r| r.next_reply().map_err(Error::item));
                let _ = tx.send(reply);
            },
        );
        Batchable::<MemoryStore>::queue(&mut item, &mut batch);
        assert_eq!(batch.len(), 1);

        let mut results = store.submit(batch).await.unwrap();
        Batchable::<MemoryStore>::done(Box::new(item), Ok(&mut results));
        assert!(rx.await.unwrap().is_ok());
        assert_eq!(store.row(5).as_deref(), Some("five"));
    }

    #[tokio::test]
    async fn missing_row_is_an_item_error() {
        let mut store = MemoryStore::default();
        let mut batch = MemoryBatch::default();
        let (mut get, rx) = Pending::new(Get::new(42));
        Batchable::<MemoryStore>::queue(&mut get, &mut batch);

        let mut results = store.submit(batch).await.unwrap();
        Batchable::<MemoryStore>::done(Box::new(get), Ok(&mut results));

        match rx.await.unwrap() {
            Err(Error::Item(e)) => {
                assert_eq!(e.to_string(), MemoryError::NotFound { key: 42 }.to_string());
            }
            other => panic!("expected item error, got {other:?}"),
        }
    }
}
