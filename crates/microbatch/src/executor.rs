use core::future::Future;

/// Submits an assembled batch and hands back a handle to its results.
///
/// The worker owns the executor and only ever calls it from its own task, so
/// `submit` takes `&mut self` and needs no internal synchronization. The
/// returned [`BatchResults`] must yield one outcome per queued operation, in
/// the order the operations were queued.
pub trait Executor: Send + 'static {
    /// Builder that items queue their operation into.
    type Batch: Default + Send;
    /// Handle from which per-item outcomes are read in submission order.
    type Results: BatchResults;
    /// Failure to submit a batch as a whole.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends `batch` and resolves once its results are available.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be submitted. The worker treats
    /// this as fatal.
    fn submit(
        &mut self,
        batch: Self::Batch,
    ) -> impl Future<Output = Result<Self::Results, Self::Error>> + Send;
}

/// Results of one submitted batch.
///
/// Items read their own outcome from the handle (through
/// [`Batchable::done`](crate::Batchable::done)); the worker then releases the
/// handle with [`close`](BatchResults::close).
pub trait BatchResults: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Releases the handle after every item has been notified.
    ///
    /// # Errors
    ///
    /// A failure here is fatal to the worker even though every item has
    /// already received its outcome.
    fn close(self) -> Result<(), Self::Error>;
}
