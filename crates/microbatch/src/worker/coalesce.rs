use super::Item;
use crate::{BatchConfig, BatchResults, Error, Executor, Result, latch::Latch};
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    time::{Instant, sleep},
};
use tokio_util::sync::CancellationToken;

/// How a single accumulation/flush round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    /// The batch was flushed; start the next one.
    Flushed,
    /// Every handle is gone and nothing is left to flush.
    Closed,
}

/// Fires the latch with [`Error::Shutdown`] when the worker task ends,
/// including by panic or abort. A cause recorded earlier takes precedence.
struct ShutdownGuard(Arc<Latch>);

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.0.fire(Error::Shutdown);
    }
}

/// Background task that coalesces items into batches.
///
/// Repeats [`work`] until it fails or intake closes. On failure the cause is
/// latched, intake is closed, and every item still buffered in intake is
/// notified with the cause so that nothing is left waiting. However the task
/// ends, the latch has fired once it is gone.
///
/// # Arguments
///
/// - `executor`: Executor owned exclusively by this task.
/// - `rx`: Intake channel shared with every [`Batcher`](crate::Batcher).
/// - `latch`: Terminal state observed by the handles.
/// - `config`: Flush policy.
/// - `cancel`: External cancellation, treated like a flush failure.
pub(super) async fn worker_loop<E: Executor>(
    mut executor: E,
    mut rx: mpsc::Receiver<Item<E>>,
    latch: Arc<Latch>,
    config: BatchConfig,
    cancel: CancellationToken,
) {
    let _shutdown = ShutdownGuard(Arc::clone(&latch));

    #[cfg(feature = "tracing")]
    tracing::trace!(
        max_batch = config.max_batch,
        wait_ms = config.wait.as_millis() as u64,
        "Batch worker started"
    );

    let err = loop {
        match work(&mut executor, &mut rx, &config, &cancel).await {
            Ok(Round::Flushed) => {}
            Ok(Round::Closed) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Intake closed, batch worker stopped");
                return;
            }
            Err(e) => break e,
        }
    };

    let cause = latch.fire(err);

    #[cfg(feature = "tracing")]
    tracing::debug!("Batch worker stopping: {cause}");

    // Refuse new sends; anything already buffered (or holding a permit) is
    // still delivered to `recv` until it returns `None`.
    rx.close();
    #[cfg(feature = "tracing")]
    let mut drained = 0_usize;
    while let Some(item) = rx.recv().await {
        item.done(Err(cause.clone()));
        #[cfg(feature = "tracing")]
        {
            drained += 1;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("Batch worker stopped, rejected {drained} queued items");
}

/// Accumulates one batch and flushes it.
///
/// Races intake, the batch timer and cancellation. The timer is armed by the
/// first item and lives only as long as this call, so no timer outlives its
/// batch.
///
/// # Errors
///
/// Returns the terminal cause: [`Error::Cancelled`], [`Error::Submit`] or
/// [`Error::Close`]. Every item accumulated in this round has already been
/// notified when an error is returned.
async fn work<E: Executor>(
    executor: &mut E,
    rx: &mut mpsc::Receiver<Item<E>>,
    config: &BatchConfig,
    cancel: &CancellationToken,
) -> Result<Round> {
    let mut items: Vec<Item<E>> = Vec::with_capacity(config.max_batch);
    let mut batch = E::Batch::default();
    let mut intake_closed = false;

    let timer = sleep(config.wait);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Batch worker cancelled with {} accumulated items", items.len());

                for item in items {
                    item.done(Err(Error::Cancelled));
                }
                return Err(Error::Cancelled);
            }
            () = &mut timer, if !items.is_empty() => break,
            item = rx.recv() => match item {
                Some(mut item) => {
                    if items.is_empty() {
                        timer.as_mut().reset(Instant::now() + config.wait);
                    }
                    item.queue(&mut batch);
                    items.push(item);
                    if items.len() >= config.max_batch {
                        break;
                    }
                }
                None => {
                    if items.is_empty() {
                        return Ok(Round::Closed);
                    }
                    intake_closed = true;
                    break;
                }
            },
        }
    }

    flush(executor, batch, items).await?;

    if intake_closed {
        Ok(Round::Closed)
    } else {
        Ok(Round::Flushed)
    }
}

/// Submits `batch` and notifies `items` in the order they were queued.
///
/// # Errors
///
/// - [`Error::Submit`] if the executor rejects the batch. Every item receives
///   the same error.
/// - [`Error::Close`] if releasing the results fails. Items have already
///   received their outcomes.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "trace", skip_all, fields(items = items.len()))
)]
async fn flush<E: Executor>(executor: &mut E, batch: E::Batch, items: Vec<Item<E>>) -> Result<()> {
    let mut results = match executor.submit(batch).await {
        Ok(results) => results,
        Err(e) => {
            let err = Error::submit(e);
            #[cfg(feature = "tracing")]
            tracing::error!("Failed to submit batch of {}: {err}", items.len());

            for item in items {
                item.done(Err(err.clone()));
            }
            return Err(err);
        }
    };

    for item in items {
        item.done(Ok(&mut results));
    }

    results.close().map_err(|e| {
        let err = Error::close(e);
        #[cfg(feature = "tracing")]
        tracing::error!("Failed to close batch results: {err}");
        err
    })
}
