use crate::Error;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;

/// One-shot terminal state shared by the worker task and every handle.
///
/// The worker is the only writer. The cause is recorded before the signal
/// fires, so anyone who observes the signal can read the cause.
#[derive(Debug, Default)]
pub(crate) struct Latch {
    cause: OnceLock<Error>,
    signal: CancellationToken,
}

impl Latch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records `cause` and wakes every waiter. Only the first call has an
    /// effect; the recorded cause is returned either way.
    pub(crate) fn fire(&self, cause: Error) -> Error {
        let cause = self.cause.get_or_init(|| cause).clone();
        self.signal.cancel();
        cause
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.signal.is_cancelled()
    }

    pub(crate) fn cause(&self) -> Option<Error> {
        self.cause.get().cloned()
    }

    /// The recorded cause, or [`Error::Shutdown`] if the worker went away
    /// without recording one.
    pub(crate) fn cause_or_shutdown(&self) -> Error {
        self.cause().unwrap_or(Error::Shutdown)
    }

    /// Resolves once the latch has fired.
    pub(crate) async fn fired(&self) -> Error {
        self.signal.cancelled().await;
        self.cause_or_shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_cause_wins() {
        let latch = Latch::new();
        assert!(!latch.is_fired());
        assert!(latch.cause().is_none());

        assert!(matches!(latch.fire(Error::Cancelled), Error::Cancelled));
        assert!(matches!(latch.fire(Error::Shutdown), Error::Cancelled));
        assert!(latch.is_fired());
        assert!(matches!(latch.cause(), Some(Error::Cancelled)));
    }

    #[test]
    fn missing_cause_reads_as_shutdown() {
        let latch = Latch::new();
        assert!(matches!(latch.cause_or_shutdown(), Error::Shutdown));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn wakes_every_waiter() {
        let latch = Arc::new(Latch::new());
        let waiters: Vec<_> = (0..16)
            .map(|_| {
                let latch = Arc::clone(&latch);
                tokio::spawn(async move { latch.fired().await })
            })
            .collect();

        latch.fire(Error::Cancelled);

        for waiter in waiters {
            assert!(matches!(waiter.await.unwrap(), Error::Cancelled));
        }
        // Already fired: resolves immediately.
        assert!(matches!(latch.fired().await, Error::Cancelled));
    }
}
