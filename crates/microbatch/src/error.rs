//! Error types for the batching engine.
//!
//! This module defines the central [`Error`] enum. Every variant is cheap to
//! clone so that a single terminal cause can be handed to every waiting item.
//!
//! ## Error Cases
//! - `InvalidConfig`: construction parameters were rejected.
//! - `Submit`: the executor refused an assembled batch. Terminal.
//! - `Close`: releasing a batch's results failed. Terminal.
//! - `Cancelled`: the worker's cancellation token fired. Terminal.
//! - `Shutdown`: the worker stopped without recording a cause.
//! - `Item`: a single item's outcome failed. Local to that item.
//! - `Dropped`: an item was discarded before it produced an outcome.

use std::sync::Arc;

/// Type-erased, shareable error produced by an executor or results handle.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the batching engine.
#[derive(Clone, thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The batch configuration was invalid.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The executor failed to submit a batch.
    #[error("Batch submission failed: {0}")]
    Submit(SharedError),

    /// The results of a batch could not be released.
    #[error("Closing batch results failed: {0}")]
    Close(SharedError),

    /// The worker was cancelled through its token.
    #[error("Batch worker cancelled")]
    Cancelled,

    /// The worker is no longer running.
    #[error("Batch worker has shut down")]
    Shutdown,

    /// A single item inside an otherwise successful batch failed.
    #[error("Item failed: {0}")]
    Item(SharedError),

    /// The item was dropped before it was notified.
    #[error("Item dropped before completion")]
    Dropped,
}

impl Error {
    pub(crate) fn submit<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Submit(Arc::new(err))
    }

    pub(crate) fn close<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Close(Arc::new(err))
    }

    /// Wraps an item-level failure.
    pub fn item<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Item(Arc::new(err))
    }

    /// Returns `true` if this error means the worker can no longer make
    /// progress.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Submit(_) | Self::Close(_) | Self::Cancelled | Self::Shutdown
        )
    }
}
