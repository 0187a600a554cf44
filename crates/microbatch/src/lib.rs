#![doc = include_str!("../README.md")]

mod config;
mod error;
mod executor;
mod item;
mod latch;
pub mod memory;
mod worker;

pub use crate::config::*;
pub use crate::error::*;
pub use crate::executor::*;
pub use crate::item::{Batchable, FnBatchable, Operation};
pub use crate::worker::Batcher;
// Re-exported so callers can construct the token without a direct dependency.
pub use tokio_util::sync::CancellationToken;
