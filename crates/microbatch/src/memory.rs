//! In-memory key/value executor.
//!
//! [`MemoryStore`] executes a [`MemoryBatch`] of commands against a shared
//! ordered map and returns one [`Reply`] per command. It plays the role a
//! pipelined database connection plays in production, and can be told to fail
//! a specific batch so that the worker's terminal paths can be exercised.
//!
//! Three operation kinds are provided:
//!
//! - [`Put`]: write a row, returns the number of rows affected.
//! - [`Get`]: read one row; a missing row is an item-level error.
//! - [`Scan`]: read every row in an inclusive key range.

use crate::{BatchResults, Error, Executor, Operation, Result};
use core::time::Duration;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

/// Errors raised by the in-memory executor.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum MemoryError {
    #[error("injected failure submitting batch {batch}")]
    SubmitFailed { batch: usize },

    #[error("injected failure closing batch {batch}")]
    CloseFailed { batch: usize },

    #[error("empty batch")]
    EmptyBatch,

    #[error("no more results in batch")]
    NoMoreResults,

    #[error("no row with key {key}")]
    NotFound { key: u64 },

    #[error("unexpected reply for {expected}")]
    UnexpectedReply { expected: &'static str },
}

/// A single command inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Put { key: u64, value: String },
    Get { key: u64 },
    Scan { from: u64, to: u64 },
}

/// The outcome of a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Written(u64),
    Row(Option<String>),
    Rows(Vec<(u64, String)>),
}

/// Ordered list of commands sent as one unit.
#[derive(Debug, Default)]
pub struct MemoryBatch {
    commands: Vec<Command>,
}

impl MemoryBatch {
    pub fn queue(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn put(&mut self, key: u64, value: impl Into<String>) {
        self.queue(Command::Put {
            key,
            value: value.into(),
        });
    }

    pub fn get(&mut self, key: u64) {
        self.queue(Command::Get { key });
    }

    pub fn scan(&mut self, from: u64, to: u64) {
        self.queue(Command::Scan { from, to });
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Replies of one batch, read front to back.
#[derive(Debug)]
pub struct MemoryResults {
    batch: usize,
    replies: VecDeque<Reply>,
    fail_close: bool,
}

impl MemoryResults {
    /// Pops the reply for the next command in submission order.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NoMoreResults`] once every reply was consumed.
    pub fn next_reply(&mut self) -> core::result::Result<Reply, MemoryError> {
        self.replies.pop_front().ok_or(MemoryError::NoMoreResults)
    }

    /// Sequence number (1-based) of the batch these results belong to.
    pub const fn batch(&self) -> usize {
        self.batch
    }

    pub fn remaining(&self) -> usize {
        self.replies.len()
    }
}

impl BatchResults for MemoryResults {
    type Error = MemoryError;

    fn close(self) -> core::result::Result<(), Self::Error> {
        if self.fail_close {
            return Err(MemoryError::CloseFailed { batch: self.batch });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Faults {
    submit_on: Option<usize>,
    close_on: Option<usize>,
}

#[derive(Debug, Default)]
struct Shared {
    rows: Mutex<BTreeMap<u64, String>>,
    faults: Mutex<Faults>,
    batches_sent: AtomicUsize,
    items_sent: AtomicUsize,
}

/// Shared in-memory table. Clones see the same rows and counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    latency: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `rows`.
    pub fn with_rows(rows: impl IntoIterator<Item = (u64, String)>) -> Self {
        let store = Self::default();
        store.shared.rows.lock().extend(rows);
        store
    }

    /// Simulated round-trip time applied to every submission.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails submission of the `batch`-th batch (1-based).
    pub fn fail_submit_on(&self, batch: usize) {
        self.shared.faults.lock().submit_on = Some(batch);
    }

    /// Fails closing the results of the `batch`-th batch (1-based).
    pub fn fail_close_on(&self, batch: usize) {
        self.shared.faults.lock().close_on = Some(batch);
    }

    /// Number of batches handed to [`Executor::submit`], failed ones included.
    pub fn batches_sent(&self) -> usize {
        self.shared.batches_sent.load(Ordering::Acquire)
    }

    /// Number of commands across every batch handed to [`Executor::submit`].
    pub fn items_sent(&self) -> usize {
        self.shared.items_sent.load(Ordering::Acquire)
    }

    pub fn row(&self, key: u64) -> Option<String> {
        self.shared.rows.lock().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.rows.lock().is_empty()
    }

    fn execute(&self, commands: Vec<Command>) -> VecDeque<Reply> {
        let mut rows = self.shared.rows.lock();
        commands
            .into_iter()
            .map(|command| match command {
                Command::Put { key, value } => {
                    rows.insert(key, value);
                    Reply::Written(1)
                }
                Command::Get { key } => Reply::Row(rows.get(&key).cloned()),
                Command::Scan { from, to } if from <= to => Reply::Rows(
                    rows.range(from..=to)
                        .map(|(k, v)| (*k, v.clone()))
                        .collect(),
                ),
                Command::Scan { .. } => Reply::Rows(Vec::new()),
            })
            .collect()
    }
}

impl Executor for MemoryStore {
    type Batch = MemoryBatch;
    type Results = MemoryResults;
    type Error = MemoryError;

    async fn submit(
        &mut self,
        batch: MemoryBatch,
    ) -> core::result::Result<MemoryResults, MemoryError> {
        let seq = self.shared.batches_sent.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.items_sent.fetch_add(batch.len(), Ordering::AcqRel);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let (fail_submit, fail_close) = {
            let faults = self.shared.faults.lock();
            (faults.submit_on == Some(seq), faults.close_on == Some(seq))
        };
        if fail_submit {
            return Err(MemoryError::SubmitFailed { batch: seq });
        }
        if batch.is_empty() {
            return Err(MemoryError::EmptyBatch);
        }

        Ok(MemoryResults {
            batch: seq,
            replies: self.execute(batch.commands),
            fail_close,
        })
    }
}

/// Writes `value` under `key`.
#[derive(Debug, Clone)]
pub struct Put {
    key: u64,
    value: Option<String>,
}

impl Put {
    pub fn new(key: u64, value: impl Into<String>) -> Self {
        Self {
            key,
            value: Some(value.into()),
        }
    }
}

impl Operation<MemoryStore> for Put {
    type Output = u64;

    fn queue(&mut self, batch: &mut MemoryBatch) {
        let value = self.value.take().unwrap_or_default();
        batch.put(self.key, value);
    }

    fn read(self, results: &mut MemoryResults) -> Result<u64> {
        match results.next_reply().map_err(Error::item)? {
            Reply::Written(n) => Ok(n),
            _ => Err(Error::item(MemoryError::UnexpectedReply { expected: "put" })),
        }
    }
}

/// Reads the row stored under `key`.
#[derive(Debug, Clone, Copy)]
pub struct Get {
    key: u64,
}

impl Get {
    pub const fn new(key: u64) -> Self {
        Self { key }
    }
}

impl Operation<MemoryStore> for Get {
    type Output = String;

    fn queue(&mut self, batch: &mut MemoryBatch) {
        batch.get(self.key);
    }

    fn read(self, results: &mut MemoryResults) -> Result<String> {
        match results.next_reply().map_err(Error::item)? {
            Reply::Row(Some(value)) => Ok(value),
            Reply::Row(None) => Err(Error::item(MemoryError::NotFound { key: self.key })),
            _ => Err(Error::item(MemoryError::UnexpectedReply { expected: "get" })),
        }
    }
}

/// Reads every row with a key in `from..=to`, in key order.
#[derive(Debug, Clone, Copy)]
pub struct Scan {
    from: u64,
    to: u64,
}

impl Scan {
    pub const fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }
}

impl Operation<MemoryStore> for Scan {
    type Output = Vec<(u64, String)>;

    fn queue(&mut self, batch: &mut MemoryBatch) {
        batch.scan(self.from, self.to);
    }

    fn read(self, results: &mut MemoryResults) -> Result<Self::Output> {
        match results.next_reply().map_err(Error::item)? {
            Reply::Rows(rows) => Ok(rows),
            _ => Err(Error::item(MemoryError::UnexpectedReply { expected: "scan" })),
        }
    }
}
