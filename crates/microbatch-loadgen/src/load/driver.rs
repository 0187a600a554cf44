use super::config::LoadConfig;
use microbatch::{
    Batcher, Error,
    memory::{Get, MemoryStore, Put},
};
use portable_atomic::{AtomicU64, Ordering};
use std::{sync::Arc, time::Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Outcome counters for one phase (writes or reads).
#[derive(Debug, Default)]
struct Tally {
    ok: AtomicU64,
    mismatched: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseReport {
    pub ok: u64,
    pub mismatched: u64,
    pub failed: u64,
}

impl From<&Tally> for PhaseReport {
    fn from(tally: &Tally) -> Self {
        Self {
            ok: tally.ok.load(Ordering::Relaxed),
            mismatched: tally.mismatched.load(Ordering::Relaxed),
            failed: tally.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub writes: PhaseReport,
    pub reads: PhaseReport,
    pub batches_sent: usize,
    pub elapsed_ms: f64,
    pub error: Option<Error>,
}

impl Report {
    pub const fn items_completed(&self) -> u64 {
        self.writes.ok + self.reads.ok
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Write,
    Read,
}

/// Writes `config.items` keys and then reads every key back, each phase fanned
/// out over `config.concurrency` submitter tasks sharing one worker.
///
/// The run stops early if `cancel` fires; remaining items are counted as
/// failed, which is how the worker reports them.
///
/// # Errors
///
/// Returns an error if the worker cannot be constructed or a submitter task
/// panics.
pub async fn run(config: &LoadConfig, cancel: CancellationToken) -> anyhow::Result<Report> {
    let store = MemoryStore::new().with_latency(config.latency);
    if let Some(batch) = config.fail_on_batch {
        store.fail_submit_on(batch);
    }
    let batcher = Batcher::new(store.clone(), config.batch, cancel)?;
    let start = Instant::now();

    let writes = drive(&batcher, config, Phase::Write).await?;
    tracing::info!(
        ok = writes.ok,
        failed = writes.failed,
        batches = store.batches_sent(),
        "Write phase complete"
    );

    let reads = drive(&batcher, config, Phase::Read).await?;
    tracing::info!(
        ok = reads.ok,
        mismatched = reads.mismatched,
        failed = reads.failed,
        batches = store.batches_sent(),
        "Read phase complete"
    );

    Ok(Report {
        writes,
        reads,
        batches_sent: store.batches_sent(),
        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        error: batcher.error(),
    })
}

async fn drive(
    batcher: &Batcher<MemoryStore>,
    config: &LoadConfig,
    phase: Phase,
) -> anyhow::Result<PhaseReport> {
    let tally = Arc::new(Tally::default());
    let submitters = config.concurrency as u64;
    let mut tasks = JoinSet::new();

    for submitter in 0..submitters.min(config.items) {
        let batcher = batcher.clone();
        let tally = Arc::clone(&tally);
        let items = config.items;

        tasks.spawn(async move {
            let mut key = submitter + 1;
            while key <= items {
                submit(&batcher, &tally, phase, key).await;
                key += submitters;
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined?;
    }

    Ok(PhaseReport::from(tally.as_ref()))
}

async fn submit(batcher: &Batcher<MemoryStore>, tally: &Tally, phase: Phase, key: u64) {
    let counter = match phase {
        Phase::Write => match batcher.call(Put::new(key, value_for(key))).await {
            Ok(_) => &tally.ok,
            Err(e) => {
                tracing::trace!(key, "Write failed: {e}");
                &tally.failed
            }
        },
        Phase::Read => match batcher.call(Get::new(key)).await {
            Ok(value) if value == value_for(key) => &tally.ok,
            Ok(value) => {
                tracing::warn!(key, value = %value, "Read returned another key's row");
                &tally.mismatched
            }
            Err(e) => {
                tracing::trace!(key, "Read failed: {e}");
                &tally.failed
            }
        },
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

fn value_for(key: u64) -> String {
    format!("value {key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use microbatch::BatchConfig;

    fn config(items: u64, concurrency: usize, fail_on_batch: Option<usize>) -> LoadConfig {
        LoadConfig {
            batch: BatchConfig::new(50, Duration::from_millis(16)).unwrap(),
            items,
            concurrency,
            latency: Duration::ZERO,
            fail_on_batch,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writes_then_reads_every_key() {
        let report = run(&config(120, 120, None), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report.writes,
            PhaseReport {
                ok: 120,
                mismatched: 0,
                failed: 0
            }
        );
        assert_eq!(
            report.reads,
            PhaseReport {
                ok: 120,
                mismatched: 0,
                failed: 0
            }
        );
        assert_eq!(report.items_completed(), 240);
        assert!(report.batches_sent >= 240 / 50);
        assert!(report.error.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn injected_failure_fails_the_rest_of_the_run() {
        let report = run(&config(200, 200, Some(2)), CancellationToken::new())
            .await
            .unwrap();

        assert!(report.writes.ok <= 50);
        assert_eq!(report.writes.ok + report.writes.failed, 200);
        assert_eq!(report.reads.failed, 200);
        assert_eq!(report.batches_sent, 2);
        assert!(matches!(report.error, Some(Error::Submit(_))));
    }

    #[tokio::test]
    async fn cancelled_run_reports_failures() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = run(&config(10, 2, None), cancel).await.unwrap();

        assert_eq!(report.writes.failed + report.reads.failed, 20);
        assert_eq!(report.batches_sent, 0);
        assert!(matches!(report.error, Some(Error::Cancelled)));
    }
}
