use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use microbatch::BatchConfig;

/// Runtime configuration for the `microbatch-loadgen` binary.
///
/// Every value can be given as a CLI flag or an environment variable (a `.env`
/// file is loaded first). Defaults mirror the library defaults so a bare run
/// shows how the engine behaves out of the box.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "microbatch-loadgen",
    version,
    about = "Drive a micro-batching worker with concurrent writes and keyed reads"
)]
pub struct CliArgs {
    /// Maximum number of items coalesced into one batch.
    ///
    /// Also the capacity of the worker's intake channel.
    ///
    /// Environment variable: `MAX_BATCH`
    #[arg(long, env = "MAX_BATCH", default_value_t = 50)]
    pub max_batch: usize,

    /// Flush window in milliseconds, measured from the first item of a batch.
    ///
    /// Environment variable: `WAIT_MS`
    #[arg(long, env = "WAIT_MS", default_value_t = 16)]
    pub wait_ms: u64,

    /// Number of keys written and then read back.
    ///
    /// Environment variable: `ITEMS`
    #[arg(long, env = "ITEMS", default_value_t = 250)]
    pub items: u64,

    /// Number of concurrent submitter tasks.
    ///
    /// Keys are spread round-robin across submitters; each submitter waits for
    /// its previous item before sending the next one.
    ///
    /// Environment variable: `CONCURRENCY`
    #[arg(long, env = "CONCURRENCY", default_value_t = 250)]
    pub concurrency: usize,

    /// Simulated executor round trip in microseconds.
    ///
    /// Environment variable: `LATENCY_US`
    #[arg(long, env = "LATENCY_US", default_value_t = 0)]
    pub latency_us: u64,

    /// Inject a submission failure on this batch (1-based).
    ///
    /// Useful to watch the worker latch its failure and reject the rest of
    /// the run.
    ///
    /// Environment variable: `FAIL_ON_BATCH`
    #[arg(long, env = "FAIL_ON_BATCH")]
    pub fail_on_batch: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub batch: BatchConfig,
    pub items: u64,
    pub concurrency: usize,
    pub latency: Duration,
    pub fail_on_batch: Option<usize>,
}

impl TryFrom<CliArgs> for LoadConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.items == 0 {
            bail!("ITEMS must be greater than 0");
        }

        if args.concurrency == 0 {
            bail!("CONCURRENCY must be greater than 0");
        }

        if args.fail_on_batch == Some(0) {
            bail!("FAIL_ON_BATCH is 1-based and must be greater than 0");
        }

        let batch = BatchConfig::new(args.max_batch, Duration::from_millis(args.wait_ms))?;

        Ok(Self {
            batch,
            items: args.items,
            concurrency: args.concurrency,
            latency: Duration::from_micros(args.latency_us),
            fail_on_batch: args.fail_on_batch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<LoadConfig> {
        let args = CliArgs::try_parse_from(
            core::iter::once("microbatch-loadgen").chain(args.iter().copied()),
        )?;
        LoadConfig::try_from(args)
    }

    #[test]
    fn explicit_flags_are_applied() {
        let config = parse(&[
            "--max-batch",
            "10",
            "--wait-ms",
            "5",
            "--items",
            "100",
            "--concurrency",
            "4",
            "--latency-us",
            "250",
            "--fail-on-batch",
            "3",
        ])
        .unwrap();
        assert_eq!(config.batch.max_batch, 10);
        assert_eq!(config.batch.wait, Duration::from_millis(5));
        assert_eq!(config.items, 100);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.latency, Duration::from_micros(250));
        assert_eq!(config.fail_on_batch, Some(3));
    }

    #[test]
    fn rejects_zero_wait() {
        let err = parse(&["--wait-ms", "0"]).unwrap_err();
        assert!(err.to_string().contains("wait"));
    }

    #[test]
    fn rejects_zero_max_batch() {
        let err = parse(&["--max-batch", "0"]).unwrap_err();
        assert!(err.to_string().contains("max_batch"));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = parse(&["--concurrency", "0"]).unwrap_err();
        assert!(err.to_string().contains("CONCURRENCY"));
    }

    #[test]
    fn rejects_zero_fail_on_batch() {
        let err = parse(&["--fail-on-batch", "0"]).unwrap_err();
        assert!(err.to_string().contains("FAIL_ON_BATCH"));
    }
}
