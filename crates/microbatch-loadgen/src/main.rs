mod load;

use clap::Parser;
use load::config::{CliArgs, LoadConfig};
use load::driver::run;
use load::telemetry::init_telemetry;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = LoadConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let report = run(&config, cancel).await?;

    tracing::info!(
        batches = report.batches_sent,
        completed = report.items_completed(),
        elapsed_ms = report.elapsed_ms,
        "Run finished"
    );
    if let Some(e) = &report.error {
        tracing::warn!("Worker stopped early: {e}");
    }
    if report.reads.mismatched > 0 {
        anyhow::bail!("{} reads returned another key's row", report.reads.mismatched);
    }

    Ok(())
}

fn log_startup_info(config: &LoadConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting load run with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting load run: {} items, {} submitters, max_batch {}, wait {:?}",
            config.items,
            config.concurrency,
            config.batch.max_batch,
            config.batch.wait
        );
    }
}

/// Cancels the run on Ctrl+C or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
        () = cancel.cancelled() => return,
    }

    tracing::info!("Shutdown signal received, cancelling the batch worker...");
    cancel.cancel();
}
