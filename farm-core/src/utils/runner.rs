use crate::config::DelayRange;
use crate::traits::{Worker, WorkerReport};
use crate::utils::retry::sleep_cancellable;
use anyhow::Result;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

pub struct WorkerRunner;

impl WorkerRunner {
    /// Runs workers with at most `concurrency` in flight, each after a
    /// random start delay drawn from `delay_range`. Ctrl+C cancels the whole
    /// batch cooperatively.
    pub async fn run_workers(
        workers: Vec<Box<dyn Worker>>,
        concurrency: usize,
        delay_range: DelayRange,
    ) -> Result<WorkerReport> {
        let token = CancellationToken::new();
        let signal_token = token.clone();

        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C. Initiating graceful shutdown...");
                    signal_token.cancel();
                }
                Err(err) => {
                    error!("Unable to listen for shutdown signal: {}", err);
                }
            }
        });

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let start_time = std::time::Instant::now();
        info!("Starting {} workers (pool size {})...", workers.len(), concurrency);

        let mut set = JoinSet::new();

        for (i, worker) in workers.into_iter().enumerate() {
            let id = i + 1;
            let span = tracing::info_span!(
                "worker",
                worker_id = format!("{:03}", id),
                account = worker.account()
            );
            let child_token = token.clone();
            let permits = semaphore.clone();

            let start_delay = if delay_range.max > delay_range.min {
                rand::thread_rng().gen_range(delay_range.min..=delay_range.max)
            } else {
                delay_range.min
            };

            set.spawn(
                async move {
                    let _permit = match permits.acquire().await {
                        Ok(p) => p,
                        Err(_) => return Ok(WorkerReport::default()),
                    };

                    if start_delay > 0 {
                        debug!("Start delay {}s", start_delay);
                        if !sleep_cancellable(Duration::from_secs(start_delay), &child_token).await
                        {
                            return Ok(WorkerReport::skipped());
                        }
                    }

                    match worker.run(child_token).await {
                        Ok(report) => Ok(report),
                        Err(e) => {
                            error!("Worker {} failed: {:?}", id, e);
                            Err(e)
                        }
                    }
                }
                .instrument(span),
            );
        }

        let mut totals = WorkerReport::default();

        while let Some(res) = set.join_next().await {
            match res {
                Ok(Ok(report)) => {
                    totals.success += report.success;
                    totals.failed += report.failed;
                    totals.skipped += report.skipped;
                }
                Ok(Err(_)) => {
                    // Already logged in the worker span.
                    totals.failed += 1;
                }
                Err(e) => {
                    error!("A worker task panicked or failed to join: {:?}", e);
                    totals.failed += 1;
                }
            }
        }

        let total_duration = start_time.elapsed();
        info!(
            "Batch complete in {:.1}s | Success: {} | Failed: {} | Skipped: {}",
            total_duration.as_secs_f64(),
            totals.success,
            totals.failed,
            totals.skipped
        );

        Ok(totals)
    }
}
