use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Per-worker outcome counters aggregated by the runner.
#[derive(Debug, Default, Clone)]
pub struct WorkerReport {
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl WorkerReport {
    pub fn succeeded() -> Self {
        Self {
            success: 1,
            ..Default::default()
        }
    }

    pub fn failed() -> Self {
        Self {
            failed: 1,
            ..Default::default()
        }
    }

    pub fn skipped() -> Self {
        Self {
            skipped: 1,
            ..Default::default()
        }
    }
}

/// One account's unit of work: a registration run or a farming loop.
///
/// Workers own everything they need (key, proxy rotator, store handle); the
/// runner only schedules them and observes the report.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Short account identifier used in log lines.
    fn account(&self) -> &str;

    /// Run to completion or until the token is cancelled.
    async fn run(&self, cancel: CancellationToken) -> Result<WorkerReport>;
}
