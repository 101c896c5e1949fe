//! Stale-run watchdog
//!
//! A run that dies without finalizing leaves its `running` row behind, which
//! would block single-flight forever. The watchdog sweeps for rows whose
//! heartbeat went silent past the threshold and force-transitions them to
//! `error`.

use chrono::{Duration, Utc};
use std::time::Duration as StdDuration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::infrastructure::SyncLogRepository;

pub struct Watchdog {
    sync_logs: SyncLogRepository,
    threshold_seconds: i64,
    interval_seconds: u64,
}

impl Watchdog {
    pub fn new(sync_logs: SyncLogRepository, threshold_seconds: i64, interval_seconds: u64) -> Self {
        Self {
            sync_logs,
            threshold_seconds: threshold_seconds.max(1),
            interval_seconds: interval_seconds.max(1),
        }
    }

    /// One sweep over the running rows; returns how many were expired
    pub async fn sweep(&self) -> anyhow::Result<usize> {
        let expired = self
            .sync_logs
            .expire_stale_runs(Duration::seconds(self.threshold_seconds), Utc::now())
            .await?;

        if expired.is_empty() {
            debug!("Watchdog sweep: all running syncs are healthy");
        }
        Ok(expired.len())
    }

    /// Sweep on an interval until the token is cancelled
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(
            "🔄 Watchdog started (interval {}s, stale threshold {}s)",
            self.interval_seconds, self.threshold_seconds
        );

        let mut interval = tokio::time::interval(StdDuration::from_secs(self.interval_seconds));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("✅ Watchdog stopped");
                    return Ok(());
                }
                _ = interval.tick() => {
                    match self.sweep().await {
                        Ok(0) => {}
                        Ok(count) => info!("⚠️ Watchdog expired {} stale sync run(s)", count),
                        Err(err) => warn!("⚠️ Watchdog sweep failed: {err:#}"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sync_log::SyncType;
    use crate::infrastructure::DatabaseConnection;
    use tempfile::tempdir;

    async fn setup() -> (SyncLogRepository, tempfile::TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let database_url = format!("sqlite://{}", db_path.display());

        let db = DatabaseConnection::new(&database_url)
            .await
            .expect("Failed to create database connection");
        db.migrate().await.expect("Failed to run migrations");

        (SyncLogRepository::new(db.pool().clone()), temp_dir)
    }

    #[tokio::test]
    async fn test_sweep_expires_only_stale_runs() {
        let (sync_logs, _guard) = setup().await;

        sync_logs
            .start_run(SyncType::Inventory, Utc::now() - Duration::hours(1))
            .await
            .expect("start")
            .expect("row");
        sync_logs
            .start_run(SyncType::Vendors, Utc::now())
            .await
            .expect("start")
            .expect("row");

        let watchdog = Watchdog::new(sync_logs.clone(), 600, 60);
        assert_eq!(watchdog.sweep().await.expect("sweep"), 1);

        // A second sweep finds nothing left to expire
        assert_eq!(watchdog.sweep().await.expect("sweep"), 0);
        println!("✅ Watchdog sweep expired exactly the stale run");
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_cancellation() {
        let (sync_logs, _guard) = setup().await;
        let watchdog = Watchdog::new(sync_logs, 600, 3600);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { watchdog.run(shutdown).await }
        });

        shutdown.cancel();
        let result = tokio::time::timeout(StdDuration::from_secs(5), handle)
            .await
            .expect("watchdog should stop promptly")
            .expect("task should not panic");
        assert!(result.is_ok());
        println!("✅ Watchdog honored the cancellation token");
    }
}
