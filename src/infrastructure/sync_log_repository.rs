//! Repository for sync run logs
//!
//! Owns the single-flight guarantee: a run only starts when the conditional
//! insert of its `running` row lands, and every terminal transition is gated
//! on the row still being `running` so a finished or expired run is never
//! finalized twice.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::domain::sync_log::{ItemFailure, SyncLog, SyncRunStatus, SyncType};

/// Repository over the sync_logs table
#[derive(Clone)]
pub struct SyncLogRepository {
    pool: Arc<SqlitePool>,
}

impl SyncLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    // ===============================
    // RUN LIFECYCLE
    // ===============================

    /// Try to start a run of the given type
    ///
    /// The insert only lands when no conflicting `running` row exists: same
    /// type or a full run for scoped types, any run at all for a full run.
    /// Returns `None` when another run holds the slot.
    pub async fn start_run(
        &self,
        sync_type: SyncType,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncLog>> {
        let id = Uuid::new_v4().to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO sync_logs
            (id, sync_type, status, items_processed, items_inserted, items_updated,
             items_skipped, errors, started_at, heartbeat_at)
            SELECT ?, ?, 'running', 0, 0, 0, 0, '[]', ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM sync_logs
                WHERE status = 'running'
                  AND (sync_type = ? OR sync_type = 'full' OR ? = 'full')
            )
            "#,
        )
        .bind(&id)
        .bind(sync_type)
        .bind(now)
        .bind(now)
        .bind(sync_type)
        .bind(sync_type)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(SyncLog {
            id,
            sync_type,
            status: SyncRunStatus::Running,
            items_processed: 0,
            items_inserted: 0,
            items_updated: 0,
            items_skipped: 0,
            errors: Vec::new(),
            duration_ms: None,
            started_at: now,
            heartbeat_at: now,
            completed_at: None,
        }))
    }

    /// Refresh a running row with live counters and a new heartbeat
    pub async fn update_progress(
        &self,
        id: &str,
        processed: u32,
        inserted: u32,
        updated: u32,
        skipped: u32,
        errors: &[ItemFailure],
        heartbeat_at: DateTime<Utc>,
    ) -> Result<()> {
        let errors_json = serde_json::to_string(errors)?;

        sqlx::query(
            r#"
            UPDATE sync_logs
            SET items_processed = ?, items_inserted = ?, items_updated = ?,
                items_skipped = ?, errors = ?, heartbeat_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(processed as i64)
        .bind(inserted as i64)
        .bind(updated as i64)
        .bind(skipped as i64)
        .bind(errors_json)
        .bind(heartbeat_at)
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Move a running row to a terminal status
    ///
    /// Returns false when the row was no longer `running`, which happens when
    /// the watchdog expired it first.
    #[allow(clippy::too_many_arguments)]
    pub async fn finalize_run(
        &self,
        id: &str,
        status: SyncRunStatus,
        processed: u32,
        inserted: u32,
        updated: u32,
        skipped: u32,
        errors: &[ItemFailure],
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let errors_json = serde_json::to_string(errors)?;

        let result = sqlx::query(
            r#"
            UPDATE sync_logs
            SET status = ?, items_processed = ?, items_inserted = ?, items_updated = ?,
                items_skipped = ?, errors = ?, completed_at = ?,
                duration_ms = CAST((julianday(?) - julianday(started_at)) * 86400000 AS INTEGER)
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(status)
        .bind(processed as i64)
        .bind(inserted as i64)
        .bind(updated as i64)
        .bind(skipped as i64)
        .bind(errors_json)
        .bind(completed_at)
        .bind(completed_at)
        .bind(id)
        .execute(&*self.pool)
        .await?;

        let finalized = result.rows_affected() > 0;
        if !finalized {
            warn!("⚠️ Sync log {} was already terminal, skipping finalize", id);
        }
        Ok(finalized)
    }

    // ===============================
    // QUERIES
    // ===============================

    /// Get one log by id
    pub async fn get_log_by_id(&self, id: &str) -> Result<Option<SyncLog>> {
        let row = sqlx::query("SELECT * FROM sync_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        row.map(|row| map_log_row(&row)).transpose()
    }

    /// All currently running rows, oldest first
    pub async fn get_running_runs(&self) -> Result<Vec<SyncLog>> {
        let rows =
            sqlx::query("SELECT * FROM sync_logs WHERE status = 'running' ORDER BY started_at ASC")
                .fetch_all(&*self.pool)
                .await?;

        rows.iter().map(map_log_row).collect()
    }

    /// Currently running row for one type, if any
    pub async fn get_running_run(&self, sync_type: SyncType) -> Result<Option<SyncLog>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM sync_logs
            WHERE status = 'running' AND sync_type = ?
            ORDER BY started_at DESC LIMIT 1
            "#,
        )
        .bind(sync_type)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(|row| map_log_row(&row)).transpose()
    }

    /// Most recent terminal run for one type
    pub async fn get_latest_terminal_run(&self, sync_type: SyncType) -> Result<Option<SyncLog>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM sync_logs
            WHERE sync_type = ? AND status != 'running'
            ORDER BY started_at DESC LIMIT 1
            "#,
        )
        .bind(sync_type)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(|row| map_log_row(&row)).transpose()
    }

    /// Most recent fully successful run for one type
    ///
    /// Partial runs do not count: an incremental sync anchored on a partial
    /// run could skip records its failed pages never delivered.
    pub async fn get_latest_success(&self, sync_type: SyncType) -> Result<Option<SyncLog>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM sync_logs
            WHERE sync_type = ? AND status = 'success'
            ORDER BY started_at DESC LIMIT 1
            "#,
        )
        .bind(sync_type)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(|row| map_log_row(&row)).transpose()
    }

    /// Most recent runs across all types, newest first
    pub async fn get_recent_logs(&self, limit: u32) -> Result<Vec<SyncLog>> {
        let rows = sqlx::query("SELECT * FROM sync_logs ORDER BY started_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&*self.pool)
            .await?;

        rows.iter().map(map_log_row).collect()
    }

    // ===============================
    // WATCHDOG
    // ===============================

    /// Expire running rows whose heartbeat is older than the threshold
    ///
    /// Each stale row moves to `error` with a failure entry naming the
    /// staleness. Returns the rows that were expired.
    pub async fn expire_stale_runs(
        &self,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<SyncLog>> {
        let cutoff = now - threshold;
        let running = self.get_running_runs().await?;

        let mut expired = Vec::new();
        for log in running {
            if log.heartbeat_at >= cutoff {
                continue;
            }

            let staleness_secs = (now - log.heartbeat_at).num_seconds();
            let mut errors = log.errors.clone();
            errors.push(ItemFailure {
                identifier: "watchdog".to_string(),
                message: format!(
                    "Run marked stale: no heartbeat for {}s (threshold {}s)",
                    staleness_secs,
                    threshold.num_seconds()
                ),
            });

            let finalized = self
                .finalize_run(
                    &log.id,
                    SyncRunStatus::Error,
                    log.items_processed,
                    log.items_inserted,
                    log.items_updated,
                    log.items_skipped,
                    &errors,
                    now,
                )
                .await?;

            if finalized {
                warn!(
                    "⚠️ Watchdog expired stale {} run {} ({}s without heartbeat)",
                    log.sync_type, log.id, staleness_secs
                );
                expired.push(SyncLog {
                    status: SyncRunStatus::Error,
                    errors,
                    completed_at: Some(now),
                    ..log
                });
            }
        }

        Ok(expired)
    }
}

fn map_log_row(row: &SqliteRow) -> Result<SyncLog> {
    let errors_json: String = row.get("errors");
    let errors: Vec<ItemFailure> = serde_json::from_str(&errors_json).unwrap_or_default();

    Ok(SyncLog {
        id: row.get("id"),
        sync_type: row.get("sync_type"),
        status: row.get("status"),
        items_processed: row.get::<i64, _>("items_processed") as u32,
        items_inserted: row.get::<i64, _>("items_inserted") as u32,
        items_updated: row.get::<i64, _>("items_updated") as u32,
        items_skipped: row.get::<i64, _>("items_skipped") as u32,
        errors,
        duration_ms: row.get::<Option<i64>, _>("duration_ms").map(|ms| ms as u64),
        started_at: row.get("started_at"),
        heartbeat_at: row.get("heartbeat_at"),
        completed_at: row.get("completed_at"),
    })
}
