//! Sync run orchestration
//!
//! One orchestrator drives every sync type through the same page loop:
//! fetch, normalize, map, filter, upsert, heartbeat. Runs are single-flight
//! per type (exclusive for full runs) via the conditional insert in the sync
//! log repository, and every run ends in exactly one terminal status.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::inventory::{UpstreamItem, UpstreamOrder};
use crate::domain::sync_log::{
    ItemFailure, SyncLog, SyncRunStatus, SyncSummary, SyncType,
};
use crate::infrastructure::config::{upstream, SyncConfig};
use crate::infrastructure::{
    InventoryRepository, PageRequest, SyncLogRepository, UpstreamFetcher,
};
use crate::sync::field_map::{map_item, map_order, map_vendor};
use crate::sync::normalizer::{self, FlatRecord};
use crate::sync::upsert::{BatchOutcome, UpsertEngine};

/// Typed failures the trigger interface reports to callers
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("A conflicting sync is already running for {sync_type}")]
    AlreadyRunning { sync_type: SyncType },
    #[error("Sync failed: {message}")]
    Fatal { message: String },
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::Fatal {
            message: format!("{err:#}"),
        }
    }
}

/// One sync trigger, from the CLI or a library caller
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub sync_type: SyncType,
    /// Ignore any incremental anchor and walk the full upstream data set
    pub full_resync: bool,
    /// Delete local rows for the entity once the first page has landed
    pub replace_all: bool,
    /// Explicit incremental cutoff, overrides the derived one
    pub filter_since: Option<DateTime<Utc>>,
    /// Restrict inventory upserts to priority SKUs (new SKUs always pass)
    pub priority_only: bool,
    /// Fetch, map and partition but write nothing, not even a log row
    pub dry_run: bool,
}

impl SyncRequest {
    pub fn new(sync_type: SyncType) -> Self {
        Self {
            sync_type,
            full_resync: false,
            replace_all: false,
            filter_since: None,
            priority_only: false,
            dry_run: false,
        }
    }
}

/// Live and historical view of one sync type
#[derive(Debug, Clone)]
pub struct SyncStatusReport {
    pub sync_type: SyncType,
    pub running: Option<SyncLog>,
    pub last_terminal: Option<SyncLog>,
}

/// How one entity's page loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseOutcome {
    /// Ran to the final page
    Completed,
    /// A later page failed; remaining pages skipped
    Degraded,
    /// First page failed before any record was processed
    FailedFirstPage,
    /// Credentials rejected; the whole run must stop
    AuthRejected,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    pages: u32,
    inserted: u32,
    updated: u32,
    skipped: u32,
    failed: u32,
}

/// Cumulative run state shared by every phase of a run
#[derive(Debug, Default)]
struct RunState {
    counters: Counters,
    errors: Vec<ItemFailure>,
}

impl RunState {
    fn processed(&self) -> u32 {
        self.counters.inserted + self.counters.updated + self.counters.skipped
    }

    fn absorb_outcome(&mut self, outcome: BatchOutcome) {
        self.counters.inserted += outcome.inserted;
        self.counters.updated += outcome.updated;
        self.counters.skipped += outcome.skipped;
        self.counters.failed += outcome.failed.len() as u32;
        self.errors.extend(outcome.failed);
    }

    fn summary_since(&self, start: Counters, duration_ms: u64) -> SyncSummary {
        SyncSummary {
            pages_processed: self.counters.pages - start.pages,
            inserted: self.counters.inserted - start.inserted,
            updated: self.counters.updated - start.updated,
            skipped: self.counters.skipped - start.skipped,
            failed: self.counters.failed - start.failed,
            duration_ms,
        }
    }
}

pub struct SyncOrchestrator {
    fetcher: Arc<dyn UpstreamFetcher>,
    repository: InventoryRepository,
    sync_logs: SyncLogRepository,
    sync_config: SyncConfig,
    page_size: u32,
}

impl SyncOrchestrator {
    pub fn new(
        fetcher: Arc<dyn UpstreamFetcher>,
        repository: InventoryRepository,
        sync_logs: SyncLogRepository,
        sync_config: SyncConfig,
        page_size: u32,
    ) -> Self {
        Self {
            fetcher,
            repository,
            sync_logs,
            sync_config,
            page_size: page_size.max(1),
        }
    }

    /// Run one sync to a terminal status
    ///
    /// Returns the finished log row. Dry runs return a synthesized log that
    /// was never persisted.
    pub async fn run(&self, request: &SyncRequest) -> Result<SyncLog, SyncError> {
        match request.sync_type {
            SyncType::Full => self.run_full(request).await,
            _ => self.run_scoped(request).await,
        }
    }

    async fn run_scoped(&self, request: &SyncRequest) -> Result<SyncLog, SyncError> {
        let started = Utc::now();
        let clock = Instant::now();

        let log = if request.dry_run {
            None
        } else {
            match self.sync_logs.start_run(request.sync_type, started).await? {
                Some(log) => Some(log),
                None => {
                    return Err(SyncError::AlreadyRunning {
                        sync_type: request.sync_type,
                    })
                }
            }
        };
        let log_id = log.as_ref().map(|l| l.id.clone());
        let mut state = RunState::default();

        let cutoff = match self.resolve_cutoff(request).await {
            Ok(cutoff) => cutoff,
            Err(err) => {
                self.abort_run(log_id.as_deref(), &state, "startup", &format!("{err:#}"))
                    .await;
                return Err(err.into());
            }
        };

        info!(
            "🔄 Starting {} sync ({})",
            request.sync_type,
            describe_mode(request, cutoff)
        );

        let engine = UpsertEngine::new(
            self.repository.clone(),
            self.sync_config.batch_size,
            request.dry_run,
        );

        let outcome = match self
            .run_pages(
                request.sync_type,
                &engine,
                cutoff,
                request,
                log_id.as_deref(),
                &mut state,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                self.abort_run(log_id.as_deref(), &state, "engine", &err.to_string())
                    .await;
                return Err(err);
            }
        };

        let status = final_status(outcome == PhaseOutcome::AuthRejected, &state);
        let completed = Utc::now();
        let duration_ms = clock.elapsed().as_millis() as u64;

        if let Some(id) = &log_id {
            self.sync_logs
                .finalize_run(
                    id,
                    status,
                    state.processed(),
                    state.counters.inserted,
                    state.counters.updated,
                    state.counters.skipped,
                    &state.errors,
                    completed,
                )
                .await?;
        }

        let summary = state.summary_since(Counters::default(), duration_ms);
        log_run_end(request.sync_type, status, &summary);

        Ok(build_log(
            log_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            request.sync_type,
            status,
            &state,
            started,
            completed,
            duration_ms,
        ))
    }

    async fn run_full(&self, request: &SyncRequest) -> Result<SyncLog, SyncError> {
        let started = Utc::now();
        let clock = Instant::now();

        let log = if request.dry_run {
            None
        } else {
            match self.sync_logs.start_run(SyncType::Full, started).await? {
                Some(log) => Some(log),
                None => {
                    return Err(SyncError::AlreadyRunning {
                        sync_type: SyncType::Full,
                    })
                }
            }
        };
        let log_id = log.as_ref().map(|l| l.id.clone());
        let mut state = RunState::default();

        let cutoff = match self.resolve_cutoff(request).await {
            Ok(cutoff) => cutoff,
            Err(err) => {
                self.abort_run(log_id.as_deref(), &state, "startup", &format!("{err:#}"))
                    .await;
                return Err(err.into());
            }
        };

        info!(
            "🔄 Starting full sync ({})",
            describe_mode(request, cutoff)
        );

        let engine = UpsertEngine::new(
            self.repository.clone(),
            self.sync_config.batch_size,
            request.dry_run,
        );

        let mut total = SyncSummary {
            pages_processed: 0,
            inserted: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            duration_ms: 0,
        };
        let mut auth_rejected = false;

        for entity in [
            SyncType::Vendors,
            SyncType::Inventory,
            SyncType::PurchaseOrders,
        ] {
            let phase_start = state.counters;
            let phase_clock = Instant::now();

            let outcome = match self
                .run_pages(entity, &engine, cutoff, request, log_id.as_deref(), &mut state)
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.abort_run(log_id.as_deref(), &state, "engine", &err.to_string())
                        .await;
                    return Err(err);
                }
            };

            let phase_summary =
                state.summary_since(phase_start, phase_clock.elapsed().as_millis() as u64);
            info!(
                "📦 Full sync phase {} done: {} inserted, {} updated, {} skipped, {} failed",
                entity,
                phase_summary.inserted,
                phase_summary.updated,
                phase_summary.skipped,
                phase_summary.failed
            );
            total.absorb(&phase_summary);

            if outcome == PhaseOutcome::AuthRejected {
                auth_rejected = true;
                break;
            }
        }
        total.duration_ms = clock.elapsed().as_millis() as u64;

        let status = final_status(auth_rejected, &state);
        let completed = Utc::now();

        if let Some(id) = &log_id {
            self.sync_logs
                .finalize_run(
                    id,
                    status,
                    state.processed(),
                    state.counters.inserted,
                    state.counters.updated,
                    state.counters.skipped,
                    &state.errors,
                    completed,
                )
                .await?;
        }

        log_run_end(SyncType::Full, status, &total);

        Ok(build_log(
            log_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            SyncType::Full,
            status,
            &state,
            started,
            completed,
            total.duration_ms,
        ))
    }

    /// Walk one entity's pages until exhausted or the taxonomy says stop
    async fn run_pages(
        &self,
        entity: SyncType,
        engine: &UpsertEngine,
        cutoff: Option<DateTime<Utc>>,
        request: &SyncRequest,
        log_id: Option<&str>,
        state: &mut RunState,
    ) -> Result<PhaseOutcome, SyncError> {
        let resource = self.resource_for(entity);
        let replace_all = request.replace_all && !request.dry_run;

        let priority_skus: Option<HashSet<String>> =
            if request.priority_only && entity == SyncType::Inventory {
                Some(self.repository.get_priority_skus().await.map_err(SyncError::from)?)
            } else {
                None
            };

        let mut offset: u32 = 0;
        let mut replaced = false;

        loop {
            let page_index = offset / self.page_size;
            let page_request = PageRequest {
                limit: self.page_size,
                offset,
                updated_since: cutoff,
            };

            let raw = match self.fetcher.fetch_page(resource, &page_request).await {
                Ok(raw) => raw,
                Err(err) => {
                    if err.is_auth() {
                        error!("❌ Upstream rejected credentials during {} sync: {}", entity, err);
                        state.errors.push(page_failure(entity, page_index, &err.to_string()));
                        return Ok(PhaseOutcome::AuthRejected);
                    }
                    return Ok(classify_page_failure(entity, state, page_index, &err.to_string()));
                }
            };

            let records = match normalizer::normalize(&raw.body) {
                Ok(records) => records,
                Err(err) => {
                    return Ok(classify_page_failure(entity, state, page_index, &err.to_string()));
                }
            };
            state.counters.pages += 1;
            debug!(
                "📄 {} page {}: {} records",
                entity,
                page_index,
                records.len()
            );

            // The delete is deferred until upstream has proven it can answer,
            // so a dead endpoint can never wipe the local mirror.
            if replace_all && !replaced {
                let deleted = self.delete_entity_rows(entity).await.map_err(SyncError::from)?;
                warn!(
                    "⚠️ Replace-all: deleted {} local {} rows, repopulating from upstream",
                    deleted, entity
                );
                replaced = true;
            }

            if records.is_empty() {
                break;
            }
            let page_len = records.len();

            match self
                .process_page(entity, records, engine, priority_skus.as_ref(), request.dry_run)
                .await
            {
                Ok(outcome) => state.absorb_outcome(outcome),
                Err(err) => {
                    return Ok(classify_page_failure(entity, state, page_index, &format!("{err:#}")));
                }
            }

            if let Some(id) = log_id {
                if let Err(err) = self
                    .sync_logs
                    .update_progress(
                        id,
                        state.processed(),
                        state.counters.inserted,
                        state.counters.updated,
                        state.counters.skipped,
                        &state.errors,
                        Utc::now(),
                    )
                    .await
                {
                    warn!("⚠️ Could not write sync progress: {err:#}");
                }
            }

            if page_len < self.page_size as usize {
                break;
            }
            offset += self.page_size;
        }

        Ok(PhaseOutcome::Completed)
    }

    /// Map, reconcile and upsert one page of records
    async fn process_page(
        &self,
        entity: SyncType,
        records: Vec<FlatRecord>,
        engine: &UpsertEngine,
        priority_skus: Option<&HashSet<String>>,
        dry_run: bool,
    ) -> anyhow::Result<BatchOutcome> {
        let now = Utc::now();

        match entity {
            SyncType::Inventory => {
                let mapped: Vec<UpstreamItem> = records.iter().map(map_item).collect();
                let filtered = self.apply_priority_filter(mapped, priority_skus).await?;

                if !dry_run {
                    self.ensure_item_vendors(&filtered, now).await?;
                }
                engine.upsert_items(&filtered, now).await
            }
            SyncType::Vendors => {
                let mapped: Vec<_> = records.iter().map(map_vendor).collect();
                engine.upsert_vendors(&mapped, now).await
            }
            SyncType::PurchaseOrders => {
                let mapped: Vec<UpstreamOrder> = records.iter().map(map_order).collect();
                let mut linked = Vec::with_capacity(mapped.len());
                for order in mapped {
                    let vendor_id = match (&order.vendor_name, dry_run) {
                        (Some(name), false) => {
                            Some(self.repository.ensure_vendor_for_name(name, now).await?)
                        }
                        _ => None,
                    };
                    linked.push((order, vendor_id));
                }
                engine.upsert_orders(&linked, now).await
            }
            SyncType::Full => unreachable!("full runs drive scoped entities"),
        }
    }

    /// Drop non-priority records; SKUs unknown to the local store always pass
    async fn apply_priority_filter(
        &self,
        mapped: Vec<UpstreamItem>,
        priority_skus: Option<&HashSet<String>>,
    ) -> anyhow::Result<Vec<UpstreamItem>> {
        let Some(priority) = priority_skus else {
            return Ok(mapped);
        };

        let keys: Vec<String> = mapped
            .iter()
            .filter(|item| !item.sku.is_empty())
            .map(|item| item.sku.clone())
            .collect();
        let known = self.repository.get_content_hashes(&keys).await?;

        let before = mapped.len();
        let kept: Vec<UpstreamItem> = mapped
            .into_iter()
            .filter(|item| {
                item.sku.is_empty()
                    || priority.contains(&item.sku)
                    || !known.contains_key(&item.sku)
            })
            .collect();
        debug!(
            "Priority filter kept {} of {} records on this page",
            kept.len(),
            before
        );
        Ok(kept)
    }

    /// Make sure every vendor named by an item page exists in the vendor table
    async fn ensure_item_vendors(
        &self,
        items: &[UpstreamItem],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut names: Vec<&str> = items
            .iter()
            .filter_map(|item| item.vendor.as_deref())
            .collect();
        names.sort_unstable();
        names.dedup();

        for name in names {
            self.repository.ensure_vendor_for_name(name, now).await?;
        }
        Ok(())
    }

    async fn delete_entity_rows(&self, entity: SyncType) -> anyhow::Result<u64> {
        match entity {
            SyncType::Inventory => self.repository.delete_all_items().await,
            SyncType::Vendors => self.repository.delete_all_vendors().await,
            SyncType::PurchaseOrders => self.repository.delete_all_orders().await,
            SyncType::Full => unreachable!("full runs drive scoped entities"),
        }
    }

    /// Incremental cutoff: explicit filter wins, else the previous successful
    /// run's start time; full resyncs scan everything
    async fn resolve_cutoff(&self, request: &SyncRequest) -> anyhow::Result<Option<DateTime<Utc>>> {
        if request.full_resync || request.replace_all {
            return Ok(None);
        }
        if let Some(since) = request.filter_since {
            return Ok(Some(since));
        }

        Ok(self
            .sync_logs
            .get_latest_success(request.sync_type)
            .await?
            .map(|log| log.started_at))
    }

    /// Best-effort error finalize for a run that cannot continue, keeping
    /// whatever counters it accumulated before dying
    async fn abort_run(
        &self,
        log_id: Option<&str>,
        state: &RunState,
        identifier: &str,
        message: &str,
    ) {
        let Some(id) = log_id else { return };
        let mut errors = state.errors.clone();
        errors.push(ItemFailure {
            identifier: identifier.to_string(),
            message: message.to_string(),
        });
        if let Err(finalize_err) = self
            .sync_logs
            .finalize_run(
                id,
                SyncRunStatus::Error,
                state.processed(),
                state.counters.inserted,
                state.counters.updated,
                state.counters.skipped,
                &errors,
                Utc::now(),
            )
            .await
        {
            warn!("⚠️ Could not finalize aborted run {}: {finalize_err:#}", id);
        }
    }

    fn resource_for(&self, entity: SyncType) -> &str {
        match entity {
            SyncType::Inventory => &self.sync_config.inventory_resource,
            SyncType::Vendors => upstream::RESOURCE_PARTY,
            SyncType::PurchaseOrders => upstream::RESOURCE_ORDER,
            SyncType::Full => unreachable!("full runs drive scoped entities"),
        }
    }

    // ===============================
    // STATUS SURFACE
    // ===============================

    /// Current running log (live counters) plus the latest terminal log
    pub async fn sync_status(&self, sync_type: SyncType) -> anyhow::Result<SyncStatusReport> {
        Ok(SyncStatusReport {
            sync_type,
            running: self.sync_logs.get_running_run(sync_type).await?,
            last_terminal: self.sync_logs.get_latest_terminal_run(sync_type).await?,
        })
    }

    /// Most recent run history across all types
    pub async fn recent_logs(&self, limit: u32) -> anyhow::Result<Vec<SyncLog>> {
        self.sync_logs.get_recent_logs(limit).await
    }
}

fn page_failure(entity: SyncType, page: u32, message: &str) -> ItemFailure {
    ItemFailure {
        identifier: format!("{}:page[{}]", entity, page),
        message: message.to_string(),
    }
}

/// Classify a failed page: fatal on the first page, degraded afterwards
fn classify_page_failure(
    entity: SyncType,
    state: &mut RunState,
    page_index: u32,
    message: &str,
) -> PhaseOutcome {
    state.errors.push(page_failure(entity, page_index, message));

    if page_index == 0 {
        error!("❌ {} sync failed on its first page: {}", entity, message);
        PhaseOutcome::FailedFirstPage
    } else {
        warn!(
            "⚠️ {} sync degraded at page {}, skipping the rest: {}",
            entity, page_index, message
        );
        PhaseOutcome::Degraded
    }
}

/// Credential failures are always errors, clean runs are successes, and
/// anything else depends on whether the run made useful progress
fn final_status(auth_rejected: bool, state: &RunState) -> SyncRunStatus {
    if auth_rejected {
        return SyncRunStatus::Error;
    }
    if state.errors.is_empty() {
        return SyncRunStatus::Success;
    }
    if state.processed() > 0 {
        SyncRunStatus::Partial
    } else {
        SyncRunStatus::Error
    }
}

fn build_log(
    id: String,
    sync_type: SyncType,
    status: SyncRunStatus,
    state: &RunState,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    duration_ms: u64,
) -> SyncLog {
    SyncLog {
        id,
        sync_type,
        status,
        items_processed: state.processed(),
        items_inserted: state.counters.inserted,
        items_updated: state.counters.updated,
        items_skipped: state.counters.skipped,
        errors: state.errors.clone(),
        duration_ms: Some(duration_ms),
        started_at,
        heartbeat_at: completed_at,
        completed_at: Some(completed_at),
    }
}

fn describe_mode(request: &SyncRequest, cutoff: Option<DateTime<Utc>>) -> String {
    let mut parts: Vec<String> = Vec::new();
    match cutoff {
        Some(since) => parts.push(format!(
            "incremental since {}",
            since.to_rfc3339_opts(SecondsFormat::Secs, true)
        )),
        None => parts.push("full scan".to_string()),
    }
    if request.replace_all {
        parts.push("replace-all".to_string());
    }
    if request.priority_only {
        parts.push("priority only".to_string());
    }
    if request.dry_run {
        parts.push("dry run".to_string());
    }
    parts.join(", ")
}

fn log_run_end(sync_type: SyncType, status: SyncRunStatus, summary: &SyncSummary) {
    match status {
        SyncRunStatus::Success => info!(
            "✅ {} sync succeeded: {} pages, {} inserted, {} updated, {} skipped in {}ms",
            sync_type,
            summary.pages_processed,
            summary.inserted,
            summary.updated,
            summary.skipped,
            summary.duration_ms
        ),
        SyncRunStatus::Partial => warn!(
            "⚠️ {} sync partial: {} pages, {} inserted, {} updated, {} skipped, {} failed in {}ms",
            sync_type,
            summary.pages_processed,
            summary.inserted,
            summary.updated,
            summary.skipped,
            summary.failed,
            summary.duration_ms
        ),
        _ => error!(
            "❌ {} sync failed after {} pages in {}ms",
            sync_type, summary.pages_processed, summary.duration_ms
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(processed: u32, errors: usize) -> RunState {
        let mut state = RunState::default();
        state.counters.inserted = processed;
        state.errors = (0..errors)
            .map(|i| ItemFailure {
                identifier: format!("record[{i}]"),
                message: "boom".to_string(),
            })
            .collect();
        state
    }

    #[test]
    fn clean_run_is_success() {
        assert_eq!(final_status(false, &state_with(10, 0)), SyncRunStatus::Success);
        assert_eq!(final_status(false, &state_with(0, 0)), SyncRunStatus::Success);
    }

    #[test]
    fn progress_with_errors_is_partial() {
        assert_eq!(final_status(false, &state_with(10, 2)), SyncRunStatus::Partial);
    }

    #[test]
    fn errors_without_progress_are_fatal() {
        assert_eq!(final_status(false, &state_with(0, 1)), SyncRunStatus::Error);
    }

    #[test]
    fn auth_rejection_is_fatal_even_with_progress() {
        assert_eq!(final_status(true, &state_with(500, 1)), SyncRunStatus::Error);
    }

    #[test]
    fn mode_description_names_the_active_options() {
        let mut request = SyncRequest::new(SyncType::Inventory);
        request.priority_only = true;
        request.dry_run = true;

        let described = describe_mode(&request, None);
        assert!(described.contains("full scan"));
        assert!(described.contains("priority only"));
        assert!(described.contains("dry run"));

        let cutoff = "2024-03-01T00:00:00Z".parse().ok();
        assert!(describe_mode(&SyncRequest::new(SyncType::Inventory), cutoff)
            .contains("incremental since 2024-03-01"));
    }
}
