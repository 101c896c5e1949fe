//! Hash-gated batched upserts
//!
//! The engine takes mapped records, reads the stored fingerprints for each
//! bounded batch, and only writes rows whose content actually changed. A
//! failing batch transaction is replayed record by record so one poison
//! record cannot take its whole batch down with it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::inventory::{UpstreamItem, UpstreamOrder, UpstreamVendor};
use crate::domain::sync_log::ItemFailure;
use crate::infrastructure::InventoryRepository;
use crate::sync::change_detector::content_hash;

const MISSING_KEY_MESSAGE: &str = "Record has no usable natural key";

/// Counters for one page worth of upserts
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub inserted: u32,
    pub updated: u32,
    pub skipped: u32,
    pub failed: Vec<ItemFailure>,
}

impl BatchOutcome {
    pub fn processed(&self) -> u32 {
        self.inserted + self.updated + self.skipped
    }
}

/// Batched, change-aware writer over the inventory repository
#[derive(Clone)]
pub struct UpsertEngine {
    repository: InventoryRepository,
    batch_size: usize,
    dry_run: bool,
}

impl UpsertEngine {
    pub fn new(repository: InventoryRepository, batch_size: usize, dry_run: bool) -> Self {
        Self {
            repository,
            // chunks() panics on zero
            batch_size: batch_size.max(1),
            dry_run,
        }
    }

    /// Upsert inventory items keyed on `sku`
    ///
    /// Unchanged rows only get their `last_synced_at` stamped. Keyless
    /// records are captured as failures under their page position.
    pub async fn upsert_items(
        &self,
        records: &[UpstreamItem],
        now: DateTime<Utc>,
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for (chunk_idx, chunk) in records.chunks(self.batch_size).enumerate() {
            let base = chunk_idx * self.batch_size;

            let mut keyed: Vec<(&UpstreamItem, String)> = Vec::with_capacity(chunk.len());
            for (offset, item) in chunk.iter().enumerate() {
                if item.sku.is_empty() {
                    outcome.failed.push(ItemFailure {
                        identifier: format!("record[{}]", base + offset),
                        message: MISSING_KEY_MESSAGE.to_string(),
                    });
                    continue;
                }
                keyed.push((item, content_hash(item)));
            }

            let keys: Vec<String> = keyed.iter().map(|(item, _)| item.sku.clone()).collect();
            let stored = self.repository.get_content_hashes(&keys).await?;

            let mut unchanged: Vec<String> = Vec::new();
            let mut writes: Vec<(UpstreamItem, String, bool)> = Vec::new();
            for (item, hash) in keyed {
                match stored.get(&item.sku) {
                    Some(stored_hash) if *stored_hash == hash => unchanged.push(item.sku.clone()),
                    Some(_) => writes.push((item.clone(), hash, true)),
                    None => writes.push((item.clone(), hash, false)),
                }
            }

            outcome.skipped += unchanged.len() as u32;
            let new_count = writes.iter().filter(|(_, _, existed)| !existed).count() as u32;
            let changed_count = writes.len() as u32 - new_count;

            if self.dry_run {
                outcome.inserted += new_count;
                outcome.updated += changed_count;
                continue;
            }

            if !unchanged.is_empty() {
                self.repository.stamp_last_synced(&unchanged, now).await?;
            }
            if writes.is_empty() {
                continue;
            }

            let batch: Vec<(UpstreamItem, String)> = writes
                .iter()
                .map(|(item, hash, _)| (item.clone(), hash.clone()))
                .collect();

            match self.repository.upsert_item_batch(&batch, now).await {
                Ok(()) => {
                    outcome.inserted += new_count;
                    outcome.updated += changed_count;
                }
                Err(batch_err) => {
                    warn!(
                        "⚠️ Item batch of {} failed ({}), replaying record by record",
                        batch.len(),
                        batch_err
                    );
                    for (item, hash, existed) in &writes {
                        match self.repository.upsert_item(item, hash, now).await {
                            Ok(()) => {
                                if *existed {
                                    outcome.updated += 1;
                                } else {
                                    outcome.inserted += 1;
                                }
                            }
                            Err(err) => outcome.failed.push(ItemFailure {
                                identifier: item.sku.clone(),
                                message: err.to_string(),
                            }),
                        }
                    }
                }
            }
        }

        debug!(
            "Item upsert: {} inserted, {} updated, {} skipped, {} failed",
            outcome.inserted,
            outcome.updated,
            outcome.skipped,
            outcome.failed.len()
        );
        Ok(outcome)
    }

    /// Upsert vendors keyed on `upstream_vendor_id`
    pub async fn upsert_vendors(
        &self,
        records: &[UpstreamVendor],
        now: DateTime<Utc>,
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for (chunk_idx, chunk) in records.chunks(self.batch_size).enumerate() {
            let base = chunk_idx * self.batch_size;

            let mut keyed: Vec<&UpstreamVendor> = Vec::with_capacity(chunk.len());
            for (offset, vendor) in chunk.iter().enumerate() {
                if vendor.upstream_vendor_id.is_empty() {
                    outcome.failed.push(ItemFailure {
                        identifier: format!("record[{}]", base + offset),
                        message: MISSING_KEY_MESSAGE.to_string(),
                    });
                    continue;
                }
                keyed.push(vendor);
            }

            let keys: Vec<String> = keyed
                .iter()
                .map(|v| v.upstream_vendor_id.clone())
                .collect();
            let stored = self.repository.get_vendors_by_upstream_ids(&keys).await?;

            let mut writes: Vec<(UpstreamVendor, bool)> = Vec::new();
            for vendor in keyed {
                match stored.get(&vendor.upstream_vendor_id) {
                    Some(existing) if content_hash(existing) == content_hash(vendor) => {
                        outcome.skipped += 1;
                    }
                    Some(_) => writes.push((vendor.clone(), true)),
                    None => writes.push((vendor.clone(), false)),
                }
            }

            let new_count = writes.iter().filter(|(_, existed)| !existed).count() as u32;
            let changed_count = writes.len() as u32 - new_count;

            if self.dry_run {
                outcome.inserted += new_count;
                outcome.updated += changed_count;
                continue;
            }
            if writes.is_empty() {
                continue;
            }

            let batch: Vec<UpstreamVendor> = writes.iter().map(|(v, _)| v.clone()).collect();
            match self.repository.upsert_vendor_batch(&batch, now).await {
                Ok(()) => {
                    outcome.inserted += new_count;
                    outcome.updated += changed_count;
                }
                Err(batch_err) => {
                    warn!(
                        "⚠️ Vendor batch of {} failed ({}), replaying record by record",
                        batch.len(),
                        batch_err
                    );
                    for (vendor, existed) in &writes {
                        match self.repository.upsert_vendor(vendor, now).await {
                            Ok(()) => {
                                if *existed {
                                    outcome.updated += 1;
                                } else {
                                    outcome.inserted += 1;
                                }
                            }
                            Err(err) => outcome.failed.push(ItemFailure {
                                identifier: vendor.upstream_vendor_id.clone(),
                                message: err.to_string(),
                            }),
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Upsert purchase orders keyed on `upstream_order_id`
    ///
    /// Vendor links are resolved by the caller before the write so the whole
    /// batch shares one reconciliation pass.
    pub async fn upsert_orders(
        &self,
        records: &[(UpstreamOrder, Option<i64>)],
        now: DateTime<Utc>,
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for (chunk_idx, chunk) in records.chunks(self.batch_size).enumerate() {
            let base = chunk_idx * self.batch_size;

            let mut keyed: Vec<(&UpstreamOrder, Option<i64>)> = Vec::with_capacity(chunk.len());
            for (offset, (order, vendor_id)) in chunk.iter().enumerate() {
                if order.upstream_order_id.is_empty() {
                    outcome.failed.push(ItemFailure {
                        identifier: format!("record[{}]", base + offset),
                        message: MISSING_KEY_MESSAGE.to_string(),
                    });
                    continue;
                }
                keyed.push((order, *vendor_id));
            }

            let keys: Vec<String> = keyed
                .iter()
                .map(|(o, _)| o.upstream_order_id.clone())
                .collect();
            let stored = self.repository.get_orders_by_upstream_ids(&keys).await?;

            let mut writes: Vec<(UpstreamOrder, Option<i64>, bool)> = Vec::new();
            for (order, vendor_id) in keyed {
                match stored.get(&order.upstream_order_id) {
                    Some(existing) if content_hash(existing) == content_hash(order) => {
                        outcome.skipped += 1;
                    }
                    Some(_) => writes.push((order.clone(), vendor_id, true)),
                    None => writes.push((order.clone(), vendor_id, false)),
                }
            }

            let new_count = writes.iter().filter(|(_, _, existed)| !existed).count() as u32;
            let changed_count = writes.len() as u32 - new_count;

            if self.dry_run {
                outcome.inserted += new_count;
                outcome.updated += changed_count;
                continue;
            }
            if writes.is_empty() {
                continue;
            }

            let batch: Vec<(UpstreamOrder, Option<i64>)> = writes
                .iter()
                .map(|(o, v, _)| (o.clone(), *v))
                .collect();
            match self.repository.upsert_order_batch(&batch, now).await {
                Ok(()) => {
                    outcome.inserted += new_count;
                    outcome.updated += changed_count;
                }
                Err(batch_err) => {
                    warn!(
                        "⚠️ Order batch of {} failed ({}), replaying record by record",
                        batch.len(),
                        batch_err
                    );
                    for (order, vendor_id, existed) in &writes {
                        match self.repository.upsert_order(order, *vendor_id, now).await {
                            Ok(()) => {
                                if *existed {
                                    outcome.updated += 1;
                                } else {
                                    outcome.inserted += 1;
                                }
                            }
                            Err(err) => outcome.failed.push(ItemFailure {
                                identifier: order.upstream_order_id.clone(),
                                message: err.to_string(),
                            }),
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::DatabaseConnection;
    use tempfile::tempdir;

    async fn setup_engine(
        batch_size: usize,
        dry_run: bool,
    ) -> (UpsertEngine, InventoryRepository, tempfile::TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let database_url = format!("sqlite://{}", db_path.display());

        let db = DatabaseConnection::new(&database_url)
            .await
            .expect("Failed to create database connection");
        db.migrate().await.expect("Failed to run migrations");

        let repository = InventoryRepository::new(db.pool().clone());
        (
            UpsertEngine::new(repository.clone(), batch_size, dry_run),
            repository,
            temp_dir,
        )
    }

    fn item(sku: &str, stock: i64) -> UpstreamItem {
        UpstreamItem {
            sku: sku.to_string(),
            product_name: "Widget".to_string(),
            stock,
            cost: 9.99,
            vendor: None,
            location: "A-01".to_string(),
            reorder_point: 2,
            reorder_quantity: 10,
        }
    }

    #[tokio::test]
    async fn test_second_run_with_no_changes_only_skips() {
        let (engine, repository, _guard) = setup_engine(2, false).await;
        let records = vec![item("SKU-1", 5), item("SKU-2", 8), item("SKU-3", 0)];

        let first = engine
            .upsert_items(&records, Utc::now())
            .await
            .expect("first run");
        assert_eq!(first.inserted, 3);
        assert_eq!(first.updated, 0);
        assert_eq!(first.skipped, 0);

        let before = repository
            .get_item_by_sku("SKU-1")
            .await
            .expect("read")
            .expect("row");

        let second_now = Utc::now();
        let second = engine
            .upsert_items(&records, second_now)
            .await
            .expect("second run");
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.skipped, 3);

        let after = repository
            .get_item_by_sku("SKU-1")
            .await
            .expect("read")
            .expect("row");
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(after.last_synced_at, Some(second_now));
        println!("✅ Idempotent rerun stamped last_synced_at only");
    }

    #[tokio::test]
    async fn test_changed_rows_are_rewritten() {
        let (engine, _repository, _guard) = setup_engine(50, false).await;

        engine
            .upsert_items(&[item("SKU-1", 5), item("SKU-2", 8)], Utc::now())
            .await
            .expect("first run");

        let outcome = engine
            .upsert_items(&[item("SKU-1", 6), item("SKU-2", 8)], Utc::now())
            .await
            .expect("second run");
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn test_keyless_records_become_positioned_failures() {
        let (engine, _repository, _guard) = setup_engine(50, false).await;

        let outcome = engine
            .upsert_items(&[item("SKU-1", 1), item("", 2), item("SKU-3", 3)], Utc::now())
            .await
            .expect("run");

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].identifier, "record[1]");
    }

    #[tokio::test]
    async fn test_dry_run_reports_counts_without_writing() {
        let (engine, repository, _guard) = setup_engine(50, true).await;

        let outcome = engine
            .upsert_items(&[item("SKU-1", 1), item("SKU-2", 2)], Utc::now())
            .await
            .expect("dry run");

        assert_eq!(outcome.inserted, 2);
        assert_eq!(repository.count_items().await.expect("count"), 0);
        println!("✅ Dry run left the store untouched");
    }

    #[tokio::test]
    async fn test_order_batch_failure_replays_record_by_record() {
        let (engine, repository, _guard) = setup_engine(50, false).await;
        let now = Utc::now();

        let vendor_id = repository
            .ensure_vendor_for_name("Acme Supply", now)
            .await
            .expect("vendor");

        let good = UpstreamOrder {
            upstream_order_id: "ORD-1".to_string(),
            order_number: "PO-1".to_string(),
            status: "APPROVED".to_string(),
            order_total: 10.0,
            vendor_name: Some("Acme Supply".to_string()),
            ordered_at: None,
        };
        let poisoned = UpstreamOrder {
            upstream_order_id: "ORD-2".to_string(),
            order_number: "PO-2".to_string(),
            ..good.clone()
        };

        // vendor_id 9999 violates the foreign key and sinks the batch
        let outcome = engine
            .upsert_orders(
                &[(good, Some(vendor_id)), (poisoned, Some(9999))],
                now,
            )
            .await
            .expect("run");

        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].identifier, "ORD-2");
        assert!(repository
            .get_order_by_upstream_id("ORD-1")
            .await
            .expect("read")
            .is_some());
        assert!(repository
            .get_order_by_upstream_id("ORD-2")
            .await
            .expect("read")
            .is_none());
        println!("✅ Batch failure was isolated to the offending record");
    }

    #[tokio::test]
    async fn test_vendor_rename_is_detected() {
        let (engine, _repository, _guard) = setup_engine(50, false).await;
        let vendor = UpstreamVendor {
            upstream_vendor_id: "VEND-1".to_string(),
            name: "Acme Supply".to_string(),
        };

        engine
            .upsert_vendors(std::slice::from_ref(&vendor), Utc::now())
            .await
            .expect("first run");

        let renamed = UpstreamVendor {
            name: "Acme Supply Co".to_string(),
            ..vendor
        };
        let outcome = engine
            .upsert_vendors(&[renamed], Utc::now())
            .await
            .expect("second run");
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.skipped, 0);
    }
}
