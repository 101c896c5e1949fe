//! Repository for inventory items, vendors and purchase orders
//!
//! This module provides the write path of the sync engine: hash lookups,
//! conflict-target upserts that preserve `created_at`, vendor-name
//! reconciliation and the opt-in replace-all deletes.

#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::domain::inventory::{
    InventoryItem, PurchaseOrder, UpstreamItem, UpstreamOrder, UpstreamSyncStatus, UpstreamVendor,
    Vendor,
};

/// Repository over the local store (inventory_items + vendors + purchase_orders)
#[derive(Clone)]
pub struct InventoryRepository {
    pool: Arc<SqlitePool>,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    // ===============================
    // INVENTORY ITEM OPERATIONS
    // ===============================

    /// Bulk-read stored content hashes for a set of SKUs
    pub async fn get_content_hashes(&self, skus: &[String]) -> Result<HashMap<String, String>> {
        if skus.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT sku, content_hash FROM inventory_items WHERE sku IN ({})",
            placeholders(skus.len())
        );

        let mut query = sqlx::query(&sql);
        for sku in skus {
            query = query.bind(sku);
        }

        let rows = query.fetch_all(&*self.pool).await?;
        let mut hashes = HashMap::with_capacity(rows.len());
        for row in rows {
            hashes.insert(row.get("sku"), row.get("content_hash"));
        }

        Ok(hashes)
    }

    /// Insert or update one inventory item keyed on its SKU
    ///
    /// `created_at` is deliberately absent from the update list so the
    /// original insertion time survives every later sync. `sync_priority` is
    /// operator-owned and likewise untouched on update.
    pub async fn upsert_item(
        &self,
        item: &UpstreamItem,
        content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_items
            (sku, product_name, stock, cost, vendor, location, reorder_point,
             reorder_quantity, content_hash, last_synced_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(sku) DO UPDATE SET
                product_name = excluded.product_name,
                stock = excluded.stock,
                cost = excluded.cost,
                vendor = excluded.vendor,
                location = excluded.location,
                reorder_point = excluded.reorder_point,
                reorder_quantity = excluded.reorder_quantity,
                content_hash = excluded.content_hash,
                last_synced_at = excluded.last_synced_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&item.sku)
        .bind(&item.product_name)
        .bind(item.stock)
        .bind(item.cost)
        .bind(&item.vendor)
        .bind(&item.location)
        .bind(item.reorder_point)
        .bind(item.reorder_quantity)
        .bind(content_hash)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Upsert a batch of items inside one transaction
    pub async fn upsert_item_batch(
        &self,
        items: &[(UpstreamItem, String)],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (item, content_hash) in items {
            sqlx::query(
                r#"
                INSERT INTO inventory_items
                (sku, product_name, stock, cost, vendor, location, reorder_point,
                 reorder_quantity, content_hash, last_synced_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(sku) DO UPDATE SET
                    product_name = excluded.product_name,
                    stock = excluded.stock,
                    cost = excluded.cost,
                    vendor = excluded.vendor,
                    location = excluded.location,
                    reorder_point = excluded.reorder_point,
                    reorder_quantity = excluded.reorder_quantity,
                    content_hash = excluded.content_hash,
                    last_synced_at = excluded.last_synced_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&item.sku)
            .bind(&item.product_name)
            .bind(item.stock)
            .bind(item.cost)
            .bind(&item.vendor)
            .bind(&item.location)
            .bind(item.reorder_point)
            .bind(item.reorder_quantity)
            .bind(content_hash)
            .bind(now)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Stamp `last_synced_at` on unchanged rows that a sync verified
    pub async fn stamp_last_synced(&self, skus: &[String], at: DateTime<Utc>) -> Result<()> {
        if skus.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE inventory_items SET last_synced_at = ? WHERE sku IN ({})",
            placeholders(skus.len())
        );

        let mut query = sqlx::query(&sql).bind(at);
        for sku in skus {
            query = query.bind(sku);
        }
        query.execute(&*self.pool).await?;

        Ok(())
    }

    /// SKUs considered high priority: flagged by an operator or at/below
    /// their reorder point
    pub async fn get_priority_skus(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            "SELECT sku FROM inventory_items WHERE sync_priority > 0 OR stock <= reorder_point",
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("sku")).collect())
    }

    /// Get one item by SKU
    pub async fn get_item_by_sku(&self, sku: &str) -> Result<Option<InventoryItem>> {
        let row = sqlx::query(
            r#"
            SELECT sku, product_name, stock, cost, vendor, location, reorder_point,
                   reorder_quantity, content_hash, last_synced_at, sync_priority,
                   created_at, updated_at
            FROM inventory_items WHERE sku = ?
            "#,
        )
        .bind(sku)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|row| InventoryItem {
            sku: row.get("sku"),
            product_name: row.get("product_name"),
            stock: row.get("stock"),
            cost: row.get("cost"),
            vendor: row.get("vendor"),
            location: row.get("location"),
            reorder_point: row.get("reorder_point"),
            reorder_quantity: row.get("reorder_quantity"),
            content_hash: row.get("content_hash"),
            last_synced_at: row.get("last_synced_at"),
            sync_priority: row.get("sync_priority"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    /// Count stored items
    pub async fn count_items(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM inventory_items")
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get("count"))
    }

    /// Delete every stored item (replace-all full sync only)
    pub async fn delete_all_items(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM inventory_items")
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Set the operator priority flag on a SKU
    pub async fn set_sync_priority(&self, sku: &str, priority: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE inventory_items SET sync_priority = ? WHERE sku = ?")
            .bind(priority)
            .bind(sku)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ===============================
    // VENDOR OPERATIONS
    // ===============================

    /// Bulk-read stored vendors by upstream id, in their mapped form
    pub async fn get_vendors_by_upstream_ids(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, UpstreamVendor>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT name, upstream_vendor_id FROM vendors WHERE upstream_vendor_id IN ({})",
            placeholders(ids.len())
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&*self.pool).await?;
        let mut vendors = HashMap::with_capacity(rows.len());
        for row in rows {
            let upstream_vendor_id: String = row.get("upstream_vendor_id");
            vendors.insert(
                upstream_vendor_id.clone(),
                UpstreamVendor {
                    upstream_vendor_id,
                    name: row.get("name"),
                },
            );
        }

        Ok(vendors)
    }

    /// Insert or update one vendor keyed on its upstream id.
    ///
    /// A row first created from a free-text vendor name has no upstream id;
    /// the name conflict target adopts that row and stamps the id onto it.
    pub async fn upsert_vendor(&self, vendor: &UpstreamVendor, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vendors (name, upstream_vendor_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(upstream_vendor_id) DO UPDATE SET
                name = excluded.name,
                updated_at = excluded.updated_at
            ON CONFLICT(name) DO UPDATE SET
                name = excluded.name,
                upstream_vendor_id = excluded.upstream_vendor_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&vendor.name)
        .bind(&vendor.upstream_vendor_id)
        .bind(now)
        .bind(now)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Upsert a batch of vendors inside one transaction
    pub async fn upsert_vendor_batch(
        &self,
        vendors: &[UpstreamVendor],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for vendor in vendors {
            sqlx::query(
                r#"
                INSERT INTO vendors (name, upstream_vendor_id, created_at, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(upstream_vendor_id) DO UPDATE SET
                    name = excluded.name,
                    updated_at = excluded.updated_at
                ON CONFLICT(name) DO UPDATE SET
                    name = excluded.name,
                    upstream_vendor_id = excluded.upstream_vendor_id,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&vendor.name)
            .bind(&vendor.upstream_vendor_id)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Find a vendor by name, case-insensitively
    pub async fn find_vendor_by_name(&self, name: &str) -> Result<Option<Vendor>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, upstream_vendor_id, created_at, updated_at
            FROM vendors WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|row| Vendor {
            id: row.get("id"),
            name: row.get("name"),
            upstream_vendor_id: row.get("upstream_vendor_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    /// Resolve a free-text vendor name to a vendor id, creating the vendor
    /// when no case-insensitive match exists
    pub async fn ensure_vendor_for_name(&self, name: &str, now: DateTime<Utc>) -> Result<i64> {
        if let Some(vendor) = self.find_vendor_by_name(name).await? {
            return Ok(vendor.id);
        }

        // DO NOTHING so a concurrent insert of the same name is not an error
        sqlx::query(
            r#"
            INSERT INTO vendors (name, created_at, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        let vendor = self
            .find_vendor_by_name(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Vendor '{name}' missing after insert"))?;

        Ok(vendor.id)
    }

    /// Count stored vendors
    pub async fn count_vendors(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM vendors")
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get("count"))
    }

    /// Delete every stored vendor (replace-all full sync only)
    pub async fn delete_all_vendors(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM vendors")
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ===============================
    // PURCHASE ORDER OPERATIONS
    // ===============================

    /// Bulk-read stored purchase orders by upstream id, in their mapped form
    pub async fn get_orders_by_upstream_ids(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, UpstreamOrder>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            r#"
            SELECT order_number, status, order_total, vendor_name, ordered_at, upstream_order_id
            FROM purchase_orders WHERE upstream_order_id IN ({})
            "#,
            placeholders(ids.len())
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&*self.pool).await?;
        let mut orders = HashMap::with_capacity(rows.len());
        for row in rows {
            let upstream_order_id: String = row.get("upstream_order_id");
            orders.insert(
                upstream_order_id.clone(),
                UpstreamOrder {
                    upstream_order_id,
                    order_number: row.get("order_number"),
                    status: row.get("status"),
                    order_total: row.get("order_total"),
                    vendor_name: row.get("vendor_name"),
                    ordered_at: row.get("ordered_at"),
                },
            );
        }

        Ok(orders)
    }

    /// Insert or update one purchase order keyed on its upstream id
    pub async fn upsert_order(
        &self,
        order: &UpstreamOrder,
        vendor_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO purchase_orders
            (order_number, vendor_id, vendor_name, status, order_total, ordered_at,
             upstream_order_id, upstream_sync_status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(upstream_order_id) DO UPDATE SET
                order_number = excluded.order_number,
                vendor_id = excluded.vendor_id,
                vendor_name = excluded.vendor_name,
                status = excluded.status,
                order_total = excluded.order_total,
                ordered_at = excluded.ordered_at,
                upstream_sync_status = excluded.upstream_sync_status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&order.order_number)
        .bind(vendor_id)
        .bind(&order.vendor_name)
        .bind(&order.status)
        .bind(order.order_total)
        .bind(order.ordered_at)
        .bind(&order.upstream_order_id)
        .bind(UpstreamSyncStatus::Synced)
        .bind(now)
        .bind(now)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Upsert a batch of purchase orders inside one transaction
    pub async fn upsert_order_batch(
        &self,
        orders: &[(UpstreamOrder, Option<i64>)],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (order, vendor_id) in orders {
            sqlx::query(
                r#"
                INSERT INTO purchase_orders
                (order_number, vendor_id, vendor_name, status, order_total, ordered_at,
                 upstream_order_id, upstream_sync_status, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(upstream_order_id) DO UPDATE SET
                    order_number = excluded.order_number,
                    vendor_id = excluded.vendor_id,
                    vendor_name = excluded.vendor_name,
                    status = excluded.status,
                    order_total = excluded.order_total,
                    ordered_at = excluded.ordered_at,
                    upstream_sync_status = excluded.upstream_sync_status,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&order.order_number)
            .bind(vendor_id)
            .bind(&order.vendor_name)
            .bind(&order.status)
            .bind(order.order_total)
            .bind(order.ordered_at)
            .bind(&order.upstream_order_id)
            .bind(UpstreamSyncStatus::Synced)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Get one purchase order by upstream id
    pub async fn get_order_by_upstream_id(&self, id: &str) -> Result<Option<PurchaseOrder>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_number, vendor_id, vendor_name, status, order_total,
                   ordered_at, upstream_order_id, upstream_sync_status, created_at, updated_at
            FROM purchase_orders WHERE upstream_order_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|row| PurchaseOrder {
            id: row.get("id"),
            order_number: row.get("order_number"),
            vendor_id: row.get("vendor_id"),
            vendor_name: row.get("vendor_name"),
            status: row.get("status"),
            order_total: row.get("order_total"),
            ordered_at: row.get("ordered_at"),
            upstream_order_id: row
                .get::<Option<String>, _>("upstream_order_id")
                .unwrap_or_default(),
            upstream_sync_status: row.get("upstream_sync_status"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    /// Count stored purchase orders
    pub async fn count_orders(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM purchase_orders")
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get("count"))
    }

    /// Delete every stored purchase order (replace-all full sync only)
    pub async fn delete_all_orders(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM purchase_orders")
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::DatabaseConnection;
    use chrono::Duration;
    use tempfile::tempdir;

    async fn setup_repository() -> (InventoryRepository, tempfile::TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let database_url = format!("sqlite://{}", db_path.display());

        let db = DatabaseConnection::new(&database_url)
            .await
            .expect("Failed to create database connection");
        db.migrate().await.expect("Failed to run migrations");

        (InventoryRepository::new(db.pool().clone()), temp_dir)
    }

    fn sample_item(sku: &str, stock: i64) -> UpstreamItem {
        UpstreamItem {
            sku: sku.to_string(),
            product_name: "Widget".to_string(),
            stock,
            cost: 12.5,
            vendor: Some("Acme Supply".to_string()),
            location: "A-01".to_string(),
            reorder_point: 5,
            reorder_quantity: 25,
        }
    }

    #[tokio::test]
    async fn test_upsert_item_preserves_created_at() {
        let (repo, _guard) = setup_repository().await;

        let first = Utc::now() - Duration::hours(2);
        repo.upsert_item(&sample_item("SKU-1", 10), "hash-a", first)
            .await
            .expect("Failed to insert item");

        let later = Utc::now();
        repo.upsert_item(&sample_item("SKU-1", 3), "hash-b", later)
            .await
            .expect("Failed to update item");

        let item = repo
            .get_item_by_sku("SKU-1")
            .await
            .expect("Failed to read item")
            .expect("Item should exist");

        assert_eq!(item.stock, 3);
        assert_eq!(item.content_hash, "hash-b");
        assert_eq!(item.created_at, first);
        assert_eq!(item.updated_at, later);
        println!("✅ Upsert preserved created_at across an update");
    }

    #[tokio::test]
    async fn test_content_hash_bulk_read() {
        let (repo, _guard) = setup_repository().await;
        let now = Utc::now();

        repo.upsert_item(&sample_item("SKU-1", 10), "hash-1", now)
            .await
            .expect("Failed to insert item");
        repo.upsert_item(&sample_item("SKU-2", 20), "hash-2", now)
            .await
            .expect("Failed to insert item");

        let hashes = repo
            .get_content_hashes(&[
                "SKU-1".to_string(),
                "SKU-2".to_string(),
                "SKU-MISSING".to_string(),
            ])
            .await
            .expect("Failed to read hashes");

        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes.get("SKU-1").map(String::as_str), Some("hash-1"));
        assert!(!hashes.contains_key("SKU-MISSING"));
        println!("✅ Bulk hash read returned only stored SKUs");
    }

    #[tokio::test]
    async fn test_vendor_name_reconciliation_is_case_insensitive() {
        let (repo, _guard) = setup_repository().await;
        let now = Utc::now();

        let first_id = repo
            .ensure_vendor_for_name("Acme Supply", now)
            .await
            .expect("Failed to create vendor");
        let second_id = repo
            .ensure_vendor_for_name("ACME SUPPLY", now)
            .await
            .expect("Failed to resolve vendor");
        let other_id = repo
            .ensure_vendor_for_name("Globex", now)
            .await
            .expect("Failed to create second vendor");

        assert_eq!(first_id, second_id);
        assert_ne!(first_id, other_id);
        assert_eq!(repo.count_vendors().await.expect("count"), 2);
        println!("✅ Vendor reconciliation matched case-insensitively");
    }

    #[tokio::test]
    async fn test_vendor_upsert_adopts_name_only_row() {
        let (repo, _guard) = setup_repository().await;
        let now = Utc::now();

        // An inventory sync sees the name before the vendors sync sees the id
        let name_only_id = repo
            .ensure_vendor_for_name("acme supply", now)
            .await
            .expect("Failed to create vendor");

        let upstream = UpstreamVendor {
            upstream_vendor_id: "V-100".to_string(),
            name: "Acme Supply".to_string(),
        };
        repo.upsert_vendor(&upstream, now)
            .await
            .expect("Failed to upsert vendor");

        let vendor = repo
            .find_vendor_by_name("ACME SUPPLY")
            .await
            .expect("Failed to read vendor")
            .expect("Vendor should exist");

        assert_eq!(repo.count_vendors().await.expect("count"), 1);
        assert_eq!(vendor.id, name_only_id);
        assert_eq!(vendor.upstream_vendor_id.as_deref(), Some("V-100"));
        assert_eq!(vendor.name, "Acme Supply");
        println!("✅ Vendor upsert adopted the name-only row and kept its id");
    }

    #[tokio::test]
    async fn test_order_upsert_keyed_on_upstream_id() {
        let (repo, _guard) = setup_repository().await;
        let now = Utc::now();

        let vendor_id = repo
            .ensure_vendor_for_name("Acme Supply", now)
            .await
            .expect("Failed to create vendor");

        let order = UpstreamOrder {
            upstream_order_id: "ORD-100".to_string(),
            order_number: "PO-2024-001".to_string(),
            status: "APPROVED".to_string(),
            order_total: 149.99,
            vendor_name: Some("Acme Supply".to_string()),
            ordered_at: Some(now),
        };
        repo.upsert_order(&order, Some(vendor_id), now)
            .await
            .expect("Failed to insert order");

        let changed = UpstreamOrder {
            status: "RECEIVED".to_string(),
            ..order
        };
        repo.upsert_order(&changed, Some(vendor_id), now)
            .await
            .expect("Failed to update order");

        let stored = repo
            .get_order_by_upstream_id("ORD-100")
            .await
            .expect("Failed to read order")
            .expect("Order should exist");

        assert_eq!(repo.count_orders().await.expect("count"), 1);
        assert_eq!(stored.status, "RECEIVED");
        assert_eq!(stored.vendor_id, Some(vendor_id));
        assert_eq!(stored.upstream_sync_status, UpstreamSyncStatus::Synced);
        println!("✅ Order upsert updated in place by upstream id");
    }

    #[tokio::test]
    async fn test_priority_skus_cover_flags_and_reorder_breach() {
        let (repo, _guard) = setup_repository().await;
        let now = Utc::now();

        // stock 10 vs reorder point 5: not a breach
        repo.upsert_item(&sample_item("SKU-CALM", 10), "h1", now)
            .await
            .expect("insert");
        // stock 2 vs reorder point 5: breach
        repo.upsert_item(&sample_item("SKU-LOW", 2), "h2", now)
            .await
            .expect("insert");
        // flagged by an operator
        repo.upsert_item(&sample_item("SKU-FLAG", 50), "h3", now)
            .await
            .expect("insert");
        repo.set_sync_priority("SKU-FLAG", 1)
            .await
            .expect("Failed to set priority");

        let priority = repo.get_priority_skus().await.expect("Failed to query");
        assert!(priority.contains("SKU-LOW"));
        assert!(priority.contains("SKU-FLAG"));
        assert!(!priority.contains("SKU-CALM"));
        println!("✅ Priority set covers operator flags and reorder breaches");
    }
}
