//! Inventory domain entities
//!
//! Stored forms mirror the SQLite schema; the `Upstream*` forms are the
//! mapped records produced from upstream payloads before change detection
//! and upsert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Type};

/// Inventory item as stored locally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub sku: String,
    pub product_name: String,
    pub stock: i64,
    pub cost: f64,
    pub vendor: Option<String>,
    pub location: String,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub content_hash: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_priority: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inventory item as mapped from an upstream record (tracked fields only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamItem {
    pub sku: String,
    pub product_name: String,
    pub stock: i64,
    pub cost: f64,
    pub vendor: Option<String>,
    pub location: String,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
}

/// Vendor information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: i64,
    pub name: String,
    pub upstream_vendor_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Vendor as mapped from an upstream record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamVendor {
    pub upstream_vendor_id: String,
    pub name: String,
}

/// Purchase order as stored locally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: i64,
    pub order_number: String,
    pub vendor_id: Option<i64>,
    pub vendor_name: Option<String>,
    pub status: String,
    pub order_total: f64,
    pub ordered_at: Option<DateTime<Utc>>,
    pub upstream_order_id: String,
    pub upstream_sync_status: UpstreamSyncStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Purchase order as mapped from an upstream record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamOrder {
    pub upstream_order_id: String,
    pub order_number: String,
    pub status: String,
    pub order_total: f64,
    pub vendor_name: Option<String>,
    pub ordered_at: Option<DateTime<Utc>>,
}

/// Reconciliation state of a purchase order against the upstream system
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamSyncStatus {
    NotSynced,
    Synced,
    Error,
}

impl UpstreamSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamSyncStatus::NotSynced => "not_synced",
            UpstreamSyncStatus::Synced => "synced",
            UpstreamSyncStatus::Error => "error",
        }
    }
}

impl Type<sqlx::Sqlite> for UpstreamSyncStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, sqlx::Sqlite> for UpstreamSyncStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as Encode<sqlx::Sqlite>>::encode(self.as_str().to_string(), buf)
    }
}

impl<'r> Decode<'r, sqlx::Sqlite> for UpstreamSyncStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as Decode<sqlx::Sqlite>>::decode(value)?;
        match s.as_str() {
            "not_synced" => Ok(UpstreamSyncStatus::NotSynced),
            "synced" => Ok(UpstreamSyncStatus::Synced),
            "error" => Ok(UpstreamSyncStatus::Error),
            _ => Err(format!("Invalid UpstreamSyncStatus: {s}").into()),
        }
    }
}
