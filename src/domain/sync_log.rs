//! Sync run bookkeeping
//!
//! Every sync run is recorded in the append-only `sync_logs` table. A row is
//! created in `running` state when the run acquires its single-flight slot
//! and transitions exactly once to a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Type};

/// Which entity a sync run reconciles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Inventory,
    Vendors,
    PurchaseOrders,
    /// Composite run: vendors, then inventory, then purchase orders
    Full,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Inventory => "inventory",
            SyncType::Vendors => "vendors",
            SyncType::PurchaseOrders => "purchase_orders",
            SyncType::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inventory" => Some(SyncType::Inventory),
            "vendors" => Some(SyncType::Vendors),
            "purchase_orders" => Some(SyncType::PurchaseOrders),
            "full" => Some(SyncType::Full),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Type<sqlx::Sqlite> for SyncType {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, sqlx::Sqlite> for SyncType {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as Encode<sqlx::Sqlite>>::encode(self.as_str().to_string(), buf)
    }
}

impl<'r> Decode<'r, sqlx::Sqlite> for SyncType {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as Decode<sqlx::Sqlite>>::decode(value)?;
        SyncType::parse(&s).ok_or_else(|| format!("Invalid SyncType: {s}").into())
    }
}

/// Lifecycle status of a sync run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Running,
    Success,
    Partial,
    Error,
}

impl SyncRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRunStatus::Running => "running",
            SyncRunStatus::Success => "success",
            SyncRunStatus::Partial => "partial",
            SyncRunStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncRunStatus::Running)
    }
}

impl std::fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Type<sqlx::Sqlite> for SyncRunStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, sqlx::Sqlite> for SyncRunStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as Encode<sqlx::Sqlite>>::encode(self.as_str().to_string(), buf)
    }
}

impl<'r> Decode<'r, sqlx::Sqlite> for SyncRunStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as Decode<sqlx::Sqlite>>::decode(value)?;
        match s.as_str() {
            "running" => Ok(SyncRunStatus::Running),
            "success" => Ok(SyncRunStatus::Success),
            "partial" => Ok(SyncRunStatus::Partial),
            "error" => Ok(SyncRunStatus::Error),
            _ => Err(format!("Invalid SyncRunStatus: {s}").into()),
        }
    }
}

/// One record that could not be written, keyed by its natural identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub identifier: String,
    pub message: String,
}

/// Persisted sync run record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: String,
    pub sync_type: SyncType,
    pub status: SyncRunStatus,
    pub items_processed: u32,
    pub items_inserted: u32,
    pub items_updated: u32,
    pub items_skipped: u32,
    pub errors: Vec<ItemFailure>,
    pub duration_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncLog {
    pub fn is_running(&self) -> bool {
        self.status == SyncRunStatus::Running
    }
}

/// Minimal summary of a run, used for end-of-run logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSummary {
    pub pages_processed: u32,
    pub inserted: u32,
    pub updated: u32,
    pub skipped: u32,
    pub failed: u32,
    pub duration_ms: u64,
}

impl SyncSummary {
    pub fn processed(&self) -> u32 {
        self.inserted + self.updated + self.skipped
    }

    /// Fold a per-phase summary into a composite run total
    pub fn absorb(&mut self, other: &SyncSummary) {
        self.pages_processed = self.pages_processed.saturating_add(other.pages_processed);
        self.inserted = self.inserted.saturating_add(other.inserted);
        self.updated = self.updated.saturating_add(other.updated);
        self.skipped = self.skipped.saturating_add(other.skipped);
        self.failed = self.failed.saturating_add(other.failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_type_round_trips_through_text() {
        for t in [
            SyncType::Inventory,
            SyncType::Vendors,
            SyncType::PurchaseOrders,
            SyncType::Full,
        ] {
            assert_eq!(SyncType::parse(t.as_str()), Some(t));
        }
        assert_eq!(SyncType::parse("orders"), None);
    }

    #[test]
    fn running_is_the_only_non_terminal_status() {
        assert!(!SyncRunStatus::Running.is_terminal());
        assert!(SyncRunStatus::Success.is_terminal());
        assert!(SyncRunStatus::Partial.is_terminal());
        assert!(SyncRunStatus::Error.is_terminal());
    }

    #[test]
    fn summary_absorb_accumulates_counters() {
        let mut total = SyncSummary {
            pages_processed: 2,
            inserted: 5,
            updated: 1,
            skipped: 3,
            failed: 0,
            duration_ms: 0,
        };
        total.absorb(&SyncSummary {
            pages_processed: 1,
            inserted: 0,
            updated: 4,
            skipped: 2,
            failed: 1,
            duration_ms: 10,
        });
        assert_eq!(total.pages_processed, 3);
        assert_eq!(total.inserted, 5);
        assert_eq!(total.updated, 5);
        assert_eq!(total.skipped, 5);
        assert_eq!(total.failed, 1);
        assert_eq!(total.processed(), 15);
    }
}
