//! Domain module - Core entities and sync run bookkeeping
//!
//! This module contains the inventory entities, their upstream-mapped forms,
//! and the sync log types shared by the sync engine and its callers.

pub mod inventory;
pub mod sync_log;

// Re-export commonly used items for convenience
pub use inventory::{
    InventoryItem, PurchaseOrder, UpstreamItem, UpstreamOrder, UpstreamSyncStatus, UpstreamVendor,
    Vendor,
};
pub use sync_log::{ItemFailure, SyncLog, SyncRunStatus, SyncSummary, SyncType};
