//! StockSync - Upstream Inventory Sync Engine
//!
//! Mirrors inventory items, vendors and purchase orders from an upstream
//! warehouse REST API into a local SQLite store, with change-aware upserts
//! and append-only run logs.

// Module declarations
pub mod domain;
pub mod infrastructure;
pub mod sync;

// Re-export the trigger surface for easier access
pub use sync::{SyncError, SyncOrchestrator, SyncRequest, SyncStatusReport};
