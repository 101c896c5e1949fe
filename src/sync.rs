//! Sync engine for the upstream inventory system
//!
//! The pipeline stages live here: response normalization, alias-driven field
//! mapping, content-hash change detection, batched upserts, and the
//! orchestrator that drives them page by page under single-flight run logs.

pub mod change_detector;
pub mod field_map;
pub mod normalizer;
pub mod orchestrator;
pub mod upsert;
pub mod watchdog;

// Re-export commonly used items
pub use change_detector::{content_hash, has_changed, Fingerprint};
pub use normalizer::{normalize, FlatRecord, NormalizeError};
pub use orchestrator::{SyncError, SyncOrchestrator, SyncRequest, SyncStatusReport};
pub use upsert::{BatchOutcome, UpsertEngine};
pub use watchdog::Watchdog;
