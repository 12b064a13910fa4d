//! In-memory snapshot storage.
//!
//! This module provides the `CacheStore`, which holds the current snapshot of
//! each reference data kind. A snapshot is replaced wholesale on each
//! successful load; nothing is evicted or mutated piecemeal.
//!
//! Snapshots carry:
//! - the primary id→record map
//! - for rooms and lines, a location→ids index
//! - the time they were loaded

pub mod snapshot;
pub mod store;

pub use snapshot::{LocationIds, Snapshot};
pub use store::{CacheStore, KindSnapshot};
