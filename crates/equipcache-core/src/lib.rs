//! Background-populated cache for equipment reference data.
//!
//! Rooms, lines, manufacturers and types change rarely but are looked up
//! constantly to turn numeric ids into names and to list what sits at a
//! location. `ReferenceCache` loads all four kinds in parallel on a tokio
//! runtime, retries each independently, and serves lookups at any time,
//! including while a load is still running.
//!
//! ```no_run
//! use std::sync::Arc;
//! use equipcache_core::{CacheConfig, JsonFileSource, ReferenceCache};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let source = Arc::new(JsonFileSource::new("reference.json"));
//! let cache = ReferenceCache::new(source, CacheConfig::default())?;
//! cache.initialize();
//! if cache.ready().await {
//!     println!("{}", cache.display_name(equipcache_core::EntityKind::Room, 12));
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod facade;
pub mod loader;
pub mod models;
pub mod retry;
pub mod source;
pub mod status;

pub use cache::{CacheStore, KindSnapshot, LocationIds, Snapshot};
pub use config::CacheConfig;
pub use coordinator::InitializationCoordinator;
pub use error::{CacheError, LoadError, SourceError};
pub use facade::{ReferenceCache, UNKNOWN_NAME};
pub use loader::EntityLoader;
pub use models::{EntityKind, LineRecord, ManufacturerRecord, Record, RoomRecord, SourceRow, TypeRecord};
pub use retry::{run_with_retry, RetryOutcome, RetryPolicy};
pub use source::{InMemorySource, JsonFileSource, ReferenceSession, ReferenceSource};
pub use status::{CacheStatus, KindStatus, LoadState, OverallState};
