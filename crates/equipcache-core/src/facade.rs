//! Public query surface of the reference cache.
//!
//! `ReferenceCache` is an explicit, owned component: create one per
//! application context (or per test) and share it by `Arc`.
//!
//! Getters never wait for readiness. A caller that needs complete data calls
//! `wait_until_ready` (or `ready().await`) first; a caller happy with
//! best-effort answers may query right after `initialize`.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::cache::{CacheStore, LocationIds, Snapshot};
use crate::config::CacheConfig;
use crate::coordinator::InitializationCoordinator;
use crate::error::CacheError;
use crate::loader::EntityLoader;
use crate::models::{EntityKind, LineRecord, ManufacturerRecord, RoomRecord, TypeRecord};
use crate::source::ReferenceSource;
use crate::status::{CacheStatus, LoadState, OverallState};

/// Name shown for ids the cache cannot resolve
pub const UNKNOWN_NAME: &str = "Unknown";

pub struct ReferenceCache {
    store: Arc<CacheStore>,
    coordinator: InitializationCoordinator,
    config: CacheConfig,
}

impl ReferenceCache {
    /// Create a cache whose loads run on the current tokio runtime.
    pub fn new(source: Arc<dyn ReferenceSource>, config: CacheConfig) -> Result<Self, CacheError> {
        let handle = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        Self::with_handle(source, config, handle)
    }

    /// Create a cache whose loads run on `handle`'s runtime. The cache itself
    /// may then be used from any thread.
    pub fn with_handle(
        source: Arc<dyn ReferenceSource>,
        config: CacheConfig,
        handle: Handle,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        let store = Arc::new(CacheStore::new());
        let coordinator = InitializationCoordinator::new(
            Arc::clone(&store),
            EntityLoader::for_all_kinds(&source),
            config.retry_policy(),
            handle,
        );
        Ok(Self {
            store,
            coordinator,
            config,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ===== Lifecycle =====

    /// Start loading in the background. No-op if a pass is running or done.
    pub fn initialize(&self) -> bool {
        self.coordinator.initialize()
    }

    /// Reload every kind; stale data stays readable until replaced.
    pub fn reload(&self) -> bool {
        self.coordinator.reload()
    }

    /// Abort in-flight loads and drop all cached data.
    pub fn shutdown(&self) {
        self.coordinator.shutdown()
    }

    // ===== Readiness =====

    pub fn is_ready(&self) -> bool {
        self.coordinator.is_ready()
    }

    pub fn has_failed(&self) -> bool {
        self.coordinator.has_failed()
    }

    /// Errors of the last finished pass, `"kind: error"` joined by `"; "`.
    /// Stays `None` until the running pass is joined.
    pub fn last_error(&self) -> Option<String> {
        self.coordinator.last_error()
    }

    pub fn overall_state(&self) -> OverallState {
        self.coordinator.overall_state()
    }

    pub fn load_state(&self, kind: EntityKind) -> LoadState {
        self.coordinator.load_state(kind)
    }

    /// Block the calling thread until ready, failed or timed out.
    ///
    /// Do not call from an async task; use `ready` there.
    pub fn wait_until_ready(&self, timeout: Option<Duration>) -> bool {
        self.coordinator.wait_until_ready(timeout)
    }

    /// `wait_until_ready` with the configured timeout
    pub fn wait_until_ready_default(&self) -> bool {
        self.coordinator
            .wait_until_ready(Some(self.config.wait_timeout()))
    }

    pub async fn ready(&self) -> bool {
        self.coordinator.ready().await
    }

    pub async fn ready_within(&self, timeout: Duration) -> bool {
        self.coordinator.ready_within(timeout).await
    }

    pub fn status(&self) -> CacheStatus {
        self.coordinator.status()
    }

    // ===== Lookups =====

    pub fn room_name(&self, id: i64) -> Option<String> {
        self.store.get_name_by_id(EntityKind::Room, id)
    }

    pub fn line_name(&self, id: i64) -> Option<String> {
        self.store.get_name_by_id(EntityKind::Line, id)
    }

    pub fn manufacturer_name(&self, id: i64) -> Option<String> {
        self.store.get_name_by_id(EntityKind::Manufacturer, id)
    }

    pub fn type_name(&self, id: i64) -> Option<String> {
        self.store.get_name_by_id(EntityKind::Type, id)
    }

    pub fn name(&self, kind: EntityKind, id: i64) -> Option<String> {
        self.store.get_name_by_id(kind, id)
    }

    /// Name for display, falling back to `UNKNOWN_NAME`
    pub fn display_name(&self, kind: EntityKind, id: i64) -> String {
        self.store
            .get_name_by_id(kind, id)
            .unwrap_or_else(|| UNKNOWN_NAME.to_string())
    }

    /// Room ids at `location_id`. The view belongs to the snapshot current at
    /// call time; re-query after a reload instead of holding on to it.
    pub fn rooms_at_location(&self, location_id: i64) -> LocationIds {
        self.store.get_ids_by_location(EntityKind::Room, location_id)
    }

    /// Line ids at `location_id`, with the same validity window as
    /// `rooms_at_location`.
    pub fn lines_at_location(&self, location_id: i64) -> LocationIds {
        self.store.get_ids_by_location(EntityKind::Line, location_id)
    }

    // ===== Snapshot handles =====
    //
    // Read-only views for callers needing whole records. Each handle stays
    // consistent while held; take a new one after a reload.

    pub fn rooms(&self) -> Arc<Snapshot<RoomRecord>> {
        self.store.rooms()
    }

    pub fn lines(&self) -> Arc<Snapshot<LineRecord>> {
        self.store.lines()
    }

    pub fn manufacturers(&self) -> Arc<Snapshot<ManufacturerRecord>> {
        self.store.manufacturers()
    }

    pub fn types(&self) -> Arc<Snapshot<TypeRecord>> {
        self.store.types()
    }
}
