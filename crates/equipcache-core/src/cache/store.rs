use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::snapshot::{LocationIds, Snapshot};
use crate::models::{EntityKind, LineRecord, ManufacturerRecord, Record, RoomRecord, TypeRecord};

/// A freshly built snapshot tagged with its kind, ready to commit.
#[derive(Debug, Clone)]
pub enum KindSnapshot {
    Room(Snapshot<RoomRecord>),
    Line(Snapshot<LineRecord>),
    Manufacturer(Snapshot<ManufacturerRecord>),
    Type(Snapshot<TypeRecord>),
}

impl KindSnapshot {
    pub fn kind(&self) -> EntityKind {
        match self {
            KindSnapshot::Room(_) => EntityKind::Room,
            KindSnapshot::Line(_) => EntityKind::Line,
            KindSnapshot::Manufacturer(_) => EntityKind::Manufacturer,
            KindSnapshot::Type(_) => EntityKind::Type,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            KindSnapshot::Room(s) => s.len(),
            KindSnapshot::Line(s) => s.len(),
            KindSnapshot::Manufacturer(s) => s.len(),
            KindSnapshot::Type(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One kind's current snapshot.
///
/// The lock only guards swapping the `Arc`; readers clone it and drop the
/// guard before looking anything up, so a commit waits at most for a pointer
/// copy and a reader never sees a partially replaced map.
struct Slot<R> {
    current: RwLock<Arc<Snapshot<R>>>,
}

impl<R> Slot<R> {
    fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    fn load(&self) -> Arc<Snapshot<R>> {
        // Writers only ever store a whole Arc, so a poisoned guard still holds a complete snapshot
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    fn replace(&self, snapshot: Snapshot<R>) {
        let snapshot = Arc::new(snapshot);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = snapshot;
    }
}

/// Thread-safe holder of every kind's current snapshot.
///
/// Each kind has its own lock: a commit of one kind never blocks readers of
/// another.
///
/// Only the crate's coordinator writes to a store; outside callers get reads.
///
/// ```compile_fail
/// let store = equipcache_core::CacheStore::new();
/// store.clear();
/// ```
pub struct CacheStore {
    rooms: Slot<RoomRecord>,
    lines: Slot<LineRecord>,
    manufacturers: Slot<ManufacturerRecord>,
    types: Slot<TypeRecord>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        Self {
            rooms: Slot::new(),
            lines: Slot::new(),
            manufacturers: Slot::new(),
            types: Slot::new(),
        }
    }

    /// Atomically replace one kind's snapshot
    pub(crate) fn commit(&self, snapshot: KindSnapshot) {
        let kind = snapshot.kind();
        let records = snapshot.len();
        match snapshot {
            KindSnapshot::Room(s) => self.rooms.replace(s),
            KindSnapshot::Line(s) => self.lines.replace(s),
            KindSnapshot::Manufacturer(s) => self.manufacturers.replace(s),
            KindSnapshot::Type(s) => self.types.replace(s),
        }
        debug!(kind = %kind, records, "Snapshot committed");
    }

    /// Reset every kind to the empty snapshot
    pub(crate) fn clear(&self) {
        self.rooms.replace(Snapshot::default());
        self.lines.replace(Snapshot::default());
        self.manufacturers.replace(Snapshot::default());
        self.types.replace(Snapshot::default());
    }

    // ===== Snapshot handles =====

    pub fn rooms(&self) -> Arc<Snapshot<RoomRecord>> {
        self.rooms.load()
    }

    pub fn lines(&self) -> Arc<Snapshot<LineRecord>> {
        self.lines.load()
    }

    pub fn manufacturers(&self) -> Arc<Snapshot<ManufacturerRecord>> {
        self.manufacturers.load()
    }

    pub fn types(&self) -> Arc<Snapshot<TypeRecord>> {
        self.types.load()
    }

    // ===== Queries =====

    /// Name for `id`, or `None` when the id is absent or the kind has never loaded.
    ///
    /// Never waits for a load in progress.
    pub fn get_name_by_id(&self, kind: EntityKind, id: i64) -> Option<String> {
        fn name<R: Record>(slot: &Slot<R>, id: i64) -> Option<String> {
            slot.load().name_of(id).map(str::to_string)
        }
        match kind {
            EntityKind::Room => name(&self.rooms, id),
            EntityKind::Line => name(&self.lines, id),
            EntityKind::Manufacturer => name(&self.manufacturers, id),
            EntityKind::Type => name(&self.types, id),
        }
    }

    /// Ids at `location_id` in the kind's current snapshot.
    ///
    /// Empty for unknown locations and for kinds without a location index.
    pub fn get_ids_by_location(&self, kind: EntityKind, location_id: i64) -> LocationIds {
        match kind {
            EntityKind::Room => self.rooms.load().ids_at(location_id),
            EntityKind::Line => self.lines.load().ids_at(location_id),
            EntityKind::Manufacturer | EntityKind::Type => LocationIds::empty(),
        }
    }

    pub fn record_count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Room => self.rooms.load().len(),
            EntityKind::Line => self.lines.load().len(),
            EntityKind::Manufacturer => self.manufacturers.load().len(),
            EntityKind::Type => self.types.load().len(),
        }
    }

    pub fn loaded_at(&self, kind: EntityKind) -> Option<DateTime<Utc>> {
        match kind {
            EntityKind::Room => self.rooms.load().loaded_at(),
            EntityKind::Line => self.lines.load().loaded_at(),
            EntityKind::Manufacturer => self.manufacturers.load().loaded_at(),
            EntityKind::Type => self.types.load().loaded_at(),
        }
    }
}
