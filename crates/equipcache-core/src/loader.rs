//! Full (non-incremental) loads of one reference data kind.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::cache::{KindSnapshot, Snapshot};
use crate::error::LoadError;
use crate::models::{
    EntityKind, LineRecord, ManufacturerRecord, Record, RoomRecord, SourceRow, TypeRecord,
};
use crate::source::ReferenceSource;

/// Fetches one complete dataset for a kind and builds its snapshot.
///
/// Clones share an in-flight gate: at most one `load` per loader family runs
/// at a time, even when an earlier caller stopped waiting for its result.
#[derive(Clone)]
pub struct EntityLoader {
    kind: EntityKind,
    source: Arc<dyn ReferenceSource>,
    in_flight: Arc<Mutex<()>>,
}

impl EntityLoader {
    pub fn new(kind: EntityKind, source: Arc<dyn ReferenceSource>) -> Self {
        Self {
            kind,
            source,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// One loader per kind, all sharing `source`
    pub fn for_all_kinds(source: &Arc<dyn ReferenceSource>) -> [EntityLoader; 4] {
        EntityKind::ALL.map(|kind| EntityLoader::new(kind, Arc::clone(source)))
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Open a private session, fetch every row and build the snapshot.
    ///
    /// All-or-nothing: any store failure or malformed row fails the whole load.
    /// Blocks while another clone's load is still running.
    pub fn load(&self) -> Result<KindSnapshot, LoadError> {
        let _in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let mut session = self.source.open_session()?;
        let rows = session.fetch(self.kind)?;
        debug!(kind = %self.kind, rows = rows.len(), "Rows fetched");

        Ok(match self.kind {
            EntityKind::Room => KindSnapshot::Room(build_snapshot::<RoomRecord>(rows)?),
            EntityKind::Line => KindSnapshot::Line(build_snapshot::<LineRecord>(rows)?),
            EntityKind::Manufacturer => {
                KindSnapshot::Manufacturer(build_snapshot::<ManufacturerRecord>(rows)?)
            }
            EntityKind::Type => KindSnapshot::Type(build_snapshot::<TypeRecord>(rows)?),
        })
    }
}

fn build_snapshot<R: Record>(rows: Vec<SourceRow>) -> Result<Snapshot<R>, LoadError> {
    let records = rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| R::from_row(row, index))
        .collect::<Result<Vec<R>, LoadError>>()?;
    Snapshot::build(records)
}
