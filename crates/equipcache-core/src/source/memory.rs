use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{ReferenceSession, ReferenceSource};
use crate::error::SourceError;
use crate::models::{EntityKind, SourceRow};

#[derive(Debug, Default)]
struct KindRows {
    rows: Vec<SourceRow>,
    /// Number of upcoming fetches that fail before rows are returned
    pending_failures: u32,
    fetches: u32,
    active: u32,
    max_active: u32,
    /// Overrides the source-wide delay for this kind
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct Shared {
    kinds: [KindRows; 4],
    delay: Duration,
}

/// Source serving rows held in memory.
///
/// Clones share the same rows, so a caller can keep a handle and replace data
/// (or inject failures) while a cache owns another clone. Useful for embedding
/// applications that already hold their reference data and for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    shared: Arc<Mutex<Shared>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, kind: EntityKind, rows: Vec<SourceRow>) -> Self {
        self.set_rows(kind, rows);
        self
    }

    /// Replace the rows served for `kind` from the next fetch on
    pub fn set_rows(&self, kind: EntityKind, rows: Vec<SourceRow>) {
        self.lock().kinds[kind.index()].rows = rows;
    }

    /// Make the next `count` fetches of `kind` fail
    pub fn fail_next(&self, kind: EntityKind, count: u32) {
        self.lock().kinds[kind.index()].pending_failures = count;
    }

    /// Sleep this long inside every fetch, simulating a slow backing store
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// Sleep this long inside fetches of `kind` only
    pub fn set_kind_delay(&self, kind: EntityKind, delay: Duration) {
        self.lock().kinds[kind.index()].delay = Some(delay);
    }

    /// Number of fetches attempted for `kind`, failed ones included
    pub fn fetch_count(&self, kind: EntityKind) -> u32 {
        self.lock().kinds[kind.index()].fetches
    }

    /// Highest number of fetches of `kind` seen running at the same time
    pub fn max_concurrent_fetches(&self, kind: EntityKind) -> u32 {
        self.lock().kinds[kind.index()].max_active
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReferenceSource for InMemorySource {
    fn open_session(&self) -> Result<Box<dyn ReferenceSession>, SourceError> {
        Ok(Box::new(InMemorySession {
            source: self.clone(),
        }))
    }
}

struct InMemorySession {
    source: InMemorySource,
}

impl InMemorySession {
    fn fetch_kind(&mut self, kind: EntityKind) -> Result<Vec<SourceRow>, SourceError> {
        let (delay, outcome) = {
            let mut shared = self.source.lock();
            let default_delay = shared.delay;
            let slot = &mut shared.kinds[kind.index()];
            let delay = slot.delay.unwrap_or(default_delay);
            slot.fetches += 1;
            slot.active += 1;
            slot.max_active = slot.max_active.max(slot.active);
            let outcome = if slot.pending_failures > 0 {
                slot.pending_failures -= 1;
                Err(SourceError::Query {
                    kind,
                    message: "injected failure".to_string(),
                })
            } else {
                Ok(slot.rows.clone())
            };
            (delay, outcome)
        };

        // Sleep outside the lock so concurrent sessions stay independent
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.source.lock().kinds[kind.index()].active -= 1;
        outcome
    }
}

impl ReferenceSession for InMemorySession {
    fn fetch_rooms(&mut self) -> Result<Vec<SourceRow>, SourceError> {
        self.fetch_kind(EntityKind::Room)
    }

    fn fetch_lines(&mut self) -> Result<Vec<SourceRow>, SourceError> {
        self.fetch_kind(EntityKind::Line)
    }

    fn fetch_manufacturers(&mut self) -> Result<Vec<SourceRow>, SourceError> {
        self.fetch_kind(EntityKind::Manufacturer)
    }

    fn fetch_types(&mut self) -> Result<Vec<SourceRow>, SourceError> {
        self.fetch_kind(EntityKind::Type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serves_rows_per_kind() {
        let source = InMemorySource::new()
            .with_rows(EntityKind::Room, vec![SourceRow::new(1, "Lab")])
            .with_rows(EntityKind::Type, vec![SourceRow::new(2, "Pump")]);
        let mut session = source.open_session().unwrap();

        assert_eq!(session.fetch_rooms().unwrap(), vec![SourceRow::new(1, "Lab")]);
        assert!(session.fetch_lines().unwrap().is_empty());
        assert_eq!(session.fetch_types().unwrap()[0].id, 2);
    }

    #[test]
    fn test_injected_failures_are_consumed() {
        let source = InMemorySource::new().with_rows(EntityKind::Line, vec![SourceRow::new(1, "L1")]);
        source.fail_next(EntityKind::Line, 2);
        let mut session = source.open_session().unwrap();

        assert!(session.fetch_lines().is_err());
        assert!(session.fetch_lines().is_err());
        assert_eq!(session.fetch_lines().unwrap().len(), 1);
        assert_eq!(source.fetch_count(EntityKind::Line), 3);
        assert_eq!(source.fetch_count(EntityKind::Room), 0);
    }

    #[test]
    fn test_clones_share_rows() {
        let source = InMemorySource::new();
        let handle = source.clone();
        handle.set_rows(EntityKind::Manufacturer, vec![SourceRow::new(9, "Acme")]);

        let mut session = source.open_session().unwrap();
        assert_eq!(session.fetch_manufacturers().unwrap()[0].id, 9);
    }
}
