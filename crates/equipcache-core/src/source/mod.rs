//! Boundary to the backing store.
//!
//! The cache never talks to a database driver directly. It asks a
//! `ReferenceSource` for a fresh `ReferenceSession` per load, and each loader
//! owns its session exclusively for the duration of one fetch.
//!
//! Two sources ship with the crate:
//! - `JsonFileSource`: reads a JSON document from disk on every session
//! - `InMemorySource`: rows held in memory, replaceable at runtime

pub mod json;
pub mod memory;

pub use json::JsonFileSource;
pub use memory::InMemorySource;

use crate::error::SourceError;
use crate::models::{EntityKind, SourceRow};

/// Synchronous request/response data-access session.
///
/// Methods take `&mut self`: a session serves one loader at a time.
pub trait ReferenceSession: Send {
    fn fetch_rooms(&mut self) -> Result<Vec<SourceRow>, SourceError>;

    fn fetch_lines(&mut self) -> Result<Vec<SourceRow>, SourceError>;

    fn fetch_manufacturers(&mut self) -> Result<Vec<SourceRow>, SourceError>;

    fn fetch_types(&mut self) -> Result<Vec<SourceRow>, SourceError>;

    /// Fetch all rows for `kind`
    fn fetch(&mut self, kind: EntityKind) -> Result<Vec<SourceRow>, SourceError> {
        match kind {
            EntityKind::Room => self.fetch_rooms(),
            EntityKind::Line => self.fetch_lines(),
            EntityKind::Manufacturer => self.fetch_manufacturers(),
            EntityKind::Type => self.fetch_types(),
        }
    }
}

/// Factory for backing-store sessions, shared by all loaders.
pub trait ReferenceSource: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn ReferenceSession>, SourceError>;
}
