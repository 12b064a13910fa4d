//! Data models for equipment reference data.
//!
//! This module contains the record types held by the cache:
//!
//! - `EntityKind`: the four kinds of reference data
//! - `RoomRecord`, `LineRecord`: records carrying a location
//! - `ManufacturerRecord`, `TypeRecord`: flat id/name records
//! - `SourceRow`: the raw row shape returned by the backing store

pub mod kind;
pub mod records;

pub use kind::EntityKind;
pub use records::{LineRecord, ManufacturerRecord, Record, RoomRecord, SourceRow, TypeRecord};
