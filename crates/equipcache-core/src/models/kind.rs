use std::fmt;

use serde::{Deserialize, Serialize};

/// The kinds of reference data held by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Room,
    Line,
    Manufacturer,
    Type,
}

impl EntityKind {
    /// All kinds, in slot order
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Room,
        EntityKind::Line,
        EntityKind::Manufacturer,
        EntityKind::Type,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Room => "room",
            EntityKind::Line => "line",
            EntityKind::Manufacturer => "manufacturer",
            EntityKind::Type => "type",
        }
    }

    /// Human-readable plural used in status output
    pub fn display_name(&self) -> &'static str {
        match self {
            EntityKind::Room => "Rooms",
            EntityKind::Line => "Lines",
            EntityKind::Manufacturer => "Manufacturers",
            EntityKind::Type => "Types",
        }
    }

    /// Whether snapshots of this kind carry a location index
    pub fn has_location_index(&self) -> bool {
        matches!(self, EntityKind::Room | EntityKind::Line)
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            EntityKind::Room => 0,
            EntityKind::Line => 1,
            EntityKind::Manufacturer => 2,
            EntityKind::Type => 3,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
