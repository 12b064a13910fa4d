use serde::{Deserialize, Serialize};

use super::EntityKind;
use crate::error::LoadError;

/// A raw row as returned by the backing store for any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRow {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location_id: Option<i64>,
}

impl SourceRow {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: Some(name.to_string()),
            location_id: None,
        }
    }

    pub fn at_location(mut self, location_id: i64) -> Self {
        self.location_id = Some(location_id);
        self
    }
}

/// A typed record of one entity kind, built from a validated `SourceRow`.
pub trait Record: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn from_row(row: SourceRow, index: usize) -> Result<Self, LoadError>;

    fn id(&self) -> i64;

    fn name(&self) -> &str;

    /// Location used for the secondary index; `None` keeps the record out of it.
    fn location_id(&self) -> Option<i64> {
        None
    }
}

/// Check the fields every kind requires and return the trimmed name.
fn validated_name(kind: EntityKind, row: &SourceRow, index: usize) -> Result<String, LoadError> {
    if row.id <= 0 {
        return Err(LoadError::MalformedRow {
            kind,
            index,
            reason: format!("non-positive id {}", row.id),
        });
    }
    match row.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(LoadError::MalformedRow {
            kind,
            index,
            reason: format!("missing name for id {}", row.id),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub id: i64,
    pub name: String,
    pub location_id: Option<i64>,
}

impl Record for RoomRecord {
    const KIND: EntityKind = EntityKind::Room;

    fn from_row(row: SourceRow, index: usize) -> Result<Self, LoadError> {
        let name = validated_name(Self::KIND, &row, index)?;
        Ok(Self {
            id: row.id,
            name,
            location_id: row.location_id,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn location_id(&self) -> Option<i64> {
        self.location_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    pub id: i64,
    pub name: String,
    pub location_id: Option<i64>,
}

impl Record for LineRecord {
    const KIND: EntityKind = EntityKind::Line;

    fn from_row(row: SourceRow, index: usize) -> Result<Self, LoadError> {
        let name = validated_name(Self::KIND, &row, index)?;
        Ok(Self {
            id: row.id,
            name,
            location_id: row.location_id,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn location_id(&self) -> Option<i64> {
        self.location_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufacturerRecord {
    pub id: i64,
    pub name: String,
}

impl Record for ManufacturerRecord {
    const KIND: EntityKind = EntityKind::Manufacturer;

    fn from_row(row: SourceRow, index: usize) -> Result<Self, LoadError> {
        // Manufacturers have no location; a stray locationId is ignored
        let name = validated_name(Self::KIND, &row, index)?;
        Ok(Self { id: row.id, name })
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRecord {
    pub id: i64,
    pub name: String,
}

impl Record for TypeRecord {
    const KIND: EntityKind = EntityKind::Type;

    fn from_row(row: SourceRow, index: usize) -> Result<Self, LoadError> {
        let name = validated_name(Self::KIND, &row, index)?;
        Ok(Self { id: row.id, name })
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_row_deserialize_camel_case() {
        let row: SourceRow =
            serde_json::from_str(r#"{"id": 7, "name": "Clean Room", "locationId": 3}"#).unwrap();
        assert_eq!(row, SourceRow::new(7, "Clean Room").at_location(3));
    }

    #[test]
    fn test_source_row_optional_fields_default() {
        let row: SourceRow = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(row.name, None);
        assert_eq!(row.location_id, None);
    }

    #[test]
    fn test_room_from_row_keeps_location() {
        let room = RoomRecord::from_row(SourceRow::new(1, "Lab A").at_location(10), 0).unwrap();
        assert_eq!(room.location_id(), Some(10));
        assert_eq!(room.name(), "Lab A");
    }

    #[test]
    fn test_name_is_trimmed() {
        let line = LineRecord::from_row(SourceRow::new(2, "  Line 2  "), 0).unwrap();
        assert_eq!(line.name, "Line 2");
    }

    #[test]
    fn test_manufacturer_ignores_location() {
        let m = ManufacturerRecord::from_row(SourceRow::new(3, "Acme").at_location(9), 0).unwrap();
        assert_eq!(m.location_id(), None);
    }

    #[test]
    fn test_blank_name_is_malformed() {
        let err = TypeRecord::from_row(SourceRow::new(4, "   "), 12).unwrap_err();
        match err {
            LoadError::MalformedRow { kind, index, .. } => {
                assert_eq!(kind, EntityKind::Type);
                assert_eq!(index, 12);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_name_is_malformed() {
        let row = SourceRow {
            id: 5,
            name: None,
            location_id: None,
        };
        assert!(RoomRecord::from_row(row, 0).is_err());
    }

    #[test]
    fn test_non_positive_id_is_malformed() {
        assert!(LineRecord::from_row(SourceRow::new(0, "Zero"), 0).is_err());
        assert!(LineRecord::from_row(SourceRow::new(-1, "Negative"), 0).is_err());
    }
}
