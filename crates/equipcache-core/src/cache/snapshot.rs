use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::LoadError;
use crate::models::Record;

/// Immutable list of the ids found at one location.
///
/// Backed by an `Arc<[i64]>`: cloning is a reference-count bump, and a view
/// stays valid after the kind is reloaded. It then describes the generation
/// that was current when it was obtained; query again for fresh data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationIds(Arc<[i64]>);

impl LocationIds {
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }
}

impl Default for LocationIds {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for LocationIds {
    type Target = [i64];

    fn deref(&self) -> &[i64] {
        &self.0
    }
}

impl From<Vec<i64>> for LocationIds {
    fn from(ids: Vec<i64>) -> Self {
        Self(ids.into())
    }
}

/// The complete result of one successful load of one kind.
#[derive(Debug, Clone)]
pub struct Snapshot<R> {
    records: HashMap<i64, R>,
    by_location: HashMap<i64, LocationIds>,
    loaded_at: Option<DateTime<Utc>>,
}

impl<R> Default for Snapshot<R> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            by_location: HashMap::new(),
            loaded_at: None,
        }
    }
}

impl<R: Record> Snapshot<R> {
    /// Build a snapshot from records in source order.
    ///
    /// Duplicate ids make the whole dataset malformed. Records without a
    /// location stay in the primary map but are left out of the index.
    pub fn build(records: Vec<R>) -> Result<Self, LoadError> {
        let mut by_id = HashMap::with_capacity(records.len());
        let mut grouped: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut seen = HashSet::with_capacity(records.len());

        for (index, record) in records.into_iter().enumerate() {
            let id = record.id();
            if !seen.insert(id) {
                return Err(LoadError::MalformedRow {
                    kind: R::KIND,
                    index,
                    reason: format!("duplicate id {}", id),
                });
            }
            if R::KIND.has_location_index() {
                if let Some(location_id) = record.location_id() {
                    grouped.entry(location_id).or_default().push(id);
                }
            }
            by_id.insert(id, record);
        }

        let by_location = grouped
            .into_iter()
            .map(|(location_id, ids)| (location_id, LocationIds::from(ids)))
            .collect();

        Ok(Self {
            records: by_id,
            by_location,
            loaded_at: Some(Utc::now()),
        })
    }

    pub fn get(&self, id: i64) -> Option<&R> {
        self.records.get(&id)
    }

    pub fn name_of(&self, id: i64) -> Option<&str> {
        self.records.get(&id).map(|r| r.name())
    }

    /// Ids at `location_id`, empty when the location is unknown
    pub fn ids_at(&self, location_id: i64) -> LocationIds {
        self.by_location
            .get(&location_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn locations(&self) -> impl Iterator<Item = i64> + '_ {
        self.by_location.keys().copied()
    }

}

impl<R> Snapshot<R> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `None` for the empty snapshot a kind starts with
    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn age_minutes(&self) -> Option<i64> {
        self.loaded_at.map(|at| (Utc::now() - at).num_minutes())
    }

    pub fn age_display(&self) -> String {
        match self.age_minutes() {
            None => "never".to_string(),
            Some(minutes) => format_age(minutes),
        }
    }
}

fn format_age(minutes: i64) -> String {
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}
