//! Load state of each kind and the overall readiness derived from them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadState {
    #[default]
    NotStarted,
    InProgress,
    Succeeded,
    Failed,
}

impl LoadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadState::Succeeded | LoadState::Failed)
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadState::NotStarted => "not started",
            LoadState::InProgress => "loading",
            LoadState::Succeeded => "ready",
            LoadState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Readiness of the whole cache. Always derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OverallState {
    Loading,
    Ready,
    Failed,
}

impl OverallState {
    /// Ready iff every kind succeeded; Failed iff some kind failed and none is
    /// still in progress; Loading otherwise.
    pub fn derive(states: &[LoadState]) -> Self {
        if states.iter().all(|s| *s == LoadState::Succeeded) {
            OverallState::Ready
        } else if states.contains(&LoadState::Failed) && !states.contains(&LoadState::InProgress) {
            OverallState::Failed
        } else {
            OverallState::Loading
        }
    }
}

impl fmt::Display for OverallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallState::Loading => "loading",
            OverallState::Ready => "ready",
            OverallState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of one kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindStatus {
    pub kind: EntityKind,
    pub state: LoadState,
    pub last_error: Option<String>,
    pub record_count: usize,
    pub loaded_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of the whole cache, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub overall: OverallState,
    pub kinds: Vec<KindStatus>,
    /// Population passes started since construction (or the last shutdown)
    pub pass_count: u64,
}

impl CacheStatus {
    pub fn kind(&self, kind: EntityKind) -> Option<&KindStatus> {
        self.kinds.iter().find(|k| k.kind == kind)
    }

    pub fn failed_kinds(&self) -> Vec<EntityKind> {
        self.kinds
            .iter()
            .filter(|k| k.state == LoadState::Failed)
            .map(|k| k.kind)
            .collect()
    }
}
