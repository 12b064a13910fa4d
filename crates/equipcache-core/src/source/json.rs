use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::{ReferenceSession, ReferenceSource};
use crate::error::SourceError;
use crate::models::SourceRow;

/// On-disk shape of a reference dataset. Missing sections are empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Dataset {
    rooms: Vec<SourceRow>,
    lines: Vec<SourceRow>,
    manufacturers: Vec<SourceRow>,
    types: Vec<SourceRow>,
}

/// Source backed by a JSON file.
///
/// Every session re-reads the file, so a reload picks up edits made since the
/// previous pass.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReferenceSource for JsonFileSource {
    fn open_session(&self) -> Result<Box<dyn ReferenceSession>, SourceError> {
        if !self.path.exists() {
            return Err(SourceError::Unavailable(format!(
                "dataset file not found: {}",
                self.path.display()
            )));
        }
        Ok(Box::new(JsonFileSession {
            path: self.path.clone(),
        }))
    }
}

struct JsonFileSession {
    path: PathBuf,
}

impl JsonFileSession {
    fn read(&self) -> Result<Dataset, SourceError> {
        let contents = std::fs::read_to_string(&self.path)?;
        let dataset: Dataset = serde_json::from_str(&contents)?;
        debug!(path = %self.path.display(), "Reference dataset read");
        Ok(dataset)
    }
}

impl ReferenceSession for JsonFileSession {
    fn fetch_rooms(&mut self) -> Result<Vec<SourceRow>, SourceError> {
        Ok(self.read()?.rooms)
    }

    fn fetch_lines(&mut self) -> Result<Vec<SourceRow>, SourceError> {
        Ok(self.read()?.lines)
    }

    fn fetch_manufacturers(&mut self) -> Result<Vec<SourceRow>, SourceError> {
        Ok(self.read()?.manufacturers)
    }

    fn fetch_types(&mut self) -> Result<Vec<SourceRow>, SourceError> {
        Ok(self.read()?.types)
    }
}
