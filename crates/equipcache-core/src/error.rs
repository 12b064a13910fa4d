use thiserror::Error;

use crate::models::EntityKind;

/// Failures raised by the backing store's data-access layer.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    #[error("Query for {kind} failed: {message}")]
    Query { kind: EntityKind, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure of one load attempt for one entity kind.
///
/// Every variant is treated as transient by the retry executor; a kind only
/// becomes terminally failed once the attempt budget is spent.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Malformed {kind} row at index {index}: {reason}")]
    MalformedRow {
        kind: EntityKind,
        index: usize,
        reason: String,
    },

    #[error("Load panicked: {0}")]
    Panicked(String),
}

/// Errors from constructing or configuring a cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("No tokio runtime available - create the cache inside a runtime or pass a handle")]
    NoRuntime,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Maximum length of error text kept in load state
const MAX_ERROR_TEXT_LENGTH: usize = 500;

/// Truncate error text to avoid holding (and logging) huge driver messages
pub(crate) fn truncate_error(text: &str) -> String {
    if text.len() <= MAX_ERROR_TEXT_LENGTH {
        return text.to_string();
    }
    let mut end = MAX_ERROR_TEXT_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &text[..end], text.len())
}
