//! Crate-wide error type.
//!
//! Per-file problems (`Parse`, `UnsupportedLanguage`, `Io`) are local to one
//! file and are skipped by batch callers. `Store` is surfaced to whoever started the batch
//! or query and is never retried here.

use thiserror::Error;

use crate::embedder::EmbedderError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("store unavailable: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("embedding failed: {0}")]
    Embedder(#[from] EmbedderError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn parse(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error only concerns a single source file.
    #[must_use]
    pub fn is_file_local(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::UnsupportedLanguage(_) | Self::Io(_)
        )
    }
}
