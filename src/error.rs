// src/error.rs

use std::path::PathBuf;

use crate::db::{StoreError, StoreErrorKind};

/// Everything that can go wrong while importing a census release.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// A file name or record did not match its declared layout.
    #[error("format error in `{input}`: {reason}")]
    Format { input: String, reason: String },

    /// Lookup metadata references a table without header information.
    #[error("metadata inconsistency for table `{table_id}`: {reason}")]
    MetadataInconsistency { table_id: String, reason: String },

    /// A non-duplicate persistence failure.
    #[error("failed to load table `{table}`: {source}")]
    Load {
        table: String,
        #[source]
        source: StoreError,
    },

    /// A duplicate primary key hit during a row-by-row load.
    #[error("duplicate key in table `{table}`: {source}")]
    DuplicateKey {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type ImportResult<T> = Result<T, ImportError>;

impl ImportError {
    pub fn format(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Format {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn inconsistent(table_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MetadataInconsistency {
            table_id: table_id.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify a store failure for `table`: duplicate keys stay
    /// distinguishable, everything else is a load error.
    pub fn from_store(table: &str, source: StoreError) -> Self {
        match source.kind {
            StoreErrorKind::DuplicateKey => Self::DuplicateKey {
                table: table.to_string(),
                source,
            },
            _ => Self::Load {
                table: table.to_string(),
                source,
            },
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

impl From<StoreError> for ImportError {
    fn from(source: StoreError) -> Self {
        Self::Load {
            table: source.table.clone().unwrap_or_default(),
            source,
        }
    }
}
