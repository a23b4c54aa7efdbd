//! Error types of the file snapshot store.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::dao::{models::UnsupportedSchema, storage::StorageError};

/// Convenient result alias returning [`FileDaoError`] failures.
pub type FileResult<T> = Result<T, FileDaoError>;

/// Failures that can occur while reading or writing snapshot files.
#[derive(Debug, Error)]
pub enum FileDaoError {
    /// The data directory could not be created.
    #[error("failed to create data directory `{path}`")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Writing or syncing a temporary file failed.
    #[error("failed to write `{path}`")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Moving a temporary file over its target failed.
    #[error("failed to move `{from}` to `{to}`")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Reading a document failed for another reason than absence.
    #[error("failed to read `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A document could not be encoded.
    #[error("failed to encode {document}")]
    Serialize {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// A document on disk is not valid JSON for its layout.
    #[error("failed to decode `{path}`")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The documents were written by a newer server.
    #[error(transparent)]
    Schema(#[from] UnsupportedSchema),
}

impl From<FileDaoError> for StorageError {
    fn from(err: FileDaoError) -> Self {
        let message = err.to_string();
        match err {
            FileDaoError::Deserialize { .. } | FileDaoError::Schema(_) => {
                StorageError::corrupt(message, err)
            }
            other => StorageError::unavailable(message, other),
        }
    }
}
