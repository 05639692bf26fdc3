//! Error types for catalog operations.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::search::model::EncoderModel;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Catalog errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Parenting `label` under `parent` would make the tag its own ancestor.
    #[error("tag '{label}' cannot be placed under '{parent}': would create a cycle")]
    Cycle { label: String, parent: String },

    /// Referenced tag does not exist.
    #[error("unknown tag: {0}")]
    UnknownTag(String),

    /// Tag label already taken.
    #[error("tag already exists: {0}")]
    DuplicateTag(String),

    /// Tag still has children or file labels.
    #[error("tag '{label}' is in use ({children} child tags, {labels} file labels)")]
    TagInUse {
        label: String,
        children: usize,
        labels: usize,
    },

    #[error("invalid confidence floor {floor} for tag '{label}' (expected 0.0..=1.0)")]
    InvalidConfidenceFloor { label: String, floor: f32 },

    /// File id and hash disagree with what the catalog already recorded.
    #[error(
        "file identity mismatch: ({file_id}, {file_hash}) conflicts with recorded ({recorded_id}, {recorded_hash})"
    )]
    IdentityMismatch {
        file_id: i64,
        file_hash: String,
        recorded_id: i64,
        recorded_hash: String,
    },

    #[error("unknown file: {0}")]
    UnknownFile(String),

    #[error("invalid file hash: {0:?}")]
    InvalidHash(String),

    #[error("unknown embedding model: {0}")]
    UnknownModel(String),

    /// Vector length does not match the model's dimensionality.
    #[error("dimension mismatch for {model}: expected {expected}, got {actual}")]
    DimensionMismatch {
        model: EncoderModel,
        expected: usize,
        actual: usize,
    },

    #[error("vector contains non-finite values")]
    NonFiniteVector,

    #[error("no {model} embedding stored for file {file_hash}")]
    MissingEmbedding {
        file_hash: String,
        model: EncoderModel,
    },

    /// External encoder failed to produce a vector.
    #[error("{model} encoder failed: {message}")]
    Encoder {
        model: EncoderModel,
        message: String,
    },

    /// Evaluation needs at least one recompute run for the model.
    #[error("no {0} prototype run to evaluate")]
    NoPrototypeRun(EncoderModel),

    /// Unparseable enum-like column value (label source, split).
    #[error("invalid {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    /// Store lock could not be acquired within the configured timeout.
    #[error("store operation timed out: {0}")]
    Timeout(#[source] rusqlite::Error),

    /// Store could not be reached (open or I/O failure).
    #[error("store unavailable: {0}")]
    Unavailable(#[source] rusqlite::Error),

    #[error("store error: {0}")]
    Store(#[source] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("index snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the caller may retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Unavailable(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => Some(failure.code),
            _ => None,
        };

        match code {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => Error::Timeout(err),
            Some(ErrorCode::CannotOpen) | Some(ErrorCode::SystemIoFailure) => {
                Error::Unavailable(err)
            }
            _ => Error::Store(err),
        }
    }
}
