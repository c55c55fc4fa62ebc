//! Error types for epochgrid
//!
//! Every failure is terminal for the operation in progress and carries the
//! offending names/values so callers can diagnose without re-running.

use crate::table::Key;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// epochgrid error types
#[derive(Error, Debug)]
pub enum Error {
    /// A required identifying column (time or epoch id) is absent
    #[error("'{name}' must be present in the epochs table as a column")]
    MissingIndexColumn {
        /// Name of the absent column
        name: String,
    },

    /// An identifying column has a type that cannot serve as a key
    #[error("column '{name}' has type {actual}, but key columns must be integer or string")]
    KeyType {
        /// Name of the offending column
        name: String,
        /// Actual column type
        actual: &'static str,
    },

    /// Requested channels missing from the table columns
    #[error("channels should all be present in the epochs table, the following are missing: {missing:?}")]
    MissingChannels {
        /// The missing channel names
        missing: Vec<String>,
    },

    /// The channel list is empty
    #[error("channel list must not be empty")]
    EmptyChannelList,

    /// The epochs table has no rows
    #[error("epochs table must not be empty")]
    EmptyTable,

    /// Table columns disagree in length
    #[error("column '{name}' has {actual} rows, expected {expected}")]
    ColumnLength {
        /// Name of the offending column
        name: String,
        /// Row count shared by the other columns
        expected: usize,
        /// Row count of this column
        actual: usize,
    },

    /// A column has the wrong type for the requested operation
    #[error("column '{name}' has type {actual}, expected {expected}")]
    ColumnType {
        /// Name of the offending column
        name: String,
        /// Expected column type
        expected: &'static str,
        /// Actual column type
        actual: &'static str,
    },

    /// Time partitions disagree on their epoch-id index
    #[error(
        "snapshot {time} differs from previous snapshot in epoch index:\n\
         current snapshot's indices:\n{current}\n\
         previous snapshot's indices:\n{previous}"
    )]
    MisalignedSnapshot {
        /// Time key of the offending partition
        time: Key,
        /// Epoch-id listing of the offending partition
        current: String,
        /// Epoch-id listing of the preceding partition
        previous: String,
    },

    /// Duplicate epoch ids within a single time partition
    #[error("duplicate values in epoch index not allowed: {dupes}")]
    DuplicateEpochIds {
        /// Listing of the duplicated epoch ids
        dupes: String,
    },

    /// The fitting callable failed for one (time, channel) cell
    #[error("model fit failed at time {time}, channel '{channel}': {source}")]
    Fit {
        /// Time key of the failing cell
        time: Key,
        /// Channel of the failing cell
        channel: String,
        /// The callable's error, verbatim
        source: Box<Error>,
    },

    /// A fitted-model cell does not expose the requested attribute
    #[error("attribute '{attr}' not available on {kind} result at time {time}, channel '{channel}'")]
    MissingAttribute {
        /// The requested attribute name
        attr: String,
        /// Time key of the offending cell
        time: Key,
        /// Channel of the offending cell
        channel: String,
        /// Kind tag of the cell's fitted-model object
        kind: String,
    },

    /// Malformed model formula
    #[error("formula error: {0}")]
    Formula(String),

    /// Numerical failure inside the built-in solver
    #[error("numerical failure: {0}")]
    Numeric(String),

    /// Worker pool construction failed
    #[error("worker pool error: {0}")]
    WorkerPool(String),

    /// Table loading error (Parquet/IPC)
    #[error("storage error: {0}")]
    Storage(String),

    /// Persisted grid file is malformed
    #[error("persisted grid error: {0}")]
    Persist(String),

    /// Persisted grid was written by an incompatible format version
    #[error("grid file has format version {found}, this build reads version {supported}")]
    UnsupportedFormatVersion {
        /// Version found in the file
        found: u32,
        /// Version this build supports
        supported: u32,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error, available to user-supplied fitting callables
    #[error("{0}")]
    Other(String),
}
