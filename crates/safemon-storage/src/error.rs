/// Failures raised by the domain registry and the scan history.
///
/// # Examples
///
/// ```rust
/// use safemon_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "category",
///     id: "42".to_string(),
/// };
/// assert!(err.to_string().contains("category"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No row with the given id.
    #[error("Storage: no {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    /// The caller supplied a value the registry refuses to store.
    #[error("Storage: invalid input: {0}")]
    Invalid(String),

    /// An underlying SQLite error, including append-only trigger aborts.
    #[error("Storage: database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failure (threats / raw_response columns).
    #[error("Storage: bad JSON column: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem failure while preparing the data directory.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage: {0}")]
    Other(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StorageError>;
