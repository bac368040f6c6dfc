use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Database error: {0}")]
    Database(#[from] rocksdb::Error),

    #[error("Missing column family '{0}' in store")]
    MissingColumnFamily(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Corrupt record in '{partition}' at key {key}: {reason}")]
    CorruptRecord { partition: &'static str, key: String, reason: String },

    #[error("Unsupported content type for {source_name}: {detected}")]
    UnsupportedContent { source_name: String, detected: String },

    #[error("K-mer size mismatch: shard {shard} was built with k={found}, expected k={expected}")]
    KsizeMismatch { shard: usize, expected: u32, found: u32 },

    #[error("No shard found in database directory {0}")]
    EmptyDatabase(String),

    #[error("Worker thread panicked: {0}")]
    WorkerPanicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Configuration error: {field} - {message}")]
    ConfigurationError { field: String, message: String },
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Extension trait for Result to add context
pub trait IndexResultExt<T> {
    /// Add context to an error
    fn with_context<F>(self, f: F) -> IndexResult<T>
    where
        F: FnOnce() -> String;

    /// Add context with a field name
    fn with_field_context(self, field: &str, message: &str) -> IndexResult<T>;
}

impl<T, E> IndexResultExt<T> for Result<T, E>
where
    E: Into<IndexError>,
{
    fn with_context<F>(self, f: F) -> IndexResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context = f();
            match e.into() {
                IndexError::ValidationError { message } => {
                    IndexError::ValidationError { message: format!("{}: {}", context, message) }
                }
                // Keep storage failures typed so callers can still tell them apart
                IndexError::Database(err) => IndexError::Database(err),
                other => IndexError::ValidationError { message: format!("{}: {}", context, other) },
            }
        })
    }

    fn with_field_context(self, field: &str, message: &str) -> IndexResult<T> {
        self.map_err(|e| IndexError::ConfigurationError {
            field: field.to_string(),
            message: format!("{}: {}", message, e.into()),
        })
    }
}

impl IndexError {
    /// Convenience constructor for decode failures of stored records
    pub fn corrupt(partition: &'static str, key: &[u8], reason: impl ToString) -> Self {
        IndexError::CorruptRecord {
            partition,
            key: key.iter().map(|b| format!("{:02x}", b)).collect(),
            reason: reason.to_string(),
        }
    }
}
