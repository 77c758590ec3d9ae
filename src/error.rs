use thiserror::Error;

// ---------------------------------------------------------------------------
// ModelError
// ---------------------------------------------------------------------------

/// Model-descriptor validation failure. Surfaced when a model is registered,
/// never at call time — a model that fails validation is simply not
/// registered.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model \"{model}\" has no primary key field")]
    MissingPrimaryKey { model: String },

    #[error("Model \"{model}\" declares more than one primary key field")]
    MultiplePrimaryKeys { model: String },

    #[error("Invalid field name \"{field}\" on model \"{model}\"")]
    InvalidFieldName { model: String, field: String },

    #[error("The last modified field \"{field}\" on model \"{model}\" is not a DATE field")]
    LastModifiedNotDate { model: String, field: String },

    #[error("The deleted field \"{field}\" on model \"{model}\" is not a BOOLEAN field")]
    DeletedNotBoolean { model: String, field: String },

    #[error("Invalid association \"{alias}\" on model \"{model}\": {reason}")]
    InvalidAssociation {
        model: String,
        alias: String,
        reason: String,
    },

    #[error("Model \"{model}\" was rejected by the adapter's validation hook")]
    RejectedByAdapter { model: String },
}

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

/// Failure raised by a storage service primitive. The adapter engine catches
/// these at the point of origin and wraps them into a rejected
/// `AdapterResponse`; they never escape the engine's public operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Record not found: {source_name}/{pk}")]
    NotFound { source_name: String, pk: String },

    #[error("Transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        StorageError::Backend(message.into())
    }
}

/// Convenience alias for storage-service results.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
