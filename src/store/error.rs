use thiserror::Error;

/// Errors from the durable artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key or namespace does not exist.
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// The backend failed or was unreachable.
    #[error("Object store error on {key}: {source}")]
    Backend {
        key: String,
        source: object_store::Error,
    },

    #[error("Failed to initialize object store: {0}")]
    Init(#[source] object_store::Error),
}

impl StoreError {
    pub(crate) fn from_backend(key: &str, source: object_store::Error) -> Self {
        match source {
            object_store::Error::NotFound { .. } => Self::NotFound { key: key.into() },
            source => Self::Backend {
                key: key.into(),
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
