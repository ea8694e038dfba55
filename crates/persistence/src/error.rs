//! Error types for the persistence layer.
//!
//! This module defines all error types used throughout the crate, following a
//! hierarchy that separates resource lookups, query translation, validation,
//! backend failures and export destination errors.
//!
//! Query translation failures ([`QueryError::UnmappedTag`] and
//! [`QueryError::UnsupportedCondition`]) indicate a caller defect and are
//! never worth retrying. See [`StorageError::is_fatal`].

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Resource state errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Query translation errors
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Export errors
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl StorageError {
    /// Returns true for errors that indicate a programming or configuration
    /// defect rather than a transient condition.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StorageError::Query(QueryError::UnmappedTag { .. })
                | StorageError::Query(QueryError::UnsupportedCondition { .. })
                | StorageError::Validation(ValidationError::InvalidConfiguration { .. })
        )
    }

    /// Returns true if the error reports a missing item, including an
    /// exactly-one lookup that matched nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::Resource(ResourceError::NotFound { .. })
                | StorageError::Resource(ResourceError::ExpectedExactlyOne { found: 0, .. })
        )
    }
}

/// Errors related to stored items.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The item was not found.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// A lookup that must match exactly one item matched a different number.
    #[error("Expected List to contain exactly one item with id {id}, found {found}")]
    ExpectedExactlyOne { id: String, found: usize },

    /// The item already exists.
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: String, id: String },
}

/// Errors raised while translating filter conditions into a storage query.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The backend cannot express this condition.
    #[error("condition '{condition}' is not supported by the {backend} backend")]
    UnsupportedCondition { backend: String, condition: String },

    /// The tag has no physical mapping in the backend.
    #[error("tag {tag} is not mapped to a queryable column")]
    UnmappedTag { tag: String },

    /// The tag is not queryable at all.
    #[error("tag {tag} is not a supported query tag")]
    UnknownQueryTag { tag: String },

    /// A raw filter value does not fit the tag's value representation.
    #[error("invalid value '{value}' for tag {tag}: {message}")]
    InvalidValue {
        tag: String,
        value: String,
        message: String,
    },
}

/// Errors related to caller-supplied input or configuration.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// An identifier (UID, partition key) is malformed.
    #[error("invalid {field} '{value}': {message}")]
    InvalidIdentifier {
        field: String,
        value: String,
        message: String,
    },

    /// An export source path could not be parsed.
    #[error("invalid export source '{value}': {message}")]
    InvalidExportSource { value: String, message: String },

    /// Configuration is inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The operation depends on a feature flag that is switched off.
    #[error("feature '{feature}' is disabled")]
    FeatureDisabled { feature: String },
}

/// Backend-specific errors.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is not available.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// Schema migration error.
    #[error("schema migration failed: {message}")]
    MigrationError { message: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Errors related to export destinations.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The destination rejected or failed a write.
    #[error("export destination '{destination}' failed: {message}")]
    Destination {
        destination: String,
        message: String,
    },

    /// A destination secret could not be stored or read.
    #[error("secret '{name}' unavailable: {message}")]
    Secret { name: String, message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Builds an internal backend error without a source.
pub(crate) fn internal_error(backend_name: &str, message: impl Into<String>) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: backend_name.to_string(),
        message: message.into(),
        source: None,
    })
}

// Implement conversions from common error types

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => {
                StorageError::Resource(ResourceError::NotFound {
                    kind: "file".to_string(),
                    id: path,
                })
            }
            other => StorageError::Backend(BackendError::Internal {
                backend_name: "object_store".to_string(),
                message: other.to_string(),
                source: Some(Box::new(other)),
            }),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_exactly_one_display() {
        let err = StorageError::Resource(ResourceError::ExpectedExactlyOne {
            id: "1.2_3.4_5.6_1_1".to_string(),
            found: 0,
        });
        assert_eq!(
            err.to_string(),
            "Expected List to contain exactly one item with id 1.2_3.4_5.6_1_1, found 0"
        );
    }

    #[test]
    fn test_query_errors_are_fatal() {
        let unmapped = StorageError::Query(QueryError::UnmappedTag {
            tag: "(0010,0040)".to_string(),
        });
        assert!(unmapped.is_fatal());

        let unsupported = StorageError::Query(QueryError::UnsupportedCondition {
            backend: "document".to_string(),
            condition: "LongRangeValueMatch".to_string(),
        });
        assert!(unsupported.is_fatal());
        assert!(unsupported.to_string().contains("document"));
    }

    #[test]
    fn test_backend_errors_are_not_fatal() {
        let err = internal_error("sqlite", "disk I/O error");
        assert!(!err.is_fatal());
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "internal error in sqlite: disk I/O error");
    }

    #[test]
    fn test_object_store_not_found_maps_to_resource() {
        let err: StorageError = object_store::Error::NotFound {
            path: "a/b/c.dcm".to_string(),
            source: "missing".into(),
        }
        .into();
        assert!(err.is_not_found());
    }
}
