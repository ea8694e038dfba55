//! Configuration for the persistence layer.
//!
//! Every section deserializes with serde and falls back to sensible defaults
//! for missing fields, so a partial JSON or TOML document is enough:
//!
//! ```
//! use dicom_persistence::config::DicomPersistenceConfig;
//!
//! let config: DicomPersistenceConfig = serde_json::from_str(
//!     r#"{ "features": { "enableExtendedQueryTags": true } }"#,
//! ).unwrap();
//! assert!(config.features.enable_extended_query_tags);
//! assert_eq!(config.query.max_query_result_count, 200);
//! config.validate().unwrap();
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Feature switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureConfig {
    /// Index and query user-registered attributes.
    pub enable_extended_query_tags: bool,

    /// Scope every operation by a partition key taken from the request.
    pub enable_data_partitions: bool,

    /// Allow export operations.
    pub enable_export: bool,
}

/// Result size limits for queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLimits {
    /// Largest limit a caller may request.
    #[serde(default = "default_max_query_result_count")]
    pub max_query_result_count: u32,

    /// Limit used when the requested one is out of range.
    #[serde(default = "default_query_result_count")]
    pub default_query_result_count: u32,
}

fn default_max_query_result_count() -> u32 {
    200
}

fn default_query_result_count() -> u32 {
    100
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_query_result_count: default_max_query_result_count(),
            default_query_result_count: default_query_result_count(),
        }
    }
}

/// Configuration for the SQLite index store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqliteIndexConfig {
    /// Database file, or `:memory:`.
    #[serde(default = "default_sqlite_path")]
    pub path: String,

    /// Maximum number of pooled connections. In-memory databases always use one.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for file databases.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Schema version to create or migrate to. Versions below 2 have no
    /// partition columns.
    #[serde(default = "default_schema_version")]
    pub schema_version: i32,
}

fn default_sqlite_path() -> String {
    ":memory:".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_schema_version() -> i32 {
    2
}

impl Default for SqliteIndexConfig {
    fn default() -> Self {
        Self {
            path: default_sqlite_path(),
            max_connections: default_max_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            schema_version: default_schema_version(),
        }
    }
}

/// Configuration for the document metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStoreConfig {
    /// Account endpoint.
    #[serde(default)]
    pub endpoint_uri: String,

    /// Account key.
    #[serde(default)]
    pub primary_key: String,

    /// Database holding the container.
    #[serde(default = "default_database_id")]
    pub database_id: String,

    /// Container holding instance documents.
    #[serde(default = "default_container_id")]
    pub container_id: String,

    /// Page size requested from the container.
    #[serde(default = "default_max_item_count")]
    pub max_item_count: u32,
}

fn default_database_id() -> String {
    "dicom".to_string()
}

fn default_container_id() -> String {
    "instances".to_string()
}

fn default_max_item_count() -> u32 {
    100
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            endpoint_uri: String::new(),
            primary_key: String::new(),
            database_id: default_database_id(),
            container_id: default_container_id(),
            max_item_count: default_max_item_count(),
        }
    }
}

/// Configuration for the delete service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteConfig {
    /// Identifiers deleted concurrently. 1 deletes one at a time.
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
}

fn default_concurrency() -> usize {
    1
}

impl Default for DeleteConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_concurrency(),
        }
    }
}

/// Configuration for the export service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportConfig {
    /// Prefix for secret names holding destination credentials.
    #[serde(default = "default_secret_prefix")]
    pub secret_prefix: String,

    /// Files copied concurrently.
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
}

fn default_secret_prefix() -> String {
    "export".to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            secret_prefix: default_secret_prefix(),
            max_concurrency: default_concurrency(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DicomPersistenceConfig {
    /// Feature switches.
    pub features: FeatureConfig,
    /// Query limits.
    pub query: QueryLimits,
    /// SQLite index store.
    pub sqlite: SqliteIndexConfig,
    /// Document store.
    pub document: DocumentStoreConfig,
    /// Delete service.
    pub delete: DeleteConfig,
    /// Export service.
    pub export: ExportConfig,
}

impl DicomPersistenceConfig {
    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |message: String| Err(ValidationError::InvalidConfiguration { message });

        if self.query.max_query_result_count == 0 {
            return invalid("maxQueryResultCount must be positive".to_string());
        }
        if self.query.default_query_result_count == 0
            || self.query.default_query_result_count > self.query.max_query_result_count
        {
            return invalid(format!(
                "defaultQueryResultCount must be within 1..={}",
                self.query.max_query_result_count
            ));
        }
        if self.sqlite.max_connections == 0 {
            return invalid("sqlite.maxConnections must be positive".to_string());
        }
        if !(1..=2).contains(&self.sqlite.schema_version) {
            return invalid(format!(
                "unsupported sqlite schema version {}",
                self.sqlite.schema_version
            ));
        }
        if self.features.enable_data_partitions && self.sqlite.schema_version < 2 {
            return invalid("data partitions need sqlite schema version 2".to_string());
        }
        if self.document.max_item_count == 0 {
            return invalid("document.maxItemCount must be positive".to_string());
        }
        if self.delete.max_concurrency == 0 || self.export.max_concurrency == 0 {
            return invalid("maxConcurrency must be positive".to_string());
        }
        Ok(())
    }
}
