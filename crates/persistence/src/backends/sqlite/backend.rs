//! SQLite index store: connection pool and schema setup.

use std::fmt::Debug;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::{QueryLimits, SqliteIndexConfig};
use crate::error::{BackendError, StorageError, StorageResult};

use super::functions::register_functions;
use super::query::PARTITION_SCHEMA_VERSION;
use super::schema;

/// Index store backed by SQLite.
///
/// Implements [`InstanceStore`](crate::core::InstanceStore),
/// [`QueryStore`](crate::core::QueryStore),
/// [`IndexStore`](crate::core::IndexStore) and
/// [`ExtendedQueryTagStore`](crate::core::ExtendedQueryTagStore).
pub struct SqliteIndexStore {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteIndexConfig,
    limits: QueryLimits,
    is_memory: bool,
    schema_version: i32,
}

impl Debug for SqliteIndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndexStore")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}

impl SqliteIndexStore {
    /// Creates an in-memory store at the latest schema version.
    pub fn in_memory() -> StorageResult<Self> {
        Self::new(SqliteIndexConfig::default(), QueryLimits::default())
    }

    /// Opens the configured database and creates or migrates its schema.
    pub fn new(config: SqliteIndexConfig, limits: QueryLimits) -> StorageResult<Self> {
        let is_memory = config.path == ":memory:";
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms as u64);

        let manager = if is_memory {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(&config.path)
        }
        .with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            register_functions(conn)
        });

        // Every connection to ":memory:" is a separate database, so an
        // in-memory store keeps exactly one connection alive.
        let builder = if is_memory {
            Pool::builder()
                .max_size(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            Pool::builder().max_size(config.max_connections)
        };

        let pool = builder
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build(manager)
            .map_err(|e| {
                StorageError::Backend(BackendError::ConnectionFailed {
                    backend_name: "sqlite".to_string(),
                    message: e.to_string(),
                })
            })?;

        let mut store = Self {
            pool,
            config,
            limits,
            is_memory,
            schema_version: 0,
        };
        store.schema_version = store.init_schema()?;

        tracing::info!(
            path = %store.config.path,
            schema_version = store.schema_version,
            "Opened sqlite index store"
        );
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<i32> {
        let conn = self.get_connection()?;

        if self.config.enable_wal && !self.is_memory {
            conn.execute_batch("PRAGMA journal_mode = WAL;").map_err(|e| {
                StorageError::Backend(BackendError::Internal {
                    backend_name: "sqlite".to_string(),
                    message: format!("Failed to enable WAL mode: {}", e),
                    source: None,
                })
            })?;
        }

        schema::initialize_schema(&conn, self.config.schema_version)
    }

    /// Get a connection from the pool.
    pub(crate) fn get_connection(
        &self,
    ) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "sqlite".to_string(),
                message: e.to_string(),
            })
        })
    }

    /// Schema version the database is at.
    pub fn schema_version(&self) -> i32 {
        self.schema_version
    }

    /// Returns true once the schema has partition columns.
    pub fn supports_partitions(&self) -> bool {
        self.schema_version >= PARTITION_SCHEMA_VERSION
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &SqliteIndexConfig {
        &self.config
    }

    /// Query paging limits.
    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }
}
