//! Secret storage for export destination credentials.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ExportError, StorageResult};

/// Reference to a stored secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretHandle {
    /// Name the secret was stored under.
    pub name: String,
    /// Version identifier assigned by the store.
    pub id: String,
    /// When the secret stops being readable, if ever.
    pub expires_on: Option<DateTime<Utc>>,
}

/// A vault for credentials that must not be persisted in operation inputs.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Stores `value` under `name`, replacing earlier versions.
    async fn store_secret(&self, name: &str, value: &str) -> StorageResult<SecretHandle>;

    /// Reads the current value of `name`.
    ///
    /// # Errors
    ///
    /// * `StorageError::Export(Secret)` - If the secret is missing or expired
    async fn get_secret(&self, name: &str) -> StorageResult<String>;
}

struct SecretEntry {
    handle: SecretHandle,
    value: String,
}

/// Process-local secret store.
///
/// Values live only as long as the store. Suitable for tests and single
/// node deployments without a vault.
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, SecretEntry>>,
    time_to_live: Option<Duration>,
}

impl InMemorySecretStore {
    /// Creates a store whose secrets never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose secrets expire after `time_to_live`.
    pub fn with_time_to_live(time_to_live: Duration) -> Self {
        Self {
            secrets: RwLock::default(),
            time_to_live: Some(time_to_live),
        }
    }

    /// Number of stored secrets.
    pub fn len(&self) -> usize {
        self.secrets.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.secrets.read().is_empty()
    }
}

impl std::fmt::Debug for InMemorySecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySecretStore")
            .field("len", &self.len())
            .field("time_to_live", &self.time_to_live)
            .finish()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn store_secret(&self, name: &str, value: &str) -> StorageResult<SecretHandle> {
        let handle = SecretHandle {
            name: name.to_string(),
            id: uuid::Uuid::new_v4().to_string(),
            expires_on: self.time_to_live.map(|ttl| Utc::now() + ttl),
        };
        self.secrets.write().insert(
            name.to_string(),
            SecretEntry {
                handle: handle.clone(),
                value: value.to_string(),
            },
        );
        tracing::debug!(secret = name, "Stored secret");
        Ok(handle)
    }

    async fn get_secret(&self, name: &str) -> StorageResult<String> {
        let secrets = self.secrets.read();
        let entry = secrets.get(name).ok_or_else(|| ExportError::Secret {
            name: name.to_string(),
            message: "not found".to_string(),
        })?;
        if entry.handle.expires_on.is_some_and(|at| at <= Utc::now()) {
            return Err(ExportError::Secret {
                name: name.to_string(),
                message: "expired".to_string(),
            }
            .into());
        }
        Ok(entry.value.clone())
    }
}
