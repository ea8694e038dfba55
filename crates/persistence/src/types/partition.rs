//! Data partition types.
//!
//! This module defines the [`PartitionKey`] type, the integer scope applied to
//! every store operation when data partitioning is enabled.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Name of the partition used when partitioning is disabled.
pub const DEFAULT_PARTITION_NAME: &str = "default";

/// An integer data-partition key.
///
/// Every stored instance belongs to exactly one partition. When the data
/// partition feature is off, all operations run against
/// [`PartitionKey::DEFAULT`].
///
/// # Examples
///
/// ```
/// use dicom_persistence::types::PartitionKey;
///
/// let key = PartitionKey::new(7).unwrap();
/// assert_eq!(key.value(), 7);
/// assert!(PartitionKey::new(0).is_err());
/// assert_eq!(PartitionKey::default(), PartitionKey::DEFAULT);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(i32);

impl PartitionKey {
    /// The partition every instance lands in when partitioning is disabled.
    pub const DEFAULT: PartitionKey = PartitionKey(1);

    /// Creates a partition key, rejecting values below 1.
    pub fn new(value: i32) -> Result<Self, ValidationError> {
        if value < 1 {
            return Err(ValidationError::InvalidIdentifier {
                field: "partition key".to_string(),
                value: value.to_string(),
                message: "partition keys start at 1".to_string(),
            });
        }
        Ok(Self(value))
    }

    /// Returns the raw key.
    pub fn value(&self) -> i32 {
        self.0
    }

    /// Returns `true` if this is the default partition.
    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl Default for PartitionKey {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Debug for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionKey({})", self.0)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PartitionKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .parse::<i32>()
            .map_err(|e| ValidationError::InvalidIdentifier {
                field: "partition key".to_string(),
                value: s.to_string(),
                message: e.to_string(),
            })?;
        Self::new(value)
    }
}

/// A registered data partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionEntry {
    /// Storage key.
    pub key: PartitionKey,
    /// Client-facing partition name.
    pub name: String,
    /// When the partition was created.
    pub created: DateTime<Utc>,
}

impl PartitionEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(key: PartitionKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            created: Utc::now(),
        }
    }

    /// The entry for the default partition.
    pub fn default_partition() -> Self {
        Self::new(PartitionKey::DEFAULT, DEFAULT_PARTITION_NAME)
    }
}
