//! Instance identifiers.
//!
//! A DICOM instance is addressed by its UID triple. Every time the same triple
//! is stored again it receives a new watermark, so durable references carry
//! that version and the owning partition as well.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

use super::partition::PartitionKey;

/// Longest UID permitted by the DICOM standard.
pub const MAX_UID_LENGTH: usize = 64;

/// Checks that `value` is a syntactically valid DICOM UID.
///
/// UIDs are non-empty, at most 64 characters and made of digits and dots.
pub fn validate_uid(field: &str, value: &str) -> Result<(), ValidationError> {
    let invalid = |message: &str| ValidationError::InvalidIdentifier {
        field: field.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    };

    if value.is_empty() {
        return Err(invalid("value is empty"));
    }
    if value.len() > MAX_UID_LENGTH {
        return Err(invalid("value exceeds 64 characters"));
    }
    if !value.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(invalid("only digits and '.' are allowed"));
    }
    Ok(())
}

/// The UID triple of an instance, without version information.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceIdentifier {
    /// Study Instance UID (0020,000D).
    pub study_instance_uid: String,
    /// Series Instance UID (0020,000E).
    pub series_instance_uid: String,
    /// SOP Instance UID (0008,0018).
    pub sop_instance_uid: String,
    /// Owning data partition.
    pub partition_key: PartitionKey,
}

impl InstanceIdentifier {
    /// Creates an identifier after validating each UID.
    pub fn new(
        study_instance_uid: impl Into<String>,
        series_instance_uid: impl Into<String>,
        sop_instance_uid: impl Into<String>,
        partition_key: PartitionKey,
    ) -> Result<Self, ValidationError> {
        let id = Self {
            study_instance_uid: study_instance_uid.into(),
            series_instance_uid: series_instance_uid.into(),
            sop_instance_uid: sop_instance_uid.into(),
            partition_key,
        };
        validate_uid("StudyInstanceUID", &id.study_instance_uid)?;
        validate_uid("SeriesInstanceUID", &id.series_instance_uid)?;
        validate_uid("SOPInstanceUID", &id.sop_instance_uid)?;
        Ok(id)
    }
}

/// A durable reference to one stored copy of an instance.
///
/// Identity is all five fields: the same UID triple stored twice yields two
/// identifiers that differ only by `version`.
///
/// # Examples
///
/// ```
/// use dicom_persistence::types::{PartitionKey, VersionedInstanceIdentifier};
///
/// let id =
///     VersionedInstanceIdentifier::new("1.2", "1.2.3", "1.2.3.4", 5, PartitionKey::DEFAULT)
///         .unwrap();
/// assert_eq!(id.to_string(), "1.2/1.2.3/1.2.3.4@5 (partition 1)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedInstanceIdentifier {
    /// Study Instance UID (0020,000D).
    pub study_instance_uid: String,
    /// Series Instance UID (0020,000E).
    pub series_instance_uid: String,
    /// SOP Instance UID (0008,0018).
    pub sop_instance_uid: String,
    /// Watermark assigned when this copy was indexed.
    pub version: i64,
    /// Owning data partition.
    pub partition_key: PartitionKey,
}

impl VersionedInstanceIdentifier {
    /// Creates an identifier after validating each UID.
    pub fn new(
        study_instance_uid: impl Into<String>,
        series_instance_uid: impl Into<String>,
        sop_instance_uid: impl Into<String>,
        version: i64,
        partition_key: PartitionKey,
    ) -> Result<Self, ValidationError> {
        let id = InstanceIdentifier::new(
            study_instance_uid,
            series_instance_uid,
            sop_instance_uid,
            partition_key,
        )?;
        Ok(Self::from_instance(id, version))
    }

    /// Attaches a version to an unversioned identifier.
    pub fn from_instance(id: InstanceIdentifier, version: i64) -> Self {
        Self {
            study_instance_uid: id.study_instance_uid,
            series_instance_uid: id.series_instance_uid,
            sop_instance_uid: id.sop_instance_uid,
            version,
            partition_key: id.partition_key,
        }
    }

    /// Drops the version.
    pub fn instance(&self) -> InstanceIdentifier {
        InstanceIdentifier {
            study_instance_uid: self.study_instance_uid.clone(),
            series_instance_uid: self.series_instance_uid.clone(),
            sop_instance_uid: self.sop_instance_uid.clone(),
            partition_key: self.partition_key,
        }
    }
}

impl fmt::Display for InstanceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{} (partition {})",
            self.study_instance_uid,
            self.series_instance_uid,
            self.sop_instance_uid,
            self.partition_key
        )
    }
}

impl fmt::Display for VersionedInstanceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}@{} (partition {})",
            self.study_instance_uid,
            self.series_instance_uid,
            self.sop_instance_uid,
            self.version,
            self.partition_key
        )
    }
}
