//! Instance, index and query store traits.
//!
//! This module defines the traits an index backend implements, plus
//! [`resolve_instance_identifiers`], the single place where a partial key is
//! mapped to the store call that lists its instances.

use async_trait::async_trait;

use crate::error::{StorageResult, ValidationError};
use crate::query::{BaseQueryExpression, QueryTag};
use crate::types::{DicomDataset, Page, PartitionKey, VersionedInstanceIdentifier};

/// Lists the stored versions of instances under a UID prefix.
///
/// All methods return an empty list, not an error, when nothing matches.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Returns a human-readable name for this store.
    fn backend_name(&self) -> &'static str;

    /// Every instance version in a study.
    async fn get_instance_identifiers_in_study(
        &self,
        partition_key: PartitionKey,
        study_instance_uid: &str,
    ) -> StorageResult<Vec<VersionedInstanceIdentifier>>;

    /// Every instance version in a series.
    async fn get_instance_identifiers_in_series(
        &self,
        partition_key: PartitionKey,
        study_instance_uid: &str,
        series_instance_uid: &str,
    ) -> StorageResult<Vec<VersionedInstanceIdentifier>>;

    /// Every stored version of one instance.
    async fn get_instance_identifier(
        &self,
        partition_key: PartitionKey,
        study_instance_uid: &str,
        series_instance_uid: &str,
        sop_instance_uid: &str,
    ) -> StorageResult<Vec<VersionedInstanceIdentifier>>;
}

/// Executes parsed queries.
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Runs `expression` in a partition.
    ///
    /// Passing the `continuation_token` of a previous page resumes after it.
    ///
    /// # Errors
    ///
    /// * `StorageError::Query(UnsupportedCondition)` - If the backend cannot
    ///   express one of the filters. Nothing is executed in that case.
    async fn query(
        &self,
        partition_key: PartitionKey,
        expression: &BaseQueryExpression,
        continuation_token: Option<&str>,
    ) -> StorageResult<Page<VersionedInstanceIdentifier>>;
}

/// Maintains the queryable index of stored instances.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Reserves a version for a new copy of the instance in `dataset` and
    /// indexes its attributes.
    ///
    /// Returns the assigned watermark.
    async fn begin_create_instance_index(
        &self,
        partition_key: PartitionKey,
        dataset: &DicomDataset,
        query_tags: &[QueryTag],
    ) -> StorageResult<i64>;

    /// Marks the copy created by [`begin_create_instance_index`] as
    /// complete, making it visible to queries.
    ///
    /// [`begin_create_instance_index`]: IndexStore::begin_create_instance_index
    async fn end_create_instance_index(
        &self,
        partition_key: PartitionKey,
        dataset: &DicomDataset,
        watermark: i64,
    ) -> StorageResult<()>;

    /// Removes one version from the index. Missing entries are ignored.
    async fn delete_instance_index(
        &self,
        identifier: &VersionedInstanceIdentifier,
    ) -> StorageResult<()>;
}

/// Which listing call a partial key resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionScope {
    /// Study, series and instance UIDs are all present.
    Instance,
    /// Only the study UID is present.
    Study,
    /// Study and series UIDs are present.
    Series,
}

impl ResolutionScope {
    /// Picks the scope for a partial key.
    ///
    /// The full triple wins, then study only, then study and series. An
    /// instance UID without a series UID is rejected.
    pub fn for_key(
        series_instance_uid: Option<&str>,
        sop_instance_uid: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let series = series_instance_uid.filter(|s| !s.is_empty());
        let sop = sop_instance_uid.filter(|s| !s.is_empty());

        if series.is_some() && sop.is_some() {
            Ok(Self::Instance)
        } else if series.is_none() && sop.is_none() {
            Ok(Self::Study)
        } else if sop.is_none() {
            Ok(Self::Series)
        } else {
            Err(ValidationError::InvalidIdentifier {
                field: "SeriesInstanceUID".to_string(),
                value: String::new(),
                message: "an instance UID requires its series UID".to_string(),
            })
        }
    }
}

/// Resolves a partial key to the identifiers it covers.
///
/// # Errors
///
/// * `StorageError::Validation` - If the study UID is empty, or an instance
///   UID is given without a series UID
pub async fn resolve_instance_identifiers<S>(
    store: &S,
    partition_key: PartitionKey,
    study_instance_uid: &str,
    series_instance_uid: Option<&str>,
    sop_instance_uid: Option<&str>,
) -> StorageResult<Vec<VersionedInstanceIdentifier>>
where
    S: InstanceStore + ?Sized,
{
    if study_instance_uid.is_empty() {
        return Err(ValidationError::InvalidIdentifier {
            field: "StudyInstanceUID".to_string(),
            value: String::new(),
            message: "value is empty".to_string(),
        }
        .into());
    }

    let series = series_instance_uid.unwrap_or_default();
    let sop = sop_instance_uid.unwrap_or_default();

    match ResolutionScope::for_key(series_instance_uid, sop_instance_uid)? {
        ResolutionScope::Instance => {
            store
                .get_instance_identifier(partition_key, study_instance_uid, series, sop)
                .await
        }
        ResolutionScope::Study => {
            store
                .get_instance_identifiers_in_study(partition_key, study_instance_uid)
                .await
        }
        ResolutionScope::Series => {
            store
                .get_instance_identifiers_in_series(partition_key, study_instance_uid, series)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_precedence() {
        assert_eq!(
            ResolutionScope::for_key(Some("1.2"), Some("1.2.3")).unwrap(),
            ResolutionScope::Instance
        );
        assert_eq!(ResolutionScope::for_key(None, None).unwrap(), ResolutionScope::Study);
        assert_eq!(
            ResolutionScope::for_key(Some(""), Some("")).unwrap(),
            ResolutionScope::Study
        );
        assert_eq!(
            ResolutionScope::for_key(Some("1.2"), None).unwrap(),
            ResolutionScope::Series
        );
        assert!(ResolutionScope::for_key(None, Some("1.2.3")).is_err());
    }
}
