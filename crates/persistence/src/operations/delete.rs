//! Delete service.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::DeleteConfig;
use crate::core::{
    FileStore, IndexStore, InstanceStore, MetadataStore, resolve_instance_identifiers,
};
use crate::error::StorageResult;
use crate::types::{PartitionKey, VersionedInstanceIdentifier};

use super::outcome::{ItemOutcome, ItemOutcomes, count_failed};

/// Result of a delete call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    /// One entry per identifier that was attempted.
    pub outcomes: ItemOutcomes,
    /// Cancellation stopped the call before every identifier was attempted.
    pub cancelled: bool,
}

impl DeleteSummary {
    /// Number of identifiers deleted.
    pub fn succeeded(&self) -> usize {
        self.outcomes.len() - self.failed()
    }

    /// Number of identifiers that failed.
    pub fn failed(&self) -> usize {
        count_failed(&self.outcomes)
    }

    /// Returns true if nothing failed and nothing was skipped.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed() == 0
    }
}

/// Deletes instances immediately.
///
/// For every identifier the metadata is deleted first, then the file, then
/// the index entry when an index store is attached. Each step ignores
/// entries that are already gone, so repeating a delete is harmless.
pub struct DeleteService {
    instances: Arc<dyn InstanceStore>,
    metadata: Arc<dyn MetadataStore>,
    files: Arc<dyn FileStore>,
    index: Option<Arc<dyn IndexStore>>,
    config: DeleteConfig,
}

impl DeleteService {
    /// Creates a service.
    pub fn new(
        instances: Arc<dyn InstanceStore>,
        metadata: Arc<dyn MetadataStore>,
        files: Arc<dyn FileStore>,
        config: DeleteConfig,
    ) -> Self {
        Self {
            instances,
            metadata,
            files,
            index: None,
            config,
        }
    }

    /// Also removes index entries.
    pub fn with_index_store(mut self, index: Arc<dyn IndexStore>) -> Self {
        self.index = Some(index);
        self
    }

    /// Deletes every instance of a study.
    pub async fn delete_study(
        &self,
        partition_key: PartitionKey,
        study_instance_uid: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<DeleteSummary> {
        self.delete_scope(partition_key, study_instance_uid, None, None, cancel)
            .await
    }

    /// Deletes every instance of a series.
    pub async fn delete_series(
        &self,
        partition_key: PartitionKey,
        study_instance_uid: &str,
        series_instance_uid: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<DeleteSummary> {
        self.delete_scope(
            partition_key,
            study_instance_uid,
            Some(series_instance_uid),
            None,
            cancel,
        )
        .await
    }

    /// Deletes every stored version of one instance.
    pub async fn delete_instance(
        &self,
        partition_key: PartitionKey,
        study_instance_uid: &str,
        series_instance_uid: &str,
        sop_instance_uid: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<DeleteSummary> {
        self.delete_scope(
            partition_key,
            study_instance_uid,
            Some(series_instance_uid),
            Some(sop_instance_uid),
            cancel,
        )
        .await
    }

    /// Removes instances left behind by earlier deletes.
    ///
    /// Deletes take effect immediately, so there is never anything to
    /// collect. Returns `(success, cleaned up count)`.
    pub async fn cleanup_deleted_instances(
        &self,
        _cancel: &CancellationToken,
    ) -> StorageResult<(bool, usize)> {
        Ok((true, 0))
    }

    async fn delete_scope(
        &self,
        partition_key: PartitionKey,
        study_instance_uid: &str,
        series_instance_uid: Option<&str>,
        sop_instance_uid: Option<&str>,
        cancel: &CancellationToken,
    ) -> StorageResult<DeleteSummary> {
        if cancel.is_cancelled() {
            return Ok(DeleteSummary {
                outcomes: Vec::new(),
                cancelled: true,
            });
        }

        let identifiers = resolve_instance_identifiers(
            self.instances.as_ref(),
            partition_key,
            study_instance_uid,
            series_instance_uid,
            sop_instance_uid,
        )
        .await?;

        tracing::debug!(
            study = study_instance_uid,
            series = series_instance_uid,
            sop = sop_instance_uid,
            count = identifiers.len(),
            "Resolved identifiers to delete"
        );

        Ok(self.delete_identifiers(identifiers, cancel).await)
    }

    /// Deletes the given identifiers with bounded concurrency.
    ///
    /// Failures are logged and reported per identifier. Once `cancel` fires
    /// no further identifiers are started.
    pub async fn delete_identifiers(
        &self,
        identifiers: Vec<VersionedInstanceIdentifier>,
        cancel: &CancellationToken,
    ) -> DeleteSummary {
        let total = identifiers.len();
        let outcomes: ItemOutcomes = futures::stream::iter(identifiers)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|identifier| async move {
                let result = self.delete_one(&identifier).await;
                if let Err(err) = &result {
                    tracing::warn!(
                        identifier = %identifier,
                        error = %err,
                        "Failed to delete instance"
                    );
                }
                let outcome = ItemOutcome::from(&result);
                (identifier, outcome)
            })
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let summary = DeleteSummary {
            cancelled: outcomes.len() < total,
            outcomes,
        };
        tracing::info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            cancelled = summary.cancelled,
            "Delete finished"
        );
        summary
    }

    async fn delete_one(&self, identifier: &VersionedInstanceIdentifier) -> StorageResult<()> {
        self.metadata
            .delete_instance_metadata_if_exists(identifier)
            .await?;
        self.files.delete_file_if_exists(identifier).await?;
        if let Some(index) = &self.index {
            index.delete_instance_index(identifier).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DeleteService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteService")
            .field("backend", &self.instances.backend_name())
            .field("index", &self.index.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
