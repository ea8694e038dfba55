//! [`DocumentStore`]: the instance, query, metadata and index stores over a
//! document container.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::config::{DocumentStoreConfig, QueryLimits};
use crate::core::{IndexStore, InstanceStore, MetadataStore, QueryStore};
use crate::error::{ResourceError, StorageError, StorageResult};
use crate::query::{BaseQueryExpression, QueryTag};
use crate::types::{DicomDataset, Page, PartitionKey, VersionedInstanceIdentifier};

use super::container::DocumentContainer;
use super::generator::{DocumentQuery, DocumentQueryGenerator};
use super::model::InstanceDocument;

const BACKEND_NAME: &str = "document";

/// Document-backed store. Each instance version is one [`InstanceDocument`].
pub struct DocumentStore<C> {
    container: Arc<C>,
    config: DocumentStoreConfig,
    limits: QueryLimits,
}

impl<C> std::fmt::Debug for DocumentStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("database_id", &self.config.database_id)
            .field("container_id", &self.config.container_id)
            .field("max_item_count", &self.config.max_item_count)
            .finish_non_exhaustive()
    }
}

impl<C: DocumentContainer> DocumentStore<C> {
    /// Creates a store over a container.
    pub fn new(container: Arc<C>, config: DocumentStoreConfig, limits: QueryLimits) -> Self {
        Self {
            container,
            config,
            limits,
        }
    }

    /// The underlying container.
    pub fn container(&self) -> &Arc<C> {
        &self.container
    }

    /// Reads every page of a query.
    async fn read_all(&self, query: &DocumentQuery) -> StorageResult<Vec<InstanceDocument>> {
        let mut documents = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = self
                .container
                .query_items(query, continuation.as_deref(), self.config.max_item_count)
                .await?;
            for item in page.items {
                documents.push(serde_json::from_value(item)?);
            }
            match page.continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }
        Ok(documents)
    }

    async fn list(&self, query: DocumentQuery) -> StorageResult<Vec<VersionedInstanceIdentifier>> {
        self.read_all(&query)
            .await?
            .iter()
            .map(InstanceDocument::identifier)
            .collect()
    }

    /// Looks up the document of one instance version by id.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(ExpectedExactlyOne)` - Unless exactly one
    ///   document carries the id
    pub async fn get_item_by_id(
        &self,
        identifier: &VersionedInstanceIdentifier,
    ) -> StorageResult<InstanceDocument> {
        let id = InstanceDocument::document_id(identifier);
        let mut query = DocumentQuery::new();
        query.and_field_equals("id", json!(id));

        let mut documents = self.read_all(&query).await?;
        if documents.len() != 1 {
            return Err(StorageError::Resource(ResourceError::ExpectedExactlyOne {
                id,
                found: documents.len(),
            }));
        }
        Ok(documents.remove(0))
    }

    fn study_query(partition_key: PartitionKey, study_instance_uid: &str) -> DocumentQuery {
        let mut query = DocumentQuery::in_partition(partition_key);
        query.and_field_equals("studyId", json!(study_instance_uid));
        query
    }
}

#[async_trait]
impl<C: DocumentContainer> InstanceStore for DocumentStore<C> {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn get_instance_identifiers_in_study(
        &self,
        partition_key: PartitionKey,
        study_instance_uid: &str,
    ) -> StorageResult<Vec<VersionedInstanceIdentifier>> {
        self.list(Self::study_query(partition_key, study_instance_uid))
            .await
    }

    async fn get_instance_identifiers_in_series(
        &self,
        partition_key: PartitionKey,
        study_instance_uid: &str,
        series_instance_uid: &str,
    ) -> StorageResult<Vec<VersionedInstanceIdentifier>> {
        let mut query = Self::study_query(partition_key, study_instance_uid);
        query.and_field_equals("seriesId", json!(series_instance_uid));
        self.list(query).await
    }

    async fn get_instance_identifier(
        &self,
        partition_key: PartitionKey,
        study_instance_uid: &str,
        series_instance_uid: &str,
        sop_instance_uid: &str,
    ) -> StorageResult<Vec<VersionedInstanceIdentifier>> {
        let mut query = Self::study_query(partition_key, study_instance_uid);
        query
            .and_field_equals("seriesId", json!(series_instance_uid))
            .and_field_equals("sopInstanceId", json!(sop_instance_uid));
        self.list(query).await
    }
}

#[async_trait]
impl<C: DocumentContainer> QueryStore for DocumentStore<C> {
    async fn query(
        &self,
        partition_key: PartitionKey,
        expression: &BaseQueryExpression,
        continuation_token: Option<&str>,
    ) -> StorageResult<Page<VersionedInstanceIdentifier>> {
        let query = DocumentQueryGenerator::generate(expression, partition_key)?;
        let page_size = expression
            .evaluated_limit(&self.limits)
            .min(self.config.max_item_count);

        tracing::debug!(query = %query, page_size, "Executing document query");

        let page = self
            .container
            .query_items(&query, continuation_token, page_size)
            .await?;

        if let Some(token) = &page.continuation {
            tracing::debug!(continuation = %token, "Document query has more results");
        }

        let mut identifiers = Vec::with_capacity(page.items.len());
        for item in page.items {
            let document: InstanceDocument = serde_json::from_value(item)?;
            identifiers.push(document.identifier()?);
        }
        Ok(Page::new(identifiers, page.continuation))
    }
}

#[async_trait]
impl<C: DocumentContainer> MetadataStore for DocumentStore<C> {
    async fn store_instance_metadata(
        &self,
        partition_key: PartitionKey,
        dataset: &DicomDataset,
        version: i64,
    ) -> StorageResult<()> {
        let identifier = dataset.to_versioned_identifier(version, partition_key)?;
        let document = InstanceDocument::new(&identifier, dataset)?;
        let id = document.id.clone();

        self.container
            .create_item(serde_json::to_value(&document)?)
            .await?;

        tracing::info!(id = %id, "Created instance document");
        Ok(())
    }

    async fn get_instance_metadata(
        &self,
        identifier: &VersionedInstanceIdentifier,
    ) -> StorageResult<DicomDataset> {
        self.get_item_by_id(identifier).await?.dataset()
    }

    async fn delete_instance_metadata_if_exists(
        &self,
        identifier: &VersionedInstanceIdentifier,
    ) -> StorageResult<()> {
        let id = InstanceDocument::document_id(identifier);
        if self.container.delete_item(&id).await? {
            tracing::info!(id = %id, "Deleted instance document");
        } else {
            tracing::debug!(id = %id, "Instance document already absent");
        }
        Ok(())
    }
}

#[async_trait]
impl<C: DocumentContainer> IndexStore for DocumentStore<C> {
    /// Assigns the next version of the UID triple. Documents are queryable
    /// as stored, so `query_tags` is not consulted.
    async fn begin_create_instance_index(
        &self,
        partition_key: PartitionKey,
        dataset: &DicomDataset,
        _query_tags: &[QueryTag],
    ) -> StorageResult<i64> {
        let identifier = dataset.to_versioned_identifier(0, partition_key)?;
        let existing = self
            .get_instance_identifier(
                partition_key,
                &identifier.study_instance_uid,
                &identifier.series_instance_uid,
                &identifier.sop_instance_uid,
            )
            .await?;
        Ok(existing.iter().map(|id| id.version).max().unwrap_or(0) + 1)
    }

    async fn end_create_instance_index(
        &self,
        _partition_key: PartitionKey,
        _dataset: &DicomDataset,
        watermark: i64,
    ) -> StorageResult<()> {
        tracing::debug!(watermark, "Document index needs no completion step");
        Ok(())
    }

    async fn delete_instance_index(
        &self,
        identifier: &VersionedInstanceIdentifier,
    ) -> StorageResult<()> {
        self.delete_instance_metadata_if_exists(identifier).await
    }
}
