//! Metadata and file store traits.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;
use crate::types::{DicomDataset, PartitionKey, VersionedInstanceIdentifier};

/// Stores the attribute set of each instance version, without bulk data.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Stores `dataset` as version `version` in a partition.
    ///
    /// Bulk data elements are dropped before writing.
    ///
    /// # Errors
    ///
    /// * `StorageError::Validation` - If the dataset lacks its UIDs
    /// * `StorageError::Resource(AlreadyExists)` - If this version is already stored
    async fn store_instance_metadata(
        &self,
        partition_key: PartitionKey,
        dataset: &DicomDataset,
        version: i64,
    ) -> StorageResult<()>;

    /// Reads the dataset stored for one version.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If nothing is stored for it
    /// * `StorageError::Resource(ExpectedExactlyOne)` - If the backend finds
    ///   zero or several entries by key lookup
    async fn get_instance_metadata(
        &self,
        identifier: &VersionedInstanceIdentifier,
    ) -> StorageResult<DicomDataset>;

    /// Deletes the dataset stored for one version. Missing entries are ignored.
    async fn delete_instance_metadata_if_exists(
        &self,
        identifier: &VersionedInstanceIdentifier,
    ) -> StorageResult<()>;
}

/// Stores the original DICOM file of each instance version.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Writes the file and returns its location.
    async fn store_file(
        &self,
        identifier: &VersionedInstanceIdentifier,
        content: Bytes,
    ) -> StorageResult<String>;

    /// Reads the file.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If no file is stored
    async fn get_file(&self, identifier: &VersionedInstanceIdentifier) -> StorageResult<Bytes>;

    /// Deletes the file. Missing files are ignored.
    async fn delete_file_if_exists(
        &self,
        identifier: &VersionedInstanceIdentifier,
    ) -> StorageResult<()>;
}
