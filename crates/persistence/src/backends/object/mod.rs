//! File and metadata stores over an [`ObjectStore`].
//!
//! Objects are keyed by UID path. Instances outside the default partition
//! get a `partitions/{key}/` prefix so equal UIDs in different partitions
//! never collide.
//!
//! ```text
//! {study}/{series}/{sop}_{version}.dcm
//! {study}/{series}/{sop}_{version}_metadata.json
//! partitions/2/{study}/{series}/{sop}_{version}.dcm
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};

use crate::core::{FileStore, MetadataStore};
use crate::error::{ResourceError, StorageError, StorageResult};
use crate::types::{DicomDataset, PartitionKey, VersionedInstanceIdentifier};

fn instance_prefix(identifier: &VersionedInstanceIdentifier) -> String {
    let uids = format!(
        "{}/{}/{}_{}",
        identifier.study_instance_uid,
        identifier.series_instance_uid,
        identifier.sop_instance_uid,
        identifier.version
    );
    if identifier.partition_key.is_default() {
        uids
    } else {
        format!("partitions/{}/{}", identifier.partition_key, uids)
    }
}

/// Object path of the original file of an instance version.
pub fn file_path(identifier: &VersionedInstanceIdentifier) -> Path {
    Path::from(format!("{}.dcm", instance_prefix(identifier)))
}

/// Object path of the metadata of an instance version.
pub fn metadata_path(identifier: &VersionedInstanceIdentifier) -> Path {
    Path::from(format!("{}_metadata.json", instance_prefix(identifier)))
}

async fn read_opt(store: &dyn ObjectStore, path: &Path) -> StorageResult<Option<Bytes>> {
    match store.get(path).await {
        Ok(result) => Ok(Some(result.bytes().await?)),
        Err(object_store::Error::NotFound { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn delete_if_exists(store: &dyn ObjectStore, path: &Path) -> StorageResult<bool> {
    match store.delete(path).await {
        Ok(()) => Ok(true),
        Err(object_store::Error::NotFound { .. }) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// [`FileStore`] keeping each file as one object.
#[derive(Debug, Clone)]
pub struct ObjectFileStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectFileStore {
    /// Wraps an object store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Stores files under a local directory.
    pub fn local(root: impl AsRef<std::path::Path>) -> StorageResult<Self> {
        let store = object_store::local::LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Stores files in process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()))
    }
}

#[async_trait]
impl FileStore for ObjectFileStore {
    async fn store_file(
        &self,
        identifier: &VersionedInstanceIdentifier,
        content: Bytes,
    ) -> StorageResult<String> {
        let path = file_path(identifier);
        self.store.put(&path, PutPayload::from(content)).await?;
        tracing::debug!(path = %path, "Stored instance file");
        Ok(path.to_string())
    }

    async fn get_file(&self, identifier: &VersionedInstanceIdentifier) -> StorageResult<Bytes> {
        let path = file_path(identifier);
        read_opt(&*self.store, &path).await?.ok_or_else(|| {
            StorageError::Resource(ResourceError::NotFound {
                kind: "file".to_string(),
                id: path.to_string(),
            })
        })
    }

    async fn delete_file_if_exists(
        &self,
        identifier: &VersionedInstanceIdentifier,
    ) -> StorageResult<()> {
        let path = file_path(identifier);
        if delete_if_exists(&*self.store, &path).await? {
            tracing::debug!(path = %path, "Deleted instance file");
        }
        Ok(())
    }
}

/// [`MetadataStore`] keeping each dataset as a JSON object.
#[derive(Debug, Clone)]
pub struct ObjectMetadataStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectMetadataStore {
    /// Wraps an object store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Stores metadata in process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()))
    }
}

#[async_trait]
impl MetadataStore for ObjectMetadataStore {
    async fn store_instance_metadata(
        &self,
        partition_key: PartitionKey,
        dataset: &DicomDataset,
        version: i64,
    ) -> StorageResult<()> {
        let identifier = dataset.to_versioned_identifier(version, partition_key)?;
        let path = metadata_path(&identifier);
        let payload = serde_json::to_vec(&dataset.without_bulk_data())?;

        let options = PutOptions {
            mode: PutMode::Create,
            ..Default::default()
        };
        match self
            .store
            .put_opts(&path, PutPayload::from(payload), options)
            .await
        {
            Ok(_) => Ok(()),
            Err(object_store::Error::AlreadyExists { .. }) => {
                Err(StorageError::Resource(ResourceError::AlreadyExists {
                    kind: "instance metadata".to_string(),
                    id: identifier.to_string(),
                }))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_instance_metadata(
        &self,
        identifier: &VersionedInstanceIdentifier,
    ) -> StorageResult<DicomDataset> {
        let bytes = read_opt(&*self.store, &metadata_path(identifier))
            .await?
            .ok_or_else(|| {
                StorageError::Resource(ResourceError::NotFound {
                    kind: "instance metadata".to_string(),
                    id: identifier.to_string(),
                })
            })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn delete_instance_metadata_if_exists(
        &self,
        identifier: &VersionedInstanceIdentifier,
    ) -> StorageResult<()> {
        delete_if_exists(&*self.store, &metadata_path(identifier)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dicom::core::VR;
    use dicom::dictionary_std::tags;

    use super::*;

    fn id(version: i64, partition: i32) -> VersionedInstanceIdentifier {
        VersionedInstanceIdentifier::new(
            "1.2",
            "1.2.3",
            "1.2.3.4",
            version,
            PartitionKey::new(partition).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_paths() {
        assert_eq!(file_path(&id(1, 1)).as_ref(), "1.2/1.2.3/1.2.3.4_1.dcm");
        assert_eq!(
            file_path(&id(4, 2)).as_ref(),
            "partitions/2/1.2/1.2.3/1.2.3.4_4.dcm"
        );
        assert_eq!(
            metadata_path(&id(1, 1)).as_ref(),
            "1.2/1.2.3/1.2.3.4_1_metadata.json"
        );
    }

    #[tokio::test]
    async fn test_file_round_trip_and_delete() {
        let files = ObjectFileStore::in_memory();
        let location = files
            .store_file(&id(1, 1), Bytes::from_static(b"DICM"))
            .await
            .unwrap();
        assert_eq!(location, "1.2/1.2.3/1.2.3.4_1.dcm");
        assert_eq!(files.get_file(&id(1, 1)).await.unwrap(), Bytes::from_static(b"DICM"));

        files.delete_file_if_exists(&id(1, 1)).await.unwrap();
        files.delete_file_if_exists(&id(1, 1)).await.unwrap();
        assert!(files.get_file(&id(1, 1)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        let files = ObjectFileStore::local(dir.path()).unwrap();
        files
            .store_file(&id(2, 1), Bytes::from_static(b"DICM"))
            .await
            .unwrap();
        assert!(dir.path().join("1.2/1.2.3/1.2.3.4_2.dcm").exists());
    }

    #[tokio::test]
    async fn test_metadata_is_written_once() {
        let metadata = ObjectMetadataStore::in_memory();
        let mut dataset = DicomDataset::new();
        dataset
            .insert_string(tags::STUDY_INSTANCE_UID, VR::UI, "1.2")
            .insert_string(tags::SERIES_INSTANCE_UID, VR::UI, "1.2.3")
            .insert_string(tags::SOP_INSTANCE_UID, VR::UI, "1.2.3.4");

        metadata
            .store_instance_metadata(PartitionKey::DEFAULT, &dataset, 1)
            .await
            .unwrap();
        let err = metadata
            .store_instance_metadata(PartitionKey::DEFAULT, &dataset, 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Resource(ResourceError::AlreadyExists { .. })
        ));

        assert_eq!(metadata.get_instance_metadata(&id(1, 1)).await.unwrap(), dataset);
        metadata.delete_instance_metadata_if_exists(&id(1, 1)).await.unwrap();
        assert!(metadata
            .get_instance_metadata(&id(1, 1))
            .await
            .unwrap_err()
            .is_not_found());
    }
}
