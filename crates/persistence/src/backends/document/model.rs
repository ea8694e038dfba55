//! Instance document shape.

use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::types::{DicomDataset, PartitionKey, VersionedInstanceIdentifier};

/// One stored instance version.
///
/// `value` holds the dataset in the DICOM JSON model so queries can address
/// `value.<tag>.Value[0]`. `serialized_value` is the same dataset as text and
/// is what metadata reads return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDocument {
    /// Document id, see [`document_id`](Self::document_id).
    pub id: String,
    /// Study Instance UID.
    pub study_id: String,
    /// Series Instance UID.
    pub series_id: String,
    /// SOP Instance UID.
    pub sop_instance_id: String,
    /// Instance version.
    pub version: i64,
    /// Owning data partition.
    pub partition_key: PartitionKey,
    /// Queryable dataset.
    pub value: DicomDataset,
    /// The dataset as JSON text.
    pub serialized_value: String,
}

impl InstanceDocument {
    /// Physical id of an instance version: `{study}_{series}_{sop}_{version}_{partition}`.
    pub fn document_id(identifier: &VersionedInstanceIdentifier) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            identifier.study_instance_uid,
            identifier.series_instance_uid,
            identifier.sop_instance_uid,
            identifier.version,
            identifier.partition_key
        )
    }

    /// Builds the document for an identifier, dropping bulk data from the dataset.
    pub fn new(
        identifier: &VersionedInstanceIdentifier,
        dataset: &DicomDataset,
    ) -> StorageResult<Self> {
        let value = dataset.without_bulk_data();
        let serialized_value = serde_json::to_string(&value)?;
        Ok(Self {
            id: Self::document_id(identifier),
            study_id: identifier.study_instance_uid.clone(),
            series_id: identifier.series_instance_uid.clone(),
            sop_instance_id: identifier.sop_instance_uid.clone(),
            version: identifier.version,
            partition_key: identifier.partition_key,
            value,
            serialized_value,
        })
    }

    /// The identifier this document was stored under.
    pub fn identifier(&self) -> StorageResult<VersionedInstanceIdentifier> {
        Ok(VersionedInstanceIdentifier::new(
            &self.study_id,
            &self.series_id,
            &self.sop_instance_id,
            self.version,
            self.partition_key,
        )?)
    }

    /// Parses the stored dataset.
    pub fn dataset(&self) -> StorageResult<DicomDataset> {
        let value: serde_json::Value = serde_json::from_str(&self.serialized_value)?;
        Ok(DicomDataset::from_json(value)?)
    }
}
