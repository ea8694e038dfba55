//! Core types for the persistence layer.
//!
//! - [`PartitionKey`] - Data partition scope
//! - [`VersionedInstanceIdentifier`] - Durable reference to a stored instance
//! - [`DicomDataset`] - A dataset in the DICOM JSON model
//! - [`Page`], [`OffsetCursor`] - Pagination types
//!
//! # Examples
//!
//! ```
//! use dicom::core::VR;
//! use dicom::dictionary_std::tags;
//! use dicom_persistence::types::{DicomDataset, PartitionKey};
//!
//! let mut dataset = DicomDataset::new();
//! dataset
//!     .insert_string(tags::STUDY_INSTANCE_UID, VR::UI, "1.2.3")
//!     .insert_string(tags::SERIES_INSTANCE_UID, VR::UI, "1.2.3.4")
//!     .insert_string(tags::SOP_INSTANCE_UID, VR::UI, "1.2.3.4.5");
//!
//! let id = dataset.to_versioned_identifier(1, PartitionKey::DEFAULT).unwrap();
//! assert_eq!(id.series_instance_uid, "1.2.3.4");
//! ```

mod dataset;
mod identifier;
mod pagination;
mod partition;

pub use dataset::{
    DICOM_DATE_FORMAT, DicomDataset, canonical_tag_path, parse_tag_path, parse_vr, vr_code,
};
pub use identifier::{
    InstanceIdentifier, MAX_UID_LENGTH, VersionedInstanceIdentifier, validate_uid,
};
pub use pagination::{OffsetCursor, Page};
pub use partition::{DEFAULT_PARTITION_NAME, PartitionEntry, PartitionKey};
