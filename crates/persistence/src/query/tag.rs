//! Query tag descriptors.
//!
//! A [`QueryTag`] is the resolved form of a queryable attribute: the DICOM
//! tag, its value representation, the level it is indexed at and, for
//! user-registered attributes, the extended query tag entry that gives it a
//! storage key.

use std::fmt;

use dicom::core::{Tag, VR};
use dicom::dictionary_std::tags;
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::types::{canonical_tag_path, parse_tag_path, parse_vr, vr_code};

/// The level at which an attribute is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QueryTagLevel {
    /// One value per instance.
    Instance = 0,
    /// One value per series.
    Series = 1,
    /// One value per study.
    Study = 2,
}

impl QueryTagLevel {
    /// Returns the level stored in the index.
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Parses a stored level.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Instance),
            1 => Some(Self::Series),
            2 => Some(Self::Study),
            _ => None,
        }
    }
}

impl fmt::Display for QueryTagLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance => write!(f, "Instance"),
            Self::Series => write!(f, "Series"),
            Self::Study => write!(f, "Study"),
        }
    }
}

/// Physical value type an extended query tag is stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtendedQueryTagDataType {
    /// Text values, compared exactly.
    String,
    /// Integer values.
    Long,
    /// Floating point values.
    Double,
    /// Dates and date-times.
    DateTime,
    /// Person names, matched by word prefix.
    PersonName,
}

impl ExtendedQueryTagDataType {
    /// Maps a value representation to its storage type.
    ///
    /// Returns `None` for VRs that cannot be indexed.
    pub fn from_vr(vr: VR) -> Option<Self> {
        match vr {
            VR::AE | VR::AS | VR::CS | VR::DS | VR::LO | VR::SH | VR::UI => Some(Self::String),
            VR::IS | VR::SL | VR::SS | VR::UL | VR::US => Some(Self::Long),
            VR::FD | VR::FL | VR::TM => Some(Self::Double),
            VR::DA | VR::DT => Some(Self::DateTime),
            VR::PN => Some(Self::PersonName),
            _ => None,
        }
    }
}

/// Lifecycle of an extended query tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtendedQueryTagStatus {
    /// Registered; existing instances are still being reindexed.
    Adding = 0,
    /// Fully indexed and queryable.
    Ready = 1,
    /// Being removed.
    Deleting = 2,
}

impl ExtendedQueryTagStatus {
    /// Parses a stored status.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Adding),
            1 => Some(Self::Ready),
            2 => Some(Self::Deleting),
            _ => None,
        }
    }
}

/// Whether clients may filter on an extended query tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryStatus {
    /// Filters on the tag are rejected.
    Disabled = 0,
    /// Filters on the tag are accepted.
    Enabled = 1,
}

/// A registered extended query tag as kept by the tag store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedQueryTagStoreEntry {
    /// Storage key joining the tag to its value rows.
    pub key: i32,
    /// Canonical tag path, e.g. `00101010`.
    pub path: String,
    /// Two-letter VR code.
    pub vr: String,
    /// Private creator for private tags.
    pub private_creator: Option<String>,
    /// Indexing level.
    pub level: QueryTagLevel,
    /// Indexing lifecycle.
    pub status: ExtendedQueryTagStatus,
    /// Query availability.
    pub query_status: QueryStatus,
    /// Number of instances that failed validation during reindexing.
    pub error_count: i32,
}

/// A request to register an extended query tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddExtendedQueryTagEntry {
    /// Canonical tag path.
    pub path: String,
    /// Two-letter VR code.
    pub vr: String,
    /// Private creator for private tags.
    pub private_creator: Option<String>,
    /// Indexing level.
    pub level: QueryTagLevel,
}

/// A resolved, queryable attribute.
///
/// # Examples
///
/// ```
/// use dicom::dictionary_std::tags;
/// use dicom_persistence::query::{core_query_tags, QueryTagLevel};
///
/// let study_date = core_query_tags()
///     .into_iter()
///     .find(|t| t.tag() == tags::STUDY_DATE)
///     .unwrap();
/// assert_eq!(study_date.level(), QueryTagLevel::Study);
/// assert!(!study_date.is_extended());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTag {
    tag: Tag,
    vr: VR,
    level: QueryTagLevel,
    name: String,
    extended: Option<ExtendedQueryTagStoreEntry>,
}

impl QueryTag {
    /// Creates a descriptor for a core (always indexed) attribute.
    pub fn core(tag: Tag, vr: VR, level: QueryTagLevel, name: impl Into<String>) -> Self {
        Self {
            tag,
            vr,
            level,
            name: name.into(),
            extended: None,
        }
    }

    /// Creates a descriptor from a registered extended query tag.
    pub fn from_extended(entry: ExtendedQueryTagStoreEntry) -> Result<Self, QueryError> {
        let tag = parse_tag_path(&entry.path).ok_or_else(|| QueryError::UnknownQueryTag {
            tag: entry.path.clone(),
        })?;
        let vr = parse_vr(&entry.vr).ok_or_else(|| QueryError::InvalidValue {
            tag: entry.path.clone(),
            value: entry.vr.clone(),
            message: "unknown value representation".to_string(),
        })?;
        Ok(Self {
            tag,
            vr,
            level: entry.level,
            name: entry.path.clone(),
            extended: Some(entry),
        })
    }

    /// The DICOM tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// The value representation.
    pub fn vr(&self) -> VR {
        self.vr
    }

    /// The indexing level.
    pub fn level(&self) -> QueryTagLevel {
        self.level
    }

    /// Keyword for core tags, canonical path for extended tags.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical tag path.
    pub fn path(&self) -> String {
        canonical_tag_path(self.tag)
    }

    /// Returns true for user-registered attributes.
    pub fn is_extended(&self) -> bool {
        self.extended.is_some()
    }

    /// The extended query tag entry, if any.
    pub fn extended_entry(&self) -> Option<&ExtendedQueryTagStoreEntry> {
        self.extended.as_ref()
    }

    /// Storage key of an extended tag.
    pub fn extended_key(&self) -> Option<i32> {
        self.extended.as_ref().map(|e| e.key)
    }

    /// Returns true if the tag is a registered extended tag whose values are
    /// fully indexed.
    pub fn is_indexed(&self) -> bool {
        self.extended
            .as_ref()
            .is_some_and(|e| e.status == ExtendedQueryTagStatus::Ready)
    }

    /// Storage type for the tag's values.
    pub fn data_type(&self) -> Option<ExtendedQueryTagDataType> {
        ExtendedQueryTagDataType::from_vr(self.vr)
    }

    /// Two-letter VR code.
    pub fn vr_code(&self) -> &'static str {
        vr_code(self.vr)
    }
}

impl fmt::Display for QueryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tag, self.name)
    }
}

/// Attributes indexed for every instance regardless of configuration.
pub fn core_query_tags() -> Vec<QueryTag> {
    use QueryTagLevel::*;

    vec![
        QueryTag::core(tags::STUDY_INSTANCE_UID, VR::UI, Study, "StudyInstanceUID"),
        QueryTag::core(tags::STUDY_DATE, VR::DA, Study, "StudyDate"),
        QueryTag::core(tags::STUDY_DESCRIPTION, VR::LO, Study, "StudyDescription"),
        QueryTag::core(tags::ACCESSION_NUMBER, VR::SH, Study, "AccessionNumber"),
        QueryTag::core(tags::PATIENT_ID, VR::LO, Study, "PatientID"),
        QueryTag::core(tags::PATIENT_NAME, VR::PN, Study, "PatientName"),
        QueryTag::core(
            tags::REFERRING_PHYSICIAN_NAME,
            VR::PN,
            Study,
            "ReferringPhysicianName",
        ),
        QueryTag::core(tags::PATIENT_BIRTH_DATE, VR::DA, Study, "PatientBirthDate"),
        QueryTag::core(tags::SERIES_INSTANCE_UID, VR::UI, Series, "SeriesInstanceUID"),
        QueryTag::core(tags::MODALITY, VR::CS, Series, "Modality"),
        QueryTag::core(
            tags::PERFORMED_PROCEDURE_STEP_START_DATE,
            VR::DA,
            Series,
            "PerformedProcedureStepStartDate",
        ),
        QueryTag::core(
            tags::MANUFACTURER_MODEL_NAME,
            VR::LO,
            Series,
            "ManufacturerModelName",
        ),
        QueryTag::core(tags::SOP_INSTANCE_UID, VR::UI, Instance, "SOPInstanceUID"),
    ]
}
