//! Mapping from query tags to index tables and columns.

use dicom::core::Tag;
use dicom::dictionary_std::tags;

use crate::error::QueryError;
use crate::query::{ExtendedQueryTagDataType, QueryTag, QueryTagLevel};

/// The index tables a filter can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlTableType {
    InstanceTable,
    StudyTable,
    SeriesTable,
    ExtendedQueryTagString,
    ExtendedQueryTagLong,
    ExtendedQueryTagDouble,
    ExtendedQueryTagDateTime,
    ExtendedQueryTagPersonName,
}

impl SqlTableType {
    /// Physical table name.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::InstanceTable => "Instance",
            Self::StudyTable => "Study",
            Self::SeriesTable => "Series",
            Self::ExtendedQueryTagString => "ExtendedQueryTagString",
            Self::ExtendedQueryTagLong => "ExtendedQueryTagLong",
            Self::ExtendedQueryTagDouble => "ExtendedQueryTagDouble",
            Self::ExtendedQueryTagDateTime => "ExtendedQueryTagDateTime",
            Self::ExtendedQueryTagPersonName => "ExtendedQueryTagPersonName",
        }
    }

    /// Alias prefix used in generated SQL. Extended tables append the tag key.
    pub fn alias_prefix(&self) -> &'static str {
        match self {
            Self::InstanceTable => "i",
            Self::StudyTable => "st",
            Self::SeriesTable => "se",
            Self::ExtendedQueryTagString => "cts",
            Self::ExtendedQueryTagLong => "ctl",
            Self::ExtendedQueryTagDouble => "ctd",
            Self::ExtendedQueryTagDateTime => "ctdt",
            Self::ExtendedQueryTagPersonName => "ctpn",
        }
    }

    /// Returns true for the per-type extended value tables.
    pub fn is_extended(&self) -> bool {
        !matches!(
            self,
            Self::InstanceTable | Self::StudyTable | Self::SeriesTable
        )
    }

    /// Extended value table for a storage type.
    pub fn for_data_type(data_type: ExtendedQueryTagDataType) -> Self {
        match data_type {
            ExtendedQueryTagDataType::String => Self::ExtendedQueryTagString,
            ExtendedQueryTagDataType::Long => Self::ExtendedQueryTagLong,
            ExtendedQueryTagDataType::Double => Self::ExtendedQueryTagDouble,
            ExtendedQueryTagDataType::DateTime => Self::ExtendedQueryTagDateTime,
            ExtendedQueryTagDataType::PersonName => Self::ExtendedQueryTagPersonName,
        }
    }
}

/// Where a tag's values live in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DicomTagSqlEntry {
    /// Table holding the value.
    pub table: SqlTableType,
    /// Column compared by exact and range matches.
    pub column: &'static str,
    /// Word column used by fuzzy person name matches.
    pub full_text_column: Option<&'static str>,
    /// Storage key of an extended tag.
    pub tag_key: Option<i32>,
    /// Level the value is indexed at.
    pub level: QueryTagLevel,
}

const CORE_COLUMNS: &[(Tag, SqlTableType, &str, Option<&str>)] = &[
    (tags::STUDY_INSTANCE_UID, SqlTableType::StudyTable, "StudyInstanceUid", None),
    (tags::STUDY_DATE, SqlTableType::StudyTable, "StudyDate", None),
    (tags::STUDY_DESCRIPTION, SqlTableType::StudyTable, "StudyDescription", None),
    (tags::ACCESSION_NUMBER, SqlTableType::StudyTable, "AccessionNumber", None),
    (tags::PATIENT_ID, SqlTableType::StudyTable, "PatientId", None),
    (
        tags::PATIENT_NAME,
        SqlTableType::StudyTable,
        "PatientName",
        Some("PatientNameWords"),
    ),
    (
        tags::REFERRING_PHYSICIAN_NAME,
        SqlTableType::StudyTable,
        "ReferringPhysicianName",
        Some("ReferringPhysicianNameWords"),
    ),
    (tags::PATIENT_BIRTH_DATE, SqlTableType::StudyTable, "PatientBirthDate", None),
    (tags::SERIES_INSTANCE_UID, SqlTableType::SeriesTable, "SeriesInstanceUid", None),
    (tags::MODALITY, SqlTableType::SeriesTable, "Modality", None),
    (
        tags::PERFORMED_PROCEDURE_STEP_START_DATE,
        SqlTableType::SeriesTable,
        "PerformedProcedureStepStartDate",
        None,
    ),
    (
        tags::MANUFACTURER_MODEL_NAME,
        SqlTableType::SeriesTable,
        "ManufacturerModelName",
        None,
    ),
    (tags::SOP_INSTANCE_UID, SqlTableType::InstanceTable, "SopInstanceUid", None),
];

impl DicomTagSqlEntry {
    /// Resolves the storage location of a query tag.
    ///
    /// # Errors
    ///
    /// * `QueryError::UnmappedTag` - If the tag is neither a core tag nor a
    ///   fully indexed extended tag
    pub fn for_query_tag(tag: &QueryTag) -> Result<Self, QueryError> {
        if let Some(entry) = tag.extended_entry() {
            if !tag.is_indexed() {
                return Err(unmapped(tag));
            }
            let data_type = tag.data_type().ok_or_else(|| unmapped(tag))?;
            let table = SqlTableType::for_data_type(data_type);
            let full_text_column = (table == SqlTableType::ExtendedQueryTagPersonName)
                .then_some("TagValueWords");
            return Ok(Self {
                table,
                column: "TagValue",
                full_text_column,
                tag_key: Some(entry.key),
                level: entry.level,
            });
        }

        CORE_COLUMNS
            .iter()
            .find(|(t, ..)| *t == tag.tag())
            .map(|(_, table, column, full_text_column)| Self {
                table: *table,
                column,
                full_text_column: *full_text_column,
                tag_key: None,
                level: tag.level(),
            })
            .ok_or_else(|| unmapped(tag))
    }

    /// Alias of the table instance this entry is read from.
    pub fn alias(&self) -> String {
        match self.tag_key {
            Some(key) if self.table.is_extended() => {
                format!("{}{}", self.table.alias_prefix(), key)
            }
            _ => self.table.alias_prefix().to_string(),
        }
    }

    /// `alias.column`.
    pub fn qualified_column(&self) -> String {
        format!("{}.{}", self.alias(), self.column)
    }

    /// `alias.full_text_column`, if the entry has one.
    pub fn qualified_full_text_column(&self) -> Option<String> {
        self.full_text_column
            .map(|column| format!("{}.{}", self.alias(), column))
    }
}

fn unmapped(tag: &QueryTag) -> QueryError {
    QueryError::UnmappedTag {
        tag: tag.path(),
    }
}

#[cfg(test)]
mod tests {
    use dicom::core::VR;

    use super::*;
    use crate::query::{
        ExtendedQueryTagStatus, ExtendedQueryTagStoreEntry, QueryStatus, core_query_tags,
    };

    fn extended(vr: &str, status: ExtendedQueryTagStatus) -> QueryTag {
        QueryTag::from_extended(ExtendedQueryTagStoreEntry {
            key: 7,
            path: "00101010".to_string(),
            vr: vr.to_string(),
            private_creator: None,
            level: QueryTagLevel::Study,
            status,
            query_status: QueryStatus::Enabled,
            error_count: 0,
        })
        .unwrap()
    }

    #[test]
    fn test_every_core_tag_is_mapped() {
        for tag in core_query_tags() {
            let entry = DicomTagSqlEntry::for_query_tag(&tag).unwrap();
            assert!(!entry.table.is_extended(), "{tag}");
        }
    }

    #[test]
    fn test_core_patient_name_has_word_column() {
        let tag = QueryTag::core(tags::PATIENT_NAME, VR::PN, QueryTagLevel::Study, "PatientName");
        let entry = DicomTagSqlEntry::for_query_tag(&tag).unwrap();
        assert_eq!(entry.qualified_column(), "st.PatientName");
        assert_eq!(
            entry.qualified_full_text_column().as_deref(),
            Some("st.PatientNameWords")
        );
    }

    #[test]
    fn test_every_core_person_name_has_word_column() {
        for tag in core_query_tags().into_iter().filter(|t| t.vr() == VR::PN) {
            let entry = DicomTagSqlEntry::for_query_tag(&tag).unwrap();
            assert_eq!(
                entry.full_text_column.map(str::to_string),
                Some(format!("{}Words", entry.column)),
                "{tag}"
            );
        }
    }

    #[test]
    fn test_extended_alias_carries_key() {
        let entry = DicomTagSqlEntry::for_query_tag(&extended("AS", ExtendedQueryTagStatus::Ready))
            .unwrap();
        assert_eq!(entry.table, SqlTableType::ExtendedQueryTagString);
        assert_eq!(entry.qualified_column(), "cts7.TagValue");

        let entry = DicomTagSqlEntry::for_query_tag(&extended("PN", ExtendedQueryTagStatus::Ready))
            .unwrap();
        assert_eq!(
            entry.qualified_full_text_column().as_deref(),
            Some("ctpn7.TagValueWords")
        );
    }

    #[test]
    fn test_unindexed_or_unknown_tags_are_unmapped() {
        let adding = extended("AS", ExtendedQueryTagStatus::Adding);
        assert!(matches!(
            DicomTagSqlEntry::for_query_tag(&adding),
            Err(QueryError::UnmappedTag { .. })
        ));

        let unknown = QueryTag::core(
            tags::INSTITUTION_NAME,
            VR::LO,
            QueryTagLevel::Series,
            "InstitutionName",
        );
        assert!(matches!(
            DicomTagSqlEntry::for_query_tag(&unknown),
            Err(QueryError::UnmappedTag { .. })
        ));
    }
}
