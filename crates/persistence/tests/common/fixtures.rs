//! Dataset fixtures and store builders.

use chrono::NaiveDate;
use dicom::core::VR;
use dicom::dictionary_std::tags;

use dicom_persistence::backends::sqlite::SqliteIndexStore;
use dicom_persistence::core::IndexStore;
use dicom_persistence::query::{QueryTag, core_query_tags};
use dicom_persistence::types::{DicomDataset, PartitionKey, VersionedInstanceIdentifier};

/// An instance fixture for testing.
#[derive(Debug, Clone)]
pub struct InstanceFixture {
    /// Study Instance UID.
    pub study: String,
    /// Series Instance UID.
    pub series: String,
    /// SOP Instance UID.
    pub sop: String,
    /// Study date.
    pub study_date: Option<NaiveDate>,
    /// Patient name, alphabetic component.
    pub patient_name: Option<String>,
    /// Modality.
    pub modality: Option<String>,
    /// Extra string elements.
    pub extra: Vec<(dicom::core::Tag, VR, String)>,
    /// Extra person name elements.
    pub names: Vec<(dicom::core::Tag, String)>,
}

impl InstanceFixture {
    /// Creates a fixture with only the UID triple.
    pub fn new(study: &str, series: &str, sop: &str) -> Self {
        Self {
            study: study.to_string(),
            series: series.to_string(),
            sop: sop.to_string(),
            study_date: None,
            patient_name: None,
            modality: None,
            extra: Vec::new(),
            names: Vec::new(),
        }
    }

    /// Sets the study date.
    pub fn with_study_date(mut self, year: i32, month: u32, day: u32) -> Self {
        self.study_date = NaiveDate::from_ymd_opt(year, month, day);
        self
    }

    /// Sets the patient name.
    pub fn with_patient_name(mut self, name: &str) -> Self {
        self.patient_name = Some(name.to_string());
        self
    }

    /// Sets the modality.
    pub fn with_modality(mut self, modality: &str) -> Self {
        self.modality = Some(modality.to_string());
        self
    }

    /// Adds a person name element.
    pub fn with_person_name(mut self, tag: dicom::core::Tag, alphabetic: &str) -> Self {
        self.names.push((tag, alphabetic.to_string()));
        self
    }

    /// Adds a string element.
    pub fn with_string(mut self, tag: dicom::core::Tag, vr: VR, value: &str) -> Self {
        self.extra.push((tag, vr, value.to_string()));
        self
    }

    /// Builds the dataset.
    pub fn dataset(&self) -> DicomDataset {
        let mut dataset = DicomDataset::new();
        dataset
            .insert_string(tags::STUDY_INSTANCE_UID, VR::UI, self.study.as_str())
            .insert_string(tags::SERIES_INSTANCE_UID, VR::UI, self.series.as_str())
            .insert_string(tags::SOP_INSTANCE_UID, VR::UI, self.sop.as_str());
        if let Some(date) = self.study_date {
            dataset.insert_date(tags::STUDY_DATE, date);
        }
        if let Some(name) = &self.patient_name {
            dataset.insert_person_name(tags::PATIENT_NAME, name.as_str());
        }
        if let Some(modality) = &self.modality {
            dataset.insert_string(tags::MODALITY, VR::CS, modality.as_str());
        }
        for (tag, vr, value) in &self.extra {
            dataset.insert_string(*tag, *vr, value.as_str());
        }
        for (tag, name) in &self.names {
            dataset.insert_person_name(*tag, name.as_str());
        }
        dataset
    }
}

/// Creates an in-memory SQLite index at the latest schema.
pub fn sqlite_store() -> SqliteIndexStore {
    SqliteIndexStore::in_memory().expect("Failed to create SQLite index store")
}

/// Indexes a dataset and marks it complete, returning its identifier.
pub async fn index_instance<S: IndexStore + ?Sized>(
    store: &S,
    partition_key: PartitionKey,
    dataset: &DicomDataset,
    query_tags: &[QueryTag],
) -> VersionedInstanceIdentifier {
    let watermark = store
        .begin_create_instance_index(partition_key, dataset, query_tags)
        .await
        .expect("Failed to begin indexing");
    store
        .end_create_instance_index(partition_key, dataset, watermark)
        .await
        .expect("Failed to end indexing");
    dataset
        .to_versioned_identifier(watermark, partition_key)
        .expect("Fixture UIDs are valid")
}

/// Looks up a core query tag by keyword.
pub fn core_tag(name: &str) -> QueryTag {
    core_query_tags()
        .into_iter()
        .find(|t| t.name() == name)
        .unwrap_or_else(|| panic!("{name} is not a core query tag"))
}

/// Shorthand for a versioned identifier in the default partition.
pub fn identifier(
    study: &str,
    series: &str,
    sop: &str,
    version: i64,
) -> VersionedInstanceIdentifier {
    VersionedInstanceIdentifier::new(study, series, sop, version, PartitionKey::DEFAULT)
        .expect("Fixture UIDs are valid")
}
