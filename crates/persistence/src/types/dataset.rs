//! Parsed DICOM datasets in the DICOM JSON model.
//!
//! The crate never decodes DICOM wire data itself. Callers hand over datasets
//! already rendered in the PS3.18 JSON model, where every element is keyed by
//! its eight-digit tag path:
//!
//! ```json
//! { "00080020": { "vr": "DA", "Value": ["20210305"] } }
//! ```
//!
//! [`canonical_tag_path`] is the single formatter for those keys. The dataset
//! writer and the document query generator both go through it, so a stored
//! element and a predicate over it always agree on the path.

use chrono::NaiveDate;
use dicom::core::{Tag, VR};
use dicom::dictionary_std::tags;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::ValidationError;

use super::identifier::VersionedInstanceIdentifier;
use super::partition::PartitionKey;

/// Date format used for DA values in datasets and document predicates.
pub const DICOM_DATE_FORMAT: &str = "%Y%m%d";

/// Formats a tag as its canonical path, e.g. `(0008,0020)` becomes `00080020`.
///
/// # Examples
///
/// ```
/// use dicom::dictionary_std::tags;
/// use dicom_persistence::types::canonical_tag_path;
///
/// assert_eq!(canonical_tag_path(tags::STUDY_DATE), "00080020");
/// ```
pub fn canonical_tag_path(tag: Tag) -> String {
    tag.to_string()
        .trim_matches(|c| c == '(' || c == ')')
        .replace(',', "")
}

/// Parses a canonical tag path back into a tag.
pub fn parse_tag_path(path: &str) -> Option<Tag> {
    if path.len() != 8 || !path.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let group = u16::from_str_radix(&path[..4], 16).ok()?;
    let element = u16::from_str_radix(&path[4..], 16).ok()?;
    Some(Tag(group, element))
}

/// Returns the two-letter code of a value representation.
pub fn vr_code(vr: VR) -> &'static str {
    match vr {
        VR::AE => "AE",
        VR::AS => "AS",
        VR::AT => "AT",
        VR::CS => "CS",
        VR::DA => "DA",
        VR::DS => "DS",
        VR::DT => "DT",
        VR::FL => "FL",
        VR::FD => "FD",
        VR::IS => "IS",
        VR::LO => "LO",
        VR::LT => "LT",
        VR::OB => "OB",
        VR::OD => "OD",
        VR::OF => "OF",
        VR::OL => "OL",
        VR::OV => "OV",
        VR::OW => "OW",
        VR::PN => "PN",
        VR::SH => "SH",
        VR::SL => "SL",
        VR::SQ => "SQ",
        VR::SS => "SS",
        VR::ST => "ST",
        VR::SV => "SV",
        VR::TM => "TM",
        VR::UC => "UC",
        VR::UI => "UI",
        VR::UL => "UL",
        VR::UR => "UR",
        VR::US => "US",
        VR::UT => "UT",
        VR::UV => "UV",
        _ => "UN",
    }
}

/// Parses a two-letter value representation code.
pub fn parse_vr(code: &str) -> Option<VR> {
    let bytes = code.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    VR::from_binary([bytes[0], bytes[1]])
}

/// A dataset in the DICOM JSON model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DicomDataset {
    elements: Map<String, Value>,
}

impl DicomDataset {
    /// Creates an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON value, which must be an object keyed by tag paths.
    pub fn from_json(value: Value) -> Result<Self, ValidationError> {
        match value {
            Value::Object(elements) => {
                if let Some(bad) = elements.keys().find(|k| parse_tag_path(k).is_none()) {
                    return Err(ValidationError::InvalidIdentifier {
                        field: "tag".to_string(),
                        value: bad.clone(),
                        message: "dataset keys must be eight hex digits".to_string(),
                    });
                }
                Ok(Self { elements })
            }
            other => Err(ValidationError::InvalidIdentifier {
                field: "dataset".to_string(),
                value: other.to_string(),
                message: "expected a JSON object".to_string(),
            }),
        }
    }

    /// Inserts an element with the given values, replacing any existing one.
    pub fn insert(&mut self, tag: Tag, vr: VR, values: Vec<Value>) -> &mut Self {
        self.elements.insert(
            canonical_tag_path(tag),
            json!({ "vr": vr_code(vr), "Value": values }),
        );
        self
    }

    /// Inserts a single string value.
    pub fn insert_string(&mut self, tag: Tag, vr: VR, value: impl Into<String>) -> &mut Self {
        self.insert(tag, vr, vec![Value::String(value.into())])
    }

    /// Inserts a person name with only the alphabetic component.
    pub fn insert_person_name(&mut self, tag: Tag, alphabetic: impl Into<String>) -> &mut Self {
        self.insert(tag, VR::PN, vec![json!({ "Alphabetic": alphabetic.into() })])
    }

    /// Inserts a DA value.
    pub fn insert_date(&mut self, tag: Tag, date: NaiveDate) -> &mut Self {
        self.insert_string(tag, VR::DA, date.format(DICOM_DATE_FORMAT).to_string())
    }

    /// Returns the number of top-level elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the dataset has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns `true` if the dataset has an element for `tag`.
    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&canonical_tag_path(tag))
    }

    /// Returns the declared VR of an element.
    pub fn vr(&self, tag: Tag) -> Option<VR> {
        self.element(tag)?.get("vr")?.as_str().and_then(parse_vr)
    }

    /// Returns the first entry of an element's `Value` array.
    pub fn first_value(&self, tag: Tag) -> Option<&Value> {
        self.element(tag)?.get("Value")?.as_array()?.first()
    }

    /// Returns the first value as a string.
    pub fn string(&self, tag: Tag) -> Option<&str> {
        self.first_value(tag)?.as_str()
    }

    /// Returns the alphabetic component of the first person name value.
    pub fn person_name(&self, tag: Tag) -> Option<&str> {
        self.first_value(tag)?.get("Alphabetic")?.as_str()
    }

    /// Returns the first value parsed as a date.
    ///
    /// DT values keep only their leading `yyyyMMdd` part.
    pub fn date(&self, tag: Tag) -> Option<NaiveDate> {
        let value = self.string(tag)?.trim();
        let value = if self.vr(tag) == Some(VR::DT) {
            value.get(..8)?
        } else {
            value
        };
        NaiveDate::parse_from_str(value, DICOM_DATE_FORMAT).ok()
    }

    /// Returns the first value as an integer. IS values arrive as strings.
    pub fn long(&self, tag: Tag) -> Option<i64> {
        match self.first_value(tag)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the first value as a float. DS values arrive as strings.
    pub fn double(&self, tag: Tag) -> Option<f64> {
        match self.first_value(tag)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Builds the versioned identifier of the instance this dataset describes.
    pub fn to_versioned_identifier(
        &self,
        version: i64,
        partition_key: PartitionKey,
    ) -> Result<VersionedInstanceIdentifier, ValidationError> {
        VersionedInstanceIdentifier::new(
            self.string(tags::STUDY_INSTANCE_UID).unwrap_or_default(),
            self.string(tags::SERIES_INSTANCE_UID).unwrap_or_default(),
            self.string(tags::SOP_INSTANCE_UID).unwrap_or_default(),
            version,
            partition_key,
        )
    }

    /// Returns a copy with bulk data references and inline binaries removed.
    pub fn without_bulk_data(&self) -> Self {
        let elements = self
            .elements
            .iter()
            .filter(|(_, element)| !is_bulk_data(element))
            .map(|(key, element)| (key.clone(), strip_nested_bulk_data(element)))
            .collect();
        Self { elements }
    }

    /// Returns the underlying JSON object.
    pub fn as_json(&self) -> &Map<String, Value> {
        &self.elements
    }

    /// Consumes the dataset into a JSON value.
    pub fn into_json(self) -> Value {
        Value::Object(self.elements)
    }

    fn element(&self, tag: Tag) -> Option<&Value> {
        self.elements.get(&canonical_tag_path(tag))
    }
}

fn is_bulk_data(element: &Value) -> bool {
    element.get("BulkDataURI").is_some() || element.get("InlineBinary").is_some()
}

// Sequence items are datasets themselves.
fn strip_nested_bulk_data(element: &Value) -> Value {
    let is_sequence = element.get("vr").and_then(Value::as_str) == Some("SQ");
    if !is_sequence {
        return element.clone();
    }
    let mut element = element.clone();
    if let Some(items) = element.get_mut("Value").and_then(Value::as_array_mut) {
        for item in items.iter_mut() {
            if let Value::Object(fields) = item {
                fields.retain(|_, nested| !is_bulk_data(nested));
                for nested in fields.values_mut() {
                    *nested = strip_nested_bulk_data(nested);
                }
            }
        }
    }
    element
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DicomDataset {
        let mut ds = DicomDataset::new();
        ds.insert_string(tags::STUDY_INSTANCE_UID, VR::UI, "1.2.3")
            .insert_string(tags::SERIES_INSTANCE_UID, VR::UI, "1.2.3.4")
            .insert_string(tags::SOP_INSTANCE_UID, VR::UI, "1.2.3.4.5")
            .insert_person_name(tags::PATIENT_NAME, "Doe^John")
            .insert_string(tags::STUDY_DATE, VR::DA, "20210305")
            .insert_string(tags::SERIES_NUMBER, VR::IS, "12");
        ds
    }

    #[test]
    fn test_canonical_tag_path_round_trips() {
        let path = canonical_tag_path(tags::STUDY_DATE);
        assert_eq!(path, "00080020");
        assert_eq!(parse_tag_path(&path), Some(tags::STUDY_DATE));
        assert_eq!(canonical_tag_path(Tag(0x0009, 0x10AB)), "000910AB");
        assert_eq!(parse_tag_path("0008002"), None);
        assert_eq!(parse_tag_path("0008002G"), None);
    }

    #[test]
    fn test_vr_codes_round_trip() {
        for vr in [VR::DA, VR::PN, VR::UI, VR::FD, VR::SQ, VR::US] {
            assert_eq!(parse_vr(vr_code(vr)), Some(vr));
        }
        assert_eq!(parse_vr("X"), None);
    }

    #[test]
    fn test_typed_accessors() {
        let ds = sample();
        assert_eq!(ds.person_name(tags::PATIENT_NAME), Some("Doe^John"));
        assert_eq!(ds.date(tags::STUDY_DATE), NaiveDate::from_ymd_opt(2021, 3, 5));
        assert_eq!(ds.long(tags::SERIES_NUMBER), Some(12));
        assert_eq!(ds.vr(tags::STUDY_DATE), Some(VR::DA));
        assert!(ds.string(tags::MODALITY).is_none());
    }

    #[test]
    fn test_date_time_reads_its_date_part() {
        let mut ds = DicomDataset::new();
        ds.insert_string(tags::ACQUISITION_DATE_TIME, VR::DT, "20200922120000.000000+0100")
            .insert_string(tags::STUDY_DATE, VR::DA, "20200922120000");
        assert_eq!(
            ds.date(tags::ACQUISITION_DATE_TIME),
            NaiveDate::from_ymd_opt(2020, 9, 22)
        );
        // DA values must be exactly a date.
        assert!(ds.date(tags::STUDY_DATE).is_none());
    }

    #[test]
    fn test_elements_are_keyed_by_canonical_path() {
        let ds = sample();
        let value = ds.into_json();
        assert_eq!(value["00080020"]["Value"][0], "20210305");
        assert_eq!(value["00100010"]["Value"][0]["Alphabetic"], "Doe^John");
    }

    #[test]
    fn test_to_versioned_identifier() {
        let id = sample()
            .to_versioned_identifier(3, PartitionKey::DEFAULT)
            .unwrap();
        assert_eq!(id.study_instance_uid, "1.2.3");
        assert_eq!(id.sop_instance_uid, "1.2.3.4.5");
        assert_eq!(id.version, 3);

        assert!(
            DicomDataset::new()
                .to_versioned_identifier(1, PartitionKey::DEFAULT)
                .is_err()
        );
    }

    #[test]
    fn test_without_bulk_data() {
        let mut ds = sample();
        ds.elements.insert(
            "7FE00010".to_string(),
            json!({ "vr": "OB", "BulkDataURI": "http://example/pixel" }),
        );
        ds.elements.insert(
            "00540016".to_string(),
            json!({ "vr": "SQ", "Value": [
                { "00281201": { "vr": "OW", "InlineBinary": "AAAA" },
                  "00181072": { "vr": "TM", "Value": ["101500"] } }
            ] }),
        );

        let stripped = ds.without_bulk_data();
        assert_eq!(stripped.len(), ds.len() - 1);
        let sequence = &stripped.as_json()["00540016"]["Value"][0];
        assert!(sequence.get("00281201").is_none());
        assert!(sequence.get("00181072").is_some());
    }

    #[test]
    fn test_from_json_rejects_bad_keys() {
        assert!(DicomDataset::from_json(json!({ "PatientName": {} })).is_err());
        assert!(DicomDataset::from_json(json!([1, 2])).is_err());
        assert!(DicomDataset::from_json(json!({ "00100010": { "vr": "PN" } })).is_ok());
    }
}
