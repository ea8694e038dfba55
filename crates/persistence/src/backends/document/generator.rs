//! Document-store query generation.
//!
//! Conditions address the dataset stored under `value` with bracket paths,
//! `c['value']['00080020']['Value'][0]`, adding `['Alphabetic']` for person
//! names. Values are formatted the way the dataset stores them (dates as
//! `yyyyMMdd`) and are always bound as `@pN` parameters. DT elements hold a
//! time after the date, so date filters on them become a range over every
//! value starting with the date. Each condition
//! renders as one parenthesized fragment and fragments are joined with
//! `" AND "`.

use std::fmt;

use chrono::NaiveDate;
use dicom::core::VR;
use serde_json::{Value, json};

use crate::error::QueryError;
use crate::query::{BaseQueryExpression, QueryFilterConditionVisitor, QueryTag, visit_all};
use crate::types::{DICOM_DATE_FORMAT, PartitionKey, canonical_tag_path};

const BACKEND_NAME: &str = "document";

// Sorts after every character a DT value can hold.
const DATE_TIME_UPPER_BOUND: char = '~';

/// Where a predicate reads its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentPath {
    /// A top-level document property such as `studyId`.
    Field(&'static str),
    /// The first value of a dataset element.
    Tag {
        /// Canonical tag path.
        path: String,
        /// Read the `Alphabetic` component of a person name.
        alphabetic: bool,
    },
}

impl DocumentPath {
    fn tag(tag: &QueryTag, alphabetic: bool) -> Self {
        Self::Tag {
            path: canonical_tag_path(tag.tag()),
            alphabetic,
        }
    }

    /// Looks the path up in a document.
    pub fn resolve<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        match self {
            Self::Field(name) => document.get(*name),
            Self::Tag { path, alphabetic } => {
                let first = document.get("value")?.get(path)?.get("Value")?.get(0)?;
                if *alphabetic {
                    first.get("Alphabetic")
                } else {
                    Some(first)
                }
            }
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "c.{}", name),
            Self::Tag { path, alphabetic } => {
                write!(f, "c['value']['{}']['Value'][0]", path)?;
                if *alphabetic {
                    write!(f, "['Alphabetic']")?;
                }
                Ok(())
            }
        }
    }
}

/// One conjunct of a document query. Operands name bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentPredicate {
    /// `path = @p`
    #[allow(missing_docs)]
    Equals { path: DocumentPath, parameter: String },
    /// `path BETWEEN @min AND @max`, inclusive.
    #[allow(missing_docs)]
    Between {
        path: DocumentPath,
        minimum: String,
        maximum: String,
    },
    /// Case-insensitive, unanchored regular expression match.
    #[allow(missing_docs)]
    RegexMatch { path: DocumentPath, parameter: String },
}

impl fmt::Display for DocumentPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals { path, parameter } => write!(f, "({} = {})", path, parameter),
            Self::Between {
                path,
                minimum,
                maximum,
            } => write!(f, "({} BETWEEN {} AND {})", path, minimum, maximum),
            Self::RegexMatch { path, parameter } => {
                write!(f, "(REGEXMATCH({}, {}, 'i'))", path, parameter)
            }
        }
    }
}

/// A named parameter value.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameter {
    /// Name including the `@` sigil.
    pub name: String,
    /// Bound value.
    pub value: Value,
}

/// A parameterized document query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    /// Conjunctive predicates in evaluation order.
    pub predicates: Vec<DocumentPredicate>,
    /// Bound parameters.
    pub parameters: Vec<QueryParameter>,
    /// Matches skipped before the first page.
    pub offset: u64,
}

impl DocumentQuery {
    /// Creates an unfiltered query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query over one partition.
    pub fn in_partition(partition_key: PartitionKey) -> Self {
        let mut query = Self::new();
        query.and_field_equals("partitionKey", json!(partition_key.value()));
        query
    }

    /// Adds `c.{field} = @{field}`.
    pub fn and_field_equals(&mut self, field: &'static str, value: Value) -> &mut Self {
        let parameter = format!("@{}", field);
        self.parameters.push(QueryParameter {
            name: parameter.clone(),
            value,
        });
        self.predicates.push(DocumentPredicate::Equals {
            path: DocumentPath::Field(field),
            parameter,
        });
        self
    }

    /// Binds a positional `@pN` parameter and returns its name.
    fn bind(&mut self, value: Value) -> String {
        let count = self
            .parameters
            .iter()
            .filter(|p| p.name.starts_with("@p") && p.name[2..].parse::<usize>().is_ok())
            .count();
        let name = format!("@p{}", count);
        self.parameters.push(QueryParameter {
            name: name.clone(),
            value,
        });
        name
    }

    /// Looks up a bound parameter.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// The predicate text joined with `" AND "`.
    pub fn filter_text(&self) -> String {
        self.predicates
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// The full query text.
    pub fn text(&self) -> String {
        let mut text = "SELECT * FROM c".to_string();
        if !self.predicates.is_empty() {
            text.push_str(" WHERE ");
            text.push_str(&self.filter_text());
        }
        if self.offset > 0 {
            text.push_str(&format!(" OFFSET {}", self.offset));
        }
        text
    }
}

impl fmt::Display for DocumentQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Visitor that accumulates document predicates for one query.
#[derive(Debug, Default)]
pub struct DocumentQueryGenerator {
    query: DocumentQuery,
    output: String,
}

impl DocumentQueryGenerator {
    /// Creates a generator with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator whose query is scoped to a partition.
    pub fn for_partition(partition_key: PartitionKey) -> Self {
        Self {
            query: DocumentQuery::in_partition(partition_key),
            output: String::new(),
        }
    }

    /// Builds the partition-scoped query for an expression.
    ///
    /// # Errors
    ///
    /// * `QueryError::UnsupportedCondition` - If a condition is a long range
    pub fn generate(
        expression: &BaseQueryExpression,
        partition_key: PartitionKey,
    ) -> Result<DocumentQuery, QueryError> {
        let mut generator = Self::for_partition(partition_key);
        visit_all(expression.filter_conditions(), &mut generator)?;
        let mut query = generator.into_query();
        query.offset = expression.offset() as u64;
        Ok(query)
    }

    /// Filter text produced by the visited conditions.
    pub fn output_query(&self) -> &str {
        &self.output
    }

    /// The accumulated query.
    pub fn into_query(self) -> DocumentQuery {
        self.query
    }

    fn add_to_query(&mut self, predicate: DocumentPredicate) {
        if !self.output.is_empty() {
            self.output.push_str(" AND ");
        }
        self.output.push_str(&predicate.to_string());
        self.query.predicates.push(predicate);
    }

    fn equals(&mut self, tag: &QueryTag, value: Value) {
        let parameter = self.query.bind(value);
        self.add_to_query(DocumentPredicate::Equals {
            path: DocumentPath::tag(tag, false),
            parameter,
        });
    }
}

/// Regex used for fuzzy person name matches: every whitespace-separated
/// token followed by `.*`, concatenated.
pub fn fuzzy_name_pattern(value: &str) -> String {
    value
        .split(' ')
        .map(|token| format!("{}.*", regex::escape(token)))
        .collect()
}

impl QueryFilterConditionVisitor for DocumentQueryGenerator {
    fn visit_string_single_value(&mut self, tag: &QueryTag, value: &str) -> Result<(), QueryError> {
        self.equals(tag, json!(value));
        Ok(())
    }

    fn visit_double_single_value(&mut self, tag: &QueryTag, value: f64) -> Result<(), QueryError> {
        self.equals(tag, json!(value));
        Ok(())
    }

    fn visit_long_single_value(&mut self, tag: &QueryTag, value: i64) -> Result<(), QueryError> {
        self.equals(tag, json!(value));
        Ok(())
    }

    fn visit_long_range(
        &mut self,
        tag: &QueryTag,
        _minimum: i64,
        _maximum: i64,
    ) -> Result<(), QueryError> {
        Err(QueryError::UnsupportedCondition {
            backend: BACKEND_NAME.to_string(),
            condition: format!("LongRangeValueMatch on {}", tag.path()),
        })
    }

    fn visit_date_single_value(
        &mut self,
        tag: &QueryTag,
        value: NaiveDate,
    ) -> Result<(), QueryError> {
        if tag.vr() == VR::DT {
            return self.visit_date_range(tag, value, value);
        }
        self.equals(tag, json!(value.format(DICOM_DATE_FORMAT).to_string()));
        Ok(())
    }

    fn visit_date_range(
        &mut self,
        tag: &QueryTag,
        minimum: NaiveDate,
        maximum: NaiveDate,
    ) -> Result<(), QueryError> {
        let minimum = self
            .query
            .bind(json!(minimum.format(DICOM_DATE_FORMAT).to_string()));
        let mut maximum = maximum.format(DICOM_DATE_FORMAT).to_string();
        if tag.vr() == VR::DT {
            maximum.push(DATE_TIME_UPPER_BOUND);
        }
        let maximum = self.query.bind(json!(maximum));
        self.add_to_query(DocumentPredicate::Between {
            path: DocumentPath::tag(tag, false),
            minimum,
            maximum,
        });
        Ok(())
    }

    fn visit_person_name_fuzzy(&mut self, tag: &QueryTag, value: &str) -> Result<(), QueryError> {
        let parameter = self.query.bind(json!(fuzzy_name_pattern(value)));
        self.add_to_query(DocumentPredicate::RegexMatch {
            path: DocumentPath::tag(tag, true),
            parameter,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryFilterCondition, QueryIncludeField, core_query_tags};

    fn core(name: &str) -> QueryTag {
        core_query_tags()
            .into_iter()
            .find(|t| t.name() == name)
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_single_condition_has_no_separator() {
        let mut generator = DocumentQueryGenerator::new();
        QueryFilterCondition::DateSingleValue {
            tag: core("StudyDate"),
            value: date(2020, 9, 22),
        }
        .accept(&mut generator)
        .unwrap();

        assert_eq!(
            generator.output_query(),
            "(c['value']['00080020']['Value'][0] = @p0)"
        );
        let query = generator.into_query();
        assert_eq!(query.parameter("@p0"), Some(&json!("20200922")));
    }

    #[test]
    fn test_conditions_are_joined_with_and() {
        let mut generator = DocumentQueryGenerator::new();
        let conditions = vec![
            QueryFilterCondition::StringSingleValue {
                tag: core("Modality"),
                value: "CT".to_string(),
            },
            QueryFilterCondition::DateRange {
                tag: core("StudyDate"),
                minimum: date(2020, 1, 1),
                maximum: date(2020, 12, 31),
            },
        ];
        visit_all(&conditions, &mut generator).unwrap();

        assert_eq!(
            generator.output_query(),
            "(c['value']['00080060']['Value'][0] = @p0) AND \
             (c['value']['00080020']['Value'][0] BETWEEN @p1 AND @p2)"
        );
        let query = generator.into_query();
        assert_eq!(query.parameter("@p1"), Some(&json!("20200101")));
        assert_eq!(query.parameter("@p2"), Some(&json!("20201231")));
    }

    #[test]
    fn test_date_time_dates_match_as_prefix_range() {
        let tag = QueryTag::core(
            dicom::dictionary_std::tags::ACQUISITION_DATE_TIME,
            VR::DT,
            crate::query::QueryTagLevel::Instance,
            "AcquisitionDateTime",
        );
        let mut generator = DocumentQueryGenerator::new();
        generator
            .visit_date_single_value(&tag, date(2020, 9, 22))
            .unwrap();

        assert_eq!(
            generator.output_query(),
            "(c['value']['0008002A']['Value'][0] BETWEEN @p0 AND @p1)"
        );
        let query = generator.into_query();
        assert_eq!(query.parameter("@p0"), Some(&json!("20200922")));
        assert_eq!(query.parameter("@p1"), Some(&json!("20200922~")));
    }

    #[test]
    fn test_fuzzy_name_is_case_insensitive_regex() {
        let mut generator = DocumentQueryGenerator::new();
        QueryFilterCondition::PersonNameFuzzy {
            tag: core("PatientName"),
            value: "jo do".to_string(),
        }
        .accept(&mut generator)
        .unwrap();

        assert_eq!(
            generator.output_query(),
            "(REGEXMATCH(c['value']['00100010']['Value'][0]['Alphabetic'], @p0, 'i'))"
        );
        assert_eq!(
            generator.into_query().parameter("@p0"),
            Some(&json!("jo.*do.*"))
        );
    }

    #[test]
    fn test_fuzzy_pattern_escapes_metacharacters() {
        assert_eq!(fuzzy_name_pattern("o'b.r"), "o'b\\.r.*");
    }

    #[test]
    fn test_long_range_fails_before_writing() {
        let mut generator = DocumentQueryGenerator::new();
        let tag = core("StudyDate");
        let err = generator.visit_long_range(&tag, 1, 5).unwrap_err();

        assert!(matches!(err, QueryError::UnsupportedCondition { .. }));
        assert!(generator.output_query().is_empty());
        assert!(generator.into_query().predicates.is_empty());
    }

    #[test]
    fn test_values_are_bound_not_interpolated() {
        let expression = BaseQueryExpression::new(
            QueryIncludeField::Default,
            false,
            10,
            0,
            vec![QueryFilterCondition::StringSingleValue {
                tag: core("AccessionNumber"),
                value: "x') OR (1 = 1".to_string(),
            }],
        );
        let query = DocumentQueryGenerator::generate(&expression, PartitionKey::DEFAULT).unwrap();

        assert_eq!(
            query.text(),
            "SELECT * FROM c WHERE (c.partitionKey = @partitionKey) AND \
             (c['value']['00080050']['Value'][0] = @p0)"
        );
        assert_eq!(query.parameter("@p0"), Some(&json!("x') OR (1 = 1")));
    }
}
