//! SQL generation from filter conditions.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};

use crate::error::QueryError;
use crate::query::{
    BaseQueryExpression, QueryFilterConditionVisitor, QueryTag, QueryTagLevel, visit_all,
};
use crate::types::PartitionKey;

use super::fragment::{SqlFragment, SqlParam};
use super::tag_map::DicomTagSqlEntry;

/// Format of date values in the index tables.
pub const SQL_DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// First schema version with partition columns.
pub const PARTITION_SCHEMA_VERSION: i32 = 2;

/// Formats a date the way the index stores it.
pub fn format_sql_date(date: NaiveDate) -> String {
    date.and_time(NaiveTime::default())
        .format(SQL_DATE_TIME_FORMAT)
        .to_string()
}

/// Turns a query expression into a parameterized SELECT over the index.
///
/// Every literal, including the partition key and paging values, is bound
/// as a parameter. Each filter contributes one line starting with `AND `;
/// extended tags contribute their key filter first.
///
/// ```
/// use dicom_persistence::backends::sqlite::{SqlParam, SqlQueryGenerator};
/// use dicom_persistence::query::{core_query_tags, QueryParameters, QueryParser};
/// use dicom_persistence::types::PartitionKey;
///
/// let expression = QueryParser::new(core_query_tags())
///     .parse(&QueryParameters {
///         filters: vec![("Modality".into(), "CT".into())],
///         ..Default::default()
///     })
///     .unwrap();
///
/// let fragment = SqlQueryGenerator::new(&expression, PartitionKey::DEFAULT, 2)
///     .generate(10, 0)
///     .unwrap();
/// assert!(fragment.sql.contains("AND se.Modality = ?2"));
/// assert_eq!(fragment.params[1], SqlParam::String("CT".into()));
/// assert!(!fragment.sql.contains("'CT'"));
/// ```
pub struct SqlQueryGenerator<'a> {
    expression: &'a BaseQueryExpression,
    partition_key: PartitionKey,
    schema_version: i32,
    fragment: SqlFragment,
}

impl<'a> SqlQueryGenerator<'a> {
    /// Creates a generator for one query.
    pub fn new(
        expression: &'a BaseQueryExpression,
        partition_key: PartitionKey,
        schema_version: i32,
    ) -> Self {
        Self {
            expression,
            partition_key,
            schema_version,
            fragment: SqlFragment::default(),
        }
    }

    fn supports_partitions(&self) -> bool {
        self.schema_version >= PARTITION_SCHEMA_VERSION
    }

    /// Builds the statement, fetching at most `limit` rows after skipping
    /// `offset`.
    ///
    /// # Errors
    ///
    /// * `QueryError::UnmappedTag` - If a filter targets a tag with no
    ///   index location
    pub fn generate(mut self, limit: u64, offset: u64) -> Result<SqlFragment, QueryError> {
        let joins = self.extended_joins()?;

        self.fragment.push_str(
            "SELECT i.StudyInstanceUid, i.SeriesInstanceUid, i.SopInstanceUid, i.Watermark\n\
             FROM Instance i\n\
             INNER JOIN Study st ON st.StudyKey = i.StudyKey\n\
             INNER JOIN Series se ON se.SeriesKey = i.SeriesKey\n",
        );
        if self.supports_partitions() {
            self.fragment
                .push_str("AND se.PartitionKey = i.PartitionKey\n");
        }
        for join in joins.values() {
            self.fragment.push_str(join);
        }

        self.fragment.push_str("WHERE i.Status = 1\n");
        if self.supports_partitions() {
            let p = self
                .fragment
                .add_param(SqlParam::integer(self.partition_key.value() as i64));
            self.fragment
                .push_str(&format!("AND i.PartitionKey = {p}\n"));
        }

        let expression = self.expression;
        visit_all(expression.filter_conditions(), &mut self)?;

        let limit = self.fragment.add_param(SqlParam::integer(to_i64(limit)));
        let offset = self.fragment.add_param(SqlParam::integer(to_i64(offset)));
        self.fragment.push_str(&format!(
            "ORDER BY i.Watermark\nLIMIT {limit} OFFSET {offset}"
        ));

        Ok(self.fragment)
    }

    /// One INNER JOIN per distinct extended tag, keyed by alias so repeated
    /// filters on the same tag share a join.
    fn extended_joins(&self) -> Result<BTreeMap<String, String>, QueryError> {
        let mut joins = BTreeMap::new();
        for condition in self.expression.filter_conditions() {
            let entry = DicomTagSqlEntry::for_query_tag(condition.tag())?;
            if !entry.table.is_extended() {
                continue;
            }
            let alias = entry.alias();
            if joins.contains_key(&alias) {
                continue;
            }

            let mut join = format!(
                "INNER JOIN {} {alias}\nON {alias}.StudyKey = st.StudyKey\n",
                entry.table.table_name()
            );
            if matches!(entry.level, QueryTagLevel::Series | QueryTagLevel::Instance) {
                join.push_str(&format!("AND {alias}.SeriesKey = se.SeriesKey\n"));
            }
            if entry.level == QueryTagLevel::Instance {
                join.push_str(&format!("AND {alias}.InstanceKey = i.InstanceKey\n"));
            }
            if self.supports_partitions() {
                join.push_str(&format!("AND {alias}.PartitionKey = st.PartitionKey\n"));
            }
            joins.insert(alias, join);
        }
        Ok(joins)
    }

    /// Starts a filter line, writing the key filter for extended tags.
    fn begin_filter(&mut self, tag: &QueryTag) -> Result<DicomTagSqlEntry, QueryError> {
        let entry = DicomTagSqlEntry::for_query_tag(tag)?;
        self.fragment.push_str("AND ");
        if let Some(key) = entry.tag_key {
            let p = self.fragment.add_param(SqlParam::integer(key as i64));
            self.fragment
                .push_str(&format!("{}.TagKey = {p}\nAND ", entry.alias()));
        }
        Ok(entry)
    }

    fn append_equals(&mut self, tag: &QueryTag, value: SqlParam) -> Result<(), QueryError> {
        let entry = self.begin_filter(tag)?;
        let p = self.fragment.add_param(value);
        self.fragment
            .push_str(&format!("{} = {p}\n", entry.qualified_column()));
        Ok(())
    }

    fn append_between(
        &mut self,
        tag: &QueryTag,
        minimum: SqlParam,
        maximum: SqlParam,
    ) -> Result<(), QueryError> {
        let entry = self.begin_filter(tag)?;
        let min = self.fragment.add_param(minimum);
        let max = self.fragment.add_param(maximum);
        self.fragment.push_str(&format!(
            "{} BETWEEN {min} AND {max}\n",
            entry.qualified_column()
        ));
        Ok(())
    }
}

impl QueryFilterConditionVisitor for SqlQueryGenerator<'_> {
    fn visit_string_single_value(&mut self, tag: &QueryTag, value: &str) -> Result<(), QueryError> {
        self.append_equals(tag, SqlParam::string(value))
    }

    fn visit_double_single_value(&mut self, tag: &QueryTag, value: f64) -> Result<(), QueryError> {
        self.append_equals(tag, SqlParam::float(value))
    }

    fn visit_long_single_value(&mut self, tag: &QueryTag, value: i64) -> Result<(), QueryError> {
        self.append_equals(tag, SqlParam::integer(value))
    }

    fn visit_long_range(
        &mut self,
        tag: &QueryTag,
        minimum: i64,
        maximum: i64,
    ) -> Result<(), QueryError> {
        self.append_between(tag, SqlParam::integer(minimum), SqlParam::integer(maximum))
    }

    fn visit_date_single_value(
        &mut self,
        tag: &QueryTag,
        value: NaiveDate,
    ) -> Result<(), QueryError> {
        self.append_equals(tag, SqlParam::string(format_sql_date(value)))
    }

    fn visit_date_range(
        &mut self,
        tag: &QueryTag,
        minimum: NaiveDate,
        maximum: NaiveDate,
    ) -> Result<(), QueryError> {
        self.append_between(
            tag,
            SqlParam::string(format_sql_date(minimum)),
            SqlParam::string(format_sql_date(maximum)),
        )
    }

    fn visit_person_name_fuzzy(&mut self, tag: &QueryTag, value: &str) -> Result<(), QueryError> {
        let entry = DicomTagSqlEntry::for_query_tag(tag)?;
        let column = entry
            .qualified_full_text_column()
            .ok_or_else(|| QueryError::UnsupportedCondition {
                backend: "sqlite".to_string(),
                condition: format!("PersonNameFuzzyMatch on {}", tag.path()),
            })?;

        // Quotes delimit the phrase, so embedded ones are dropped.
        let value = value.replace('"', "");
        self.begin_filter(tag)?;
        let p = self
            .fragment
            .add_param(SqlParam::string(format!("\"{value}*\"")));
        self.fragment
            .push_str(&format!("CONTAINS({column}, {p})\n"));
        Ok(())
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use dicom::core::VR;
    use dicom::dictionary_std::tags;

    use super::*;
    use crate::query::{
        ExtendedQueryTagStatus, ExtendedQueryTagStoreEntry, QueryFilterCondition,
        QueryIncludeField, QueryStatus,
    };

    fn core(name: &str) -> QueryTag {
        crate::query::core_query_tags()
            .into_iter()
            .find(|t| t.name() == name)
            .unwrap()
    }

    fn extended(key: i32, path: &str, vr: &str, level: QueryTagLevel) -> QueryTag {
        QueryTag::from_extended(ExtendedQueryTagStoreEntry {
            key,
            path: path.to_string(),
            vr: vr.to_string(),
            private_creator: None,
            level,
            status: ExtendedQueryTagStatus::Ready,
            query_status: QueryStatus::Enabled,
            error_count: 0,
        })
        .unwrap()
    }

    fn expression(filters: Vec<QueryFilterCondition>) -> BaseQueryExpression {
        BaseQueryExpression::new(QueryIncludeField::Default, false, 10, 0, filters)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range_uses_between() {
        let expr = expression(vec![QueryFilterCondition::DateRange {
            tag: core("StudyDate"),
            minimum: date(2020, 1, 1),
            maximum: date(2020, 12, 31),
        }]);
        let fragment = SqlQueryGenerator::new(&expr, PartitionKey::DEFAULT, 2)
            .generate(11, 0)
            .unwrap();

        assert!(fragment.sql.contains("AND st.StudyDate BETWEEN ?2 AND ?3\n"));
        assert_eq!(fragment.params[0], SqlParam::Integer(1));
        assert_eq!(
            fragment.params[1],
            SqlParam::String("2020-01-01 00:00:00.000000".into())
        );
        assert_eq!(
            fragment.params[2],
            SqlParam::String("2020-12-31 00:00:00.000000".into())
        );
        assert!(fragment.sql.ends_with("LIMIT ?4 OFFSET ?5"));
    }

    #[test]
    fn test_fuzzy_person_name_uses_contains() {
        let expr = expression(vec![QueryFilterCondition::PersonNameFuzzy {
            tag: core("PatientName"),
            value: "jo".to_string(),
        }]);
        let fragment = SqlQueryGenerator::new(&expr, PartitionKey::DEFAULT, 2)
            .generate(10, 0)
            .unwrap();

        assert!(fragment.sql.contains("AND CONTAINS(st.PatientNameWords, ?2)\n"));
        assert_eq!(fragment.params[1], SqlParam::String("\"jo*\"".into()));
    }

    #[test]
    fn test_fuzzy_phrase_drops_embedded_quotes() {
        let expr = expression(vec![QueryFilterCondition::PersonNameFuzzy {
            tag: core("ReferringPhysicianName"),
            value: "o\"brien".to_string(),
        }]);
        let fragment = SqlQueryGenerator::new(&expr, PartitionKey::DEFAULT, 2)
            .generate(10, 0)
            .unwrap();

        assert!(
            fragment
                .sql
                .contains("AND CONTAINS(st.ReferringPhysicianNameWords, ?2)\n")
        );
        assert_eq!(fragment.params[1], SqlParam::String("\"obrien*\"".into()));
    }

    #[test]
    fn test_extended_tag_gets_join_and_key_filter() {
        let tag = extended(4, "00101010", "AS", QueryTagLevel::Study);
        let expr = expression(vec![QueryFilterCondition::StringSingleValue {
            tag,
            value: "040Y".to_string(),
        }]);
        let fragment = SqlQueryGenerator::new(&expr, PartitionKey::DEFAULT, 2)
            .generate(10, 0)
            .unwrap();

        assert!(fragment.sql.contains("INNER JOIN ExtendedQueryTagString cts4\n"));
        assert!(fragment.sql.contains("ON cts4.StudyKey = st.StudyKey\n"));
        assert!(!fragment.sql.contains("cts4.SeriesKey"));
        assert!(fragment.sql.contains("AND cts4.TagKey = ?2\nAND cts4.TagValue = ?3\n"));
        assert_eq!(fragment.params[1], SqlParam::Integer(4));
        assert_eq!(fragment.params[2], SqlParam::String("040Y".into()));
    }

    #[test]
    fn test_instance_level_join_reaches_instance() {
        let tag = extended(9, "00180050", "DS", QueryTagLevel::Instance);
        let expr = expression(vec![QueryFilterCondition::StringSingleValue {
            tag,
            value: "1.5".to_string(),
        }]);
        let fragment = SqlQueryGenerator::new(&expr, PartitionKey::DEFAULT, 2)
            .generate(10, 0)
            .unwrap();
        assert!(fragment.sql.contains("AND cts9.SeriesKey = se.SeriesKey\n"));
        assert!(fragment.sql.contains("AND cts9.InstanceKey = i.InstanceKey\n"));
    }

    #[test]
    fn test_long_range_on_extended_tag() {
        let tag = extended(5, "00200011", "IS", QueryTagLevel::Series);
        let expr = expression(vec![QueryFilterCondition::LongRange {
            tag,
            minimum: 1,
            maximum: 4,
        }]);
        let fragment = SqlQueryGenerator::new(&expr, PartitionKey::DEFAULT, 2)
            .generate(10, 0)
            .unwrap();
        assert!(
            fragment
                .sql
                .contains("AND ctl5.TagKey = ?2\nAND ctl5.TagValue BETWEEN ?3 AND ?4\n")
        );
    }

    #[test]
    fn test_partition_clauses_depend_on_schema_version() {
        let expr = expression(Vec::new());
        let partition = PartitionKey::new(3).unwrap();

        let v2 = SqlQueryGenerator::new(&expr, partition, 2)
            .generate(10, 0)
            .unwrap();
        assert!(v2.sql.contains("AND i.PartitionKey = ?1\n"));
        assert_eq!(v2.params[0], SqlParam::Integer(3));

        let v1 = SqlQueryGenerator::new(&expr, partition, 1)
            .generate(10, 0)
            .unwrap();
        assert!(!v1.sql.contains("PartitionKey"));
        assert_eq!(v1.params.len(), 2);
    }

    #[test]
    fn test_values_are_never_interpolated() {
        let hostile = "x'; DROP TABLE Instance; --";
        let expr = expression(vec![QueryFilterCondition::StringSingleValue {
            tag: core("AccessionNumber"),
            value: hostile.to_string(),
        }]);
        let fragment = SqlQueryGenerator::new(&expr, PartitionKey::DEFAULT, 2)
            .generate(10, 0)
            .unwrap();
        assert!(!fragment.sql.contains("DROP"));
        assert!(fragment.params.contains(&SqlParam::String(hostile.into())));
    }

    #[test]
    fn test_unmapped_tag_fails() {
        let tag = QueryTag::core(
            tags::INSTITUTION_NAME,
            VR::LO,
            QueryTagLevel::Series,
            "InstitutionName",
        );
        let expr = expression(vec![QueryFilterCondition::StringSingleValue {
            tag,
            value: "x".to_string(),
        }]);
        let err = SqlQueryGenerator::new(&expr, PartitionKey::DEFAULT, 2)
            .generate(10, 0)
            .unwrap_err();
        assert!(matches!(err, QueryError::UnmappedTag { .. }));
    }

    #[test]
    fn test_format_sql_date() {
        assert_eq!(format_sql_date(date(1999, 3, 7)), "1999-03-07 00:00:00.000000");
    }
}
