//! Parsing of QIDO-style query parameters into filter conditions.
//!
//! Values are checked against the tag's value representation here, so the
//! conditions handed to the generators are always well typed.

use std::collections::HashSet;

use chrono::NaiveDate;
use dicom::core::{Tag, VR};

use crate::error::QueryError;
use crate::types::{DICOM_DATE_FORMAT, parse_tag_path};

use super::condition::QueryFilterCondition;
use super::expression::{BaseQueryExpression, QueryIncludeField};
use super::tag::{ExtendedQueryTagDataType, QueryTag};

/// Raw query parameters, already split from the request.
#[derive(Debug, Clone, Default)]
pub struct QueryParameters {
    /// Attribute filters as `(keyword or tag path, value)`.
    pub filters: Vec<(String, String)>,
    /// `includefield` values. `all` selects every attribute.
    pub include_fields: Vec<String>,
    /// `fuzzymatching` flag.
    pub fuzzy_matching: bool,
    /// Requested limit. Out of range values fall back to the default later.
    pub limit: i32,
    /// Rows to skip.
    pub offset: u32,
}

/// Builds [`BaseQueryExpression`]s against a resolved set of query tags.
#[derive(Debug, Clone)]
pub struct QueryParser {
    tags: Vec<QueryTag>,
}

impl QueryParser {
    /// Creates a parser over the queryable tags.
    pub fn new(tags: Vec<QueryTag>) -> Self {
        Self { tags }
    }

    /// Parses parameters into an expression.
    pub fn parse(&self, parameters: &QueryParameters) -> Result<BaseQueryExpression, QueryError> {
        let mut seen = HashSet::new();
        let mut conditions = Vec::with_capacity(parameters.filters.len());

        for (key, value) in &parameters.filters {
            let tag = self.resolve(key)?;
            if !seen.insert(tag.tag()) {
                return Err(QueryError::InvalidValue {
                    tag: key.clone(),
                    value: value.clone(),
                    message: "attribute is filtered more than once".to_string(),
                });
            }
            conditions.push(parse_condition(tag, value, parameters.fuzzy_matching)?);
        }

        let include_fields = self.parse_include_fields(&parameters.include_fields)?;

        Ok(BaseQueryExpression::new(
            include_fields,
            parameters.fuzzy_matching,
            parameters.limit,
            parameters.offset,
            conditions,
        ))
    }

    /// Finds a query tag by keyword or canonical path.
    pub fn resolve(&self, key: &str) -> Result<&QueryTag, QueryError> {
        let by_path = parse_tag_path(key);
        self.tags
            .iter()
            .find(|t| Some(t.tag()) == by_path || t.name().eq_ignore_ascii_case(key))
            .ok_or_else(|| QueryError::UnknownQueryTag {
                tag: key.to_string(),
            })
    }

    fn parse_include_fields(&self, fields: &[String]) -> Result<QueryIncludeField, QueryError> {
        if fields.is_empty() {
            return Ok(QueryIncludeField::Default);
        }
        if fields.iter().any(|f| f.eq_ignore_ascii_case("all")) {
            return Ok(QueryIncludeField::All);
        }
        let tags = fields
            .iter()
            .map(|f| {
                parse_tag_path(f)
                    .or_else(|| self.resolve(f).ok().map(|t| t.tag()))
                    .ok_or_else(|| QueryError::UnknownQueryTag { tag: f.clone() })
            })
            .collect::<Result<Vec<Tag>, _>>()?;
        Ok(QueryIncludeField::Fields(tags))
    }
}

/// Builds the condition for one `(tag, value)` pair.
pub fn parse_condition(
    tag: &QueryTag,
    value: &str,
    fuzzy_matching: bool,
) -> Result<QueryFilterCondition, QueryError> {
    let invalid = |message: &str| QueryError::InvalidValue {
        tag: tag.name().to_string(),
        value: value.to_string(),
        message: message.to_string(),
    };

    if value.is_empty() {
        return Err(invalid("empty filter value"));
    }

    let data_type = tag
        .data_type()
        .ok_or_else(|| invalid("value representation is not queryable"))?;

    let condition = match data_type {
        ExtendedQueryTagDataType::String => QueryFilterCondition::StringSingleValue {
            tag: tag.clone(),
            value: value.to_string(),
        },
        ExtendedQueryTagDataType::PersonName if fuzzy_matching => {
            QueryFilterCondition::PersonNameFuzzy {
                tag: tag.clone(),
                value: value.to_string(),
            }
        }
        ExtendedQueryTagDataType::PersonName => QueryFilterCondition::StringSingleValue {
            tag: tag.clone(),
            value: value.to_string(),
        },
        ExtendedQueryTagDataType::Long => match split_range(value) {
            Some((min, max)) => {
                let minimum = parse_long(min).ok_or_else(|| invalid("expected an integer range"))?;
                let maximum = parse_long(max).ok_or_else(|| invalid("expected an integer range"))?;
                if minimum > maximum {
                    return Err(invalid("range minimum exceeds maximum"));
                }
                QueryFilterCondition::LongRange {
                    tag: tag.clone(),
                    minimum,
                    maximum,
                }
            }
            None => QueryFilterCondition::LongSingleValue {
                tag: tag.clone(),
                value: parse_long(value).ok_or_else(|| invalid("expected an integer"))?,
            },
        },
        ExtendedQueryTagDataType::Double => QueryFilterCondition::DoubleSingleValue {
            tag: tag.clone(),
            value: value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| invalid("expected a number"))?,
        },
        ExtendedQueryTagDataType::DateTime => {
            let parse = |s: &str| parse_date(s, tag.vr());
            match split_range(value).or_else(|| open_range(value)) {
                Some((min, max)) => {
                    let minimum = if min.is_empty() {
                        earliest_date()
                    } else {
                        parse(min).ok_or_else(|| invalid("expected a date range"))?
                    };
                    let maximum = if max.is_empty() {
                        latest_date()
                    } else {
                        parse(max).ok_or_else(|| invalid("expected a date range"))?
                    };
                    if minimum > maximum {
                        return Err(invalid("range minimum exceeds maximum"));
                    }
                    QueryFilterCondition::DateRange {
                        tag: tag.clone(),
                        minimum,
                        maximum,
                    }
                }
                None => QueryFilterCondition::DateSingleValue {
                    tag: tag.clone(),
                    value: parse(value).ok_or_else(|| invalid("expected a yyyyMMdd date"))?,
                },
            }
        }
    };

    Ok(condition)
}

// `a-b` with both sides present. A leading '-' belongs to a negative number.
fn split_range(value: &str) -> Option<(&str, &str)> {
    let dash = value.get(1..)?.find('-')? + 1;
    let (min, max) = (&value[..dash], &value[dash + 1..]);
    (!min.is_empty() && !max.is_empty()).then_some((min, max))
}

// `-b` or `a-` for open ended date ranges.
fn open_range(value: &str) -> Option<(&str, &str)> {
    if let Some(max) = value.strip_prefix('-') {
        return (!max.is_empty()).then_some(("", max));
    }
    value
        .strip_suffix('-')
        .filter(|min| !min.is_empty())
        .map(|min| (min, ""))
}

/// Lower bound of an open-ended date range.
pub fn earliest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Upper bound of an open-ended date range.
pub fn latest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

fn parse_long(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

// DT values carry a time part after the date; only the date is indexed.
fn parse_date(value: &str, vr: VR) -> Option<NaiveDate> {
    let value = value.trim();
    let date = if vr == VR::DT {
        value.get(..8)?
    } else {
        value
    };
    NaiveDate::parse_from_str(date, DICOM_DATE_FORMAT).ok()
}
