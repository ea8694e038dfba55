//! Filter conditions.
//!
//! One variant per combination of value category and cardinality. Conditions
//! carry their tag and values only. Each backend turns them into its own
//! predicate language through [`QueryFilterConditionVisitor`].
//!
//! Callers validate values against the tag's VR before constructing a
//! condition; [`QueryParser`](super::QueryParser) is the usual construction
//! site.

use std::fmt;

use chrono::NaiveDate;

use crate::error::QueryError;

use super::tag::QueryTag;
use super::visitor::QueryFilterConditionVisitor;

/// A single filter over one query tag.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilterCondition {
    /// Exact string match.
    StringSingleValue { tag: QueryTag, value: String },
    /// Exact floating point match.
    DoubleSingleValue { tag: QueryTag, value: f64 },
    /// Exact integer match.
    LongSingleValue { tag: QueryTag, value: i64 },
    /// Inclusive integer range.
    LongRange {
        tag: QueryTag,
        minimum: i64,
        maximum: i64,
    },
    /// Exact date match.
    DateSingleValue { tag: QueryTag, value: NaiveDate },
    /// Inclusive date range.
    DateRange {
        tag: QueryTag,
        minimum: NaiveDate,
        maximum: NaiveDate,
    },
    /// Token prefix match on a person name.
    PersonNameFuzzy { tag: QueryTag, value: String },
}

impl QueryFilterCondition {
    /// Returns the tag the condition filters on.
    pub fn tag(&self) -> &QueryTag {
        match self {
            Self::StringSingleValue { tag, .. }
            | Self::DoubleSingleValue { tag, .. }
            | Self::LongSingleValue { tag, .. }
            | Self::LongRange { tag, .. }
            | Self::DateSingleValue { tag, .. }
            | Self::DateRange { tag, .. }
            | Self::PersonNameFuzzy { tag, .. } => tag,
        }
    }

    /// Returns the variant name, used in capability errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StringSingleValue { .. } => "StringSingleValueMatch",
            Self::DoubleSingleValue { .. } => "DoubleSingleValueMatch",
            Self::LongSingleValue { .. } => "LongSingleValueMatch",
            Self::LongRange { .. } => "LongRangeValueMatch",
            Self::DateSingleValue { .. } => "DateSingleValueMatch",
            Self::DateRange { .. } => "DateRangeValueMatch",
            Self::PersonNameFuzzy { .. } => "PersonNameFuzzyMatch",
        }
    }

    /// Dispatches to the visitor method for this variant.
    pub fn accept<V>(&self, visitor: &mut V) -> Result<(), QueryError>
    where
        V: QueryFilterConditionVisitor + ?Sized,
    {
        match self {
            Self::StringSingleValue { tag, value } => visitor.visit_string_single_value(tag, value),
            Self::DoubleSingleValue { tag, value } => {
                visitor.visit_double_single_value(tag, *value)
            }
            Self::LongSingleValue { tag, value } => visitor.visit_long_single_value(tag, *value),
            Self::LongRange {
                tag,
                minimum,
                maximum,
            } => visitor.visit_long_range(tag, *minimum, *maximum),
            Self::DateSingleValue { tag, value } => visitor.visit_date_single_value(tag, *value),
            Self::DateRange {
                tag,
                minimum,
                maximum,
            } => visitor.visit_date_range(tag, *minimum, *maximum),
            Self::PersonNameFuzzy { tag, value } => visitor.visit_person_name_fuzzy(tag, value),
        }
    }
}

impl fmt::Display for QueryFilterCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StringSingleValue { tag, value } | Self::PersonNameFuzzy { tag, value } => {
                write!(f, "{} {}='{}'", self.kind(), tag.name(), value)
            }
            Self::DoubleSingleValue { tag, value } => {
                write!(f, "{} {}={}", self.kind(), tag.name(), value)
            }
            Self::LongSingleValue { tag, value } => {
                write!(f, "{} {}={}", self.kind(), tag.name(), value)
            }
            Self::LongRange {
                tag,
                minimum,
                maximum,
            } => write!(f, "{} {}={}-{}", self.kind(), tag.name(), minimum, maximum),
            Self::DateSingleValue { tag, value } => {
                write!(f, "{} {}={}", self.kind(), tag.name(), value)
            }
            Self::DateRange {
                tag,
                minimum,
                maximum,
            } => write!(f, "{} {}={}-{}", self.kind(), tag.name(), minimum, maximum),
        }
    }
}
