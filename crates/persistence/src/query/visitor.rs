//! Double dispatch from filter conditions to backend predicate generators.
//!
//! A backend implements every method. Each call appends the predicate for
//! one condition to a buffer the backend owns, so generators are stateful
//! and are used for a single query. A variant the backend cannot express
//! returns [`QueryError::UnsupportedCondition`] before writing anything.

use chrono::NaiveDate;

use crate::error::QueryError;

use super::condition::QueryFilterCondition;
use super::tag::QueryTag;

/// Visitor over [`QueryFilterCondition`] variants.
pub trait QueryFilterConditionVisitor {
    /// Exact string match.
    fn visit_string_single_value(&mut self, tag: &QueryTag, value: &str) -> Result<(), QueryError>;

    /// Exact floating point match.
    fn visit_double_single_value(&mut self, tag: &QueryTag, value: f64) -> Result<(), QueryError>;

    /// Exact integer match.
    fn visit_long_single_value(&mut self, tag: &QueryTag, value: i64) -> Result<(), QueryError>;

    /// Inclusive integer range.
    fn visit_long_range(
        &mut self,
        tag: &QueryTag,
        minimum: i64,
        maximum: i64,
    ) -> Result<(), QueryError>;

    /// Exact date match.
    fn visit_date_single_value(
        &mut self,
        tag: &QueryTag,
        value: NaiveDate,
    ) -> Result<(), QueryError>;

    /// Inclusive date range.
    fn visit_date_range(
        &mut self,
        tag: &QueryTag,
        minimum: NaiveDate,
        maximum: NaiveDate,
    ) -> Result<(), QueryError>;

    /// Token prefix match on a person name.
    fn visit_person_name_fuzzy(&mut self, tag: &QueryTag, value: &str) -> Result<(), QueryError>;
}

/// Visits every condition in order, stopping at the first error.
pub fn visit_all<V>(conditions: &[QueryFilterCondition], visitor: &mut V) -> Result<(), QueryError>
where
    V: QueryFilterConditionVisitor + ?Sized,
{
    conditions.iter().try_for_each(|c| c.accept(visitor))
}
