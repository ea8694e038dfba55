//! Query expressions.

use dicom::core::Tag;

use crate::config::QueryLimits;

use super::condition::QueryFilterCondition;

/// Which attributes a query returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryIncludeField {
    /// Every stored attribute.
    All,
    /// The default attributes of the queried level plus these tags.
    Fields(Vec<Tag>),
    /// The default attributes of the queried level.
    #[default]
    Default,
}

/// A parsed QIDO-style query.
///
/// Filter conditions are combined with AND in insertion order.
///
/// # Examples
///
/// ```
/// use dicom_persistence::config::QueryLimits;
/// use dicom_persistence::query::{BaseQueryExpression, QueryIncludeField};
///
/// let limits = QueryLimits::default();
/// let expr = BaseQueryExpression::new(QueryIncludeField::Default, false, 5000, 0, vec![]);
/// assert_eq!(expr.evaluated_limit(&limits), 100);
/// assert!(!expr.has_filters());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BaseQueryExpression {
    include_fields: QueryIncludeField,
    fuzzy_matching: bool,
    limit: i32,
    offset: u32,
    filter_conditions: Vec<QueryFilterCondition>,
}

impl BaseQueryExpression {
    /// Creates an expression.
    pub fn new(
        include_fields: QueryIncludeField,
        fuzzy_matching: bool,
        limit: i32,
        offset: u32,
        filter_conditions: Vec<QueryFilterCondition>,
    ) -> Self {
        Self {
            include_fields,
            fuzzy_matching,
            limit,
            offset,
            filter_conditions,
        }
    }

    /// Attributes to return.
    pub fn include_fields(&self) -> &QueryIncludeField {
        &self.include_fields
    }

    /// Whether person name filters use fuzzy matching.
    pub fn fuzzy_matching(&self) -> bool {
        self.fuzzy_matching
    }

    /// The limit as requested.
    pub fn limit(&self) -> i32 {
        self.limit
    }

    /// Rows to skip.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Filter conditions in AND order.
    pub fn filter_conditions(&self) -> &[QueryFilterCondition] {
        &self.filter_conditions
    }

    /// Returns true if at least one filter is present.
    pub fn has_filters(&self) -> bool {
        !self.filter_conditions.is_empty()
    }

    /// The limit actually applied: the requested one when it lies in
    /// `1..=max`, the default otherwise.
    pub fn evaluated_limit(&self, limits: &QueryLimits) -> u32 {
        match u32::try_from(self.limit) {
            Ok(limit) if limit > 0 && limit <= limits.max_query_result_count => limit,
            _ => limits.default_query_result_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_limit(limit: i32) -> BaseQueryExpression {
        BaseQueryExpression::new(QueryIncludeField::All, false, limit, 0, Vec::new())
    }

    #[test]
    fn test_evaluated_limit() {
        let limits = QueryLimits {
            max_query_result_count: 200,
            default_query_result_count: 100,
        };
        assert_eq!(with_limit(0).evaluated_limit(&limits), 100);
        assert_eq!(with_limit(-7).evaluated_limit(&limits), 100);
        assert_eq!(with_limit(5000).evaluated_limit(&limits), 100);
        assert_eq!(with_limit(50).evaluated_limit(&limits), 50);
        assert_eq!(with_limit(1).evaluated_limit(&limits), 1);
        assert_eq!(with_limit(200).evaluated_limit(&limits), 200);
        assert_eq!(with_limit(201).evaluated_limit(&limits), 100);
    }
}
