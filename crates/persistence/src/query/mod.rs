//! Query model and translation protocol.
//!
//! A QIDO-style request becomes a [`BaseQueryExpression`]: include fields,
//! paging and an ordered list of [`QueryFilterCondition`]s. Conditions know
//! nothing about storage. Each index backend implements
//! [`QueryFilterConditionVisitor`] to turn them into its own predicate
//! language:
//!
//! ```text
//! QueryParameters ──QueryParser──▶ BaseQueryExpression
//!                                        │ accept()
//!                      ┌─────────────────┴──────────────────┐
//!                      ▼                                    ▼
//!            SqlQueryGenerator                    DocumentQueryGenerator
//!        (joins, bound ? parameters)         (bracket paths, @p parameters)
//! ```
//!
//! # Example
//!
//! ```
//! use dicom_persistence::query::{core_query_tags, QueryParameters, QueryParser};
//!
//! let parser = QueryParser::new(core_query_tags());
//! let expression = parser
//!     .parse(&QueryParameters {
//!         filters: vec![("StudyDate".into(), "20200101-20201231".into())],
//!         limit: 10,
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//! assert!(expression.has_filters());
//! assert_eq!(expression.filter_conditions()[0].kind(), "DateRangeValueMatch");
//! ```

mod cache;
mod condition;
mod expression;
mod parser;
mod tag;
mod tag_service;
mod visitor;

pub use cache::AsyncCache;
pub use condition::QueryFilterCondition;
pub use expression::{BaseQueryExpression, QueryIncludeField};
pub use parser::{QueryParameters, QueryParser, earliest_date, latest_date, parse_condition};
pub use tag::{
    AddExtendedQueryTagEntry, ExtendedQueryTagDataType, ExtendedQueryTagStatus,
    ExtendedQueryTagStoreEntry, QueryStatus, QueryTag, QueryTagLevel, core_query_tags,
};
pub use tag_service::QueryTagService;
pub use visitor::{QueryFilterConditionVisitor, visit_all};
