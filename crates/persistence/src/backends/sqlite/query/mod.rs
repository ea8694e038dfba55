//! Translation of query expressions into SQL over the index tables.

mod fragment;
mod generator;
mod tag_map;

pub use fragment::{SqlFragment, SqlParam};
pub use generator::{
    PARTITION_SCHEMA_VERSION, SQL_DATE_TIME_FORMAT, SqlQueryGenerator, format_sql_date,
};
pub use tag_map::{DicomTagSqlEntry, SqlTableType};
