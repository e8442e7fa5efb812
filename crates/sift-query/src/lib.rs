//! Filtering, sorting and row shaping for the table views over a report.

pub mod filter;
pub mod query;
pub mod rows;

pub use filter::{
    ColumnType, CompiledFilter, Filter, FilterError, FilterItem, Filterable, LinkOperator,
    filter_rows,
};
pub use query::{Period, QueryError, RowQuery, SortBy, SortDirection};
pub use rows::{
    JobRow, TestRow, UPGRADE_TAG, VariantRow, brief_name, job_rows, test_rows, variant_rows,
};
