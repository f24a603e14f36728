//! SQL generation: the incremental text buffer, the typed form of the JSON
//! query language, and the stateless translator that joins them.

pub mod buffer;
pub mod query;
pub mod translator;

pub use buffer::SqlBuffer;
pub use query::{
    Aggregate, Expression, ExpressionValues, InsertValues, JsonAccessor, QueryPayload, ReturnEntry,
    SortBy, WhereClause,
};
