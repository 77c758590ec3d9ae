//! Query primitives: the filter-expression language and prepared query
//! options.

pub mod options;
mod parser;
pub mod predicate;

pub use options::{OrderBy, QueryOptions, SortDirection};
pub use predicate::{ComparisonOp, GroupOp, Predicate, PredicateBuilder};
