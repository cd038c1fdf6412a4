//! # Sandbar
//!
//! Lazy query composition and relation lists for SQL-backed record
//! models.
//!
//! Queries are value-like: `filter`, `sort`, `limit` and friends return
//! new composers, and nothing executes until a terminal operation
//! finalizes the statement and hands it to the execution collaborator.
//! Relation lists layer one-to-many and many-to-many-through semantics
//! on top, and a manipulator pipeline lets cross-cutting concerns
//! (soft-delete, locale scoping) rewrite any statement at finalize time.

pub mod config;
pub mod error;
pub mod list;
pub mod query;
pub mod record;
pub mod relation;
pub mod schema;
pub mod statement;
pub mod store;
pub mod validation;
pub mod value;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
#[cfg(any(test, feature = "test-helpers"))]
pub mod tests_cfg;

pub use config::QueryConfig;
pub use error::OrmError;
pub use list::{DataList, Filterable, Limitable, ListDecorator, ProjectionMap, Sortable};
pub use query::{ConditionGroup, DataQuery, QueryManipulator};
pub use record::Record;
pub use relation::{HasManyList, ManyManyThroughList};
pub use schema::{MapSchema, SchemaProvider};
pub use store::{RecordStore, Row};
pub use validation::ValidationResult;
pub use value::SqlValue;
