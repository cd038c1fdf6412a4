//! SQL statement model.
//!
//! Statements in this layer are built from [`SqlFragment`]s: pieces of SQL
//! text carrying their own deferred bound parameters. [`SqlSelect`] is the
//! working SELECT statement that query manipulators rewrite during
//! finalization; [`SqlDelete`] covers the targeted deletes issued by
//! many-many join-row removal.
//!
//! Placeholders are dialect-neutral `?`; a driver owning a concrete
//! dialect renumbers them at the execution seam.

pub mod delete;
pub mod fragment;
pub mod select;

#[doc(inline)]
pub use delete::SqlDelete;
#[doc(inline)]
pub use fragment::{in_predicate, SqlFragment};
#[doc(inline)]
pub use select::{
    JoinClause, JoinKind, JoinSource, SortDirection, SqlSelect, JOIN_PRIORITY_DEFAULT,
    JOIN_PRIORITY_THROUGH,
};

/// Quote an identifier for SQL text.
pub(crate) fn quote(ident: &str) -> String {
    format!("\"{ident}\"")
}
