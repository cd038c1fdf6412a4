//! Relation lists: query-backed views scoped to one or more parent records.
//!
//! A relation list is a [`DataList`](crate::list::DataList) whose query is
//! narrowed by a foreign scope, plus write operations that move records in
//! and out of the relation. Two shapes are provided:
//!
//! - [`HasManyList`] for one-to-many relations keyed by a foreign-key
//!   column on the child table, and
//! - [`ManyManyThroughList`] for many-to-many relations mediated by an
//!   explicit join entity.

mod has_many;
mod join_manipulator;
mod many_many;

pub use has_many::HasManyList;
pub use join_manipulator::ManyManyThroughJoinManipulator;
pub use many_many::ManyManyThroughList;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::record::Record;
use crate::statement::{in_predicate, SqlFragment};
use crate::value::SqlValue;

/// Observer invoked after a successful `add`, with the list, the added
/// record and the extra fields the caller supplied.
pub type AddCallback<L> = Arc<dyn Fn(&L, &dyn Record, &BTreeMap<String, SqlValue>)>;

/// Observer invoked after a successful `remove`, with the list and the
/// ids that were unlinked.
pub type RemoveCallback<L> = Arc<dyn Fn(&L, &[SqlValue])>;

/// The set of parent records a relation list is currently scoped to.
///
/// `Unscoped` (and an empty `Many`) place no restriction on reads; writes
/// that need a single unambiguous parent refuse to run in those states.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ForeignScope {
    /// No parent restriction.
    #[default]
    Unscoped,
    /// Scoped to exactly one parent id.
    One(SqlValue),
    /// Scoped to a set of parent ids.
    Many(Vec<SqlValue>),
}

impl ForeignScope {
    /// Normalize a list of ids into a scope.
    ///
    /// A single id collapses to [`ForeignScope::One`] so writes stay
    /// possible; an empty list stays `Many` and matches nothing on read.
    pub fn from_ids(mut ids: Vec<SqlValue>) -> Self {
        if ids.len() == 1 {
            match ids.pop() {
                Some(id) => ForeignScope::One(id),
                None => ForeignScope::Many(ids),
            }
        } else {
            ForeignScope::Many(ids)
        }
    }

    /// The single parent id, when the scope is unambiguous.
    pub fn single_id(&self) -> Option<&SqlValue> {
        match self {
            ForeignScope::One(id) => Some(id),
            _ => None,
        }
    }

    /// All ids in the scope, in order.
    pub fn ids(&self) -> Vec<SqlValue> {
        match self {
            ForeignScope::Unscoped => Vec::new(),
            ForeignScope::One(id) => vec![id.clone()],
            ForeignScope::Many(ids) => ids.clone(),
        }
    }

    /// Whether the scope restricts reads at all.
    pub fn is_restrictive(&self) -> bool {
        match self {
            ForeignScope::Unscoped => false,
            ForeignScope::One(_) => true,
            ForeignScope::Many(ids) => !ids.is_empty(),
        }
    }

    /// Whether `id` falls inside the scope. Unrestrictive scopes match
    /// everything.
    pub fn matches(&self, id: &SqlValue) -> bool {
        match self {
            ForeignScope::Unscoped => true,
            ForeignScope::One(own) => own == id,
            ForeignScope::Many(ids) => ids.is_empty() || ids.contains(id),
        }
    }
}

/// Build the WHERE predicate tying `column` to a scope, or `None` when the
/// scope is unrestrictive.
///
/// A deliberately empty id set renders as `1 = 0`: asking for "these zero
/// parents" must match nothing rather than everything.
pub(crate) fn foreign_id_filter(
    column: &str,
    scope: &ForeignScope,
    inline: bool,
) -> Option<SqlFragment> {
    match scope {
        ForeignScope::Unscoped => None,
        ForeignScope::One(id) => Some(SqlFragment::with_params(
            format!("{column} = ?"),
            vec![id.clone()],
        )),
        ForeignScope::Many(ids) if ids.is_empty() => None,
        ForeignScope::Many(ids) => Some(in_predicate(column, ids, inline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ids_normalizes_single() {
        assert_eq!(
            ForeignScope::from_ids(vec![SqlValue::Int(7)]),
            ForeignScope::One(SqlValue::Int(7))
        );
        assert_eq!(
            ForeignScope::from_ids(vec![]),
            ForeignScope::Many(vec![])
        );
    }

    #[test]
    fn test_matches() {
        assert!(ForeignScope::Unscoped.matches(&SqlValue::Int(1)));
        assert!(ForeignScope::Many(vec![]).matches(&SqlValue::Int(1)));
        assert!(ForeignScope::One(SqlValue::Int(1)).matches(&SqlValue::Int(1)));
        assert!(!ForeignScope::One(SqlValue::Int(1)).matches(&SqlValue::Int(2)));
        let many = ForeignScope::Many(vec![SqlValue::Int(1), SqlValue::Int(2)]);
        assert!(many.matches(&SqlValue::Int(2)));
        assert!(!many.matches(&SqlValue::Int(3)));
    }

    #[test]
    fn test_foreign_id_filter_shapes() {
        assert!(foreign_id_filter("\"Comment\".\"PostID\"", &ForeignScope::Unscoped, true).is_none());
        let one = foreign_id_filter(
            "\"Comment\".\"PostID\"",
            &ForeignScope::One(SqlValue::Int(3)),
            true,
        )
        .unwrap();
        assert_eq!(one.sql, "\"Comment\".\"PostID\" = ?");
        assert_eq!(one.params, vec![SqlValue::Int(3)]);

        let many = foreign_id_filter(
            "\"Comment\".\"PostID\"",
            &ForeignScope::Many(vec![SqlValue::Int(1), SqlValue::Int(2)]),
            true,
        )
        .unwrap();
        assert_eq!(many.sql, "\"Comment\".\"PostID\" IN (1, 2)");
        assert!(many.params.is_empty());
    }

}
