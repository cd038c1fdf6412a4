//! The middleware seam around statement finalization.
//!
//! Manipulators registered on a [`DataQuery`](crate::query::DataQuery)
//! are invoked in registration order: every `before_finalize` hook, then
//! the composer's own clauses, then every `after_finalize` hook. Hooks
//! run exactly once per finalize pass and must be idempotent across
//! repeated passes: each pass gets a fresh [`FinalizeContext`], so state
//! captured during one pass never leaks into the next.

use crate::error::OrmError;
use crate::query::composer::DataQuery;
use crate::statement::{SqlFragment, SqlSelect};
use std::collections::BTreeMap;

/// Transient state carried between the before- and after-hook phases of a
/// single finalize pass.
///
/// The pending map holds subqueries captured by before-hooks, keyed by
/// the tag of the pending join they belong to. Two manipulators capturing
/// under the same tag is unsupported; the later capture wins.
#[derive(Debug, Default)]
pub struct FinalizeContext {
    pending: BTreeMap<String, SqlFragment>,
}

impl FinalizeContext {
    pub fn new() -> Self {
        FinalizeContext::default()
    }

    /// Store a captured subquery for the pending join tagged `tag`.
    pub fn capture(&mut self, tag: impl Into<String>, subquery: SqlFragment) {
        self.pending.insert(tag.into(), subquery);
    }

    /// Consume the captured subquery for `tag`, if one is pending.
    pub fn take(&mut self, tag: &str) -> Option<SqlFragment> {
        self.pending.remove(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// A pair of hooks rewriting the working statement around finalization.
pub trait QueryManipulator {
    /// Identity used for registration bookkeeping (replacing a
    /// manipulator when a relation list is re-scoped).
    fn name(&self) -> &'static str;

    /// Runs before the composer applies its own accumulated clauses.
    fn before_finalize(
        &self,
        query: &DataQuery,
        stmt: &mut SqlSelect,
        cx: &mut FinalizeContext,
    ) -> Result<(), OrmError>;

    /// Runs after the composer applied its clauses and all before-hooks
    /// ran. An after-hook with nothing captured in `cx` must be a no-op.
    fn after_finalize(
        &self,
        query: &DataQuery,
        stmt: &mut SqlSelect,
        cx: &mut FinalizeContext,
    ) -> Result<(), OrmError>;
}
