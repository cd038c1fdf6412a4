//! The value-like query composer.

use crate::error::OrmError;
use crate::query::group::{Clause, ConditionGroup};
use crate::query::manipulator::{FinalizeContext, QueryManipulator};
use crate::schema::SchemaProvider;
use crate::statement::{JoinClause, SortDirection, SqlFragment, SqlSelect};
use crate::value::SqlValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Parameter keys under this namespace scope the query to a relation and
/// are stripped before parameters propagate to materialized records.
pub const FOREIGN_PARAM_NAMESPACE: &str = "Foreign.";

/// A deferred, immutable representation of a single entity query plus its
/// middleware.
///
/// Every transformation borrows the composer and returns a new one;
/// manipulators are shared `Arc`s, so cloning is structural sharing, not
/// a deep copy. Only [`finalize`](DataQuery::finalize) has a
/// side-effecting contract, and even that side effect is confined to the
/// statement it returns.
#[derive(Clone)]
pub struct DataQuery {
    entity: String,
    table: String,
    extra_select: Vec<(String, Option<String>)>,
    joins: Vec<JoinClause>,
    wheres: Vec<SqlFragment>,
    havings: Vec<SqlFragment>,
    order: Vec<(String, SortDirection)>,
    limit: Option<u64>,
    offset: u64,
    params: BTreeMap<String, SqlValue>,
    manipulators: Vec<Arc<dyn QueryManipulator>>,
}

impl fmt::Debug for DataQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataQuery")
            .field("entity", &self.entity)
            .field("table", &self.table)
            .field("wheres", &self.wheres)
            .field("havings", &self.havings)
            .field("order", &self.order)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("params", &self.params)
            .field(
                "manipulators",
                &self
                    .manipulators
                    .iter()
                    .map(|m| m.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl DataQuery {
    /// A composer over `entity`, resolving the backing table up front.
    pub fn new(entity: &str, schema: &dyn SchemaProvider) -> Result<Self, OrmError> {
        let table = schema.table_name(entity)?;
        Ok(DataQuery {
            entity: entity.to_string(),
            table,
            extra_select: Vec::new(),
            joins: Vec::new(),
            wheres: Vec::new(),
            havings: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: 0,
            params: BTreeMap::new(),
            manipulators: Vec::new(),
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Add a WHERE fragment.
    pub fn filter(&self, fragment: SqlFragment) -> Self {
        let mut next = self.clone();
        next.wheres.push(fragment);
        next
    }

    /// Add several alternatives as one OR-combined WHERE fragment.
    pub fn filter_any(&self, fragments: Vec<SqlFragment>) -> Self {
        let mut next = self.clone();
        if let Some(mut combined) = SqlFragment::join(&fragments, " OR ") {
            if fragments.len() > 1 {
                combined.sql = format!("({})", combined.sql);
            }
            next.wheres.push(combined);
        }
        next
    }

    /// Add a HAVING fragment.
    pub fn having(&self, fragment: SqlFragment) -> Self {
        let mut next = self.clone();
        next.havings.push(fragment);
        next
    }

    /// Splice a rendered condition group into this composer's WHERE or
    /// HAVING list, per the group's clause. An empty group is a no-op.
    pub fn apply_group(&self, group: &ConditionGroup) -> Self {
        match group.render() {
            None => self.clone(),
            Some(fragment) => match group.clause() {
                Clause::Where => self.filter(fragment),
                Clause::Having => self.having(fragment),
            },
        }
    }

    /// Add an ORDER BY entry (a raw column reference or expression).
    pub fn sort(&self, expr: impl Into<String>, direction: SortDirection) -> Self {
        let mut next = self.clone();
        next.order.push((expr.into(), direction));
        next
    }

    /// Set LIMIT/OFFSET. `length = None` means unlimited; `Some(0)` is a
    /// deliberately empty result set.
    ///
    /// # Errors
    ///
    /// `OrmError::InvalidArgument` for a negative length or offset.
    pub fn limit(&self, length: Option<i64>, offset: i64) -> Result<Self, OrmError> {
        if let Some(length) = length {
            if length < 0 {
                return Err(OrmError::invalid_argument(format!(
                    "limit length must be non-negative, got {length}"
                )));
            }
        }
        if offset < 0 {
            return Err(OrmError::invalid_argument(format!(
                "limit offset must be non-negative, got {offset}"
            )));
        }
        let mut next = self.clone();
        next.limit = length.map(|l| l as u64);
        next.offset = offset as u64;
        Ok(next)
    }

    /// Set a query-scoped parameter. Keys may be hierarchical, e.g.
    /// `"Foreign.ID"`.
    pub fn set_param(&self, key: impl Into<String>, value: SqlValue) -> Self {
        let mut next = self.clone();
        next.params.insert(key.into(), value);
        next
    }

    /// Drop a query-scoped parameter. Removing an absent key is a no-op.
    pub fn remove_param(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.params.remove(key);
        next
    }

    pub fn params(&self) -> &BTreeMap<String, SqlValue> {
        &self.params
    }

    /// The query-scoped parameters that may propagate to a freshly
    /// materialized record: everything except the reserved `Foreign.*`
    /// namespace, which would incorrectly scope that record's own
    /// relations.
    pub fn inheritable_params(&self) -> BTreeMap<String, SqlValue> {
        self.params
            .iter()
            .filter(|(k, _)| !k.starts_with(FOREIGN_PARAM_NAMESPACE))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Append a manipulator; registration order is invocation order.
    pub fn push_manipulator(&self, manipulator: Arc<dyn QueryManipulator>) -> Self {
        let mut next = self.clone();
        next.manipulators.push(manipulator);
        next
    }

    /// Drop every manipulator registered under `name`.
    pub fn remove_manipulator(&self, name: &str) -> Self {
        let mut next = self.clone();
        next.manipulators.retain(|m| m.name() != name);
        next
    }

    pub fn manipulators(&self) -> &[Arc<dyn QueryManipulator>] {
        &self.manipulators
    }

    /// Drop every WHERE fragment equal to `fragment`: the identity under
    /// which a relation scope filter was previously recorded.
    pub fn remove_filter_on(&self, fragment: &SqlFragment) -> Self {
        let mut next = self.clone();
        next.wheres.retain(|w| w != fragment);
        next
    }

    /// Append a select expression, optionally aliased.
    pub fn add_select(&self, expr: impl Into<String>, alias: Option<&str>) -> Self {
        let mut next = self.clone();
        next.extra_select.push((expr.into(), alias.map(str::to_string)));
        next
    }

    /// Append a join clause.
    pub fn join(&self, join: JoinClause) -> Self {
        let mut next = self.clone();
        next.joins.push(join);
        next
    }

    /// Produce the finalized statement: every manipulator's before-hook
    /// in registration order, then this composer's accumulated clauses,
    /// then every after-hook in the same order.
    pub fn finalize(&self) -> Result<SqlSelect, OrmError> {
        let mut stmt = SqlSelect::from_table(&self.table);
        let mut cx = FinalizeContext::new();

        for manipulator in &self.manipulators {
            manipulator.before_finalize(self, &mut stmt, &mut cx)?;
        }

        for (expr, alias) in &self.extra_select {
            stmt.add_select(expr.clone(), alias.as_deref());
        }
        for join in &self.joins {
            stmt.add_join(join.clone());
        }
        for fragment in &self.wheres {
            stmt.add_where(fragment.clone());
        }
        for fragment in &self.havings {
            stmt.add_having(fragment.clone());
        }
        for (expr, direction) in &self.order {
            stmt.add_order_by(expr.clone(), *direction);
        }
        stmt.set_limit(self.limit, self.offset);

        for manipulator in &self.manipulators {
            manipulator.after_finalize(self, &mut stmt, &mut cx)?;
        }

        Ok(stmt)
    }
}
