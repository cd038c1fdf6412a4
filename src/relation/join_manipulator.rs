//! The finalize-time join for many-to-many-through relations.
//!
//! The through list itself contributes no WHERE clauses; all scoping
//! lives here. During `before_finalize` the manipulator builds and
//! renders a self-contained subquery over the join entity, captures it on
//! the pass's [`FinalizeContext`], and adds a pending join node to the
//! outer statement. During `after_finalize` it swaps the captured
//! subquery into that node. Splitting the work this way keeps the
//! already-rendered subquery out of reach of other manipulators that
//! rewrite table references across the statement between the two phases,
//! while the join predicate (which names outer tables) stays rewritable.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::QueryConfig;
use crate::error::OrmError;
use crate::query::{DataQuery, FinalizeContext, QueryManipulator};
use crate::relation::{foreign_id_filter, ForeignScope};
use crate::schema::SchemaProvider;
use crate::statement::{
    quote, JoinClause, JoinKind, JoinSource, SqlFragment, SqlSelect, JOIN_PRIORITY_THROUGH,
};

pub(crate) const MANIPULATOR_NAME: &str = "many-many-through-join";

/// Joins the through table into a target-entity query, scoped to the
/// active parent ids.
///
/// One manipulator instance belongs to one list instance; re-scoping the
/// list replaces the manipulator wholesale (see
/// [`ManyManyThroughList::for_foreign_id`](crate::relation::ManyManyThroughList::for_foreign_id)).
pub struct ManyManyThroughJoinManipulator {
    join_entity: String,
    alias: String,
    local_key: String,
    foreign_key: String,
    scope: ForeignScope,
    schema: Arc<dyn SchemaProvider>,
    config: QueryConfig,
    // unique per instance so two through joins on one statement cannot
    // collide
    tag: String,
}

impl fmt::Debug for ManyManyThroughJoinManipulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManyManyThroughJoinManipulator")
            .field("join_entity", &self.join_entity)
            .field("alias", &self.alias)
            .field("local_key", &self.local_key)
            .field("foreign_key", &self.foreign_key)
            .field("scope", &self.scope)
            .finish()
    }
}

impl ManyManyThroughJoinManipulator {
    pub fn new(
        join_entity: &str,
        local_key: &str,
        foreign_key: &str,
        scope: ForeignScope,
        schema: Arc<dyn SchemaProvider>,
        config: QueryConfig,
    ) -> Result<Self, OrmError> {
        // the join table's name doubles as the join alias
        let alias = schema.table_name(join_entity)?;
        schema.column_ref(join_entity, local_key)?;
        schema.column_ref(join_entity, foreign_key)?;
        Ok(ManyManyThroughJoinManipulator {
            join_entity: join_entity.to_string(),
            alias,
            local_key: local_key.to_string(),
            foreign_key: foreign_key.to_string(),
            scope,
            schema,
            config,
            tag: format!("through:{join_entity}:{}", Uuid::new_v4()),
        })
    }

    pub fn join_entity(&self) -> &str {
        &self.join_entity
    }

    /// Alias prefix carried by the join entity's columns in result rows.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    fn scope_filter(&self) -> Result<Option<SqlFragment>, OrmError> {
        let column = self
            .schema
            .column_ref(&self.join_entity, &self.foreign_key)?;
        Ok(match &self.scope {
            ForeignScope::Many(ids) if ids.is_empty() => Some(SqlFragment::new("1 = 0")),
            scope => foreign_id_filter(&column, scope, self.config.inline_integer_ids),
        })
    }
}

impl QueryManipulator for ManyManyThroughJoinManipulator {
    fn name(&self) -> &'static str {
        MANIPULATOR_NAME
    }

    fn before_finalize(
        &self,
        query: &DataQuery,
        stmt: &mut SqlSelect,
        cx: &mut FinalizeContext,
    ) -> Result<(), OrmError> {
        // finalize the join-entity view on its own so its text is fixed
        // before any statement-wide rewriting happens
        let mut sub = DataQuery::new(&self.join_entity, self.schema.as_ref())?;
        if let Some(filter) = self.scope_filter()? {
            sub = sub.filter(filter);
        }
        let (sql, params) = sub.finalize()?.render()?;
        cx.capture(&self.tag, SqlFragment::with_params(sql, params));

        // surface the join row's columns alongside the target's, under
        // the alias prefix create_data_object splits on
        for field in self.schema.fields(&self.join_entity)? {
            let column = self.schema.column_name(&self.join_entity, &field)?;
            stmt.add_select(
                format!("{}.{}", quote(&self.alias), quote(&column)),
                Some(&format!("{}_{column}", self.alias)),
            );
        }

        let local_column = self.schema.column_name(&self.join_entity, &self.local_key)?;
        let target_id = self
            .schema
            .column_ref(query.entity(), &self.schema.id_column(query.entity())?)?;
        stmt.add_join(JoinClause {
            kind: JoinKind::Inner,
            source: JoinSource::Pending(self.tag.clone()),
            alias: self.alias.clone(),
            on: SqlFragment::new(format!(
                "{}.{} = {target_id}",
                quote(&self.alias),
                quote(&local_column)
            )),
            priority: JOIN_PRIORITY_THROUGH,
        });
        Ok(())
    }

    fn after_finalize(
        &self,
        _query: &DataQuery,
        stmt: &mut SqlSelect,
        cx: &mut FinalizeContext,
    ) -> Result<(), OrmError> {
        // nothing captured this pass: stay a no-op
        if let Some(subquery) = cx.take(&self.tag) {
            if !stmt.resolve_pending_join(&self.tag, subquery) {
                log::warn!(
                    "captured subquery for '{}' had no pending join to resolve",
                    self.tag
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MapSchema;
    use crate::value::SqlValue;

    fn schema() -> Arc<MapSchema> {
        Arc::new(
            MapSchema::new()
                .register("Tag", "Tag", &["ID", "Title"])
                .register("PageTag", "PageTag", &["ID", "TagID", "PageID", "SortOrder"]),
        )
    }

    fn manipulator(scope: ForeignScope) -> ManyManyThroughJoinManipulator {
        ManyManyThroughJoinManipulator::new(
            "PageTag",
            "TagID",
            "PageID",
            scope,
            schema(),
            QueryConfig::default(),
        )
        .unwrap()
    }

    fn finalize_tags(m: ManyManyThroughJoinManipulator) -> (String, Vec<SqlValue>) {
        let query = DataQuery::new("Tag", schema().as_ref())
            .unwrap()
            .push_manipulator(Arc::new(m));
        query.finalize().unwrap().render().unwrap()
    }

    #[test]
    fn test_joins_scoped_subquery() {
        let (sql, params) = finalize_tags(manipulator(ForeignScope::One(SqlValue::Int(3))));
        assert!(sql.contains(
            "INNER JOIN (SELECT \"PageTag\".* FROM \"PageTag\" WHERE \"PageTag\".\"PageID\" = ?) \
             AS \"PageTag\" ON \"PageTag\".\"TagID\" = \"Tag\".\"ID\""
        ));
        assert_eq!(params, vec![SqlValue::Int(3)]);
    }

    #[test]
    fn test_selects_aliased_join_columns() {
        let (sql, _) = finalize_tags(manipulator(ForeignScope::One(SqlValue::Int(3))));
        assert!(sql.contains("\"PageTag\".\"SortOrder\" AS \"PageTag_SortOrder\""));
        assert!(sql.contains("\"PageTag\".\"TagID\" AS \"PageTag_TagID\""));
    }

    #[test]
    fn test_no_leftover_pending_marker() {
        let m = manipulator(ForeignScope::One(SqlValue::Int(3)));
        let tag = m.tag.clone();
        let (sql, _) = finalize_tags(m);
        assert!(!sql.contains(&tag));
    }

    #[test]
    fn test_repeated_finalize_is_stable() {
        let query = DataQuery::new("Tag", schema().as_ref())
            .unwrap()
            .push_manipulator(Arc::new(manipulator(ForeignScope::One(SqlValue::Int(3)))));
        let first = query.finalize().unwrap().render().unwrap();
        let second = query.finalize().unwrap().render().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unscoped_join_has_no_filter() {
        let (sql, params) = finalize_tags(manipulator(ForeignScope::Unscoped));
        assert!(sql.contains("INNER JOIN (SELECT \"PageTag\".* FROM \"PageTag\") AS \"PageTag\""));
        assert!(params.is_empty());
    }

    #[test]
    fn test_empty_scope_matches_nothing() {
        let (sql, _) = finalize_tags(manipulator(ForeignScope::Many(vec![])));
        assert!(sql.contains("WHERE 1 = 0"));
    }

    #[test]
    fn test_inline_integer_scope() {
        let (sql, params) = finalize_tags(manipulator(ForeignScope::Many(vec![
            SqlValue::Int(3),
            SqlValue::Int(4),
        ])));
        assert!(sql.contains("\"PageTag\".\"PageID\" IN (3, 4)"));
        assert!(params.is_empty());
    }
}
