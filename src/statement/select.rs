//! The working SELECT statement rewritten during finalization.
//!
//! `SqlSelect` is deliberately transparent: select list, join list,
//! where/having fragment lists, ordering and limit/offset are all plain
//! data that query manipulators may inspect and rewrite. Joins carry a
//! [`JoinSource`] that can be `Pending`: a structured stand-in for a
//! subquery whose text is captured during the before-hook phase of a
//! finalize pass and substituted during the after-hook phase, so that
//! cross-cutting rewrites never touch an already-finalized subquery.

use crate::error::OrmError;
use crate::statement::fragment::SqlFragment;
use crate::statement::quote;
use crate::value::SqlValue;

/// Priority for ordinary table joins.
pub const JOIN_PRIORITY_DEFAULT: i32 = 50;
/// Priority for relation-injected subquery joins; sequences them ahead of
/// ordinary joins.
pub const JOIN_PRIORITY_THROUGH: i32 = 20;

/// Sort direction for an ORDER BY entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// What a join reads from.
///
/// `Pending(tag)` marks a join whose subquery text is not known yet; it is
/// resolved to `Subquery` by [`SqlSelect::resolve_pending_join`] before
/// rendering. Rendering a statement that still contains a pending join is
/// a usage error (a finalize pass forgot its after-hook).
#[derive(Debug, Clone, PartialEq)]
pub enum JoinSource {
    /// A plain table reference (subject to cross-cutting text rewriting).
    Table(String),
    /// An already-finalized subquery (never rewritten again).
    Subquery(SqlFragment),
    /// A placeholder awaiting its captured subquery, keyed by tag.
    Pending(String),
}

/// One join clause. Joins render sorted ascending by `priority`, stable
/// within equal priorities.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub source: JoinSource,
    pub alias: String,
    pub on: SqlFragment,
    pub priority: i32,
}

/// A SELECT statement under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlSelect {
    select: Vec<(String, Option<String>)>,
    from: String,
    joins: Vec<JoinClause>,
    wheres: Vec<SqlFragment>,
    group_by: Vec<String>,
    havings: Vec<SqlFragment>,
    order: Vec<(String, SortDirection)>,
    limit: Option<u64>,
    offset: u64,
}

impl SqlSelect {
    /// A statement selecting `"table".*` from `table`.
    pub fn from_table(table: impl Into<String>) -> Self {
        let table = table.into();
        let star = format!("{}.*", quote(&table));
        SqlSelect {
            select: vec![(star, None)],
            from: table,
            joins: Vec::new(),
            wheres: Vec::new(),
            group_by: Vec::new(),
            havings: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn from_name(&self) -> &str {
        &self.from
    }

    /// Append a select expression, optionally aliased.
    pub fn add_select(&mut self, expr: impl Into<String>, alias: Option<&str>) -> &mut Self {
        self.select
            .push((expr.into(), alias.map(str::to_string)));
        self
    }

    pub fn add_join(&mut self, join: JoinClause) -> &mut Self {
        self.joins.push(join);
        self
    }

    /// Convenience for an ordinary inner join on a table.
    pub fn add_inner_join(
        &mut self,
        table: impl Into<String>,
        on: SqlFragment,
        priority: i32,
    ) -> &mut Self {
        let table = table.into();
        self.add_join(JoinClause {
            kind: JoinKind::Inner,
            source: JoinSource::Table(table.clone()),
            alias: table,
            on,
            priority,
        })
    }

    pub fn add_where(&mut self, fragment: SqlFragment) -> &mut Self {
        self.wheres.push(fragment);
        self
    }

    pub fn add_having(&mut self, fragment: SqlFragment) -> &mut Self {
        self.havings.push(fragment);
        self
    }

    pub fn add_group_by(&mut self, expr: impl Into<String>) -> &mut Self {
        self.group_by.push(expr.into());
        self
    }

    pub fn add_order_by(&mut self, expr: impl Into<String>, direction: SortDirection) -> &mut Self {
        self.order.push((expr.into(), direction));
        self
    }

    /// Set LIMIT/OFFSET. `None` means unlimited; `Some(0)` renders
    /// `LIMIT 0`, a deliberately empty result set.
    pub fn set_limit(&mut self, limit: Option<u64>, offset: u64) -> &mut Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn wheres(&self) -> &[SqlFragment] {
        &self.wheres
    }

    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    /// Whether any join source is still awaiting its subquery.
    pub fn has_pending_joins(&self) -> bool {
        self.joins
            .iter()
            .any(|j| matches!(j.source, JoinSource::Pending(_)))
    }

    /// Resolve the pending join tagged `tag` with a finalized subquery.
    /// Returns whether a pending join with that tag existed.
    pub fn resolve_pending_join(&mut self, tag: &str, subquery: SqlFragment) -> bool {
        for join in &mut self.joins {
            if matches!(&join.source, JoinSource::Pending(t) if t == tag) {
                join.source = JoinSource::Subquery(subquery);
                return true;
            }
        }
        false
    }

    /// Apply a text rewrite across the statement: FROM, table join
    /// sources, join aliases' ON clauses, select expressions, where and
    /// having fragments, group-by and order-by expressions.
    ///
    /// `Subquery` and `Pending` join sources are exempt: a subquery is
    /// finalized independently and must not be rewritten a second time.
    /// The join predicate around it still is, since it references the
    /// outer statement's tables.
    pub fn rewrite_text(&mut self, f: impl Fn(&str) -> String) {
        self.from = f(&self.from);
        for (expr, _) in &mut self.select {
            *expr = f(expr);
        }
        for join in &mut self.joins {
            if let JoinSource::Table(table) = &mut join.source {
                *table = f(table);
            }
            join.on.sql = f(&join.on.sql);
        }
        for w in &mut self.wheres {
            w.sql = f(&w.sql);
        }
        for g in &mut self.group_by {
            *g = f(g);
        }
        for h in &mut self.havings {
            h.sql = f(&h.sql);
        }
        for (expr, _) in &mut self.order {
            *expr = f(expr);
        }
    }

    /// Render to SQL text plus bound parameters, in text order.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Usage` if a pending join was never resolved.
    pub fn render(&self) -> Result<(String, Vec<SqlValue>), OrmError> {
        let mut sql = String::from("SELECT ");
        let mut params: Vec<SqlValue> = Vec::new();

        let cols = self
            .select
            .iter()
            .map(|(expr, alias)| match alias {
                Some(a) => format!("{expr} AS {}", quote(a)),
                None => expr.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&cols);
        sql.push_str(&format!(" FROM {}", quote(&self.from)));

        let mut joins: Vec<&JoinClause> = self.joins.iter().collect();
        joins.sort_by_key(|j| j.priority);
        for join in joins {
            let source = match &join.source {
                JoinSource::Table(table) => quote(table),
                JoinSource::Subquery(sub) => {
                    params.extend(sub.params.iter().cloned());
                    format!("({})", sub.sql)
                }
                JoinSource::Pending(tag) => {
                    return Err(OrmError::usage(format!(
                        "statement still contains the unresolved pending join '{tag}'"
                    )));
                }
            };
            if matches!(join.source, JoinSource::Table(ref t) if *t == join.alias) {
                sql.push_str(&format!(" {} {}", join.kind.as_sql(), source));
            } else {
                sql.push_str(&format!(
                    " {} {} AS {}",
                    join.kind.as_sql(),
                    source,
                    quote(&join.alias)
                ));
            }
            sql.push_str(&format!(" ON {}", join.on.sql));
            params.extend(join.on.params.iter().cloned());
        }

        if let Some(fragment) = SqlFragment::join(&self.wheres, " AND ") {
            sql.push_str(&format!(" WHERE {}", fragment.sql));
            params.extend(fragment.params);
        }
        if !self.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", self.group_by.join(", ")));
        }
        if let Some(fragment) = SqlFragment::join(&self.havings, " AND ") {
            sql.push_str(&format!(" HAVING {}", fragment.sql));
            params.extend(fragment.params);
        }
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|(expr, dir)| format!("{expr} {}", dir.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ORDER BY {order}"));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if self.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", self.offset));
        }

        Ok((sql, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_basic() {
        let stmt = SqlSelect::from_table("Comment");
        let (sql, params) = stmt.render().unwrap();
        assert_eq!(sql, "SELECT \"Comment\".* FROM \"Comment\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_render_where_and_order() {
        let mut stmt = SqlSelect::from_table("Comment");
        stmt.add_where(SqlFragment::with_params(
            "\"Comment\".\"PostID\" = ?",
            vec![SqlValue::Int(5)],
        ));
        stmt.add_where(SqlFragment::new("\"Comment\".\"Spam\" = 0"));
        stmt.add_order_by("\"Comment\".\"ID\"", SortDirection::Desc);
        let (sql, params) = stmt.render().unwrap();
        assert_eq!(
            sql,
            "SELECT \"Comment\".* FROM \"Comment\" WHERE \"Comment\".\"PostID\" = ? \
             AND \"Comment\".\"Spam\" = 0 ORDER BY \"Comment\".\"ID\" DESC"
        );
        assert_eq!(params, vec![SqlValue::Int(5)]);
    }

    #[test]
    fn test_render_limit_zero_is_explicit() {
        let mut stmt = SqlSelect::from_table("Comment");
        stmt.set_limit(Some(0), 0);
        let (sql, _) = stmt.render().unwrap();
        assert!(sql.ends_with(" LIMIT 0"));
    }

    #[test]
    fn test_render_offset_only_when_set() {
        let mut stmt = SqlSelect::from_table("Comment");
        stmt.set_limit(Some(10), 20);
        let (sql, _) = stmt.render().unwrap();
        assert!(sql.ends_with(" LIMIT 10 OFFSET 20"));
    }

    #[test]
    fn test_pending_join_render_fails() {
        let mut stmt = SqlSelect::from_table("Tag");
        stmt.add_join(JoinClause {
            kind: JoinKind::Inner,
            source: JoinSource::Pending("tag:PageTag".to_string()),
            alias: "PageTag".to_string(),
            on: SqlFragment::new("\"PageTag\".\"TagID\" = \"Tag\".\"ID\""),
            priority: JOIN_PRIORITY_THROUGH,
        });
        let err = stmt.render().unwrap_err();
        assert!(matches!(err, OrmError::Usage(_)));
    }

    #[test]
    fn test_resolve_pending_join_then_render() {
        let mut stmt = SqlSelect::from_table("Tag");
        stmt.add_join(JoinClause {
            kind: JoinKind::Inner,
            source: JoinSource::Pending("tag:PageTag".to_string()),
            alias: "PageTag".to_string(),
            on: SqlFragment::new("\"PageTag\".\"TagID\" = \"Tag\".\"ID\""),
            priority: JOIN_PRIORITY_THROUGH,
        });
        let sub = SqlFragment::with_params(
            "SELECT \"PageTag\".* FROM \"PageTag\" WHERE \"PageTag\".\"PageID\" = ?",
            vec![SqlValue::Int(3)],
        );
        assert!(stmt.resolve_pending_join("tag:PageTag", sub));
        let (sql, params) = stmt.render().unwrap();
        assert!(!sql.contains("tag:PageTag"));
        assert!(sql.contains(
            "INNER JOIN (SELECT \"PageTag\".* FROM \"PageTag\" WHERE \"PageTag\".\"PageID\" = ?) \
             AS \"PageTag\" ON \"PageTag\".\"TagID\" = \"Tag\".\"ID\""
        ));
        assert_eq!(params, vec![SqlValue::Int(3)]);
    }

    #[test]
    fn test_resolve_unknown_tag_is_false() {
        let mut stmt = SqlSelect::from_table("Tag");
        assert!(!stmt.resolve_pending_join("nope", SqlFragment::new("SELECT 1")));
    }

    #[test]
    fn test_joins_render_in_priority_order() {
        let mut stmt = SqlSelect::from_table("Tag");
        stmt.add_inner_join(
            "Other",
            SqlFragment::new("\"Other\".\"TagID\" = \"Tag\".\"ID\""),
            JOIN_PRIORITY_DEFAULT,
        );
        stmt.add_join(JoinClause {
            kind: JoinKind::Inner,
            source: JoinSource::Subquery(SqlFragment::new("SELECT 1")),
            alias: "Sub".to_string(),
            on: SqlFragment::new("\"Sub\".\"X\" = \"Tag\".\"ID\""),
            priority: JOIN_PRIORITY_THROUGH,
        });
        let (sql, _) = stmt.render().unwrap();
        let sub_pos = sql.find("\"Sub\"").unwrap();
        let other_pos = sql.find("\"Other\"").unwrap();
        assert!(sub_pos < other_pos, "lower priority join must render first");
    }

    #[test]
    fn test_rewrite_text_skips_subquery_sources() {
        let mut stmt = SqlSelect::from_table("Tag");
        stmt.add_join(JoinClause {
            kind: JoinKind::Inner,
            source: JoinSource::Subquery(SqlFragment::new("SELECT \"Tag\".* FROM \"Tag\"")),
            alias: "Sub".to_string(),
            on: SqlFragment::new("\"Sub\".\"TagID\" = \"Tag\".\"ID\""),
            priority: JOIN_PRIORITY_THROUGH,
        });
        stmt.add_where(SqlFragment::new("\"Tag\".\"Live\" = 1"));
        stmt.rewrite_text(|text| text.replace("Tag", "Tag_Live"));

        let (sql, _) = stmt.render().unwrap();
        // Outer references are rewritten, the captured subquery is not
        assert!(sql.contains("FROM \"Tag_Live\""));
        assert!(sql.contains("\"Tag_Live\".\"Live\" = 1"));
        assert!(sql.contains("(SELECT \"Tag\".* FROM \"Tag\")"));
        assert!(sql.contains("\"Sub\".\"Tag_LiveID\" = \"Tag_Live\".\"ID\""));
    }
}
