//! SQL fragments with deferred parameter binding.

use crate::value::SqlValue;

/// A piece of SQL text plus the values bound to its `?` placeholders.
///
/// Fragments compare by content (`PartialEq`), which is the identity used
/// by `DataQuery::remove_filter_on` to drop a previously installed filter.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SqlFragment {
    /// A fragment with no bound parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        SqlFragment {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// A fragment binding `params` to its `?` placeholders, in order.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        SqlFragment {
            sql: sql.into(),
            params,
        }
    }

    /// Join fragments with a connective, concatenating their parameter
    /// lists in order. Returns `None` when `fragments` is empty.
    pub fn join(fragments: &[SqlFragment], connective: &str) -> Option<SqlFragment> {
        if fragments.is_empty() {
            return None;
        }
        let sql = fragments
            .iter()
            .map(|f| f.sql.as_str())
            .collect::<Vec<_>>()
            .join(connective);
        let params = fragments.iter().flat_map(|f| f.params.clone()).collect();
        Some(SqlFragment { sql, params })
    }
}

/// Build an IN-predicate over `column` for `values`.
///
/// When `inline` is set and every value is a non-negative integer, the
/// list is inlined as literal SQL text; any non-integer or negative value
/// forces `?` placeholders. Values are re-validated here, at
/// fragment-build time, so callers cannot accidentally inline
/// attacker-controlled input. An empty value list yields a predicate that
/// matches nothing.
pub fn in_predicate(column: &str, values: &[SqlValue], inline: bool) -> SqlFragment {
    if values.is_empty() {
        // IN over an empty set selects nothing
        return SqlFragment::new("1 = 0");
    }
    if inline {
        let literals: Option<Vec<i64>> =
            values.iter().map(SqlValue::as_inline_integer).collect();
        if let Some(ids) = literals {
            let list = ids
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return SqlFragment::new(format!("{column} IN ({list})"));
        }
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    SqlFragment::with_params(format!("{column} IN ({placeholders})"), values.to_vec())
}
