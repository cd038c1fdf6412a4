//! Targeted DELETE statements.
//!
//! Used by many-many relation lists, where unlinking means physically
//! deleting join rows. Kept deliberately small: a table plus AND-joined
//! where fragments.

use crate::statement::fragment::SqlFragment;
use crate::statement::quote;
use crate::value::SqlValue;

/// A DELETE statement under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlDelete {
    table: String,
    wheres: Vec<SqlFragment>,
}

impl SqlDelete {
    pub fn new(table: impl Into<String>) -> Self {
        SqlDelete {
            table: table.into(),
            wheres: Vec::new(),
        }
    }

    pub fn add_where(&mut self, fragment: SqlFragment) -> &mut Self {
        self.wheres.push(fragment);
        self
    }

    /// Render to SQL text plus bound parameters.
    pub fn render(&self) -> (String, Vec<SqlValue>) {
        let mut sql = format!("DELETE FROM {}", quote(&self.table));
        let mut params = Vec::new();
        if let Some(fragment) = SqlFragment::join(&self.wheres, " AND ") {
            sql.push_str(&format!(" WHERE {}", fragment.sql));
            params.extend(fragment.params);
        }
        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_with_where() {
        let mut del = SqlDelete::new("PageTag");
        del.add_where(SqlFragment::with_params(
            "\"PageTag\".\"TagID\" = ?",
            vec![SqlValue::Int(7)],
        ));
        del.add_where(SqlFragment::new("\"PageTag\".\"PageID\" IN (3)"));
        let (sql, params) = del.render();
        assert_eq!(
            sql,
            "DELETE FROM \"PageTag\" WHERE \"PageTag\".\"TagID\" = ? \
             AND \"PageTag\".\"PageID\" IN (3)"
        );
        assert_eq!(params, vec![SqlValue::Int(7)]);
    }

    #[test]
    fn test_render_without_where() {
        let del = SqlDelete::new("PageTag");
        let (sql, params) = del.render();
        assert_eq!(sql, "DELETE FROM \"PageTag\"");
        assert!(params.is_empty());
    }
}
