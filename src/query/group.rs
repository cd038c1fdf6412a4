//! Nested WHERE/HAVING condition groups.
//!
//! A group is fixed at construction to one clause (WHERE or HAVING) and
//! one connective (AND or OR). Fragments accumulate through the
//! clause-matching operations; calling a WHERE-only operation on a HAVING
//! group (or vice versa) is a contract violation and fails immediately.

use crate::error::OrmError;
use crate::statement::SqlFragment;

/// Which clause of the statement a group contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Where,
    Having,
}

/// How a group's fragments are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    fn separator(self) -> &'static str {
        match self {
            Connective::And => " AND ",
            Connective::Or => " OR ",
        }
    }
}

/// A parenthesized fragment group with its own connective.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionGroup {
    clause: Clause,
    connective: Connective,
    fragments: Vec<SqlFragment>,
}

impl ConditionGroup {
    pub fn new(clause: Clause, connective: Connective) -> Self {
        ConditionGroup {
            clause,
            connective,
            fragments: Vec::new(),
        }
    }

    /// A group whose fragments are joined by OR.
    pub fn disjunctive(clause: Clause) -> Self {
        ConditionGroup::new(clause, Connective::Or)
    }

    /// A group whose fragments are joined by AND.
    pub fn conjunctive(clause: Clause) -> Self {
        ConditionGroup::new(clause, Connective::And)
    }

    pub fn clause(&self) -> Clause {
        self.clause
    }

    pub fn connective(&self) -> Connective {
        self.connective
    }

    /// Add a WHERE fragment.
    ///
    /// # Errors
    ///
    /// `OrmError::Usage` if this group was constructed for HAVING.
    pub fn add_where(&mut self, fragment: SqlFragment) -> Result<&mut Self, OrmError> {
        if self.clause != Clause::Where {
            return Err(OrmError::usage(
                "add_where() called on a HAVING condition group",
            ));
        }
        self.fragments.push(fragment);
        Ok(self)
    }

    /// Add several alternatives as one OR-combined WHERE fragment.
    ///
    /// # Errors
    ///
    /// `OrmError::Usage` if this group was constructed for HAVING.
    pub fn add_where_any(
        &mut self,
        fragments: Vec<SqlFragment>,
    ) -> Result<&mut Self, OrmError> {
        if self.clause != Clause::Where {
            return Err(OrmError::usage(
                "add_where_any() called on a HAVING condition group",
            ));
        }
        if let Some(mut combined) = SqlFragment::join(&fragments, " OR ") {
            if fragments.len() > 1 {
                combined.sql = format!("({})", combined.sql);
            }
            self.fragments.push(combined);
        }
        Ok(self)
    }

    /// Add a HAVING fragment.
    ///
    /// # Errors
    ///
    /// `OrmError::Usage` if this group was constructed for WHERE.
    pub fn add_having(&mut self, fragment: SqlFragment) -> Result<&mut Self, OrmError> {
        if self.clause != Clause::Having {
            return Err(OrmError::usage(
                "add_having() called on a WHERE condition group",
            ));
        }
        self.fragments.push(fragment);
        Ok(self)
    }

    /// Render to a parenthesized fragment, or `None` when the group is
    /// empty; an empty group contributes nothing to the parent
    /// statement, not an empty-parens artifact.
    ///
    /// Any leading clause keyword on an accumulated fragment is stripped
    /// so the caller can splice the result into an arbitrary position.
    pub fn render(&self) -> Option<SqlFragment> {
        if self.fragments.is_empty() {
            return None;
        }
        let stripped: Vec<SqlFragment> = self
            .fragments
            .iter()
            .map(|f| SqlFragment {
                sql: strip_clause_keyword(&f.sql).to_string(),
                params: f.params.clone(),
            })
            .collect();
        let mut combined = SqlFragment::join(&stripped, self.connective.separator())
            .unwrap_or_else(|| SqlFragment::new(""));
        combined.sql = format!("({})", combined.sql);
        Some(combined)
    }
}

fn strip_clause_keyword(sql: &str) -> &str {
    let trimmed = sql.trim_start();
    for keyword in ["WHERE ", "HAVING "] {
        if trimmed.len() >= keyword.len()
            && trimmed[..keyword.len()].eq_ignore_ascii_case(keyword)
        {
            return &trimmed[keyword.len()..];
        }
    }
    trimmed
}
