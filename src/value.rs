//! Value enum for bound parameters and record fields.
//!
//! The statement model in this crate is fragment-based: SQL text plus a
//! list of values bound when the statement is finally executed. `SqlValue`
//! is the owned value carried through fragments, scoped parameter maps,
//! record fields and result rows.
//!
//! The variant set mirrors the field types supported by the persistence
//! layer: null, bool, 64-bit integer, double, text, naive timestamp and
//! UUID.

use chrono::NaiveDateTime;
use std::fmt;
use uuid::Uuid;

/// An owned SQL value, bound to a statement at execution time.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
    Uuid(Uuid),
}

impl SqlValue {
    /// Whether this value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// The integer payload, if this value is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The text payload, if this value is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a literal safe to inline into SQL text, or
    /// `None` if the value must go through a bound placeholder.
    ///
    /// Only non-negative integers qualify. Anything else, including text
    /// that merely looks numeric, is rejected so that ostensibly-numeric
    /// but attacker-controlled input always takes the parameterized path.
    pub fn as_inline_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) if *i >= 0 => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{b}"),
            SqlValue::Int(i) => write!(f, "{i}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Text(s) => write!(f, "{s}"),
            SqlValue::DateTime(dt) => write!(f, "{dt}"),
            SqlValue::Uuid(u) => write!(f, "{u}"),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}
