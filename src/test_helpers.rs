//! In-memory test doubles for the execution and persistence seams.
//!
//! [`MemoryStore`] implements [`RecordStore`] over plain row maps and
//! interprets the narrow SQL shapes this crate renders: single-table
//! SELECTs with AND/OR predicates, ORDER BY, LIMIT/OFFSET, targeted
//! DELETEs, and one join shape, a single aliased
//! `INNER JOIN (subquery) ON column = column` as emitted by the
//! through-relation layer. The joined subquery's columns surface in
//! result rows under alias-prefixed keys, mirroring the `AS "alias_col"`
//! select aliases. Anything else (LEFT JOIN, stacked joins, aggregation)
//! is rejected.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::OrmError;
use crate::record::Record;
use crate::schema::{MapSchema, SchemaProvider};
use crate::store::{RecordStore, Row};
use crate::value::SqlValue;

/// A record backed by a plain field map.
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    entity: String,
    fields: Row,
    inherited_params: BTreeMap<String, SqlValue>,
    joined: BTreeMap<String, Arc<dyn Record>>,
}

impl MemoryRecord {
    fn new(entity: &str, declared: &[String]) -> Self {
        let mut fields = Row::new();
        for field in declared {
            fields.insert(field.clone(), SqlValue::Null);
        }
        MemoryRecord {
            entity: entity.to_string(),
            fields,
            inherited_params: BTreeMap::new(),
            joined: BTreeMap::new(),
        }
    }

    /// The query-scoped parameters this record was constructed with.
    pub fn inherited_params(&self) -> &BTreeMap<String, SqlValue> {
        &self.inherited_params
    }
}

impl Record for MemoryRecord {
    fn entity_type(&self) -> &str {
        &self.entity
    }

    fn id(&self) -> Option<SqlValue> {
        match self.fields.get("ID") {
            Some(SqlValue::Null) | None => None,
            Some(id) => Some(id.clone()),
        }
    }

    fn field(&self, name: &str) -> Option<SqlValue> {
        self.fields.get(name).cloned()
    }

    fn set_field(&mut self, name: &str, value: SqlValue) -> Result<(), OrmError> {
        match self.fields.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(OrmError::schema(format!(
                "record type '{}' has no field '{name}'",
                self.entity
            ))),
        }
    }

    fn attach_joined(&mut self, key: &str, record: Arc<dyn Record>) {
        self.joined.insert(key.to_string(), record);
    }

    fn joined_record(&self, key: &str) -> Option<Arc<dyn Record>> {
        self.joined.get(key).cloned()
    }
}

/// In-memory [`RecordStore`] with seeding helpers and write/delete
/// counters.
pub struct MemoryStore {
    schema: Arc<MapSchema>,
    tables: Mutex<BTreeMap<String, Vec<Row>>>,
    write_count: Mutex<u64>,
    delete_count: Mutex<u64>,
}

impl MemoryStore {
    pub fn new(schema: Arc<MapSchema>) -> Self {
        MemoryStore {
            schema,
            tables: Mutex::new(BTreeMap::new()),
            write_count: Mutex::new(0),
            delete_count: Mutex::new(0),
        }
    }

    /// Insert rows for `entity`: each entry is an id plus field values;
    /// declared fields not named stay null.
    pub fn seed(&self, entity: &str, rows: &[(i64, &[(&str, SqlValue)])]) {
        let declared = self.declared_fields(entity);
        let table = self.table_for(entity);
        let mut tables = self.lock_tables();
        let stored = tables.entry(table).or_default();
        for (id, values) in rows {
            let mut row = Row::new();
            for field in &declared {
                row.insert(field.clone(), SqlValue::Null);
            }
            row.insert("ID".to_string(), SqlValue::Int(*id));
            for (field, value) in *values {
                row.insert((*field).to_string(), value.clone());
            }
            stored.retain(|r| r.get("ID") != Some(&SqlValue::Int(*id)));
            stored.push(row);
        }
    }

    /// How many times `write` has been called.
    pub fn write_count(&self) -> u64 {
        *self.lock(&self.write_count)
    }

    /// How many times `delete` has been called.
    pub fn delete_count(&self) -> u64 {
        *self.lock(&self.delete_count)
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_tables(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<Row>>> {
        self.lock(&self.tables)
    }

    fn declared_fields(&self, entity: &str) -> Vec<String> {
        self.schema.fields(entity).unwrap_or_default()
    }

    fn table_for(&self, entity: &str) -> String {
        self.schema
            .table_name(entity)
            .unwrap_or_else(|_| entity.to_string())
    }

    fn next_id(&self, table: &str) -> i64 {
        let tables = self.lock_tables();
        tables
            .get(table)
            .into_iter()
            .flatten()
            .filter_map(|row| row.get("ID").and_then(SqlValue::as_int))
            .max()
            .unwrap_or(0)
            + 1
    }
}

impl RecordStore for MemoryStore {
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, OrmError> {
        let select = parse_select(sql, params)?;
        let tables = self.lock_tables();
        Ok(eval_select(&tables, &select))
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, OrmError> {
        let delete = parse_delete(sql, params)?;
        let mut tables = self.lock_tables();
        let rows = tables.entry(delete.table.clone()).or_default();
        let before = rows.len();
        rows.retain(|row| !delete.predicate.matches(row));
        Ok((before - rows.len()) as u64)
    }

    fn write(&self, record: &mut dyn Record) -> Result<SqlValue, OrmError> {
        let entity = record.entity_type().to_string();
        let table = self.table_for(&entity);
        let id = match record.id() {
            Some(id) => id,
            None => {
                let id = SqlValue::Int(self.next_id(&table));
                record.set_field("ID", id.clone())?;
                id
            }
        };
        let declared = self.declared_fields(&entity);
        let mut row = Row::new();
        for field in &declared {
            row.insert(
                field.clone(),
                record.field(field).unwrap_or(SqlValue::Null),
            );
        }
        row.insert("ID".to_string(), id.clone());

        let mut tables = self.lock_tables();
        let stored = tables.entry(table).or_default();
        match stored.iter_mut().find(|r| r.get("ID") == Some(&id)) {
            Some(slot) => *slot = row,
            None => stored.push(row),
        }
        *self.lock(&self.write_count) += 1;
        Ok(id)
    }

    fn delete(&self, record: &dyn Record) -> Result<(), OrmError> {
        let id = record.id().ok_or_else(|| {
            OrmError::usage(format!(
                "cannot delete an unsaved {} record",
                record.entity_type()
            ))
        })?;
        let table = self.table_for(record.entity_type());
        let mut tables = self.lock_tables();
        if let Some(rows) = tables.get_mut(&table) {
            rows.retain(|row| row.get("ID") != Some(&id));
        }
        *self.lock(&self.delete_count) += 1;
        Ok(())
    }

    fn load_by_id(
        &self,
        entity: &str,
        id: &SqlValue,
    ) -> Result<Option<Box<dyn Record>>, OrmError> {
        let table = self.table_for(entity);
        let row = {
            let tables = self.lock_tables();
            tables
                .get(&table)
                .and_then(|rows| rows.iter().find(|r| r.get("ID") == Some(id)).cloned())
        };
        match row {
            Some(row) => Ok(Some(self.create_record(entity, &row, &BTreeMap::new())?)),
            None => Ok(None),
        }
    }

    fn new_record(&self, entity: &str) -> Result<Box<dyn Record>, OrmError> {
        self.schema.table_name(entity)?;
        Ok(Box::new(MemoryRecord::new(
            entity,
            &self.declared_fields(entity),
        )))
    }

    fn create_record(
        &self,
        entity: &str,
        row: &Row,
        inherited_params: &BTreeMap<String, SqlValue>,
    ) -> Result<Box<dyn Record>, OrmError> {
        self.schema.table_name(entity)?;
        let mut record = MemoryRecord::new(entity, &self.declared_fields(entity));
        for (column, value) in row {
            if record.fields.contains_key(column) {
                record.fields.insert(column.clone(), value.clone());
            }
        }
        record.inherited_params = inherited_params.clone();
        Ok(Box::new(record))
    }
}

// --- SQL interpretation ----------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    True,
    Const(bool),
    Eq(String, SqlValue),
    IsNull(String),
    In(String, Vec<SqlValue>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::True => true,
            Predicate::Const(value) => *value,
            Predicate::Eq(column, expected) => row.get(column) == Some(expected),
            Predicate::IsNull(column) => {
                matches!(row.get(column), Some(SqlValue::Null) | None)
            }
            Predicate::In(column, values) => row
                .get(column)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Predicate::And(parts) => parts.iter().all(|p| p.matches(row)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(row)),
        }
    }
}

struct ParsedSelect {
    table: String,
    join: Option<ParsedJoin>,
    predicate: Predicate,
    // column, descending
    order: Vec<(String, bool)>,
    limit: Option<usize>,
    offset: usize,
}

/// One aliased `INNER JOIN (subquery) ON alias.local = base.key`.
struct ParsedJoin {
    alias: String,
    sub: Box<ParsedSelect>,
    // column of the subquery side
    local: String,
    // column of the base table side
    key: String,
}

struct ParsedDelete {
    table: String,
    predicate: Predicate,
}

static SELECT_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^SELECT .+? FROM "(?P<table>[^"]+)"(?P<rest>.*)$"#).unwrap_or_else(|e| panic!("bad pattern: {e}")));

static DELETE_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^DELETE FROM "(?P<table>[^"]+)"(?P<rest>.*)$"#).unwrap_or_else(|e| panic!("bad pattern: {e}")));

static COLUMN_EQ: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^"[^"]+"\."(?P<col>[^"]+)" = (?P<rhs>.+)$"#).unwrap_or_else(|e| panic!("bad pattern: {e}"))
});

static COLUMN_IS_NULL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^"[^"]+"\."(?P<col>[^"]+)" IS NULL$"#).unwrap_or_else(|e| panic!("bad pattern: {e}"))
});

static COLUMN_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^"[^"]+"\."(?P<col>[^"]+)" IN \((?P<values>.*)\)$"#)
        .unwrap_or_else(|e| panic!("bad pattern: {e}"))
});

static ORDER_TERM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^"[^"]+"\."(?P<col>[^"]+)" (?P<dir>ASC|DESC)$"#)
        .unwrap_or_else(|e| panic!("bad pattern: {e}"))
});

static JOIN_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^ AS "(?P<alias>[^"]+)" ON "[^"]+"\."(?P<local>[^"]+)" = "[^"]+"\."(?P<key>[^"]+)"(?P<rest>.*)$"#,
    )
    .unwrap_or_else(|e| panic!("bad pattern: {e}"))
});

fn unsupported(sql: &str, detail: &str) -> OrmError {
    OrmError::database(format!("in-memory store cannot interpret {detail}: {sql}"))
}

fn parse_select(sql: &str, params: &[SqlValue]) -> Result<ParsedSelect, OrmError> {
    let mut bound = params.iter();
    parse_select_text(sql, &mut bound, sql)
}

fn parse_select_text<'a>(
    text: &str,
    bound: &mut impl Iterator<Item = &'a SqlValue>,
    sql: &str,
) -> Result<ParsedSelect, OrmError> {
    if text.contains(" GROUP BY ") || text.contains(" HAVING ") {
        return Err(unsupported(sql, "aggregation"));
    }
    let captures = SELECT_HEAD
        .captures(text)
        .ok_or_else(|| unsupported(sql, "this statement shape"))?;
    let table = captures["table"].to_string();
    let mut rest = captures["rest"].to_string();

    let mut offset = 0usize;
    if let Some((head, tail)) = split_tail(&rest, " OFFSET ") {
        offset = tail
            .trim()
            .parse()
            .map_err(|_| unsupported(sql, "the OFFSET clause"))?;
        rest = head;
    }
    let mut limit = None;
    if let Some((head, tail)) = split_tail(&rest, " LIMIT ") {
        limit = Some(
            tail.trim()
                .parse()
                .map_err(|_| unsupported(sql, "the LIMIT clause"))?,
        );
        rest = head;
    }
    let mut order = Vec::new();
    if let Some((head, tail)) = split_tail(&rest, " ORDER BY ") {
        for term in tail.split(", ") {
            let captures = ORDER_TERM
                .captures(term.trim())
                .ok_or_else(|| unsupported(sql, "the ORDER BY clause"))?;
            order.push((captures["col"].to_string(), &captures["dir"] == "DESC"));
        }
        rest = head;
    }
    let mut join = None;
    if let Some(after_open) = rest.strip_prefix(" INNER JOIN (") {
        let close = matching_paren(after_open)
            .ok_or_else(|| unsupported(sql, "an unbalanced join subquery"))?;
        // the subquery's placeholders come first in text order
        let sub = parse_select_text(&after_open[..close], bound, sql)?;
        let captures = JOIN_TAIL
            .captures(&after_open[close + 1..])
            .ok_or_else(|| unsupported(sql, "this join shape"))?;
        join = Some(ParsedJoin {
            alias: captures["alias"].to_string(),
            sub: Box::new(sub),
            local: captures["local"].to_string(),
            key: captures["key"].to_string(),
        });
        rest = captures["rest"].to_string();
    }
    if rest.contains(" JOIN ") {
        return Err(unsupported(sql, "this join shape"));
    }
    let predicate = match rest.strip_prefix(" WHERE ") {
        Some(condition) => parse_condition(condition.trim(), bound, sql)?,
        None if rest.trim().is_empty() => Predicate::True,
        None => return Err(unsupported(sql, "this statement shape")),
    };
    Ok(ParsedSelect {
        table,
        join,
        predicate,
        order,
        limit,
        offset,
    })
}

fn eval_select(tables: &BTreeMap<String, Vec<Row>>, select: &ParsedSelect) -> Vec<Row> {
    let empty = Vec::new();
    let base = tables.get(&select.table).unwrap_or(&empty);
    let mut matched: Vec<Row> = match &select.join {
        None => base.to_vec(),
        Some(join) => {
            let sub_rows = eval_select(tables, &join.sub);
            let mut joined = Vec::new();
            for row in base {
                for sub in &sub_rows {
                    let local = sub.get(&join.local);
                    if matches!(local, None | Some(SqlValue::Null)) || local != row.get(&join.key)
                    {
                        continue;
                    }
                    // surface the join row under alias-prefixed keys,
                    // mirroring the statement's select aliases
                    let mut merged = row.clone();
                    for (column, value) in sub {
                        merged.insert(format!("{}_{column}", join.alias), value.clone());
                    }
                    joined.push(merged);
                }
            }
            joined
        }
    };
    matched.retain(|row| select.predicate.matches(row));
    for (column, direction_desc) in select.order.iter().rev() {
        matched.sort_by(|a, b| {
            let ord = compare_values(
                a.get(column).unwrap_or(&SqlValue::Null),
                b.get(column).unwrap_or(&SqlValue::Null),
            );
            if *direction_desc {
                ord.reverse()
            } else {
                ord
            }
        });
    }
    let offset = select.offset.min(matched.len());
    let mut matched = matched.split_off(offset);
    if let Some(limit) = select.limit {
        matched.truncate(limit);
    }
    matched
}

fn parse_delete(sql: &str, params: &[SqlValue]) -> Result<ParsedDelete, OrmError> {
    let captures = DELETE_HEAD
        .captures(sql)
        .ok_or_else(|| unsupported(sql, "this statement shape"))?;
    let table = captures["table"].to_string();
    let rest = captures["rest"].to_string();
    let mut bound = params.iter();
    let predicate = match rest.strip_prefix(" WHERE ") {
        Some(condition) => parse_condition(condition.trim(), &mut bound, sql)?,
        None if rest.trim().is_empty() => Predicate::True,
        None => return Err(unsupported(sql, "this statement shape")),
    };
    Ok(ParsedDelete { table, predicate })
}

/// Index of the `)` closing the paren just before `text`, if balanced.
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 1i32;
    for (i, b) in text.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on the last top-level occurrence of `marker`.
fn split_tail(text: &str, marker: &str) -> Option<(String, String)> {
    let mut depth = 0i32;
    let bytes = text.as_bytes();
    let mut found = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {
                if depth == 0 && text[i..].starts_with(marker) {
                    found = Some(i);
                }
            }
        }
        i += 1;
    }
    found.map(|at| {
        (
            text[..at].to_string(),
            text[at + marker.len()..].to_string(),
        )
    })
}

/// Split `text` on every top-level occurrence of `separator`.
fn split_top_level(text: &str, separator: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {
                if depth == 0 && text[i..].starts_with(separator) {
                    parts.push(text[start..i].to_string());
                    i += separator.len();
                    start = i;
                    continue;
                }
            }
        }
        i += 1;
    }
    parts.push(text[start..].to_string());
    parts
}

fn strip_outer_parens(text: &str) -> &str {
    let trimmed = text.trim();
    if !(trimmed.starts_with('(') && trimmed.ends_with(')')) {
        return trimmed;
    }
    // only strip when the parens actually match each other
    let mut depth = 0i32;
    for (i, b) in trimmed.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 && i != trimmed.len() - 1 {
                    return trimmed;
                }
            }
            _ => {}
        }
    }
    &trimmed[1..trimmed.len() - 1]
}

fn parse_condition<'a>(
    text: &str,
    bound: &mut impl Iterator<Item = &'a SqlValue>,
    sql: &str,
) -> Result<Predicate, OrmError> {
    let text = strip_outer_parens(text);
    let alternatives = split_top_level(text, " OR ");
    if alternatives.len() > 1 {
        // no short-circuiting: every branch consumes its placeholders
        let parts = alternatives
            .iter()
            .map(|part| parse_condition(part, bound, sql))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Predicate::Or(parts));
    }
    let conjuncts = split_top_level(text, " AND ");
    if conjuncts.len() > 1 {
        let parts = conjuncts
            .iter()
            .map(|part| parse_condition(part, bound, sql))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Predicate::And(parts));
    }
    parse_atom(text.trim(), bound, sql)
}

fn parse_atom<'a>(
    text: &str,
    bound: &mut impl Iterator<Item = &'a SqlValue>,
    sql: &str,
) -> Result<Predicate, OrmError> {
    if text == "1 = 0" {
        return Ok(Predicate::Const(false));
    }
    if text == "1 = 1" {
        return Ok(Predicate::Const(true));
    }
    if let Some(captures) = COLUMN_IS_NULL.captures(text) {
        return Ok(Predicate::IsNull(captures["col"].to_string()));
    }
    if let Some(captures) = COLUMN_IN.captures(text) {
        let column = captures["col"].to_string();
        let mut values = Vec::new();
        for item in captures["values"].split(", ") {
            values.push(parse_value(item.trim(), bound, sql)?);
        }
        return Ok(Predicate::In(column, values));
    }
    if let Some(captures) = COLUMN_EQ.captures(text) {
        let column = captures["col"].to_string();
        let value = parse_value(captures["rhs"].trim(), bound, sql)?;
        return Ok(Predicate::Eq(column, value));
    }
    Err(unsupported(sql, "a predicate"))
}

fn parse_value<'a>(
    text: &str,
    bound: &mut impl Iterator<Item = &'a SqlValue>,
    sql: &str,
) -> Result<SqlValue, OrmError> {
    if text == "?" {
        return bound
            .next()
            .cloned()
            .ok_or_else(|| unsupported(sql, "a statement with too few parameters"));
    }
    if let Ok(n) = text.parse::<i64>() {
        return Ok(SqlValue::Int(n));
    }
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        return Ok(SqlValue::Text(text[1..text.len() - 1].to_string()));
    }
    Err(unsupported(sql, "a literal"))
}

fn compare_values(a: &SqlValue, b: &SqlValue) -> Ordering {
    match (a, b) {
        (SqlValue::Null, SqlValue::Null) => Ordering::Equal,
        (SqlValue::Null, _) => Ordering::Less,
        (_, SqlValue::Null) => Ordering::Greater,
        (SqlValue::Int(x), SqlValue::Int(y)) => x.cmp(y),
        (SqlValue::Float(x), SqlValue::Float(y)) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (SqlValue::Int(x), SqlValue::Float(y)) => {
            (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (SqlValue::Float(x), SqlValue::Int(y)) => {
            x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal)
        }
        (SqlValue::Bool(x), SqlValue::Bool(y)) => x.cmp(y),
        (SqlValue::Text(x), SqlValue::Text(y)) => x.cmp(y),
        (SqlValue::DateTime(x), SqlValue::DateTime(y)) => x.cmp(y),
        (SqlValue::Uuid(x), SqlValue::Uuid(y)) => x.cmp(y),
        (x, y) => x.to_string().cmp(&y.to_string()),
    }
}
