//! Key/value projection over a [`DataList`].
//!
//! A [`ProjectionMap`] reads two fields out of every record a list would
//! return and presents them as an ordered key/value view. Entries can be
//! pinned to the front or the back of the view without touching the
//! database; the queried body stays read-only.

use std::fmt;

use crate::error::OrmError;
use crate::list::{DataList, Filterable, Limitable};
use crate::value::SqlValue;

/// Ordered key/value projection of a list.
///
/// Produced by [`DataList::map`]. The projection is lazy in the same way
/// the list is: the underlying query runs when the map is iterated or a
/// key is looked up, not when the map is built.
///
/// Pinned entries added with [`unshift`](Self::unshift) iterate before the
/// queried body, entries added with [`push`](Self::push) after it. When a
/// queried row carries the same key as a pinned entry, the pinned entry
/// wins and the row is skipped, so each key surfaces at most once per
/// pinned collision.
#[derive(Clone)]
pub struct ProjectionMap {
    list: DataList,
    key_field: String,
    value_field: String,
    first: Vec<(SqlValue, SqlValue)>,
    last: Vec<(SqlValue, SqlValue)>,
}

impl fmt::Debug for ProjectionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionMap")
            .field("entity", &self.list.entity())
            .field("key_field", &self.key_field)
            .field("value_field", &self.value_field)
            .field("pinned_first", &self.first.len())
            .field("pinned_last", &self.last.len())
            .finish()
    }
}

impl ProjectionMap {
    pub(crate) fn new(list: DataList, key_field: &str, value_field: &str) -> Self {
        ProjectionMap {
            list,
            key_field: key_field.to_string(),
            value_field: value_field.to_string(),
            first: Vec::new(),
            last: Vec::new(),
        }
    }

    /// Field the keys are read from.
    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    /// Field the values are read from.
    pub fn value_field(&self) -> &str {
        &self.value_field
    }

    /// Pin an entry ahead of the queried body.
    ///
    /// Repeated calls keep their insertion order, so the first `unshift`
    /// iterates first. Re-pinning a key that is already pinned replaces
    /// its value in place.
    pub fn unshift(&mut self, key: SqlValue, value: SqlValue) {
        if !self.repin(&key, &value) {
            self.first.push((key, value));
        }
    }

    /// Pin an entry after the queried body.
    pub fn push(&mut self, key: SqlValue, value: SqlValue) {
        if !self.repin(&key, &value) {
            self.last.push((key, value));
        }
    }

    fn repin(&mut self, key: &SqlValue, value: &SqlValue) -> bool {
        for slot in self.first.iter_mut().chain(self.last.iter_mut()) {
            if slot.0 == *key {
                slot.1 = value.clone();
                return true;
            }
        }
        false
    }

    /// Look up a single key.
    ///
    /// Pinned entries are consulted before the database; front pins take
    /// precedence over back pins.
    pub fn get(&self, key: &SqlValue) -> Result<Option<SqlValue>, OrmError> {
        if let Some((_, v)) = self.first.iter().find(|(k, _)| k == key) {
            return Ok(Some(v.clone()));
        }
        if let Some((_, v)) = self.last.iter().find(|(k, _)| k == key) {
            return Ok(Some(v.clone()));
        }
        let scoped = self
            .list
            .filter_by(&self.key_field, key.clone())?
            .limit(Some(1), 0)?;
        for row in scoped.rows()? {
            if let Some(v) = row.get(&self.value_field) {
                return Ok(Some(v.clone()));
            }
        }
        Ok(None)
    }

    /// Overwrite the value of a pinned entry.
    ///
    /// The queried body is read-only; asking to set a key that is not
    /// pinned is a usage error.
    pub fn set(&mut self, key: &SqlValue, value: SqlValue) -> Result<(), OrmError> {
        if let Some(slot) = self.first.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
            return Ok(());
        }
        if let Some(slot) = self.last.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
            return Ok(());
        }
        Err(OrmError::usage(format!(
            "cannot set key {key} on a query-backed map; only pinned entries are writable"
        )))
    }

    /// Remove a pinned entry.
    ///
    /// Like [`set`](Self::set), this only touches pins. Removing a key
    /// that only exists in the queried body is a usage error.
    pub fn remove(&mut self, key: &SqlValue) -> Result<(), OrmError> {
        if let Some(pos) = self.first.iter().position(|(k, _)| k == key) {
            self.first.remove(pos);
            return Ok(());
        }
        if let Some(pos) = self.last.iter().position(|(k, _)| k == key) {
            self.last.remove(pos);
            return Ok(());
        }
        Err(OrmError::usage(format!(
            "cannot remove key {key} from a query-backed map; only pinned entries are removable"
        )))
    }

    /// Execute the query and iterate all entries in phase order.
    pub fn iter(&self) -> Result<ProjectionIter, OrmError> {
        let mut body = Vec::new();
        for row in self.list.rows()? {
            let key = row.get(&self.key_field).cloned().unwrap_or(SqlValue::Null);
            let value = row
                .get(&self.value_field)
                .cloned()
                .unwrap_or(SqlValue::Null);
            body.push((key, value));
        }
        Ok(ProjectionIter {
            first: self.first.clone(),
            body,
            last: self.last.clone(),
            phase: Phase::First,
            index: 0,
        })
    }

    /// Number of entries iteration would yield, collisions included.
    pub fn count(&self) -> Result<usize, OrmError> {
        Ok(self.iter()?.count())
    }

    /// Collect the whole projection into key/value pairs.
    pub fn entries(&self) -> Result<Vec<(SqlValue, SqlValue)>, OrmError> {
        Ok(self.iter()?.collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    First,
    Body,
    Last,
    Done,
}

/// Iterator over a [`ProjectionMap`].
///
/// Yields the front pins in insertion order, then the queried rows with
/// pinned keys skipped, then the back pins.
#[derive(Debug)]
pub struct ProjectionIter {
    first: Vec<(SqlValue, SqlValue)>,
    body: Vec<(SqlValue, SqlValue)>,
    last: Vec<(SqlValue, SqlValue)>,
    phase: Phase,
    index: usize,
}

impl ProjectionIter {
    fn pinned(&self, key: &SqlValue) -> bool {
        self.first.iter().any(|(k, _)| k == key) || self.last.iter().any(|(k, _)| k == key)
    }
}

impl Iterator for ProjectionIter {
    type Item = (SqlValue, SqlValue);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.phase {
                Phase::First => {
                    if self.index < self.first.len() {
                        let entry = self.first[self.index].clone();
                        self.index += 1;
                        return Some(entry);
                    }
                    self.phase = Phase::Body;
                    self.index = 0;
                }
                Phase::Body => {
                    while self.index < self.body.len() {
                        let entry = self.body[self.index].clone();
                        self.index += 1;
                        // pinned keys already surfaced (or will, for back pins)
                        if !self.pinned(&entry.0) {
                            return Some(entry);
                        }
                    }
                    self.phase = Phase::Last;
                    self.index = 0;
                }
                Phase::Last => {
                    if self.index < self.last.len() {
                        let entry = self.last[self.index].clone();
                        self.index += 1;
                        return Some(entry);
                    }
                    self.phase = Phase::Done;
                }
                Phase::Done => return None,
            }
        }
    }
}
