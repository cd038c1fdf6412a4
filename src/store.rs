//! The execution, persistence and construction collaborators.
//!
//! This layer never talks to a database directly. A [`RecordStore`]
//! implementation supplies statement execution (finalized SQL text plus
//! bound parameters, returning rows), record persistence (`write`,
//! `delete`, `load_by_id`) and record construction (`new_record`,
//! `create_record`). Different implementations (a real driver, a
//! transaction handle, the in-memory test store) are interchangeable
//! behind the trait.

use crate::error::OrmError;
use crate::record::Record;
use crate::value::SqlValue;
use std::collections::BTreeMap;

/// One result row: column name to value.
pub type Row = BTreeMap<String, SqlValue>;

/// Narrow seam to the statement execution, persistence and construction
/// services.
pub trait RecordStore {
    /// Execute a finalized SELECT and return its rows.
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, OrmError>;

    /// Execute a mutating statement and return the number of affected
    /// rows.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, OrmError>;

    /// Persist a record (insert when it has no ID yet, update otherwise)
    /// and return its identifier.
    fn write(&self, record: &mut dyn Record) -> Result<SqlValue, OrmError>;

    /// Delete a persisted record.
    fn delete(&self, record: &dyn Record) -> Result<(), OrmError>;

    /// Load one record of `entity` by identifier.
    fn load_by_id(&self, entity: &str, id: &SqlValue)
        -> Result<Option<Box<dyn Record>>, OrmError>;

    /// Construct an empty, unpersisted record of `entity`.
    fn new_record(&self, entity: &str) -> Result<Box<dyn Record>, OrmError>;

    /// Construct a record of `entity` from a result row, carrying the
    /// inherited query-scoped parameters (already stripped of relation
    /// scope by the caller).
    fn create_record(
        &self,
        entity: &str,
        row: &Row,
        inherited_params: &BTreeMap<String, SqlValue>,
    ) -> Result<Box<dyn Record>, OrmError>;
}
