//! Dynamic record access.
//!
//! Entities flow through this layer as `dyn Record` trait objects: the
//! relation lists read and write foreign-key fields by name, with the
//! field-to-column mapping resolved through
//! [`SchemaProvider`](crate::schema::SchemaProvider) rather than runtime
//! reflection on concrete types.

use crate::error::OrmError;
use crate::value::SqlValue;
use std::fmt;
use std::sync::Arc;

/// A record of some entity type, with dynamic field access.
pub trait Record: fmt::Debug {
    /// The logical entity type name this record belongs to.
    fn entity_type(&self) -> &str;

    /// The persisted identifier, or `None` for a record that has never
    /// been written.
    fn id(&self) -> Option<SqlValue>;

    /// Read a field by name. `None` if the record carries no such field.
    fn field(&self, name: &str) -> Option<SqlValue>;

    /// Write a field by name.
    ///
    /// # Errors
    ///
    /// `OrmError::Schema` if the field does not exist on this record.
    fn set_field(&mut self, name: &str, value: SqlValue) -> Result<(), OrmError>;

    /// Attach a related record under an association key. The association
    /// is lookup-only: the attached record's lifetime is independent of
    /// this record's.
    ///
    /// Default: drop the association. Record implementations that surface
    /// join rows (many-many-through results) override both methods.
    fn attach_joined(&mut self, _key: &str, _record: Arc<dyn Record>) {}

    /// Look up a record previously attached under `key`.
    fn joined_record(&self, _key: &str) -> Option<Arc<dyn Record>> {
        None
    }
}
