//! Schema metadata lookup.
//!
//! Components that need a physical column for a logical field take a
//! [`SchemaProvider`] explicitly; there is no reflection on entity
//! instances anywhere in the layer. [`MapSchema`] is a plain
//! registration-based implementation suitable for applications that
//! declare their entities up front (and for tests).

use crate::error::OrmError;
use crate::statement::quote;
use std::collections::BTreeMap;

/// Resolves entity types to tables and fields to columns.
pub trait SchemaProvider {
    /// The backing table for an entity type.
    fn table_name(&self, entity: &str) -> Result<String, OrmError>;

    /// The bare physical column for a field of an entity type.
    fn column_name(&self, entity: &str, field: &str) -> Result<String, OrmError>;

    /// The identifier column for an entity type.
    fn id_column(&self, entity: &str) -> Result<String, OrmError>;

    /// All field names of an entity type, in declaration order.
    fn fields(&self, entity: &str) -> Result<Vec<String>, OrmError>;

    /// The fully qualified, quoted column reference for a field.
    fn column_ref(&self, entity: &str, field: &str) -> Result<String, OrmError> {
        Ok(format!(
            "{}.{}",
            quote(&self.table_name(entity)?),
            quote(&self.column_name(entity, field)?)
        ))
    }
}

#[derive(Debug, Clone)]
struct EntitySchema {
    table: String,
    id_column: String,
    // field name -> physical column
    columns: BTreeMap<String, String>,
    field_order: Vec<String>,
}

/// Registration-based schema: entities declared with their table and
/// field list, fields mapping one-to-one onto columns unless remapped.
#[derive(Debug, Clone, Default)]
pub struct MapSchema {
    entities: BTreeMap<String, EntitySchema>,
}

impl MapSchema {
    pub fn new() -> Self {
        MapSchema::default()
    }

    /// Register an entity whose fields map directly onto columns of the
    /// same name. The identifier field is `ID` and must be present in
    /// `fields`.
    pub fn register(mut self, entity: &str, table: &str, fields: &[&str]) -> Self {
        let mut columns = BTreeMap::new();
        let mut field_order = Vec::new();
        for field in fields {
            columns.insert((*field).to_string(), (*field).to_string());
            field_order.push((*field).to_string());
        }
        self.entities.insert(
            entity.to_string(),
            EntitySchema {
                table: table.to_string(),
                id_column: "ID".to_string(),
                columns,
                field_order,
            },
        );
        self
    }

    fn entity(&self, entity: &str) -> Result<&EntitySchema, OrmError> {
        self.entities
            .get(entity)
            .ok_or_else(|| OrmError::schema(format!("unknown entity type '{entity}'")))
    }
}

impl SchemaProvider for MapSchema {
    fn table_name(&self, entity: &str) -> Result<String, OrmError> {
        Ok(self.entity(entity)?.table.clone())
    }

    fn column_name(&self, entity: &str, field: &str) -> Result<String, OrmError> {
        self.entity(entity)?
            .columns
            .get(field)
            .cloned()
            .ok_or_else(|| {
                OrmError::schema(format!("entity '{entity}' has no field '{field}'"))
            })
    }

    fn id_column(&self, entity: &str) -> Result<String, OrmError> {
        Ok(self.entity(entity)?.id_column.clone())
    }

    fn fields(&self, entity: &str) -> Result<Vec<String>, OrmError> {
        Ok(self.entity(entity)?.field_order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> MapSchema {
        MapSchema::new().register("Comment", "Comment", &["ID", "PostID", "Title"])
    }

    #[test]
    fn test_table_and_column_lookup() {
        let s = schema();
        assert_eq!(s.table_name("Comment").unwrap(), "Comment");
        assert_eq!(s.column_name("Comment", "PostID").unwrap(), "PostID");
        assert_eq!(
            s.column_ref("Comment", "PostID").unwrap(),
            "\"Comment\".\"PostID\""
        );
    }

    #[test]
    fn test_unknown_entity_is_schema_error() {
        let s = schema();
        assert!(matches!(s.table_name("Nope"), Err(OrmError::Schema(_))));
    }

    #[test]
    fn test_unknown_field_is_schema_error() {
        let s = schema();
        assert!(matches!(
            s.column_name("Comment", "Nope"),
            Err(OrmError::Schema(_))
        ));
    }

    #[test]
    fn test_fields_preserve_declaration_order() {
        let s = schema();
        assert_eq!(
            s.fields("Comment").unwrap(),
            vec!["ID".to_string(), "PostID".to_string(), "Title".to_string()]
        );
    }
}
