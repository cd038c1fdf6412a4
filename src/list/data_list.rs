//! The base lazy list over a query composer.

use crate::config::QueryConfig;
use crate::error::OrmError;
use crate::list::map::ProjectionMap;
use crate::query::{DataQuery, QueryManipulator};
use crate::record::Record;
use crate::schema::SchemaProvider;
use crate::statement::{in_predicate, SortDirection, SqlFragment};
use crate::store::{RecordStore, Row};
use crate::value::SqlValue;
use std::sync::Arc;

/// Lists that can narrow themselves by field value or raw predicate.
/// Every operation returns a new list.
pub trait Filterable: Sized {
    /// Narrow by a raw WHERE fragment.
    fn filter(&self, fragment: SqlFragment) -> Self;

    /// Narrow by field equality (`IS NULL` for a null value).
    fn filter_by(&self, field: &str, value: SqlValue) -> Result<Self, OrmError>;
}

/// Lists that can order themselves by a field.
pub trait Sortable: Sized {
    fn sort(&self, field: &str, direction: SortDirection) -> Result<Self, OrmError>;
}

/// Lists that can window themselves. `length = None` is unlimited,
/// `Some(0)` a deliberately empty result set; negative values are
/// argument errors.
pub trait Limitable: Sized {
    fn limit(&self, length: Option<i64>, offset: i64) -> Result<Self, OrmError>;
}

/// A lazy, immutable list of records of one entity type.
///
/// Terminal operations (`rows`, `all`, `first`, `count`, `by_id`,
/// `by_ids`) finalize and execute the composed statement each time they
/// are called; callers needing a stable snapshot materialize once with
/// `all()` and reuse the vector.
#[derive(Clone)]
pub struct DataList {
    query: DataQuery,
    store: Arc<dyn RecordStore>,
    schema: Arc<dyn SchemaProvider>,
    config: QueryConfig,
}

impl DataList {
    pub fn new(
        entity: &str,
        store: Arc<dyn RecordStore>,
        schema: Arc<dyn SchemaProvider>,
        config: QueryConfig,
    ) -> Result<Self, OrmError> {
        let query = DataQuery::new(entity, schema.as_ref())?;
        Ok(DataList {
            query,
            store,
            schema,
            config,
        })
    }

    pub fn entity(&self) -> &str {
        self.query.entity()
    }

    pub fn query(&self) -> &DataQuery {
        &self.query
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn schema(&self) -> &Arc<dyn SchemaProvider> {
        &self.schema
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// The same list over a transformed composer.
    pub fn with_query(&self, query: DataQuery) -> Self {
        DataList {
            query,
            store: self.store.clone(),
            schema: self.schema.clone(),
            config: self.config.clone(),
        }
    }

    /// Register a cross-cutting query manipulator on this list's
    /// composer.
    pub fn push_manipulator(&self, manipulator: Arc<dyn QueryManipulator>) -> Self {
        self.with_query(self.query.push_manipulator(manipulator))
    }

    /// Finalize, execute, and return raw rows.
    pub fn rows(&self) -> Result<Vec<Row>, OrmError> {
        let stmt = self.query.finalize()?;
        let (sql, params) = stmt.render()?;
        log::debug!("executing query for {}: {sql}", self.entity());
        self.store.query(&sql, &params)
    }

    /// Materialize a row into a record, propagating the inheritable
    /// query-scoped parameters (`Foreign.*` keys stripped).
    pub(crate) fn create_from_row(&self, row: &Row) -> Result<Box<dyn Record>, OrmError> {
        self.store
            .create_record(self.entity(), row, &self.query.inheritable_params())
    }

    /// Finalize, execute, and materialize every row.
    pub fn all(&self) -> Result<Vec<Box<dyn Record>>, OrmError> {
        self.rows()?
            .iter()
            .map(|row| self.create_from_row(row))
            .collect()
    }

    /// The first record, if any.
    pub fn first(&self) -> Result<Option<Box<dyn Record>>, OrmError> {
        let limited = Limitable::limit(self, Some(1), 0)?;
        Ok(limited.all()?.into_iter().next())
    }

    /// The number of records the composed query selects.
    pub fn count(&self) -> Result<u64, OrmError> {
        Ok(self.rows()?.len() as u64)
    }

    /// Look up one record by identifier.
    pub fn by_id(&self, id: &SqlValue) -> Result<Option<Box<dyn Record>>, OrmError> {
        let id_field = self.id_field()?;
        self.filter_by(&id_field, id.clone())?.first()
    }

    /// Narrow to the records whose identifier is in `ids`.
    pub fn by_ids(&self, ids: &[SqlValue]) -> Result<Self, OrmError> {
        let column = self
            .schema
            .column_ref(self.entity(), &self.id_field()?)?;
        Ok(self.filter(in_predicate(&column, ids, self.config.inline_integer_ids)))
    }

    /// A lazy key→value projection over this list.
    pub fn map(&self, key_field: &str, value_field: &str) -> ProjectionMap {
        ProjectionMap::new(self.clone(), key_field, value_field)
    }

    fn id_field(&self) -> Result<String, OrmError> {
        // the identifier column doubles as the field name at this seam
        self.schema.id_column(self.entity())
    }
}

impl Filterable for DataList {
    fn filter(&self, fragment: SqlFragment) -> Self {
        self.with_query(self.query.filter(fragment))
    }

    fn filter_by(&self, field: &str, value: SqlValue) -> Result<Self, OrmError> {
        let column = self.schema.column_ref(self.entity(), field)?;
        let fragment = if value.is_null() {
            SqlFragment::new(format!("{column} IS NULL"))
        } else {
            SqlFragment::with_params(format!("{column} = ?"), vec![value])
        };
        Ok(self.filter(fragment))
    }
}

impl Sortable for DataList {
    fn sort(&self, field: &str, direction: SortDirection) -> Result<Self, OrmError> {
        let column = self.schema.column_ref(self.entity(), field)?;
        Ok(self.with_query(self.query.sort(column, direction)))
    }
}

impl Limitable for DataList {
    fn limit(&self, length: Option<i64>, offset: i64) -> Result<Self, OrmError> {
        Ok(self.with_query(self.query.limit(length, offset)?))
    }
}

/// A capability-forwarding wrapper around any list.
///
/// Higher layers (pagination, display decoration) compose behavior by
/// wrapping a list and forwarding each capability call to it, never by
/// inheriting from a concrete list type.
#[derive(Clone)]
pub struct ListDecorator<L> {
    inner: L,
}

impl<L> ListDecorator<L> {
    pub fn new(inner: L) -> Self {
        ListDecorator { inner }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn into_inner(self) -> L {
        self.inner
    }
}

impl<L: Filterable> Filterable for ListDecorator<L> {
    fn filter(&self, fragment: SqlFragment) -> Self {
        ListDecorator::new(self.inner.filter(fragment))
    }

    fn filter_by(&self, field: &str, value: SqlValue) -> Result<Self, OrmError> {
        Ok(ListDecorator::new(self.inner.filter_by(field, value)?))
    }
}

impl<L: Sortable> Sortable for ListDecorator<L> {
    fn sort(&self, field: &str, direction: SortDirection) -> Result<Self, OrmError> {
        Ok(ListDecorator::new(self.inner.sort(field, direction)?))
    }
}

impl<L: Limitable> Limitable for ListDecorator<L> {
    fn limit(&self, length: Option<i64>, offset: i64) -> Result<Self, OrmError> {
        Ok(ListDecorator::new(self.inner.limit(length, offset)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_cfg::SampleWorld;

    #[test]
    fn test_all_is_lazy_and_repeatable() {
        let world = SampleWorld::new();
        world.store.seed(
            "Comment",
            &[(1, &[("PostID", SqlValue::Int(5)), ("Title", "a".into())])],
        );
        let list = world.list("Comment");
        assert_eq!(list.count().unwrap(), 1);
        // a second terminal op re-executes and sees new data
        world.store.seed(
            "Comment",
            &[(2, &[("PostID", SqlValue::Int(5)), ("Title", "b".into())])],
        );
        assert_eq!(list.count().unwrap(), 2);
    }

    #[test]
    fn test_filter_by_narrows() {
        let world = SampleWorld::new();
        world.store.seed(
            "Comment",
            &[
                (1, &[("PostID", SqlValue::Int(5)), ("Title", "a".into())]),
                (2, &[("PostID", SqlValue::Int(6)), ("Title", "b".into())]),
            ],
        );
        let list = world.list("Comment");
        let scoped = list.filter_by("PostID", SqlValue::Int(5)).unwrap();
        assert_eq!(scoped.count().unwrap(), 1);
        // original list untouched
        assert_eq!(list.count().unwrap(), 2);
    }

    #[test]
    fn test_limit_zero_yields_empty() {
        let world = SampleWorld::new();
        world
            .store
            .seed("Comment", &[(1, &[("PostID", SqlValue::Int(5))])]);
        let list = world.list("Comment").limit(Some(0), 0).unwrap();
        assert_eq!(list.count().unwrap(), 0);
    }

    #[test]
    fn test_sort_and_first() {
        let world = SampleWorld::new();
        world.store.seed(
            "Comment",
            &[
                (1, &[("PostID", SqlValue::Int(5)), ("Title", "b".into())]),
                (2, &[("PostID", SqlValue::Int(5)), ("Title", "a".into())]),
            ],
        );
        let list = world
            .list("Comment")
            .sort("Title", SortDirection::Asc)
            .unwrap();
        let first = list.first().unwrap().unwrap();
        assert_eq!(first.field("Title"), Some(SqlValue::Text("a".into())));
    }

    #[test]
    fn test_by_id_and_by_ids() {
        let world = SampleWorld::new();
        world.store.seed(
            "Comment",
            &[
                (1, &[("Title", "a".into())]),
                (2, &[("Title", "b".into())]),
                (3, &[("Title", "c".into())]),
            ],
        );
        let list = world.list("Comment");
        let rec = list.by_id(&SqlValue::Int(2)).unwrap().unwrap();
        assert_eq!(rec.field("Title"), Some(SqlValue::Text("b".into())));
        let subset = list.by_ids(&[SqlValue::Int(1), SqlValue::Int(3)]).unwrap();
        assert_eq!(subset.count().unwrap(), 2);
    }

    #[test]
    fn test_by_id_missing_is_none() {
        let world = SampleWorld::new();
        assert!(world
            .list("Comment")
            .by_id(&SqlValue::Int(99))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decorator_forwards_capabilities() {
        let world = SampleWorld::new();
        world.store.seed(
            "Comment",
            &[
                (1, &[("PostID", SqlValue::Int(5))]),
                (2, &[("PostID", SqlValue::Int(6))]),
            ],
        );
        let decorated = ListDecorator::new(world.list("Comment"));
        let narrowed = decorated
            .filter_by("PostID", SqlValue::Int(6))
            .unwrap()
            .limit(Some(10), 0)
            .unwrap();
        assert_eq!(narrowed.inner().count().unwrap(), 1);
    }

    #[test]
    fn test_unknown_field_filter_is_schema_error() {
        let world = SampleWorld::new();
        let list = world.list("Comment");
        assert!(matches!(
            list.filter_by("Nope", SqlValue::Int(1)),
            Err(OrmError::Schema(_))
        ));
    }
}
