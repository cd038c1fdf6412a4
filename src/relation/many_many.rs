//! Many-to-many relation list mediated by an explicit join entity.
//!
//! Rows of the join table carry a local key (the related record), a
//! foreign key (the parent) and any number of extra fields. Membership
//! changes are writes against join rows only: `add` upserts one row per
//! scoped parent, `remove` physically deletes rows. Neither side's
//! entity records are ever touched.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::QueryConfig;
use crate::error::OrmError;
use crate::list::{DataList, Filterable, Limitable, Sortable};
use crate::query::{DataQuery, FOREIGN_PARAM_NAMESPACE};
use crate::record::Record;
use crate::relation::join_manipulator::MANIPULATOR_NAME;
use crate::relation::{
    foreign_id_filter, AddCallback, ForeignScope, ManyManyThroughJoinManipulator, RemoveCallback,
};
use crate::schema::SchemaProvider;
use crate::statement::{SortDirection, SqlDelete, SqlFragment};
use crate::store::{RecordStore, Row};
use crate::value::SqlValue;

/// A lazy list of records related to a parent through a join entity.
///
/// The list's own query carries no scope filter; all scoping is done by
/// the [`ManyManyThroughJoinManipulator`] registered on its composer, so
/// that cross-cutting manipulators (soft-delete, locale filters) see the
/// join like any other part of the statement.
#[derive(Clone)]
pub struct ManyManyThroughList {
    list: DataList,
    join_entity: String,
    join_alias: String,
    local_key: String,
    foreign_key: String,
    scope: ForeignScope,
    add_callbacks: Vec<AddCallback<Self>>,
    remove_callbacks: Vec<RemoveCallback<Self>>,
}

impl fmt::Debug for ManyManyThroughList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManyManyThroughList")
            .field("entity", &self.list.entity())
            .field("join_entity", &self.join_entity)
            .field("local_key", &self.local_key)
            .field("foreign_key", &self.foreign_key)
            .field("scope", &self.scope)
            .finish()
    }
}

impl ManyManyThroughList {
    /// Build an unscoped list of `entity` records linked through
    /// `join_entity`, whose `local_key` field references the listed
    /// record and `foreign_key` field the parent.
    pub fn new(
        entity: &str,
        join_entity: &str,
        local_key: &str,
        foreign_key: &str,
        store: Arc<dyn RecordStore>,
        schema: Arc<dyn SchemaProvider>,
        config: QueryConfig,
    ) -> Result<Self, OrmError> {
        let join_alias = schema.table_name(join_entity)?;
        let manipulator = ManyManyThroughJoinManipulator::new(
            join_entity,
            local_key,
            foreign_key,
            ForeignScope::Unscoped,
            schema.clone(),
            config.clone(),
        )?;
        let list =
            DataList::new(entity, store, schema, config)?.push_manipulator(Arc::new(manipulator));
        Ok(ManyManyThroughList {
            list,
            join_entity: join_entity.to_string(),
            join_alias,
            local_key: local_key.to_string(),
            foreign_key: foreign_key.to_string(),
            scope: ForeignScope::Unscoped,
            add_callbacks: Vec::new(),
            remove_callbacks: Vec::new(),
        })
    }

    pub fn entity(&self) -> &str {
        self.list.entity()
    }

    pub fn join_entity(&self) -> &str {
        &self.join_entity
    }

    /// Alias prefix the join entity's columns carry in result rows.
    pub fn join_alias(&self) -> &str {
        &self.join_alias
    }

    pub fn scope(&self) -> &ForeignScope {
        &self.scope
    }

    /// The underlying plain list view.
    pub fn list(&self) -> &DataList {
        &self.list
    }

    fn with_list(&self, list: DataList) -> Self {
        let mut out = self.clone();
        out.list = list;
        out
    }

    fn schema(&self) -> &Arc<dyn SchemaProvider> {
        self.list.schema()
    }

    fn store(&self) -> &Arc<dyn RecordStore> {
        self.list.store()
    }

    /// Rescope to a single parent id.
    pub fn for_foreign_id(&self, id: SqlValue) -> Result<Self, OrmError> {
        self.rescope(ForeignScope::One(id))
    }

    /// Rescope to a set of parent ids.
    pub fn for_foreign_ids(&self, ids: &[SqlValue]) -> Result<Self, OrmError> {
        self.rescope(ForeignScope::from_ids(ids.to_vec()))
    }

    fn rescope(&self, scope: ForeignScope) -> Result<Self, OrmError> {
        let manipulator = ManyManyThroughJoinManipulator::new(
            &self.join_entity,
            &self.local_key,
            &self.foreign_key,
            scope.clone(),
            self.schema().clone(),
            self.list.config().clone(),
        )?;
        // the previous scope's manipulator is replaced, never stacked
        let mut query = self
            .list
            .query()
            .remove_manipulator(MANIPULATOR_NAME)
            .push_manipulator(Arc::new(manipulator))
            .remove_param(&format!("{FOREIGN_PARAM_NAMESPACE}ID"));
        if let Some(id) = scope.single_id() {
            query = query.set_param(&format!("{FOREIGN_PARAM_NAMESPACE}ID"), id.clone());
        }
        let mut out = self.with_list(self.list.with_query(query));
        out.scope = scope;
        Ok(out)
    }

    /// Register an observer for successful adds.
    pub fn on_add(&self, callback: AddCallback<Self>) -> Self {
        let mut out = self.clone();
        out.add_callbacks.push(callback);
        out
    }

    /// Register an observer for successful removes.
    pub fn on_remove(&self, callback: RemoveCallback<Self>) -> Self {
        let mut out = self.clone();
        out.remove_callbacks.push(callback);
        out
    }

    /// Build a record from a raw result row of this list's query.
    ///
    /// Columns carrying the join alias prefix are split off, stripped of
    /// the prefix and used to build a join-entity instance, which is
    /// attached to the primary record under the alias as a lookup-only
    /// association. The remaining columns build the primary record.
    pub fn create_data_object(&self, row: &Row) -> Result<Box<dyn Record>, OrmError> {
        let prefix = format!("{}_", self.join_alias);
        let mut main_row = Row::new();
        let mut join_row = Row::new();
        for (column, value) in row {
            match column.strip_prefix(&prefix) {
                Some(stripped) => {
                    join_row.insert(stripped.to_string(), value.clone());
                }
                None => {
                    main_row.insert(column.clone(), value.clone());
                }
            }
        }
        let mut record = self.store().create_record(
            self.entity(),
            &main_row,
            &self.list.query().inheritable_params(),
        )?;
        if !join_row.is_empty() {
            let join_record =
                self.store()
                    .create_record(&self.join_entity, &join_row, &BTreeMap::new())?;
            record.attach_joined(&self.join_alias, Arc::from(join_record));
        }
        Ok(record)
    }

    /// Finalize, execute, and materialize every row with its join record
    /// attached.
    pub fn all(&self) -> Result<Vec<Box<dyn Record>>, OrmError> {
        self.list
            .rows()?
            .iter()
            .map(|row| self.create_data_object(row))
            .collect()
    }

    pub fn first(&self) -> Result<Option<Box<dyn Record>>, OrmError> {
        let limited = Limitable::limit(self, Some(1), 0)?;
        Ok(limited.all()?.into_iter().next())
    }

    pub fn count(&self) -> Result<u64, OrmError> {
        self.list.count()
    }

    /// Link a persisted record to every scoped parent.
    ///
    /// For each scoped parent id: when a join row already links the
    /// record and that parent, its extra fields are updated in place;
    /// otherwise a new join row is created. The pair is unique, so
    /// repeated adds never duplicate rows.
    ///
    /// Fails with a usage error when the list is not scoped to at least
    /// one parent, or when the record has never been written.
    pub fn add(
        &self,
        item: &dyn Record,
        extra_fields: &BTreeMap<String, SqlValue>,
    ) -> Result<(), OrmError> {
        if item.entity_type() != self.entity() {
            return Err(OrmError::invalid_argument(format!(
                "cannot add a '{}' record to a list of '{}'",
                item.entity_type(),
                self.entity()
            )));
        }
        let item_id = match item.id() {
            Some(id) if !id.is_null() => id,
            _ => {
                return Err(OrmError::usage(format!(
                    "cannot add an unsaved {} record to a many-many relation; write it first",
                    self.entity()
                )))
            }
        };
        let foreign_ids = self.scope.ids();
        if foreign_ids.is_empty() {
            return Err(OrmError::usage(format!(
                "cannot add to an unscoped many-many relation on {}; call for_foreign_id first",
                self.entity()
            )));
        }
        for foreign_id in &foreign_ids {
            self.upsert_join_row(&item_id, foreign_id, extra_fields)?;
        }
        for callback in &self.add_callbacks {
            callback(self, item, extra_fields);
        }
        Ok(())
    }

    /// Load a persisted record by id and [`add`](Self::add) it.
    pub fn add_by_id(
        &self,
        id: &SqlValue,
        extra_fields: &BTreeMap<String, SqlValue>,
    ) -> Result<(), OrmError> {
        let record = self.load_required(id)?;
        self.add(record.as_ref(), extra_fields)
    }

    fn upsert_join_row(
        &self,
        item_id: &SqlValue,
        foreign_id: &SqlValue,
        extra_fields: &BTreeMap<String, SqlValue>,
    ) -> Result<(), OrmError> {
        let local_col = self.schema().column_ref(&self.join_entity, &self.local_key)?;
        let foreign_col = self
            .schema()
            .column_ref(&self.join_entity, &self.foreign_key)?;
        let lookup = DataQuery::new(&self.join_entity, self.schema().as_ref())?
            .filter(SqlFragment::with_params(
                format!("{local_col} = ?"),
                vec![item_id.clone()],
            ))
            .filter(SqlFragment::with_params(
                format!("{foreign_col} = ?"),
                vec![foreign_id.clone()],
            ));
        let (sql, params) = lookup.finalize()?.render()?;
        let rows = self.store().query(&sql, &params)?;

        let mut join_record = match rows.first() {
            Some(row) => self
                .store()
                .create_record(&self.join_entity, row, &BTreeMap::new())?,
            None => {
                let mut record = self.store().new_record(&self.join_entity)?;
                record.set_field(&self.local_key, item_id.clone())?;
                record.set_field(&self.foreign_key, foreign_id.clone())?;
                record
            }
        };
        for (field, value) in extra_fields {
            join_record.set_field(field, value.clone())?;
        }
        self.store().write(join_record.as_mut())?;
        Ok(())
    }

    /// Unlink a record by physically deleting its join rows.
    ///
    /// Join rows have no meaning without both keys populated, so unlike
    /// the one-to-many case there is no nulling; the rows go away. When
    /// the list is scoped, only join rows pointing at scoped parents are
    /// deleted. The related record itself remains. Returns the number of
    /// join rows deleted.
    pub fn remove(&self, item: &dyn Record) -> Result<u64, OrmError> {
        match item.id() {
            Some(id) if !id.is_null() => self.remove_by_id(&id),
            _ => Ok(0),
        }
    }

    /// [`remove`](Self::remove) by the record's id.
    pub fn remove_by_id(&self, id: &SqlValue) -> Result<u64, OrmError> {
        let table = self.schema().table_name(&self.join_entity)?;
        let local_col = self.schema().column_ref(&self.join_entity, &self.local_key)?;
        let mut delete = SqlDelete::new(&table);
        delete.add_where(SqlFragment::with_params(
            format!("{local_col} = ?"),
            vec![id.clone()],
        ));
        if let Some(filter) = self.scope_delete_filter()? {
            delete.add_where(filter);
        }
        let (sql, params) = delete.render();
        log::debug!("unlinking {} {id} via {}", self.entity(), self.join_entity);
        let affected = self.store().execute(&sql, &params)?;
        if affected > 0 {
            let removed = [id.clone()];
            for callback in &self.remove_callbacks {
                callback(self, &removed);
            }
        }
        Ok(affected)
    }

    /// Delete every join row in the active scope, leaving both related
    /// entity sets untouched. Refuses to run unscoped: that would wipe
    /// the whole join table.
    pub fn remove_all(&self) -> Result<u64, OrmError> {
        let filter = self.scope_delete_filter()?.ok_or_else(|| {
            OrmError::usage(format!(
                "cannot remove_all on an unscoped many-many relation on {}",
                self.entity()
            ))
        })?;
        let table = self.schema().table_name(&self.join_entity)?;
        let mut delete = SqlDelete::new(&table);
        delete.add_where(filter);
        let (sql, params) = delete.render();
        self.store().execute(&sql, &params)
    }

    fn scope_delete_filter(&self) -> Result<Option<SqlFragment>, OrmError> {
        let foreign_col = self
            .schema()
            .column_ref(&self.join_entity, &self.foreign_key)?;
        Ok(foreign_id_filter(
            &foreign_col,
            &self.scope,
            self.list.config().inline_integer_ids,
        ))
    }

    fn load_required(&self, id: &SqlValue) -> Result<Box<dyn Record>, OrmError> {
        self.store()
            .load_by_id(self.entity(), id)?
            .ok_or_else(|| OrmError::NotFound {
                entity: self.entity().to_string(),
                id: id.to_string(),
            })
    }
}

impl Filterable for ManyManyThroughList {
    fn filter(&self, fragment: SqlFragment) -> Self {
        self.with_list(self.list.filter(fragment))
    }

    fn filter_by(&self, field: &str, value: SqlValue) -> Result<Self, OrmError> {
        Ok(self.with_list(self.list.filter_by(field, value)?))
    }
}

impl Sortable for ManyManyThroughList {
    fn sort(&self, field: &str, direction: SortDirection) -> Result<Self, OrmError> {
        Ok(self.with_list(self.list.sort(field, direction)?))
    }
}

impl Limitable for ManyManyThroughList {
    fn limit(&self, length: Option<i64>, offset: i64) -> Result<Self, OrmError> {
        Ok(self.with_list(self.list.limit(length, offset)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_cfg::SampleWorld;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn page_tags(world: &SampleWorld) -> ManyManyThroughList {
        world.many_many("Tag", "PageTag", "TagID", "PageID")
    }

    fn join_rows(world: &SampleWorld) -> u64 {
        world.list("PageTag").count().unwrap()
    }

    #[test]
    fn test_rescope_replaces_manipulator() {
        let world = SampleWorld::new();
        let list = page_tags(&world)
            .for_foreign_id(SqlValue::Int(3))
            .unwrap()
            .for_foreign_id(SqlValue::Int(4))
            .unwrap();
        let (sql, params) = list.list().query().finalize().unwrap().render().unwrap();
        assert_eq!(sql.matches("INNER JOIN").count(), 1);
        assert_eq!(params, vec![SqlValue::Int(4)]);
    }

    #[test]
    fn test_all_joins_rows_and_attaches_join_records() {
        let world = SampleWorld::new();
        world.store.seed(
            "Tag",
            &[
                (7, &[("Title", "rust".into())]),
                (8, &[("Title", "go".into())]),
            ],
        );
        world.store.seed(
            "PageTag",
            &[
                (
                    1,
                    &[
                        ("TagID", SqlValue::Int(7)),
                        ("PageID", SqlValue::Int(3)),
                        ("SortOrder", SqlValue::Int(2)),
                    ],
                ),
                (
                    2,
                    &[("TagID", SqlValue::Int(8)), ("PageID", SqlValue::Int(4))],
                ),
            ],
        );

        let list = page_tags(&world).for_foreign_id(SqlValue::Int(3)).unwrap();
        let records = list.all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field("Title"), Some(SqlValue::Text("rust".into())));

        let join = records[0].joined_record("PageTag").unwrap();
        assert_eq!(join.field("PageID"), Some(SqlValue::Int(3)));
        assert_eq!(join.field("SortOrder"), Some(SqlValue::Int(2)));

        assert_eq!(list.count().unwrap(), 1);
        let other = page_tags(&world).for_foreign_id(SqlValue::Int(4)).unwrap();
        assert_eq!(other.count().unwrap(), 1);
    }

    #[test]
    fn test_rescope_to_many_clears_single_id_param() {
        let world = SampleWorld::new();
        let list = page_tags(&world)
            .for_foreign_id(SqlValue::Int(3))
            .unwrap()
            .for_foreign_ids(&[SqlValue::Int(3), SqlValue::Int(4)])
            .unwrap();
        assert_eq!(list.list().query().params().get("Foreign.ID"), None);
    }

    #[test]
    fn test_add_upserts_single_join_row() {
        let world = SampleWorld::new();
        world.store.seed("Tag", &[(7, &[("Title", "rust".into())])]);
        let list = page_tags(&world).for_foreign_id(SqlValue::Int(3)).unwrap();

        let mut extra = BTreeMap::new();
        extra.insert("SortOrder".to_string(), SqlValue::Int(1));
        list.add_by_id(&SqlValue::Int(7), &extra).unwrap();
        assert_eq!(join_rows(&world), 1);

        extra.insert("SortOrder".to_string(), SqlValue::Int(2));
        list.add_by_id(&SqlValue::Int(7), &extra).unwrap();
        assert_eq!(join_rows(&world), 1);

        let row = world.list("PageTag").first().unwrap().unwrap();
        assert_eq!(row.field("TagID"), Some(SqlValue::Int(7)));
        assert_eq!(row.field("PageID"), Some(SqlValue::Int(3)));
        assert_eq!(row.field("SortOrder"), Some(SqlValue::Int(2)));
    }

    #[test]
    fn test_add_writes_one_row_per_scoped_parent() {
        let world = SampleWorld::new();
        world.store.seed("Tag", &[(7, &[("Title", "rust".into())])]);
        let list = page_tags(&world)
            .for_foreign_ids(&[SqlValue::Int(3), SqlValue::Int(4)])
            .unwrap();
        list.add_by_id(&SqlValue::Int(7), &BTreeMap::new()).unwrap();
        assert_eq!(join_rows(&world), 2);
    }

    #[test]
    fn test_add_unscoped_is_usage_error() {
        let world = SampleWorld::new();
        world.store.seed("Tag", &[(7, &[("Title", "rust".into())])]);
        assert!(matches!(
            page_tags(&world).add_by_id(&SqlValue::Int(7), &BTreeMap::new()),
            Err(OrmError::Usage(_))
        ));
    }

    #[test]
    fn test_add_unsaved_record_is_usage_error() {
        let world = SampleWorld::new();
        let list = page_tags(&world).for_foreign_id(SqlValue::Int(3)).unwrap();
        let unsaved = world.store.new_record("Tag").unwrap();
        assert!(matches!(
            list.add(unsaved.as_ref(), &BTreeMap::new()),
            Err(OrmError::Usage(_))
        ));
    }

    #[test]
    fn test_remove_deletes_join_rows_not_entities() {
        let world = SampleWorld::new();
        world.store.seed("Tag", &[(7, &[("Title", "rust".into())])]);
        world.store.seed(
            "PageTag",
            &[(
                1,
                &[("TagID", SqlValue::Int(7)), ("PageID", SqlValue::Int(3))],
            )],
        );
        let list = page_tags(&world).for_foreign_id(SqlValue::Int(3)).unwrap();
        assert_eq!(list.remove_by_id(&SqlValue::Int(7)).unwrap(), 1);
        assert_eq!(join_rows(&world), 0);
        // the tag itself is still there
        assert!(world
            .store
            .load_by_id("Tag", &SqlValue::Int(7))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_remove_honors_scope() {
        let world = SampleWorld::new();
        world.store.seed(
            "PageTag",
            &[
                (
                    1,
                    &[("TagID", SqlValue::Int(7)), ("PageID", SqlValue::Int(3))],
                ),
                (
                    2,
                    &[("TagID", SqlValue::Int(7)), ("PageID", SqlValue::Int(4))],
                ),
            ],
        );
        let list = page_tags(&world).for_foreign_id(SqlValue::Int(3)).unwrap();
        assert_eq!(list.remove_by_id(&SqlValue::Int(7)).unwrap(), 1);
        // the row linking page 4 survives
        assert_eq!(join_rows(&world), 1);
        let survivor = world.list("PageTag").first().unwrap().unwrap();
        assert_eq!(survivor.field("PageID"), Some(SqlValue::Int(4)));
    }

    #[test]
    fn test_remove_all_in_scope() {
        let world = SampleWorld::new();
        world.store.seed(
            "PageTag",
            &[
                (
                    1,
                    &[("TagID", SqlValue::Int(7)), ("PageID", SqlValue::Int(3))],
                ),
                (
                    2,
                    &[("TagID", SqlValue::Int(8)), ("PageID", SqlValue::Int(3))],
                ),
                (
                    3,
                    &[("TagID", SqlValue::Int(7)), ("PageID", SqlValue::Int(4))],
                ),
            ],
        );
        let list = page_tags(&world).for_foreign_id(SqlValue::Int(3)).unwrap();
        assert_eq!(list.remove_all().unwrap(), 2);
        assert_eq!(join_rows(&world), 1);
    }

    #[test]
    fn test_remove_all_unscoped_is_usage_error() {
        let world = SampleWorld::new();
        assert!(matches!(
            page_tags(&world).remove_all(),
            Err(OrmError::Usage(_))
        ));
    }

    #[test]
    fn test_create_data_object_splits_aliased_columns() {
        let world = SampleWorld::new();
        let list = page_tags(&world).for_foreign_id(SqlValue::Int(3)).unwrap();
        let mut row = Row::new();
        row.insert("ID".to_string(), SqlValue::Int(7));
        row.insert("Title".to_string(), "rust".into());
        row.insert("PageTag_ID".to_string(), SqlValue::Int(1));
        row.insert("PageTag_TagID".to_string(), SqlValue::Int(7));
        row.insert("PageTag_PageID".to_string(), SqlValue::Int(3));
        row.insert("PageTag_SortOrder".to_string(), SqlValue::Int(9));

        let record = list.create_data_object(&row).unwrap();
        assert_eq!(record.field("Title"), Some(SqlValue::Text("rust".into())));
        // the join record is attached under the alias, not merged in
        assert_eq!(record.field("SortOrder"), None);
        let joined = record.joined_record("PageTag").unwrap();
        assert_eq!(joined.field("SortOrder"), Some(SqlValue::Int(9)));
        assert_eq!(joined.field("PageID"), Some(SqlValue::Int(3)));
    }

    #[test]
    fn test_add_callback_fires() {
        let world = SampleWorld::new();
        world.store.seed("Tag", &[(7, &[("Title", "rust".into())])]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let list = page_tags(&world)
            .for_foreign_id(SqlValue::Int(3))
            .unwrap()
            .on_add(Arc::new(move |_, item, extra| {
                log.borrow_mut()
                    .push((item.id(), extra.get("SortOrder").cloned()));
            }));
        let mut extra = BTreeMap::new();
        extra.insert("SortOrder".to_string(), SqlValue::Int(1));
        list.add_by_id(&SqlValue::Int(7), &extra).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![(Some(SqlValue::Int(7)), Some(SqlValue::Int(1)))]
        );
    }
}
