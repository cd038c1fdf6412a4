//! One-to-many relation list.
//!
//! Children carry a foreign-key field pointing back at the parent.
//! Membership changes are expressed by rewriting that field: `add`
//! repoints it at the scoped parent, `remove` nulls it. The child record
//! itself is never deleted through this list.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::QueryConfig;
use crate::error::OrmError;
use crate::list::{DataList, Filterable, Limitable, Sortable};
use crate::query::FOREIGN_PARAM_NAMESPACE;
use crate::record::Record;
use crate::relation::{foreign_id_filter, AddCallback, ForeignScope, RemoveCallback};
use crate::schema::SchemaProvider;
use crate::statement::{SortDirection, SqlFragment};
use crate::store::RecordStore;
use crate::value::SqlValue;

/// A lazy list of child records related to a parent through a
/// foreign-key field.
///
/// Like every list in this layer it is value-like: scoping and filtering
/// return a new list, and each terminal read re-runs the composed query.
#[derive(Clone)]
pub struct HasManyList {
    list: DataList,
    fk_field: String,
    scope: ForeignScope,
    // identity of the currently installed scope filter, so a rescope can
    // strip it before installing the next one
    scope_fragment: Option<SqlFragment>,
    add_callbacks: Vec<AddCallback<Self>>,
    remove_callbacks: Vec<RemoveCallback<Self>>,
}

impl fmt::Debug for HasManyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HasManyList")
            .field("entity", &self.list.entity())
            .field("fk_field", &self.fk_field)
            .field("scope", &self.scope)
            .field("add_callbacks", &self.add_callbacks.len())
            .field("remove_callbacks", &self.remove_callbacks.len())
            .finish()
    }
}

impl HasManyList {
    /// Build an unscoped list of `entity` children keyed by `fk_field`.
    ///
    /// Fails with a schema error when either the entity or the
    /// foreign-key field is unknown.
    pub fn new(
        entity: &str,
        fk_field: &str,
        store: Arc<dyn RecordStore>,
        schema: Arc<dyn SchemaProvider>,
        config: QueryConfig,
    ) -> Result<Self, OrmError> {
        // fail early on a bad foreign-key field
        schema.column_ref(entity, fk_field)?;
        let list = DataList::new(entity, store, schema, config)?;
        Ok(HasManyList {
            list,
            fk_field: fk_field.to_string(),
            scope: ForeignScope::Unscoped,
            scope_fragment: None,
            add_callbacks: Vec::new(),
            remove_callbacks: Vec::new(),
        })
    }

    pub fn entity(&self) -> &str {
        self.list.entity()
    }

    pub fn fk_field(&self) -> &str {
        &self.fk_field
    }

    pub fn scope(&self) -> &ForeignScope {
        &self.scope
    }

    /// The underlying plain list view.
    pub fn list(&self) -> &DataList {
        &self.list
    }

    fn with_list(&self, list: DataList) -> Self {
        HasManyList {
            list,
            fk_field: self.fk_field.clone(),
            scope: self.scope.clone(),
            scope_fragment: self.scope_fragment.clone(),
            add_callbacks: self.add_callbacks.clone(),
            remove_callbacks: self.remove_callbacks.clone(),
        }
    }

    /// Rescope to a single parent id.
    pub fn for_foreign_id(&self, id: SqlValue) -> Result<Self, OrmError> {
        self.rescope(ForeignScope::One(id))
    }

    /// Rescope to a set of parent ids. One id collapses to a scalar
    /// scope; an empty set matches nothing on read.
    pub fn for_foreign_ids(&self, ids: &[SqlValue]) -> Result<Self, OrmError> {
        self.rescope(ForeignScope::from_ids(ids.to_vec()))
    }

    fn rescope(&self, scope: ForeignScope) -> Result<Self, OrmError> {
        let column = self
            .list
            .schema()
            .column_ref(self.entity(), &self.fk_field)?;
        let mut query = self.list.query().clone();
        if let Some(prev) = &self.scope_fragment {
            query = query.remove_filter_on(prev);
        }
        let fragment = match &scope {
            // deliberately empty id set: the list must match nothing
            ForeignScope::Many(ids) if ids.is_empty() => Some(SqlFragment::new("1 = 0")),
            _ => foreign_id_filter(&column, &scope, self.list.config().inline_integer_ids),
        };
        if let Some(f) = &fragment {
            query = query.filter(f.clone());
        }
        // a single-id param from an earlier scope must not survive
        query = query.remove_param(&format!("{FOREIGN_PARAM_NAMESPACE}ID"));
        if let Some(id) = scope.single_id() {
            query = query.set_param(&format!("{FOREIGN_PARAM_NAMESPACE}ID"), id.clone());
        }
        Ok(HasManyList {
            list: self.list.with_query(query),
            fk_field: self.fk_field.clone(),
            scope,
            scope_fragment: fragment,
            add_callbacks: self.add_callbacks.clone(),
            remove_callbacks: self.remove_callbacks.clone(),
        })
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

    /// Link `item` into the relation by repointing its foreign-key field
    /// at the scoped parent, then persisting it.
    ///
    /// Requires a single scoped parent id: an unscoped list or one scoped
    /// to several ids refuses with a warning and returns `Ok(false)`
    /// without writing. Returns `Ok(true)` after a successful write.
    pub fn add(&self, item: &mut dyn Record) -> Result<bool, OrmError> {
        if item.entity_type() != self.entity() {
            return Err(OrmError::invalid_argument(format!(
                "cannot add a '{}' record to a list of '{}'",
                item.entity_type(),
                self.entity()
            )));
        }
        let id = match &self.scope {
            ForeignScope::One(id) => id.clone(),
            ForeignScope::Unscoped => {
                log::warn!(
                    "ignoring add to unscoped {} relation; call for_foreign_id first",
                    self.entity()
                );
                return Ok(false);
            }
            ForeignScope::Many(_) => {
                log::warn!(
                    "ignoring add to {} relation scoped to multiple parents; target is ambiguous",
                    self.entity()
                );
                return Ok(false);
            }
        };
        item.set_field(&self.fk_field, id)?;
        self.list.store().write(item)?;
        let extra = BTreeMap::new();
        for callback in &self.add_callbacks {
            callback(self, &*item, &extra);
        }
        Ok(true)
    }

    /// Load a persisted record by id and [`add`](Self::add) it.
    pub fn add_by_id(&self, id: &SqlValue) -> Result<bool, OrmError> {
        let mut record = self.load_required(id)?;
        self.add(record.as_mut())
    }

    /// Unlink `item` by nulling its foreign-key field and persisting it.
    ///
    /// The record itself is never deleted. The remove is honored only
    /// when the item's current foreign-key value falls inside the list's
    /// scope (an unscoped list, or one scoped to an empty id set, places
    /// no restriction); otherwise it is a warned no-op.
    pub fn remove(&self, item: &mut dyn Record) -> Result<bool, OrmError> {
        if item.entity_type() != self.entity() {
            return Err(OrmError::invalid_argument(format!(
                "cannot remove a '{}' record from a list of '{}'",
                item.entity_type(),
                self.entity()
            )));
        }
        let current = item.field(&self.fk_field).unwrap_or(SqlValue::Null);
        if !self.scope.matches(&current) {
            log::warn!(
                "ignoring remove from {} relation; record is linked to a parent outside the scope",
                self.entity()
            );
            return Ok(false);
        }
        item.set_field(&self.fk_field, SqlValue::Null)?;
        self.list.store().write(item)?;
        let removed: Vec<SqlValue> = item.id().into_iter().collect();
        for callback in &self.remove_callbacks {
            callback(self, &removed);
        }
        Ok(true)
    }

    /// Load a persisted record by id and [`remove`](Self::remove) it.
    pub fn remove_by_id(&self, id: &SqlValue) -> Result<bool, OrmError> {
        let mut record = self.load_required(id)?;
        self.remove(record.as_mut())
    }

    fn load_required(&self, id: &SqlValue) -> Result<Box<dyn Record>, OrmError> {
        self.list
            .store()
            .load_by_id(self.entity(), id)?
            .ok_or_else(|| OrmError::NotFound {
                entity: self.entity().to_string(),
                id: id.to_string(),
            })
    }

    pub fn all(&self) -> Result<Vec<Box<dyn Record>>, OrmError> {
        self.list.all()
    }

    pub fn first(&self) -> Result<Option<Box<dyn Record>>, OrmError> {
        self.list.first()
    }

    pub fn count(&self) -> Result<u64, OrmError> {
        self.list.count()
    }

    pub fn by_id(&self, id: &SqlValue) -> Result<Option<Box<dyn Record>>, OrmError> {
        self.list.by_id(id)
    }
}

impl Filterable for HasManyList {
    fn filter(&self, fragment: SqlFragment) -> Self {
        self.with_list(self.list.filter(fragment))
    }

    fn filter_by(&self, field: &str, value: SqlValue) -> Result<Self, OrmError> {
        Ok(self.with_list(self.list.filter_by(field, value)?))
    }
}

impl Sortable for HasManyList {
    fn sort(&self, field: &str, direction: SortDirection) -> Result<Self, OrmError> {
        Ok(self.with_list(self.list.sort(field, direction)?))
    }
}

impl Limitable for HasManyList {
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

    fn comments(world: &SampleWorld) -> HasManyList {
        world.has_many("Comment", "PostID")
    }

    #[test]
    fn test_rescope_replaces_previous_filter() {
        let world = SampleWorld::new();
        let list = comments(&world)
            .for_foreign_id(SqlValue::Int(1))
            .unwrap()
            .for_foreign_id(SqlValue::Int(2))
            .unwrap();
        let (sql, params) = list.list().query().finalize().unwrap().render().unwrap();
        assert_eq!(sql.matches("\"Comment\".\"PostID\"").count(), 1);
        assert_eq!(params, vec![SqlValue::Int(2)]);
    }

    #[test]
    fn test_rescope_to_many_clears_single_id_param() {
        let world = SampleWorld::new();
        let list = comments(&world)
            .for_foreign_id(SqlValue::Int(5))
            .unwrap()
            .for_foreign_ids(&[SqlValue::Int(1), SqlValue::Int(2)])
            .unwrap();
        assert_eq!(list.list().query().params().get("Foreign.ID"), None);

        let emptied = comments(&world)
            .for_foreign_id(SqlValue::Int(5))
            .unwrap()
            .for_foreign_ids(&[])
            .unwrap();
        assert_eq!(emptied.list().query().params().get("Foreign.ID"), None);
    }

    #[test]
    fn test_scoped_reads() {
        let world = SampleWorld::new();
        world.store.seed(
            "Comment",
            &[
                (1, &[("PostID", SqlValue::Int(5))]),
                (2, &[("PostID", SqlValue::Int(5))]),
                (3, &[("PostID", SqlValue::Int(6))]),
            ],
        );
        let list = comments(&world).for_foreign_id(SqlValue::Int(5)).unwrap();
        assert_eq!(list.count().unwrap(), 2);
    }

    #[test]
    fn test_empty_id_set_matches_nothing() {
        let world = SampleWorld::new();
        world
            .store
            .seed("Comment", &[(1, &[("PostID", SqlValue::Int(5))])]);
        let list = comments(&world).for_foreign_ids(&[]).unwrap();
        assert_eq!(list.count().unwrap(), 0);
    }

    #[test]
    fn test_add_repoints_foreign_key_with_one_write() {
        let world = SampleWorld::new();
        world
            .store
            .seed("Comment", &[(1, &[("PostID", SqlValue::Null)])]);
        let list = comments(&world).for_foreign_id(SqlValue::Int(5)).unwrap();
        let mut record = world
            .store
            .load_by_id("Comment", &SqlValue::Int(1))
            .unwrap()
            .unwrap();
        let before = world.store.write_count();
        assert!(list.add(record.as_mut()).unwrap());
        assert_eq!(record.field("PostID"), Some(SqlValue::Int(5)));
        assert_eq!(world.store.write_count(), before + 1);
        // persisted, not just mutated in memory
        let reloaded = world
            .store
            .load_by_id("Comment", &SqlValue::Int(1))
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.field("PostID"), Some(SqlValue::Int(5)));
    }

    #[test]
    fn test_add_refused_without_single_scope() {
        let world = SampleWorld::new();
        world
            .store
            .seed("Comment", &[(1, &[("PostID", SqlValue::Null)])]);
        let mut record = world
            .store
            .load_by_id("Comment", &SqlValue::Int(1))
            .unwrap()
            .unwrap();

        let unscoped = comments(&world);
        assert!(!unscoped.add(record.as_mut()).unwrap());

        let ambiguous = comments(&world)
            .for_foreign_ids(&[SqlValue::Int(1), SqlValue::Int(2)])
            .unwrap();
        assert!(!ambiguous.add(record.as_mut()).unwrap());

        // neither refusal wrote anything
        assert_eq!(record.field("PostID"), Some(SqlValue::Null));
        assert_eq!(world.store.write_count(), 0);
    }

    #[test]
    fn test_remove_nulls_fk_and_never_deletes() {
        let world = SampleWorld::new();
        world
            .store
            .seed("Comment", &[(1, &[("PostID", SqlValue::Int(5))])]);
        let list = comments(&world).for_foreign_id(SqlValue::Int(5)).unwrap();
        assert!(list.remove_by_id(&SqlValue::Int(1)).unwrap());
        let reloaded = world
            .store
            .load_by_id("Comment", &SqlValue::Int(1))
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.field("PostID"), Some(SqlValue::Null));
        assert_eq!(world.store.delete_count(), 0);
    }

    #[test]
    fn test_remove_outside_scope_is_noop() {
        let world = SampleWorld::new();
        world
            .store
            .seed("Comment", &[(1, &[("PostID", SqlValue::Int(9))])]);
        let list = comments(&world).for_foreign_id(SqlValue::Int(5)).unwrap();
        assert!(!list.remove_by_id(&SqlValue::Int(1)).unwrap());
        let reloaded = world
            .store
            .load_by_id("Comment", &SqlValue::Int(1))
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.field("PostID"), Some(SqlValue::Int(9)));
    }

    #[test]
    fn test_remove_on_unscoped_list_is_honored() {
        let world = SampleWorld::new();
        world
            .store
            .seed("Comment", &[(1, &[("PostID", SqlValue::Int(9))])]);
        assert!(comments(&world).remove_by_id(&SqlValue::Int(1)).unwrap());
    }

    #[test]
    fn test_callbacks_fire_after_mutation() {
        let world = SampleWorld::new();
        world
            .store
            .seed("Comment", &[(1, &[("PostID", SqlValue::Null)])]);
        let added = Rc::new(RefCell::new(Vec::new()));
        let removed = Rc::new(RefCell::new(Vec::new()));
        let added_log = added.clone();
        let removed_log = removed.clone();
        let list = comments(&world)
            .for_foreign_id(SqlValue::Int(5))
            .unwrap()
            .on_add(Arc::new(move |_, item, _| {
                added_log.borrow_mut().push(item.field("PostID"));
            }))
            .on_remove(Arc::new(move |_, ids| {
                removed_log.borrow_mut().extend(ids.iter().cloned());
            }));
        list.add_by_id(&SqlValue::Int(1)).unwrap();
        list.remove_by_id(&SqlValue::Int(1)).unwrap();
        assert_eq!(*added.borrow(), vec![Some(SqlValue::Int(5))]);
        assert_eq!(*removed.borrow(), vec![SqlValue::Int(1)]);
    }

    #[test]
    fn test_add_missing_id_is_not_found() {
        let world = SampleWorld::new();
        let list = comments(&world).for_foreign_id(SqlValue::Int(5)).unwrap();
        assert!(matches!(
            list.add_by_id(&SqlValue::Int(42)),
            Err(OrmError::NotFound { .. })
        ));
    }
}
