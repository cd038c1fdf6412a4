//! Sample entities and a pre-wired world for tests.
//!
//! The schema covers both relation shapes: `Comment` belongs to `Post`
//! through its `PostID` field (one-to-many), and `Tag` links to `Page`
//! through the `PageTag` join entity (many-to-many-through, with a
//! `SortOrder` extra field on the join row).

use std::sync::Arc;

use crate::config::QueryConfig;
use crate::list::DataList;
use crate::relation::{HasManyList, ManyManyThroughList};
use crate::schema::MapSchema;
use crate::test_helpers::MemoryStore;

pub fn sample_schema() -> MapSchema {
    MapSchema::new()
        .register("Post", "Post", &["ID", "Title"])
        .register("Comment", "Comment", &["ID", "PostID", "Title", "Body"])
        .register("Page", "Page", &["ID", "Title"])
        .register("Tag", "Tag", &["ID", "Title"])
        .register("PageTag", "PageTag", &["ID", "TagID", "PageID", "SortOrder"])
}

/// A [`MemoryStore`] over the sample schema plus shorthand list
/// constructors.
pub struct SampleWorld {
    pub store: Arc<MemoryStore>,
    pub schema: Arc<MapSchema>,
    pub config: QueryConfig,
}

impl SampleWorld {
    pub fn new() -> Self {
        let schema = Arc::new(sample_schema());
        let store = Arc::new(MemoryStore::new(schema.clone()));
        SampleWorld {
            store,
            schema,
            config: QueryConfig::default(),
        }
    }

    pub fn list(&self, entity: &str) -> DataList {
        DataList::new(
            entity,
            self.store.clone(),
            self.schema.clone(),
            self.config.clone(),
        )
        .expect("sample entity is registered")
    }

    pub fn has_many(&self, entity: &str, fk_field: &str) -> HasManyList {
        HasManyList::new(
            entity,
            fk_field,
            self.store.clone(),
            self.schema.clone(),
            self.config.clone(),
        )
        .expect("sample relation is registered")
    }

    pub fn many_many(
        &self,
        entity: &str,
        join_entity: &str,
        local_key: &str,
        foreign_key: &str,
    ) -> ManyManyThroughList {
        ManyManyThroughList::new(
            entity,
            join_entity,
            local_key,
            foreign_key,
            self.store.clone(),
            self.schema.clone(),
            self.config.clone(),
        )
        .expect("sample relation is registered")
    }
}

impl Default for SampleWorld {
    fn default() -> Self {
        SampleWorld::new()
    }
}
