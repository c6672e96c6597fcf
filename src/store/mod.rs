//! Remote store boundary: three independent collections of BSON records.
//!
//! Records coming out of [`RemoteStore::find`] always carry a string `id`
//! and a BSON datetime `createdAt` resolved by the store at insert time.

use std::fmt;

use async_trait::async_trait;
use bson::Document;

use crate::error::StoreError;

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

pub const ID: &str = "id";
pub const CREATED_AT: &str = "createdAt";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollectionName {
    Groups,
    Members,
    Expenses,
}

impl CollectionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionName::Groups => "groups",
            CollectionName::Members => "members",
            CollectionName::Expenses => "expenses",
        }
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Equality filter on one field plus the collection's sort order.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub field: &'static str,
    pub equals: String,
    pub sort_by: &'static str,
    pub direction: SortDirection,
}

impl Query {
    pub fn new(field: &'static str, equals: impl Into<String>) -> Self {
        Query {
            field,
            equals: equals.into(),
            sort_by: CREATED_AT,
            direction: SortDirection::Ascending,
        }
    }

    pub fn newest_first(mut self) -> Self {
        self.direction = SortDirection::Descending;
        self
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Inserts `record` and returns the generated id. `createdAt` is stamped
    /// by the store, so `record` must not carry it.
    async fn insert(&self, collection: CollectionName, record: Document)
        -> Result<String, StoreError>;

    async fn find(
        &self,
        collection: CollectionName,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError>;

    /// Merges `fields` into the record. Missing records are not an error.
    async fn update(
        &self,
        collection: CollectionName,
        id: &str,
        fields: Document,
    ) -> Result<(), StoreError>;

    /// Removes the record unconditionally. Missing records are not an error.
    async fn delete(&self, collection: CollectionName, id: &str) -> Result<(), StoreError>;
}
