use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use chrono::Utc;

use super::{CollectionName, Query, RemoteStore, SortDirection, CREATED_AT, ID};
use crate::error::StoreError;

/// In-process store with the same contract as [`super::MongoStore`].
///
/// Creation times are strictly increasing so ordering is deterministic, and
/// reads or writes against a collection can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<CollectionName, Vec<Document>>,
    last_created_at: Option<i64>,
    failing_reads: HashSet<CollectionName>,
    failing_writes: HashSet<CollectionName>,
}

impl Inner {
    fn check_write(&self, collection: CollectionName) -> Result<(), StoreError> {
        if self.failing_writes.contains(&collection) {
            return Err(StoreError::Unavailable(format!("{collection} rejects writes")));
        }
        Ok(())
    }

    // BSON datetimes keep milliseconds, so ties are broken at that grain
    fn next_created_at(&mut self) -> bson::DateTime {
        let now = Utc::now().timestamp_millis();
        let stamp = match self.last_created_at {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last_created_at = Some(stamp);
        bson::DateTime::from_millis(stamp)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, collection: CollectionName, failing: bool) {
        let mut inner = self.lock();
        if failing {
            inner.failing_reads.insert(collection);
        } else {
            inner.failing_reads.remove(&collection);
        }
    }

    pub fn fail_writes(&self, collection: CollectionName, failing: bool) {
        let mut inner = self.lock();
        if failing {
            inner.failing_writes.insert(collection);
        } else {
            inner.failing_writes.remove(&collection);
        }
    }

    pub fn record_count(&self, collection: CollectionName) -> usize {
        self.lock().collections.get(&collection).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-operation
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn compare_field(a: &Document, b: &Document, field: &str) -> Ordering {
    match (a.get(field), b.get(field)) {
        (Some(Bson::DateTime(a)), Some(Bson::DateTime(b))) => a.cmp(b),
        (Some(Bson::String(a)), Some(Bson::String(b))) => a.cmp(b),
        (Some(Bson::Double(a)), Some(Bson::Double(b))) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        // Missing values sort first, as in MongoDB
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn insert(
        &self,
        collection: CollectionName,
        mut record: Document,
    ) -> Result<String, StoreError> {
        let mut inner = self.lock();
        inner.check_write(collection)?;
        let id = ObjectId::new().to_hex();
        let created_at = inner.next_created_at();
        record.insert(ID, id.as_str());
        record.insert(CREATED_AT, created_at);
        inner.collections.entry(collection).or_default().push(record);
        Ok(id)
    }

    async fn find(
        &self,
        collection: CollectionName,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let inner = self.lock();
        if inner.failing_reads.contains(&collection) {
            return Err(StoreError::Unavailable(format!("{collection} rejects reads")));
        }
        let mut records: Vec<Document> = inner
            .collections
            .get(&collection)
            .into_iter()
            .flatten()
            .filter(|record| record.get_str(query.field).ok() == Some(query.equals.as_str()))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            let ordering = compare_field(a, b, query.sort_by);
            match query.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
        Ok(records)
    }

    async fn update(
        &self,
        collection: CollectionName,
        id: &str,
        fields: Document,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.check_write(collection)?;
        let record = inner
            .collections
            .get_mut(&collection)
            .and_then(|records| records.iter_mut().find(|r| r.get_str(ID).ok() == Some(id)));
        if let Some(record) = record {
            for (key, value) in fields {
                record.insert(key, value);
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: CollectionName, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.check_write(collection)?;
        if let Some(records) = inner.collections.get_mut(&collection) {
            records.retain(|r| r.get_str(ID).ok() != Some(id));
        }
        Ok(())
    }
}
