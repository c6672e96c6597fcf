//! Typed CRUD over the three remote collections.
//!
//! Every failure is logged here and handed back to the caller unchanged;
//! there are no retries and no cross-collection checks. Deleting a group
//! leaves its members and expenses in place.

use std::sync::Arc;

use bson::{Bson, Document};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::error::{FetchError, StoreError, WriteError};
use crate::schemas::{Expense, Group, GroupPatch, Member, NewExpense, NewGroup, NewMember};
use crate::store::{CollectionName, Query, RemoteStore};

const CREATED_BY: &str = "createdBy";
const GROUP_ID: &str = "groupId";

#[derive(Clone)]
pub struct RemoteCollectionGateway {
    store: Arc<dyn RemoteStore>,
}

fn encode<T: Serialize>(record: &T) -> Result<Document, StoreError> {
    Ok(bson::to_document(record)?)
}

// Server timestamps arrive as BSON datetimes; the typed records read RFC 3339
fn decode<T: DeserializeOwned>(mut record: Document) -> Result<T, StoreError> {
    for (_, value) in record.iter_mut() {
        if let Bson::DateTime(stamp) = value {
            *value = Bson::String(stamp.to_chrono().to_rfc3339());
        }
    }
    Ok(bson::from_document(record)?)
}

impl RemoteCollectionGateway {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        RemoteCollectionGateway { store }
    }

    async fn insert(
        &self,
        collection: CollectionName,
        record: Result<Document, StoreError>,
    ) -> Result<String, WriteError> {
        let result = match record {
            Ok(record) => self.store.insert(collection, record).await,
            Err(err) => Err(err),
        };
        result.map_err(|source| {
            error!(%collection, error = %source, "error inserting record");
            WriteError::Insert { collection, source }
        })
    }

    async fn list<T: DeserializeOwned>(
        &self,
        collection: CollectionName,
        query: Query,
    ) -> Result<Vec<T>, FetchError> {
        let records = self
            .store
            .find(collection, &query)
            .await
            .and_then(|records| records.into_iter().map(decode).collect::<Result<Vec<T>, _>>());
        records.map_err(|source| {
            error!(%collection, filter = %query.equals, error = %source, "error listing records");
            FetchError::List { collection, source }
        })
    }

    async fn delete(&self, collection: CollectionName, id: &str) -> Result<(), WriteError> {
        self.store.delete(collection, id).await.map_err(|source| {
            error!(%collection, id, error = %source, "error deleting record");
            WriteError::Delete {
                collection,
                id: id.to_owned(),
                source,
            }
        })
    }

    /// Inserts a group. The returned `created_at` is a client-side
    /// placeholder; the stored value is resolved by the server and only
    /// shows up on the next [`Self::list_groups`].
    pub async fn create_group(&self, group: NewGroup) -> Result<Group, WriteError> {
        let id = self.insert(CollectionName::Groups, encode(&group)).await?;
        Ok(Group {
            id,
            name: group.name,
            description: group.description,
            created_by: group.created_by,
            created_at: Utc::now(),
        })
    }

    /// Groups created by `owner`, newest first.
    pub async fn list_groups(&self, owner: &str) -> Result<Vec<Group>, FetchError> {
        self.list(CollectionName::Groups, Query::new(CREATED_BY, owner).newest_first())
            .await
    }

    pub async fn update_group(&self, id: &str, patch: &GroupPatch) -> Result<(), WriteError> {
        let collection = CollectionName::Groups;
        if patch.is_empty() {
            debug!(id, "empty group patch, nothing to write");
            return Ok(());
        }
        let result = match encode(patch) {
            Ok(fields) => self.store.update(collection, id, fields).await,
            Err(err) => Err(err),
        };
        result.map_err(|source| {
            error!(%collection, id, error = %source, "error updating record");
            WriteError::Update {
                collection,
                id: id.to_owned(),
                source,
            }
        })
    }

    pub async fn delete_group(&self, id: &str) -> Result<(), WriteError> {
        self.delete(CollectionName::Groups, id).await
    }

    pub async fn add_member(&self, group_id: &str, member: NewMember) -> Result<Member, WriteError> {
        let record = encode(&member).map(|mut record| {
            record.insert(GROUP_ID, group_id);
            record
        });
        let id = self.insert(CollectionName::Members, record).await?;
        Ok(Member {
            id,
            group_id: group_id.to_owned(),
            name: member.name,
            email: member.email,
            created_at: Utc::now(),
        })
    }

    /// Members of a group, oldest first.
    pub async fn list_members(&self, group_id: &str) -> Result<Vec<Member>, FetchError> {
        self.list(CollectionName::Members, Query::new(GROUP_ID, group_id))
            .await
    }

    pub async fn remove_member(&self, id: &str) -> Result<(), WriteError> {
        self.delete(CollectionName::Members, id).await
    }

    pub async fn add_expense(
        &self,
        group_id: &str,
        mut expense: NewExpense,
    ) -> Result<Expense, WriteError> {
        let collection = CollectionName::Expenses;
        if !expense.has_valid_amount() {
            error!(%collection, amount = expense.amount, "rejecting expense amount");
            return Err(WriteError::InvalidRecord {
                collection,
                reason: format!("amount must be a non-negative number, got {}", expense.amount),
            });
        }
        expense.dedup_split();
        let record = encode(&expense).map(|mut record| {
            record.insert(GROUP_ID, group_id);
            record
        });
        let id = self.insert(collection, record).await?;
        Ok(Expense {
            id,
            group_id: group_id.to_owned(),
            description: expense.description,
            amount: expense.amount,
            date: expense.date,
            paid_by: expense.paid_by,
            category: expense.category,
            split_with: expense.split_with,
            created_at: Utc::now(),
        })
    }

    /// Expenses of a group, newest first.
    pub async fn list_expenses(&self, group_id: &str) -> Result<Vec<Expense>, FetchError> {
        self.list(CollectionName::Expenses, Query::new(GROUP_ID, group_id).newest_first())
            .await
    }

    pub async fn delete_expense(&self, id: &str) -> Result<(), WriteError> {
        self.delete(CollectionName::Expenses, id).await
    }
}
