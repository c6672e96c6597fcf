use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use futures::TryStreamExt;
use mongodb::{
    options::{FindOptions, UpdateOptions},
    Collection, Database,
};
use tracing::debug;

use super::{CollectionName, Query, RemoteStore, SortDirection, ID};
use crate::error::StoreError;

#[derive(Clone, Debug)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    pub fn new(database: Database) -> Self {
        MongoStore { database }
    }

    fn collection(&self, name: CollectionName) -> Collection<Document> {
        self.database.collection::<Document>(name.as_str())
    }
}

fn object_id(id: &str) -> Result<ObjectId, StoreError> {
    ObjectId::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_owned()))
}

// Exposes `_id` as the string `id` the typed records expect
fn expose_id(mut record: Document) -> Document {
    if let Some(Bson::ObjectId(oid)) = record.remove("_id") {
        record.insert(ID, oid.to_hex());
    }
    record
}

#[async_trait]
impl RemoteStore for MongoStore {
    async fn insert(
        &self,
        collection: CollectionName,
        record: Document,
    ) -> Result<String, StoreError> {
        let id = ObjectId::new();
        // A single upsert lets the server resolve the creation time
        self.collection(collection)
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$setOnInsert": record,
                    "$currentDate": { "createdAt": { "$type": "date" } },
                },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        debug!(%collection, id = %id, "inserted record");
        Ok(id.to_hex())
    }

    async fn find(
        &self,
        collection: CollectionName,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let mut filter = Document::new();
        filter.insert(query.field, query.equals.as_str());
        let mut sort = Document::new();
        let order = match query.direction {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        };
        sort.insert(query.sort_by, order);

        let options = FindOptions::builder().sort(sort).build();
        let records: Vec<Document> = self
            .collection(collection)
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(records.into_iter().map(expose_id).collect())
    }

    async fn update(
        &self,
        collection: CollectionName,
        id: &str,
        fields: Document,
    ) -> Result<(), StoreError> {
        let id = object_id(id)?;
        self.collection(collection)
            .update_one(doc! { "_id": id }, doc! { "$set": fields }, None)
            .await?;
        Ok(())
    }

    async fn delete(&self, collection: CollectionName, id: &str) -> Result<(), StoreError> {
        let id = object_id(id)?;
        self.collection(collection)
            .delete_one(doc! { "_id": id }, None)
            .await?;
        Ok(())
    }
}
