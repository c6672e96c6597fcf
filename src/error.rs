use thiserror::Error;

use crate::store::CollectionName;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("mongodb: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("invalid record id {0:?}")]
    InvalidId(String),

    #[error("could not encode record: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error("malformed record: {0}")]
    Decode(#[from] bson::de::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("an identity observer is already subscribed")]
    AlreadySubscribed,

    #[error("anonymous sign-in failed: {0}")]
    AnonymousSignIn(String),

    #[error("sign-out failed: {0}")]
    SignOut(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to list {collection}: {source}")]
    List {
        collection: CollectionName,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to insert into {collection}: {source}")]
    Insert {
        collection: CollectionName,
        #[source]
        source: StoreError,
    },

    #[error("failed to update {collection}/{id}: {source}")]
    Update {
        collection: CollectionName,
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to delete {collection}/{id}: {source}")]
    Delete {
        collection: CollectionName,
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("rejected {collection} record: {reason}")]
    InvalidRecord {
        collection: CollectionName,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
