//! Store contracts.
//!
//! The document store and object storage are external collaborators. This
//! module fixes the operations the rest of the workspace needs from them;
//! drivers implement [`DocumentStore`] and [`ObjectStorage`].

use std::fmt;

use async_trait::async_trait;
use bson::{Document, doc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use emotes_common::AppResult;

use crate::aggregations::Stage;

/// Named collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Emotes,
    EmoteSets,
    Roles,
    Entitlements,
    Bans,
    Reports,
    Messages,
    MessagesRead,
    AuditLogs,
    Cosmetics,
    System,
}

impl Collection {
    /// Every collection.
    pub const ALL: [Self; 12] = [
        Self::Users,
        Self::Emotes,
        Self::EmoteSets,
        Self::Roles,
        Self::Entitlements,
        Self::Bans,
        Self::Reports,
        Self::Messages,
        Self::MessagesRead,
        Self::AuditLogs,
        Self::Cosmetics,
        Self::System,
    ];

    /// Collection name in the store.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Emotes => "emotes",
            Self::EmoteSets => "emote_sets",
            Self::Roles => "roles",
            Self::Entitlements => "entitlements",
            Self::Bans => "bans",
            Self::Reports => "reports",
            Self::Messages => "messages",
            Self::MessagesRead => "messages_read",
            Self::AuditLogs => "audit_logs",
            Self::Cosmetics => "cosmetics",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options for [`DocumentStore::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub projection: Option<Document>,
}

impl FindOptions {
    /// Sort by the given keys.
    #[must_use]
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Skip `n` documents.
    #[must_use]
    pub const fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Return at most `n` documents.
    #[must_use]
    pub const fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }
}

/// Which state `find_one_and_update` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    Before,
    #[default]
    After,
}

/// Result of an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

/// One operation of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne {
        document: Document,
    },
    UpdateOne {
        filter: Document,
        update: Document,
    },
    UpdateMany {
        filter: Document,
        update: Document,
    },
    DeleteOne {
        filter: Document,
    },
}

/// Totals of a bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    pub inserted: u64,
    pub matched: u64,
    pub modified: u64,
    pub deleted: u64,
}

/// Document store operations used by the mutation and query engines.
///
/// Filters and updates use the store's operator syntax (`$set`, `$in`, ...).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document matching `filter`.
    async fn find_one(&self, coll: Collection, filter: Document) -> AppResult<Option<Document>>;

    /// Every document matching `filter`.
    async fn find(
        &self,
        coll: Collection,
        filter: Document,
        options: FindOptions,
    ) -> AppResult<Vec<Document>>;

    /// Number of documents matching `filter`.
    async fn count(&self, coll: Collection, filter: Document) -> AppResult<u64>;

    /// Insert one document.
    async fn insert_one(&self, coll: Collection, document: Document) -> AppResult<()>;

    /// Insert many documents.
    async fn insert_many(&self, coll: Collection, documents: Vec<Document>) -> AppResult<()>;

    /// Atomically update the first match and return it.
    async fn find_one_and_update(
        &self,
        coll: Collection,
        filter: Document,
        update: Document,
        ret: ReturnDocument,
    ) -> AppResult<Option<Document>>;

    /// Update the first match.
    async fn update_one(
        &self,
        coll: Collection,
        filter: Document,
        update: Document,
    ) -> AppResult<UpdateResult>;

    /// Update every match.
    async fn update_many(
        &self,
        coll: Collection,
        filter: Document,
        update: Document,
    ) -> AppResult<UpdateResult>;

    /// Delete the first match. Returns the number deleted.
    async fn delete_one(&self, coll: Collection, filter: Document) -> AppResult<u64>;

    /// Apply write models in order.
    async fn bulk_write(
        &self,
        coll: Collection,
        models: Vec<WriteModel>,
    ) -> AppResult<BulkWriteResult>;

    /// Run a read pipeline.
    async fn aggregate(&self, coll: Collection, pipeline: Vec<Stage>) -> AppResult<Vec<Document>>;
}

/// Find one document and decode it.
pub async fn find_one_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    coll: Collection,
    filter: Document,
) -> AppResult<Option<T>> {
    match store.find_one(coll, filter).await? {
        Some(d) => Ok(Some(bson::from_document(d)?)),
        None => Ok(None),
    }
}

/// Find documents and decode them.
pub async fn find_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    coll: Collection,
    filter: Document,
    options: FindOptions,
) -> AppResult<Vec<T>> {
    store
        .find(coll, filter, options)
        .await?
        .into_iter()
        .map(|d| bson::from_document(d).map_err(Into::into))
        .collect()
}

/// Run a pipeline and decode every output document.
pub async fn aggregate_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    coll: Collection,
    pipeline: Vec<Stage>,
) -> AppResult<Vec<T>> {
    store
        .aggregate(coll, pipeline)
        .await?
        .into_iter()
        .map(|d| bson::from_document(d).map_err(Into::into))
        .collect()
}

/// Encode and insert one value.
pub async fn insert_as<T: Serialize + Sync>(
    store: &dyn DocumentStore,
    coll: Collection,
    value: &T,
) -> AppResult<()> {
    store.insert_one(coll, bson::to_document(value)?).await
}

/// Filter matching one id.
#[must_use]
pub fn by_id(id: bson::oid::ObjectId) -> Document {
    doc! { "_id": id }
}

/// Access control of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectAcl {
    PublicRead,
    Private,
}

impl ObjectAcl {
    /// Canned ACL name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PublicRead => "public-read",
            Self::Private => "private",
        }
    }
}

/// Object storage operations used by emote deletion.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Change the ACL of an object.
    async fn set_acl(&self, bucket: &str, key: &str, acl: ObjectAcl) -> AppResult<()>;
}

/// Object storage that accepts and discards every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObjectStorage;

#[async_trait]
impl ObjectStorage for NoOpObjectStorage {
    async fn set_acl(&self, _bucket: &str, _key: &str, _acl: ObjectAcl) -> AppResult<()> {
        Ok(())
    }
}
