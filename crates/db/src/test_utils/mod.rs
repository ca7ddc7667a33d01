//! In-memory implementations of the store contracts for tests.
//!
//! [`MemoryStore`] evaluates the filter and update operators the workspace
//! uses and the simple pipeline stages. Pipelines it cannot evaluate (pipeline
//! lookups, expression stages) are answered from results scripted with
//! [`MemoryStore::push_aggregate_result`]. Every pipeline is recorded.

mod filter;
mod pipeline;

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use emotes_common::{AppError, AppResult};

use crate::aggregations::Stage;
use crate::store::{
    BulkWriteResult, Collection, DocumentStore, FindOptions, ObjectAcl, ObjectStorage,
    ReturnDocument, UpdateResult, WriteModel,
};

use filter::{apply_update, get_path, matches, sort_cmp};

/// In-memory document store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Collection, Vec<Document>>>,
    scripted: Mutex<HashMap<Collection, VecDeque<Vec<Document>>>>,
    pipelines: Mutex<Vec<(Collection, Vec<Stage>)>>,
    failing: Mutex<HashSet<Collection>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert raw documents without going through the contract.
    pub fn seed(&self, coll: Collection, docs: impl IntoIterator<Item = Document>) {
        self.tables.write().entry(coll).or_default().extend(docs);
    }

    /// Encode and insert a value.
    pub fn seed_as<T: Serialize>(&self, coll: Collection, value: &T) -> AppResult<()> {
        let d = bson::to_document(value)?;
        self.seed(coll, [d]);
        Ok(())
    }

    /// Every document of a collection.
    #[must_use]
    pub fn all(&self, coll: Collection) -> Vec<Document> {
        self.tables.read().get(&coll).cloned().unwrap_or_default()
    }

    /// Every document of a collection, decoded.
    pub fn all_as<T: DeserializeOwned>(&self, coll: Collection) -> AppResult<Vec<T>> {
        self.all(coll)
            .into_iter()
            .map(|d| bson::from_document(d).map_err(Into::into))
            .collect()
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, coll: Collection) -> usize {
        self.tables.read().get(&coll).map_or(0, Vec::len)
    }

    /// Queue the output of the next `aggregate` call on `coll`.
    pub fn push_aggregate_result(&self, coll: Collection, docs: Vec<Document>) {
        self.scripted.lock().entry(coll).or_default().push_back(docs);
    }

    /// Pipelines run so far, in call order.
    #[must_use]
    pub fn pipelines(&self) -> Vec<(Collection, Vec<Stage>)> {
        self.pipelines.lock().clone()
    }

    /// Make every write to `coll` fail.
    pub fn fail_writes(&self, coll: Collection) {
        self.failing.lock().insert(coll);
    }

    fn check_writable(&self, coll: Collection) -> AppResult<()> {
        if self.failing.lock().contains(&coll) {
            return Err(AppError::internal(format!("write to {coll} refused")));
        }
        Ok(())
    }

    fn insert_locked(rows: &mut Vec<Document>, mut document: Document) -> AppResult<()> {
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        let id = document.get("_id").cloned();
        if rows.iter().any(|r| r.get("_id").cloned() == id) {
            return Err(AppError::internal(format!(
                "duplicate key {}",
                id.unwrap_or(Bson::Null)
            )));
        }
        rows.push(document);
        Ok(())
    }

    fn update_locked(
        rows: &mut [Document],
        filter: &Document,
        update: &Document,
        many: bool,
    ) -> AppResult<UpdateResult> {
        let mut result = UpdateResult::default();
        for row in rows.iter_mut() {
            if !matches(row, filter)? {
                continue;
            }
            let mut next = row.clone();
            apply_update(&mut next, update)?;
            result.matched += 1;
            if next != *row {
                result.modified += 1;
                *row = next;
            }
            if !many {
                break;
            }
        }
        Ok(result)
    }

    fn delete_locked(rows: &mut Vec<Document>, filter: &Document) -> AppResult<u64> {
        let mut hit = None;
        for (i, row) in rows.iter().enumerate() {
            if matches(row, filter)? {
                hit = Some(i);
                break;
            }
        }
        Ok(hit.map_or(0, |i| {
            rows.remove(i);
            1
        }))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(&self, coll: Collection, filter: Document) -> AppResult<Option<Document>> {
        let tables = self.tables.read();
        for row in tables.get(&coll).into_iter().flatten() {
            if matches(row, &filter)? {
                return Ok(Some(row.clone()));
            }
        }
        Ok(None)
    }

    async fn find(
        &self,
        coll: Collection,
        filter: Document,
        options: FindOptions,
    ) -> AppResult<Vec<Document>> {
        let mut out = Vec::new();
        {
            let tables = self.tables.read();
            for row in tables.get(&coll).into_iter().flatten() {
                if matches(row, &filter)? {
                    out.push(row.clone());
                }
            }
        }

        if let Some(sort) = &options.sort {
            out.sort_by(|a, b| {
                for (k, dir) in sort {
                    let ord = sort_cmp(get_path(a, k), get_path(b, k));
                    let ord = if matches!(dir, Bson::Int32(-1) | Bson::Int64(-1)) {
                        ord.reverse()
                    } else {
                        ord
                    };
                    if ord.is_ne() {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }
        let skip = options
            .skip
            .map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
        let limit = options
            .limit
            .filter(|n| *n > 0)
            .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
        Ok(out.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, coll: Collection, filter: Document) -> AppResult<u64> {
        let tables = self.tables.read();
        let mut n = 0;
        for row in tables.get(&coll).into_iter().flatten() {
            if matches(row, &filter)? {
                n += 1;
            }
        }
        Ok(n)
    }

    async fn insert_one(&self, coll: Collection, document: Document) -> AppResult<()> {
        self.check_writable(coll)?;
        let mut tables = self.tables.write();
        Self::insert_locked(tables.entry(coll).or_default(), document)
    }

    async fn insert_many(&self, coll: Collection, documents: Vec<Document>) -> AppResult<()> {
        self.check_writable(coll)?;
        let mut tables = self.tables.write();
        let rows = tables.entry(coll).or_default();
        for d in documents {
            Self::insert_locked(rows, d)?;
        }
        Ok(())
    }

    async fn find_one_and_update(
        &self,
        coll: Collection,
        filter: Document,
        update: Document,
        ret: ReturnDocument,
    ) -> AppResult<Option<Document>> {
        self.check_writable(coll)?;
        let mut tables = self.tables.write();
        let rows = tables.entry(coll).or_default();
        for row in rows.iter_mut() {
            if !matches(row, &filter)? {
                continue;
            }
            let before = row.clone();
            apply_update(row, &update).inspect_err(|_| *row = before.clone())?;
            trace!(%coll, "memory find_one_and_update");
            return Ok(Some(match ret {
                ReturnDocument::Before => before,
                ReturnDocument::After => row.clone(),
            }));
        }
        Ok(None)
    }

    async fn update_one(
        &self,
        coll: Collection,
        filter: Document,
        update: Document,
    ) -> AppResult<UpdateResult> {
        self.check_writable(coll)?;
        let mut tables = self.tables.write();
        Self::update_locked(tables.entry(coll).or_default(), &filter, &update, false)
    }

    async fn update_many(
        &self,
        coll: Collection,
        filter: Document,
        update: Document,
    ) -> AppResult<UpdateResult> {
        self.check_writable(coll)?;
        let mut tables = self.tables.write();
        Self::update_locked(tables.entry(coll).or_default(), &filter, &update, true)
    }

    async fn delete_one(&self, coll: Collection, filter: Document) -> AppResult<u64> {
        self.check_writable(coll)?;
        let mut tables = self.tables.write();
        Self::delete_locked(tables.entry(coll).or_default(), &filter)
    }

    async fn bulk_write(
        &self,
        coll: Collection,
        models: Vec<WriteModel>,
    ) -> AppResult<BulkWriteResult> {
        self.check_writable(coll)?;
        let mut tables = self.tables.write();
        let rows = tables.entry(coll).or_default();
        let mut result = BulkWriteResult::default();
        for model in models {
            match model {
                WriteModel::InsertOne { document } => {
                    Self::insert_locked(rows, document)?;
                    result.inserted += 1;
                }
                WriteModel::UpdateOne { filter, update } => {
                    let r = Self::update_locked(rows, &filter, &update, false)?;
                    result.matched += r.matched;
                    result.modified += r.modified;
                }
                WriteModel::UpdateMany { filter, update } => {
                    let r = Self::update_locked(rows, &filter, &update, true)?;
                    result.matched += r.matched;
                    result.modified += r.modified;
                }
                WriteModel::DeleteOne { filter } => {
                    result.deleted += Self::delete_locked(rows, &filter)?;
                }
            }
        }
        Ok(result)
    }

    async fn aggregate(&self, coll: Collection, pipeline: Vec<Stage>) -> AppResult<Vec<Document>> {
        self.pipelines.lock().push((coll, pipeline.clone()));

        if let Some(docs) = self
            .scripted
            .lock()
            .get_mut(&coll)
            .and_then(VecDeque::pop_front)
        {
            trace!(%coll, "memory aggregate answered from script");
            return Ok(docs);
        }

        let tables = self.tables.read();
        let input = tables.get(&coll).cloned().unwrap_or_default();
        pipeline::run(input, &pipeline, &tables)
    }
}

/// In-memory object storage recording ACL changes.
#[derive(Default)]
pub struct MemoryObjectStorage {
    acls: Mutex<HashMap<(String, String), ObjectAcl>>,
    calls: Mutex<Vec<(String, ObjectAcl)>>,
}

impl MemoryObjectStorage {
    /// Create an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current ACL of an object.
    #[must_use]
    pub fn acl(&self, bucket: &str, key: &str) -> Option<ObjectAcl> {
        self.acls
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .copied()
    }

    /// Keys changed so far with the ACL applied, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, ObjectAcl)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn set_acl(&self, bucket: &str, key: &str, acl: ObjectAcl) -> AppResult<()> {
        self.acls
            .lock()
            .insert((bucket.to_string(), key.to_string()), acl);
        self.calls.lock().push((key.to_string(), acl));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bson::doc;

    #[tokio::test]
    async fn test_find_one_and_update_returns_after() {
        let store = MemoryStore::new();
        let id = ObjectId::new();
        store.seed(Collection::Roles, [doc! { "_id": id, "name": "a", "position": 1 }]);

        let after = store
            .find_one_and_update(
                Collection::Roles,
                doc! { "_id": id },
                doc! { "$set": { "name": "b" } },
                ReturnDocument::After,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.get_str("name").unwrap(), "b");

        let missing = store
            .find_one_and_update(
                Collection::Roles,
                doc! { "_id": ObjectId::new() },
                doc! { "$set": { "name": "c" } },
                ReturnDocument::After,
            )
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_scripted_aggregate_is_consumed_once() {
        let store = MemoryStore::new();
        store.push_aggregate_result(Collection::Emotes, vec![doc! { "total": 7 }]);

        let first = store
            .aggregate(Collection::Emotes, vec![Stage::Count("total".into())])
            .await
            .unwrap();
        let second = store
            .aggregate(Collection::Emotes, vec![Stage::Count("total".into())])
            .await
            .unwrap();

        assert_eq!(first, vec![doc! { "total": 7 }]);
        assert!(second.is_empty());
        assert_eq!(store.pipelines().len(), 2);
    }

    #[tokio::test]
    async fn test_bulk_write_and_failures() {
        let store = MemoryStore::new();
        let result = store
            .bulk_write(
                Collection::Messages,
                vec![
                    WriteModel::InsertOne { document: doc! { "n": 1 } },
                    WriteModel::InsertOne { document: doc! { "n": 2 } },
                    WriteModel::UpdateMany {
                        filter: doc! {},
                        update: doc! { "$set": { "read": true } },
                    },
                ],
            )
            .await
            .unwrap();
        assert_eq!(result.inserted, 2);
        assert_eq!(result.modified, 2);

        store.fail_writes(Collection::Messages);
        assert!(
            store
                .insert_one(Collection::Messages, doc! { "n": 3 })
                .await
                .is_err()
        );
        assert_eq!(store.count(Collection::Messages, doc! {}).await.unwrap(), 2);
    }
}
