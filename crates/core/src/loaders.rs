//! Batched by-id loaders over the query engine.

use std::collections::HashMap;
use std::sync::Arc;

use bson::doc;
use bson::oid::ObjectId;
use futures::FutureExt;

use emotes_common::{AppResult, DataLoader, FetchResult, LoaderConfig};
use emotes_db::structures::{Emote, EmoteSet, User};

use crate::queries::Query;

/// Request-scoped loaders. Missing ids resolve to `None`.
#[derive(Clone)]
pub struct Loaders {
    /// Users by id.
    pub user_by_id: DataLoader<ObjectId, Option<User>>,
    /// Emotes by any of their version ids.
    pub emote_by_id: DataLoader<ObjectId, Option<Emote>>,
    /// Emote sets by id.
    pub emote_set_by_id: DataLoader<ObjectId, Option<EmoteSet>>,
    /// Emote sets by owner id.
    pub emote_set_by_user_id: DataLoader<ObjectId, Vec<EmoteSet>>,
}

impl Loaders {
    /// Create loaders sharing one query engine.
    #[must_use]
    pub fn new(query: Arc<Query>, config: LoaderConfig) -> Self {
        let q = query.clone();
        let user_by_id = DataLoader::new(config, move |keys: Vec<ObjectId>| {
            let q = q.clone();
            async move {
                let filter = doc! { "_id": { "$in": keys.clone() } };
                collect(q.users(filter).await, &keys, |u: &User| vec![u.id])
            }
            .boxed()
        });

        let q = query.clone();
        let emote_by_id = DataLoader::new(config, move |keys: Vec<ObjectId>| {
            let q = q.clone();
            async move {
                let filter = doc! { "versions.id": { "$in": keys.clone() } };
                collect(q.emotes(filter).await, &keys, |e: &Emote| {
                    let mut ids: Vec<ObjectId> = e.versions.iter().map(|v| v.id).collect();
                    ids.push(e.id);
                    ids
                })
            }
            .boxed()
        });

        let q = query.clone();
        let emote_set_by_id = DataLoader::new(config, move |keys: Vec<ObjectId>| {
            let q = q.clone();
            async move {
                let filter = doc! { "_id": { "$in": keys.clone() } };
                collect(q.emote_sets(filter).await, &keys, |s: &EmoteSet| vec![s.id])
            }
            .boxed()
        });

        let q = query;
        let emote_set_by_user_id = DataLoader::new(config, move |keys: Vec<ObjectId>| {
            let q = q.clone();
            async move {
                let filter = doc! { "owner_id": { "$in": keys.clone() } };
                match q.emote_sets(filter).await {
                    Ok(sets) => {
                        let mut by_owner: HashMap<ObjectId, Vec<EmoteSet>> = HashMap::new();
                        for set in sets {
                            by_owner.entry(set.owner_id).or_default().push(set);
                        }
                        FetchResult::ok(
                            keys.iter()
                                .map(|k| by_owner.get(k).cloned().unwrap_or_default())
                                .collect(),
                        )
                    }
                    Err(e) => FetchResult::failed(e),
                }
            }
            .boxed()
        });

        Self {
            user_by_id,
            emote_by_id,
            emote_set_by_id,
            emote_set_by_user_id,
        }
    }
}

/// Order fetched values by the requested keys.
fn collect<V: Clone>(
    fetched: AppResult<Vec<V>>,
    keys: &[ObjectId],
    ids: impl Fn(&V) -> Vec<ObjectId>,
) -> FetchResult<Option<V>> {
    let values = match fetched {
        Ok(v) => v,
        Err(e) => return FetchResult::failed(e),
    };
    let mut by_id: HashMap<ObjectId, V> = HashMap::new();
    for v in values {
        for id in ids(&v) {
            by_id.insert(id, v.clone());
        }
    }
    FetchResult::ok(keys.iter().map(|k| by_id.get(k).cloned()).collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    use emotes_common::{Cache, KeyScheme, MemoryKeyValueCache};
    use emotes_db::Collection;
    use emotes_db::test_utils::MemoryStore;

    fn loaders(store: Arc<MemoryStore>) -> Loaders {
        let cache = Cache::new(Arc::new(MemoryKeyValueCache::new()), KeyScheme::new("emotes", 1));
        let config = LoaderConfig {
            wait: Duration::from_millis(5),
            max_batch: 100,
        };
        Loaders::new(Arc::new(Query::new(store, cache)), config)
    }

    #[test]
    fn test_collect_orders_by_key() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let missing = ObjectId::new();
        let out = collect(
            Ok(vec![(b, "b"), (a, "a")]),
            &[a, missing, b],
            |v: &(ObjectId, &str)| vec![v.0],
        );
        assert!(out.errors.is_empty());
        assert_eq!(out.values, vec![Some((a, "a")), None, Some((b, "b"))]);
    }

    #[tokio::test]
    async fn test_user_by_id_batches_and_resolves_missing() {
        let store = Arc::new(MemoryStore::new());
        let alice = User::new(ObjectId::new(), "alice");
        let bob = User::new(ObjectId::new(), "bob");
        store.seed_as(Collection::Users, &alice).unwrap();
        store.seed_as(Collection::Users, &bob).unwrap();
        let loaders = loaders(store.clone());

        let missing = ObjectId::new();
        let out = loaders
            .user_by_id
            .load_all(vec![bob.id, missing, alice.id, bob.id])
            .await;
        let names: Vec<Option<String>> = out
            .into_iter()
            .map(|r| r.unwrap().map(|u| u.username))
            .collect();
        assert_eq!(
            names,
            vec![Some("bob".into()), None, Some("alice".into()), Some("bob".into())]
        );

        let user_pipelines = store
            .pipelines()
            .into_iter()
            .filter(|(c, _)| *c == Collection::Users)
            .count();
        assert_eq!(user_pipelines, 1);
    }

    #[tokio::test]
    async fn test_emote_set_by_user_id_groups_sets() {
        let store = Arc::new(MemoryStore::new());
        let owner = ObjectId::new();
        let first = EmoteSet::new(ObjectId::new(), owner, "first", 10);
        let second = EmoteSet::new(ObjectId::new(), owner, "second", 10);
        store.seed_as(Collection::EmoteSets, &first).unwrap();
        store.seed_as(Collection::EmoteSets, &second).unwrap();
        let loaders = loaders(store);

        let sets = loaders.emote_set_by_user_id.load(owner).await.unwrap();
        assert_eq!(sets.len(), 2);
        let none = loaders.emote_set_by_user_id.load(ObjectId::new()).await.unwrap();
        assert!(none.is_empty());
    }
}
