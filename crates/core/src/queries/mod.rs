//! Query engine.
//!
//! Queries compose read pipelines that group their matches into a single
//! denormalized document together with the related users and their role
//! entitlements. A [`Binder`] reassembles object graphs from that document
//! and [`ActiveBans`] hides what banned users own.

mod binder;
mod emote_sets;
mod emotes;
mod messages;
mod moderation;
mod roles;
mod users;

pub use binder::Binder;
pub use emotes::{SearchEmotesOptions, SearchSort};
pub use messages::ModRequestOptions;
pub use users::SearchUsersOptions;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bson::oid::ObjectId;
use bson::{Document, doc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use emotes_common::config::LimitsConfig;
use emotes_common::{AppError, AppResult, Cache, LocalCache, ZERO_ID};
use emotes_db::aggregations::Stage;
use emotes_db::store::find_as;
use emotes_db::structures::{
    Ban, BanEffect, Emote, EmoteSet, Entitlement, Role, User, never, now,
};
use emotes_db::{Collection, DocumentStore, FindOptions};

const ROLE_CACHE_TTL: Duration = Duration::from_secs(10);
const GLOBAL_SET_CACHE_TTL: Duration = Duration::from_secs(30);

/// Users hidden by active bans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveBans {
    /// Users whose objects are omitted.
    pub no_ownership: HashSet<ObjectId>,
    /// Users whose id is replaced with the zero id.
    pub memory_hole: HashSet<ObjectId>,
}

impl ActiveBans {
    /// Collect the effects of the bans in force at `now`.
    #[must_use]
    pub fn from_bans(bans: &[Ban], now: bson::DateTime) -> Self {
        let mut out = Self::default();
        for ban in bans.iter().filter(|b| b.is_active(now)) {
            let effects = ban.effect_flags();
            if effects.contains(BanEffect::NoOwnership) {
                out.no_ownership.insert(ban.victim_id);
            }
            if effects.contains(BanEffect::MemoryHole) {
                out.memory_hole.insert(ban.victim_id);
            }
        }
        out
    }

    /// Whether no user is affected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.no_ownership.is_empty() && self.memory_hole.is_empty()
    }

    /// Apply ban effects to one emote. `None` means the emote is hidden.
    #[must_use]
    pub fn emote(&self, mut emote: Emote) -> Option<Emote> {
        if self.no_ownership.contains(&emote.owner_id) {
            return None;
        }
        if self.memory_hole.contains(&emote.owner_id) {
            emote.owner_id = ZERO_ID;
            emote.owner = None;
        }
        Some(emote)
    }

    /// Apply ban effects to a list of emotes.
    #[must_use]
    pub fn emotes(&self, emotes: Vec<Emote>) -> Vec<Emote> {
        emotes.into_iter().filter_map(|e| self.emote(e)).collect()
    }

    /// Drop hidden active emote relations from a set.
    pub fn emote_set(&self, set: &mut EmoteSet) {
        for active in &mut set.emotes {
            active.emote = active.emote.take().and_then(|e| self.emote(*e)).map(Box::new);
        }
    }

    /// Remove memory-holed users from a user's editors.
    pub fn user(&self, user: &mut User) {
        user.editors.retain(|e| !self.memory_hole.contains(&e.id));
    }

    fn memory_hole_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.memory_hole.iter().copied().collect();
        ids.sort();
        ids
    }

    fn no_ownership_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.no_ownership.iter().copied().collect();
        ids.sort();
        ids
    }
}

/// Users joined by an aggregate, with their entitlements.
#[derive(Debug, Default, Deserialize)]
struct Related {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    entitlements: Vec<Entitlement>,
}

/// Read access to the document store with caching.
pub struct Query {
    store: Arc<dyn DocumentStore>,
    cache: Cache,
    limits: LimitsConfig,
    role_cache: LocalCache<String, Vec<Role>>,
    global_set: LocalCache<(), EmoteSet>,
}

impl Query {
    /// Create a query engine with default limits.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, cache: Cache) -> Self {
        Self {
            store,
            cache,
            limits: LimitsConfig::default(),
            role_cache: LocalCache::new(ROLE_CACHE_TTL),
            global_set: LocalCache::new(GLOBAL_SET_CACHE_TTL),
        }
    }

    /// Use configured domain limits.
    #[must_use]
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Effects of every ban currently in force.
    pub async fn bans(&self) -> AppResult<ActiveBans> {
        let now = now();
        let bans: Vec<Ban> = find_as(
            self.store.as_ref(),
            Collection::Bans,
            doc! { "$or": [
                { "expire_at": { "$gt": now } },
                { "expire_at": never() },
            ] },
            FindOptions::default(),
        )
        .await
        .map_err(store_error)?;
        Ok(ActiveBans::from_bans(&bans, now))
    }

    /// A binder over every role.
    pub async fn binder(&self) -> AppResult<Binder> {
        Ok(Binder::new(self.roles(Document::new()).await?))
    }

    /// Run a grouping pipeline and decode its single output document.
    /// An empty match yields the default value.
    async fn aggregate_one<T>(&self, coll: Collection, pipeline: Vec<Stage>) -> AppResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let docs = self
            .store
            .aggregate(coll, pipeline)
            .await
            .map_err(store_error)?;
        match docs.into_iter().next() {
            Some(d) => Ok(bson::from_document(d)?),
            None => Ok(T::default()),
        }
    }

    /// Read a cached JSON value. Cache failures count as a miss.
    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get_json(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed");
                None
            }
        }
    }

    /// Bind the users of an aggregate, keeping their pipeline order.
    async fn bind_users(&self, related: Related) -> AppResult<Vec<User>> {
        let binder = self.binder().await?;
        let order: Vec<ObjectId> = related.users.iter().map(|u| u.id).collect();
        let mut bound = binder.users(related.users, &related.entitlements);
        debug!(users = bound.len(), "Bound users");
        Ok(order.into_iter().filter_map(|id| bound.remove(&id)).collect())
    }
}

/// Group every input document into `field`.
fn group_into(field: &str) -> Stage {
    let mut spec = doc! { "_id": null };
    spec.insert(field, doc! { "$push": "$$ROOT" });
    Stage::Group(spec)
}

/// Join the users referenced by `local_field` as `users`, then their
/// entitlements as `entitlements`.
fn join_users(local_field: &str) -> [Stage; 2] {
    [
        Stage::lookup(Collection::Users, local_field, "_id", "users"),
        Stage::lookup(Collection::Entitlements, "users._id", "user_id", "entitlements"),
    ]
}

/// Clamp a page size and turn a 1-based page into a skip count.
fn paginate(page: u64, limit: i64, max: i64) -> (u64, i64) {
    let limit = limit.clamp(1, max.max(1));
    let skip = page.saturating_sub(1).saturating_mul(limit.unsigned_abs());
    (skip, limit)
}

/// Read the `count` field of a counting pipeline's output.
fn count_of(docs: &[Document]) -> u64 {
    docs.first()
        .and_then(|d| d.get("count"))
        .and_then(|c| match c {
            bson::Bson::Int32(n) => u64::try_from(*n).ok(),
            bson::Bson::Int64(n) => u64::try_from(*n).ok(),
            _ => None,
        })
        .unwrap_or(0)
}

/// Surface a store failure as an internal error.
fn store_error(e: AppError) -> AppError {
    match e {
        AppError::InternalServerError(_) => e,
        other => AppError::internal(other),
    }
}
