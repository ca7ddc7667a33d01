//! Emote set queries.

use bson::oid::ObjectId;
use bson::{Document, doc};
use serde::Deserialize;

use emotes_common::AppResult;
use emotes_db::aggregations::{Stage, emote_set_relation_active_emotes, emote_set_relation_owner};
use emotes_db::store::by_id;
use emotes_db::structures::{Emote, EmoteSet, Entitlement, User};
use emotes_db::{Collection, Fragment};

use super::{Query, group_into, store_error};

#[derive(Debug, Default, Deserialize)]
struct EmoteSetsAggregate {
    #[serde(default)]
    sets: Vec<EmoteSet>,
    #[serde(default)]
    emotes: Vec<Emote>,
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    emote_owners: Vec<User>,
    #[serde(default)]
    actors: Vec<User>,
    #[serde(default)]
    entitlements: Vec<Entitlement>,
    #[serde(default)]
    owner_entitlements: Vec<Entitlement>,
    #[serde(default)]
    actor_entitlements: Vec<Entitlement>,
}

impl Query {
    /// Emote sets matching `filter` with owners, active emotes, their owners
    /// and the actors who enabled them. Ban effects apply to active emotes.
    pub async fn emote_sets(&self, filter: Document) -> AppResult<Vec<EmoteSet>> {
        let pipeline = vec![
            Stage::Match(filter),
            group_into("sets"),
            Stage::lookup(Collection::Emotes, "sets.emotes.id", "versions.id", "emotes"),
            Stage::lookup(Collection::Users, "sets.owner_id", "_id", "users"),
            Stage::lookup(Collection::Users, "emotes.owner_id", "_id", "emote_owners"),
            Stage::lookup(Collection::Users, "sets.emotes.actor_id", "_id", "actors"),
            Stage::lookup(Collection::Entitlements, "users._id", "user_id", "entitlements"),
            Stage::lookup(
                Collection::Entitlements,
                "emote_owners._id",
                "user_id",
                "owner_entitlements",
            ),
            Stage::lookup(
                Collection::Entitlements,
                "actors._id",
                "user_id",
                "actor_entitlements",
            ),
        ];
        let agg: EmoteSetsAggregate = self.aggregate_one(Collection::EmoteSets, pipeline).await?;

        let binder = self.binder().await?;
        let mut entitlements = agg.entitlements;
        entitlements.extend(agg.owner_entitlements);
        entitlements.extend(agg.actor_entitlements);
        let mut users = agg.users;
        for u in agg.emote_owners.into_iter().chain(agg.actors) {
            if !users.iter().any(|o| o.id == u.id) {
                users.push(u);
            }
        }
        let users = binder.users(users, &entitlements);

        let bans = self.bans().await?;
        let mut sets = binder.emote_sets(agg.sets, agg.emotes, &users);
        for set in &mut sets {
            bans.emote_set(set);
        }
        Ok(sets)
    }

    /// One emote set.
    pub async fn emote_set(&self, id: ObjectId) -> AppResult<Option<EmoteSet>> {
        Ok(self.emote_sets(by_id(id)).await?.into_iter().next())
    }

    /// Emote sets owned by `user_id`.
    pub async fn user_emote_sets(&self, user_id: ObjectId) -> AppResult<Vec<EmoteSet>> {
        self.emote_sets(doc! { "owner_id": user_id }).await
    }

    /// One emote set joined through nested lookups, with each active emote's
    /// owner and the set owner's roles resolved by the store.
    pub async fn emote_set_with_relations(&self, id: ObjectId) -> AppResult<Option<EmoteSet>> {
        let pipeline = Fragment::new()
            .then(Stage::Match(by_id(id)))
            .then(Stage::Limit(1))
            .concat(emote_set_relation_active_emotes(true))
            .concat(emote_set_relation_owner());

        let docs = self
            .store
            .aggregate(Collection::EmoteSets, pipeline.into_pipeline())
            .await
            .map_err(store_error)?;
        let Some(doc) = docs.into_iter().next() else {
            return Ok(None);
        };
        let mut set: EmoteSet = bson::from_document(doc)?;
        self.bans().await?.emote_set(&mut set);
        Ok(Some(set))
    }
}
