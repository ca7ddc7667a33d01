//! Emote queries: lookup, search and channel listings.

use std::time::Duration;

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use serde::Deserialize;
use tracing::debug;

use emotes_common::AppResult;
use emotes_common::utils::content_hash;
use emotes_db::aggregations::Stage;
use emotes_db::structures::{
    Emote, EmoteFlags, EmoteLifecycle, Entitlement, RolePermission, User,
};
use emotes_db::{Collection, FindOptions};

use super::{
    ActiveBans, Query, Related, count_of, group_into, join_users, paginate, store_error,
};

const SEARCH_COUNT_TTL_EMPTY: Duration = Duration::from_secs(10 * 60);
const SEARCH_COUNT_TTL: Duration = Duration::from_secs(60 * 60);
const CHANNELS_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Result ordering for [`Query::search_emotes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSort {
    /// `popularity` or `age`.
    pub value: String,
    /// Ascending instead of descending.
    pub ascending: bool,
}

/// Options for [`Query::search_emotes`].
#[derive(Debug, Clone, Default)]
pub struct SearchEmotesOptions {
    /// Search text. Empty matches every visible emote.
    pub query: String,
    /// 1-based page.
    pub page: u64,
    /// Page size.
    pub limit: i64,
    /// Match whole words through the text index.
    pub exact: bool,
    /// Match `query` case-sensitively.
    pub case_sensitive: bool,
    /// Do not match tags.
    pub ignore_tags: bool,
    /// Optional ordering.
    pub sort: Option<SearchSort>,
}

#[derive(Debug, Default, Deserialize)]
struct EmotesAggregate {
    #[serde(default)]
    emotes: Vec<Emote>,
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    entitlements: Vec<Entitlement>,
}

impl Query {
    /// Emotes matching `filter` with their owners. Ban effects apply.
    pub async fn emotes(&self, filter: Document) -> AppResult<Vec<Emote>> {
        let mut pipeline = vec![Stage::Match(filter), group_into("emotes")];
        pipeline.extend(join_users("emotes.owner_id"));
        let agg: EmotesAggregate = self.aggregate_one(Collection::Emotes, pipeline).await?;
        let bans = self.bans().await?;
        self.bind_emotes(agg, &bans).await
    }

    /// The emote carrying version `id`.
    pub async fn emote(&self, id: ObjectId) -> AppResult<Option<Emote>> {
        Ok(self
            .emotes(doc! { "versions.id": id })
            .await?
            .into_iter()
            .next())
    }

    /// Search live emotes. Returns the page and the total match count.
    ///
    /// Actors without `EditAnyEmote` only see listed, non-private emotes.
    pub async fn search_emotes(
        &self,
        actor: Option<&User>,
        opt: SearchEmotesOptions,
    ) -> AppResult<(Vec<Emote>, u64)> {
        let bans = self.bans().await?;
        let privileged = actor.is_some_and(|a| a.has_permission(RolePermission::EditAnyEmote));
        let (skip, limit) = paginate(opt.page, opt.limit, self.limits.max_search_limit);

        let mut filter = doc! { "state.lifecycle": i32::from(EmoteLifecycle::Live) };
        if !privileged {
            filter.insert(
                "flags",
                doc! {
                    "$bitsAllSet": EmoteFlags::Listed.bits(),
                    "$bitsAllClear": EmoteFlags::Private.bits(),
                },
            );
        }
        if !bans.no_ownership.is_empty() {
            filter.insert("owner_id", doc! { "$nin": bans.no_ownership_ids() });
        }

        let query = if opt.case_sensitive {
            opt.query.trim().to_string()
        } else {
            opt.query.trim().to_lowercase()
        };
        let mut text_sort = None;
        if !query.is_empty() {
            if opt.exact {
                filter.insert("$text", doc! { "$search": query.clone() });
                text_sort = Some(doc! { "score": { "$meta": "textScore" } });
            } else {
                filter.insert("$expr", contains_expr(&query, opt.case_sensitive, opt.ignore_tags));
            }
        }

        let mut pipeline = Vec::new();
        if let Some(sort) = opt.sort.as_ref().and_then(sort_stage) {
            pipeline.push(sort);
        }
        pipeline.push(Stage::Match(filter.clone()));
        if let Some(sort) = text_sort {
            pipeline.push(Stage::Sort(sort));
        }
        pipeline.push(Stage::Skip(skip));
        pipeline.push(Stage::Limit(limit));
        pipeline.push(group_into("emotes"));
        pipeline.extend(join_users("emotes.owner_id"));

        let (total, agg) = tokio::try_join!(
            self.search_count(&filter, query.is_empty()),
            self.aggregate_one::<EmotesAggregate>(Collection::Emotes, pipeline),
        )?;
        let emotes = self.bind_emotes(agg, &bans).await?;
        debug!(query = %query, total, returned = emotes.len(), privileged, "Emote search");
        Ok((emotes, total))
    }

    /// Users who have `emote_id` active in a connection's emote set, most
    /// senior first. Returns the page and the total.
    pub async fn emote_channels(
        &self,
        emote_id: ObjectId,
        page: u64,
        limit: i64,
    ) -> AppResult<(Vec<User>, u64)> {
        let (skip, limit) = paginate(page, limit, self.limits.max_search_limit);
        let hex = emote_id.to_hex();

        let sets_key = self.cache.keys().key(&["emote", &hex, "active_sets"]);
        let set_ids = match self.cached::<Vec<ObjectId>>(&sets_key).await {
            Some(ids) => ids,
            None => {
                let sets: Vec<Document> = self
                    .store
                    .find(
                        Collection::EmoteSets,
                        doc! { "emotes.id": emote_id },
                        FindOptions {
                            projection: Some(doc! { "_id": 1 }),
                            ..FindOptions::default()
                        },
                    )
                    .await
                    .map_err(store_error)?;
                let ids: Vec<ObjectId> = sets
                    .iter()
                    .filter_map(|d| d.get_object_id("_id").ok())
                    .collect();
                self.cache.set_json_best_effort(&sets_key, &ids, CHANNELS_TTL).await;
                ids
            }
        };
        if set_ids.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let filter = doc! { "connections.emote_set_id": { "$in": set_ids } };
        let count_key = self.cache.keys().key(&["emote", &hex, "channel_count"]);
        let total = match self.cached::<u64>(&count_key).await {
            Some(n) => n,
            None => {
                let n = self
                    .store
                    .count(Collection::Users, filter.clone())
                    .await
                    .map_err(store_error)?;
                self.cache.set_json_best_effort(&count_key, &n, CHANNELS_TTL).await;
                n
            }
        };

        let pipeline = vec![
            Stage::Match(filter),
            Stage::Sort(doc! { "state.role_position": -1, "username": 1 }),
            Stage::Skip(skip),
            Stage::Limit(limit),
            group_into("users"),
            Stage::lookup(Collection::Entitlements, "users._id", "user_id", "entitlements"),
        ];
        let related: Related = self.aggregate_one(Collection::Users, pipeline).await?;
        let mut users = self.bind_users(related).await?;
        let bans = self.bans().await?;
        for user in &mut users {
            bans.user(user);
        }
        Ok((users, total))
    }

    /// Total matches of a search filter, cached by the filter's content.
    async fn search_count(&self, filter: &Document, empty_query: bool) -> AppResult<u64> {
        let key = self
            .cache
            .keys()
            .key(&["emote_search", "count", &content_hash(filter)?]);
        if let Some(n) = self.cached::<u64>(&key).await {
            return Ok(n);
        }

        let docs = self
            .store
            .aggregate(
                Collection::Emotes,
                vec![Stage::Match(filter.clone()), Stage::Count("count".into())],
            )
            .await
            .map_err(store_error)?;
        let n = count_of(&docs);
        let ttl = if empty_query {
            SEARCH_COUNT_TTL_EMPTY
        } else {
            SEARCH_COUNT_TTL
        };
        self.cache.set_json_best_effort(&key, &n, ttl).await;
        Ok(n)
    }

    async fn bind_emotes(&self, agg: EmotesAggregate, bans: &ActiveBans) -> AppResult<Vec<Emote>> {
        let binder = self.binder().await?;
        let users = binder.users(agg.users, &agg.entitlements);
        Ok(bans.emotes(binder.emotes(agg.emotes, &users)))
    }
}

/// `$expr` matching `query` as a substring of the name, or of the joined
/// tags unless `ignore_tags`.
fn contains_expr(query: &str, case_sensitive: bool, ignore_tags: bool) -> Document {
    let name = if case_sensitive {
        Bson::String("$name".into())
    } else {
        Bson::Document(doc! { "$toLower": "$name" })
    };
    let in_name = doc! { "$gt": [{ "$indexOfCP": [name, query] }, -1] };
    if ignore_tags {
        return in_name;
    }

    let in_tags = doc! { "$gt": [{ "$indexOfCP": [{ "$reduce": {
        "input": { "$ifNull": ["$tags", []] },
        "initialValue": " ",
        "in": { "$concat": ["$$value", " ", "$$this"] },
    } }, query] }, -1] };
    doc! { "$or": [in_name, in_tags] }
}

fn sort_stage(sort: &SearchSort) -> Option<Stage> {
    let field = match sort.value.as_str() {
        "popularity" => "versions.state.channel_count",
        "age" => "_id",
        _ => return None,
    };
    let mut keys = Document::new();
    keys.insert(field, if sort.ascending { 1 } else { -1 });
    Some(Stage::Sort(keys))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_expr_lowercases_name() {
        let expr = contains_expr("pepe", false, true);
        let args = expr.get_array("$gt").unwrap();
        let index = args[0].as_document().unwrap().get_array("$indexOfCP").unwrap();
        assert_eq!(index[0], Bson::Document(doc! { "$toLower": "$name" }));
        assert_eq!(index[1], Bson::String("pepe".into()));
    }

    #[test]
    fn test_contains_expr_includes_tags() {
        let expr = contains_expr("pepe", true, false);
        assert_eq!(expr.get_array("$or").unwrap().len(), 2);
    }

    #[test]
    fn test_sort_stage() {
        let sort = SearchSort {
            value: "popularity".into(),
            ascending: false,
        };
        assert_eq!(
            sort_stage(&sort),
            Some(Stage::Sort(doc! { "versions.state.channel_count": -1 }))
        );
        let unknown = SearchSort {
            value: "random".into(),
            ascending: true,
        };
        assert_eq!(sort_stage(&unknown), None);
    }
}
