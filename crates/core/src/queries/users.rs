//! User queries.

use bson::oid::ObjectId;
use bson::{Document, doc};
use tracing::debug;

use emotes_common::AppResult;
use emotes_db::aggregations::{
    Stage, user_connection_emote_set_relation, user_relation_editor_of, user_relation_editors,
    user_relation_roles,
};
use emotes_db::store::by_id;
use emotes_db::structures::User;
use emotes_db::{Collection, Fragment};

use super::{Query, Related, count_of, group_into, paginate, store_error};

/// Options for [`Query::search_users`].
#[derive(Debug, Clone, Default)]
pub struct SearchUsersOptions {
    /// Case-insensitive username fragment. Empty matches everyone.
    pub query: String,
    /// 1-based page.
    pub page: u64,
    /// Page size.
    pub limit: i64,
}

impl Query {
    /// Users matching `filter` with resolved roles.
    pub async fn users(&self, filter: Document) -> AppResult<Vec<User>> {
        let pipeline = vec![
            Stage::Match(filter),
            group_into("users"),
            Stage::lookup(Collection::Entitlements, "users._id", "user_id", "entitlements"),
        ];
        let related: Related = self.aggregate_one(Collection::Users, pipeline).await?;
        let mut users = self.bind_users(related).await?;

        let bans = self.bans().await?;
        for user in &mut users {
            bans.user(user);
        }
        Ok(users)
    }

    /// One user with resolved roles.
    pub async fn user(&self, id: ObjectId) -> AppResult<Option<User>> {
        Ok(self.users(by_id(id)).await?.into_iter().next())
    }

    /// One user with roles, editors, editor-of and connection emote sets.
    pub async fn user_profile(&self, id: ObjectId) -> AppResult<Option<User>> {
        let pipeline = Fragment::new()
            .then(Stage::Match(by_id(id)))
            .then(Stage::Limit(1))
            .concat(user_relation_roles())
            .concat(user_relation_editors())
            .concat(user_relation_editor_of())
            .concat(user_connection_emote_set_relation());

        let docs = self
            .store
            .aggregate(Collection::Users, pipeline.into_pipeline())
            .await
            .map_err(store_error)?;
        let Some(doc) = docs.into_iter().next() else {
            return Ok(None);
        };
        let mut user: User = bson::from_document(doc)?;

        self.binder().await?.resolve_roles(&mut user);
        let bans = self.bans().await?;
        bans.user(&mut user);
        for conn in &mut user.connections {
            if let Some(set) = conn.emote_set.as_deref_mut() {
                bans.emote_set(set);
            }
        }
        Ok(Some(user))
    }

    /// Page through users by username. Returns the page and the total.
    pub async fn search_users(&self, opt: SearchUsersOptions) -> AppResult<(Vec<User>, u64)> {
        let bans = self.bans().await?;
        let (skip, limit) = paginate(opt.page, opt.limit, self.limits.max_search_limit);

        let mut filter = Document::new();
        let query = opt.query.trim().to_lowercase();
        if !query.is_empty() {
            filter.insert("username", doc! { "$regex": regex::escape(&query), "$options": "i" });
        }

        let count_pipeline = vec![Stage::Match(filter.clone()), Stage::Count("count".into())];
        let mut pipeline = vec![
            Stage::Match(filter),
            Stage::Sort(doc! { "state.role_position": -1, "username": 1 }),
            Stage::Skip(skip),
            Stage::Limit(limit),
        ];
        if !bans.memory_hole.is_empty() {
            pipeline.push(Stage::Set(doc! {
                "editors": { "$filter": {
                    "input": { "$ifNull": ["$editors", []] },
                    "as": "e",
                    "cond": { "$not": [{ "$in": ["$$e.id", bans.memory_hole_ids()] }] },
                } },
            }));
        }
        pipeline.push(group_into("users"));
        pipeline.push(Stage::lookup(
            Collection::Entitlements,
            "users._id",
            "user_id",
            "entitlements",
        ));

        let (counted, related) = tokio::try_join!(
            async {
                self.store
                    .aggregate(Collection::Users, count_pipeline)
                    .await
                    .map_err(store_error)
            },
            self.aggregate_one::<Related>(Collection::Users, pipeline),
        )?;
        let total = count_of(&counted);
        let users = self.bind_users(related).await?;
        debug!(query = %query, total, returned = users.len(), "User search");
        Ok((users, total))
    }
}
