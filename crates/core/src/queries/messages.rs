//! Message queries.

use bson::oid::ObjectId;
use bson::{Bson, doc};
use serde::Deserialize;

use emotes_common::{AppError, AppResult};
use emotes_db::aggregations::Stage;
use emotes_db::structures::{
    Entitlement, Message, MessageDataModRequest, ObjectKind, User,
};
use emotes_db::Collection;

use super::{Query, group_into, join_users};
use crate::mutations::mod_request_permission;

/// Options for [`Query::mod_request_messages`].
#[derive(Debug, Clone, Default)]
pub struct ModRequestOptions {
    /// Only messages older than this id.
    pub after: Option<ObjectId>,
    /// Page size.
    pub limit: i64,
}

#[derive(Debug, Default, Deserialize)]
struct MessagesAggregate {
    #[serde(default)]
    messages: Vec<Message<MessageDataModRequest>>,
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    entitlements: Vec<Entitlement>,
}

impl Query {
    /// Unread mod requests about object kinds the actor can act on, newest
    /// first, with their authors.
    pub async fn mod_request_messages(
        &self,
        actor: &User,
        opt: ModRequestOptions,
    ) -> AppResult<Vec<Message<MessageDataModRequest>>> {
        let kinds: Vec<Bson> = [ObjectKind::Emote, ObjectKind::EmoteSet, ObjectKind::Report]
            .into_iter()
            .filter(|k| mod_request_permission(*k).is_some_and(|p| actor.has_permission(p)))
            .map(|k| Bson::Int32(i32::from(k)))
            .collect();
        if kinds.is_empty() {
            return Err(AppError::forbidden("you cannot view mod requests"));
        }

        let mut read_filter = doc! { "kind": "mod_request", "read": false };
        if let Some(after) = opt.after {
            read_filter.insert("message_id", doc! { "$lt": after });
        }
        let limit = opt.limit.clamp(1, self.limits.max_search_limit.max(1));

        let mut pipeline = vec![
            Stage::Match(read_filter),
            Stage::lookup(Collection::Messages, "message_id", "_id", "message"),
            Stage::unwind("message", false),
            Stage::ReplaceRoot(Bson::String("$message".into())),
            Stage::Match(doc! { "data.target_kind": { "$in": kinds } }),
            Stage::Sort(doc! { "_id": -1 }),
            Stage::Limit(limit),
            group_into("messages"),
        ];
        pipeline.extend(join_users("messages.author_id"));

        let agg: MessagesAggregate = self.aggregate_one(Collection::MessagesRead, pipeline).await?;
        let binder = self.binder().await?;
        let users = binder.users(agg.users, &agg.entitlements);
        Ok(agg
            .messages
            .into_iter()
            .map(|mut m| {
                if !m.anonymous {
                    m.author = users.get(&m.author_id).cloned().map(Box::new);
                }
                m
            })
            .collect())
    }
}
