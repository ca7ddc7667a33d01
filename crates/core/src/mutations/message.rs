//! Message mutations: inbox delivery, mod requests and read states.

use std::collections::HashMap;

use bson::doc;
use bson::oid::ObjectId;
use tracing::{debug, info};

use emotes_common::{AppError, AppResult, ZERO_ID};
use emotes_db::builders::MessageBuilder;
use emotes_db::store::{by_id, find_as, find_one_as};
use emotes_db::structures::{
    AuditLogKind, Emote, Message, MessageDataInbox, MessageDataModRequest, MessageKind,
    MessageRead, ObjectKind, RolePermission, User, now,
};
use emotes_db::{Builder, Collection, FindOptions, WriteModel};

use super::{Mutator, require, store_error};

/// Options for [`Mutator::send_inbox_message`].
#[derive(Debug, Clone, Default)]
pub struct SendInboxOptions {
    /// Intended recipients.
    pub recipients: Vec<ObjectId>,
    /// Skip recipients who have blocked the author.
    pub consider_blocked_users: bool,
}

/// Options for [`Mutator::set_message_read_states`].
#[derive(Debug, Clone, Default)]
pub struct SetReadStatesOptions {
    /// Messages to mark.
    pub message_ids: Vec<ObjectId>,
    /// The new read flag.
    pub read: bool,
}

/// Outcome of a read state batch.
#[derive(Debug, Default)]
pub struct ReadStateResult {
    /// Read state rows matched by the update.
    pub updated: u64,
    /// Per-row failures. These do not abort the batch.
    pub errors: Vec<AppError>,
}

impl Mutator {
    /// Send an inbox message. Returns the ids of the users it was delivered
    /// to.
    pub async fn send_inbox_message(
        &self,
        actor: &User,
        b: &mut MessageBuilder<MessageDataInbox>,
        opt: SendInboxOptions,
    ) -> AppResult<Vec<ObjectId>> {
        b.ensure_usable()?;
        require(actor, RolePermission::SendMessages)?;
        self.deliver_inbox(actor.id, b, opt).await
    }

    /// Insert an inbox message and one unread row per recipient.
    pub(super) async fn deliver_inbox(
        &self,
        author_id: ObjectId,
        b: &mut MessageBuilder<MessageDataInbox>,
        opt: SendInboxOptions,
    ) -> AppResult<Vec<ObjectId>> {
        b.ensure_usable()?;

        let recipients: Vec<User> = find_as(
            self.store.as_ref(),
            Collection::Users,
            doc! { "_id": { "$in": opt.recipients } },
            FindOptions::default(),
        )
        .await
        .map_err(store_error)?;
        let recipients: Vec<ObjectId> = recipients
            .into_iter()
            .filter(|u| !opt.consider_blocked_users || !u.has_blocked(author_id))
            .map(|u| u.id)
            .collect();
        if recipients.is_empty() {
            debug!(author_id = %author_id, "No recipients left, message not sent");
            b.taint();
            return Ok(recipients);
        }

        self.insert(Collection::Messages, b).await?;
        let message_id = b.snapshot().id;

        let rows = recipients
            .iter()
            .map(|r| {
                let row = MessageRead::unread(self.id_gen.generate(), message_id, MessageKind::Inbox, *r);
                Ok(WriteModel::InsertOne {
                    document: bson::to_document(&row)?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;
        self.store
            .bulk_write(Collection::MessagesRead, rows)
            .await
            .map_err(store_error)?;

        info!(author_id = %author_id, message_id = %message_id, recipients = recipients.len(), "Inbox message sent");
        let log = self
            .audit_entry(AuditLogKind::SendMessage, author_id, ObjectKind::Message, message_id)
            .with_reason(b.snapshot().data.subject.clone());
        self.audit(log).await;
        Ok(recipients)
    }

    /// Ask moderators to act on an emote, e.g. to list it.
    ///
    /// Only one unread request per emote may be pending.
    pub async fn send_mod_request(
        &self,
        actor: &User,
        emote_id: ObjectId,
        wish: impl Into<String>,
        country_code: Option<String>,
    ) -> AppResult<ObjectId> {
        let emote: Emote = find_one_as(self.store.as_ref(), Collection::Emotes, by_id(emote_id))
            .await
            .map_err(store_error)?
            .ok_or_else(|| AppError::UnknownEmote(emote_id.to_hex()))?;
        if emote.owner_id != actor.id && !actor.has_permission(RolePermission::EditAnyEmote) {
            return Err(AppError::forbidden("you do not own this emote"));
        }

        let existing: Vec<Message> = find_as(
            self.store.as_ref(),
            Collection::Messages,
            doc! { "kind": "mod_request", "data.target_id": emote_id },
            FindOptions::default(),
        )
        .await
        .map_err(store_error)?;
        if !existing.is_empty() {
            let ids: Vec<ObjectId> = existing.iter().map(|m| m.id).collect();
            let pending = self
                .store
                .count(
                    Collection::MessagesRead,
                    doc! { "message_id": { "$in": ids }, "read": false },
                )
                .await
                .map_err(store_error)?;
            if pending > 0 {
                return Err(AppError::DontBeSilly(
                    "a request for this emote is already pending".into(),
                ));
            }
        }

        let data = MessageDataModRequest {
            target_kind: ObjectKind::Emote,
            target_id: emote_id,
            wish: wish.into(),
            actor_country_code: country_code,
        };
        let mut b = Builder::new(Message::new(self.id_gen.generate(), actor.id, data));
        self.insert(Collection::Messages, &mut b).await?;
        let message_id = b.snapshot().id;

        let row = MessageRead::unread(self.id_gen.generate(), message_id, MessageKind::ModRequest, ZERO_ID);
        self.store
            .insert_one(Collection::MessagesRead, bson::to_document(&row)?)
            .await
            .map_err(store_error)?;

        info!(actor_id = %actor.id, emote_id = %emote_id, message_id = %message_id, "Mod request sent");
        let log = self
            .audit_entry(AuditLogKind::SendMessage, actor.id, ObjectKind::Message, message_id)
            .with_reason(b.snapshot().data.wish.clone());
        self.audit(log).await;
        Ok(message_id)
    }

    /// Mark messages read or unread.
    ///
    /// Rows the actor may not touch are reported in
    /// [`ReadStateResult::errors`] and skipped.
    pub async fn set_message_read_states(
        &self,
        actor: &User,
        opt: SetReadStatesOptions,
    ) -> AppResult<ReadStateResult> {
        let rows: Vec<MessageRead> = find_as(
            self.store.as_ref(),
            Collection::MessagesRead,
            doc! { "message_id": { "$in": opt.message_ids.clone() } },
            FindOptions::default(),
        )
        .await
        .map_err(store_error)?;

        let mut result = ReadStateResult::default();
        for id in &opt.message_ids {
            if !rows.iter().any(|r| r.message_id == *id) {
                result.errors.push(AppError::UnknownMessage(id.to_hex()));
            }
        }

        let targets = self.mod_request_targets(&rows).await?;
        let manage_users = actor.has_permission(RolePermission::ManageUsers);
        let mut allowed = Vec::with_capacity(rows.len());
        for row in &rows {
            let permitted = match row.kind {
                MessageKind::ModRequest => targets.get(&row.message_id).is_some_and(|kind| {
                    mod_request_permission(*kind).is_some_and(|p| actor.has_permission(p))
                }),
                _ if row.recipient_id == actor.id || manage_users => true,
                // Other recipients' copies of a message the actor also received.
                _ if rows
                    .iter()
                    .any(|r| r.message_id == row.message_id && r.recipient_id == actor.id) =>
                {
                    continue;
                }
                _ => false,
            };
            if permitted {
                allowed.push(row.id);
            } else {
                result.errors.push(AppError::forbidden(format!(
                    "you cannot change the read state of message {}",
                    row.message_id
                )));
            }
        }

        if allowed.is_empty() {
            return Ok(result);
        }

        let read_at = now();
        let models = allowed
            .iter()
            .map(|id| WriteModel::UpdateOne {
                filter: by_id(*id),
                update: doc! { "$set": { "read": opt.read, "read_at": read_at } },
            })
            .collect();
        let written = self
            .store
            .bulk_write(Collection::MessagesRead, models)
            .await
            .map_err(store_error)?;
        result.updated = written.matched;

        info!(
            actor_id = %actor.id,
            updated = result.updated,
            failed = result.errors.len(),
            read = opt.read,
            "Message read states changed"
        );
        for id in &opt.message_ids {
            if rows.iter().any(|r| r.message_id == *id && allowed.contains(&r.id)) {
                self.audit(self.audit_entry(AuditLogKind::ReadMessage, actor.id, ObjectKind::Message, *id))
                    .await;
            }
        }
        Ok(result)
    }

    /// Target kinds of the mod requests among `rows`, keyed by message id.
    async fn mod_request_targets(&self, rows: &[MessageRead]) -> AppResult<HashMap<ObjectId, ObjectKind>> {
        let ids: Vec<ObjectId> = rows
            .iter()
            .filter(|r| r.kind == MessageKind::ModRequest)
            .map(|r| r.message_id)
            .collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let messages: Vec<Message<MessageDataModRequest>> = find_as(
            self.store.as_ref(),
            Collection::Messages,
            doc! { "_id": { "$in": ids } },
            FindOptions::default(),
        )
        .await
        .map_err(store_error)?;
        Ok(messages.into_iter().map(|m| (m.id, m.data.target_kind)).collect())
    }
}

/// Permission needed to handle a mod request about `kind`.
pub(crate) const fn mod_request_permission(kind: ObjectKind) -> Option<RolePermission> {
    match kind {
        ObjectKind::Emote => Some(RolePermission::EditAnyEmote),
        ObjectKind::EmoteSet => Some(RolePermission::EditAnyEmoteSet),
        ObjectKind::Report => Some(RolePermission::ManageReports),
        _ => None,
    }
}
