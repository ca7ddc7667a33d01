//! Messages and per-recipient read states.

use std::collections::HashMap;

use bson::Document;
use bson::oid::ObjectId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use emotes_common::AppResult;

use super::{ObjectKind, User};

/// Message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A comment on an emote.
    EmoteComment,
    /// A request for moderator action.
    ModRequest,
    /// A direct notice.
    Inbox,
    /// A platform announcement.
    News,
}

/// A typed message payload.
pub trait MessageData: Serialize + DeserializeOwned {
    /// The kind this payload belongs to.
    const KIND: MessageKind;
}

/// A message with a kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<D = Document> {
    /// Message ID.
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Kind.
    pub kind: MessageKind,
    /// Author.
    pub author_id: ObjectId,
    /// Hide the author from recipients.
    #[serde(default)]
    pub anonymous: bool,
    /// Send time.
    pub created_at: bson::DateTime,
    /// Kind-specific payload.
    pub data: D,

    /// Author (relational).
    #[serde(default, skip_serializing)]
    pub author: Option<Box<User>>,
}

impl<D: MessageData> Message<D> {
    /// Create a message of the payload's kind.
    pub fn new(id: ObjectId, author_id: ObjectId, data: D) -> Self {
        Self {
            id,
            kind: D::KIND,
            author_id,
            anonymous: false,
            created_at: bson::DateTime::now(),
            data,
            author: None,
        }
    }
}

impl<D> Message<D> {
    fn with_data<T>(self, data: T) -> Message<T> {
        Message {
            id: self.id,
            kind: self.kind,
            author_id: self.author_id,
            anonymous: self.anonymous,
            created_at: self.created_at,
            data,
            author: self.author,
        }
    }
}

impl<D: Serialize> Message<D> {
    /// Re-encode the payload as a raw document.
    pub fn to_raw(self) -> AppResult<Message> {
        let data = bson::to_document(&self.data)?;
        Ok(self.with_data(data))
    }
}

impl Message {
    /// Decode the payload into a typed struct.
    pub fn convert<T: DeserializeOwned>(mut self) -> AppResult<Message<T>> {
        let data = bson::from_document(std::mem::take(&mut self.data))?;
        Ok(self.with_data(data))
    }
}

/// Inbox payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDataInbox {
    /// Subject line.
    pub subject: String,
    /// Body text. May contain `{{PLACEHOLDER}}` tokens.
    pub content: String,
    /// Flag as important.
    #[serde(default)]
    pub important: bool,
    /// Starred by the recipient.
    #[serde(default)]
    pub starred: bool,
    /// Pinned by the recipient.
    #[serde(default)]
    pub pinned: bool,
    /// Content locale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Sent by the platform.
    #[serde(default)]
    pub system: bool,
    /// Values substituted into `content`.
    #[serde(default)]
    pub placeholders: HashMap<String, String>,
}

impl MessageData for MessageDataInbox {
    const KIND: MessageKind = MessageKind::Inbox;
}

impl MessageDataInbox {
    /// Content with placeholders substituted.
    #[must_use]
    pub fn rendered(&self) -> String {
        self.placeholders
            .iter()
            .fold(self.content.clone(), |acc, (k, v)| acc.replace(&format!("{{{{{k}}}}}"), v))
    }
}

/// Mod-request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDataModRequest {
    /// Kind of the object to act on.
    pub target_kind: ObjectKind,
    /// Object to act on.
    pub target_id: ObjectId,
    /// Requested action, e.g. `list`.
    pub wish: String,
    /// Requester country.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_country_code: Option<String>,
}

impl MessageData for MessageDataModRequest {
    const KIND: MessageKind = MessageKind::ModRequest;
}

/// Emote comment payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDataEmoteComment {
    /// Commented emote.
    pub emote_id: ObjectId,
    /// Comment text.
    pub content: String,
}

impl MessageData for MessageDataEmoteComment {
    const KIND: MessageKind = MessageKind::EmoteComment;
}

/// Read state of a message for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRead {
    /// Row ID.
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Message.
    pub message_id: ObjectId,
    /// Message kind, copied for filtering.
    pub kind: MessageKind,
    /// Delivery time.
    pub timestamp: bson::DateTime,
    /// Recipient. Zero for the moderation queue.
    pub recipient_id: ObjectId,
    /// Read flag.
    #[serde(default)]
    pub read: bool,
    /// When the flag was last set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<bson::DateTime>,
}

impl MessageRead {
    /// An unread row for `recipient_id`.
    #[must_use]
    pub fn unread(id: ObjectId, message_id: ObjectId, kind: MessageKind, recipient_id: ObjectId) -> Self {
        Self {
            id,
            message_id,
            kind,
            timestamp: bson::DateTime::now(),
            recipient_id,
            read: false,
            read_at: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_inbox_placeholders() {
        let mut data = MessageDataInbox {
            subject: "Ban".to_string(),
            content: "You were banned until {{EXPIRE_AT}}.".to_string(),
            ..Default::default()
        };
        data.placeholders
            .insert("EXPIRE_AT".to_string(), "never".to_string());
        assert_eq!(data.rendered(), "You were banned until never.");
    }

    #[test]
    fn test_mod_request_raw() {
        let target = ObjectId::new();
        let msg = Message::new(
            ObjectId::new(),
            ObjectId::new(),
            MessageDataModRequest {
                target_kind: ObjectKind::Emote,
                target_id: target,
                wish: "list".to_string(),
                actor_country_code: None,
            },
        );
        assert_eq!(msg.kind, MessageKind::ModRequest);

        let raw = msg.to_raw().unwrap();
        assert_eq!(raw.data.get_i32("target_kind").unwrap(), 2);
        assert_eq!(raw.data.get_object_id("target_id").unwrap(), target);

        let doc = bson::to_document(&raw).unwrap();
        assert_eq!(doc.get_str("kind").unwrap(), "mod_request");
    }
}
