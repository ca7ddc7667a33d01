//! Emote set entity.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use emotes_common::{AppError, AppResult};

use super::{ActiveEmoteFlags, Emote, User, zero_id};

/// An emote enabled in a set under a local name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEmote {
    /// Emote version id.
    pub id: ObjectId,
    /// Name within the set.
    pub name: String,
    /// Raw [`ActiveEmoteFlags`] bits.
    #[serde(default)]
    pub flags: i32,
    /// When the emote was enabled.
    pub timestamp: bson::DateTime,
    /// Who enabled it.
    #[serde(default = "zero_id")]
    pub actor_id: ObjectId,

    /// The emote (relational).
    #[serde(default, skip_serializing)]
    pub emote: Option<Box<Emote>>,
    /// The actor (relational).
    #[serde(default, skip_serializing)]
    pub actor: Option<Box<User>>,
}

impl ActiveEmote {
    /// A freshly enabled emote.
    pub fn new(id: ObjectId, name: impl Into<String>, flags: ActiveEmoteFlags, actor_id: ObjectId) -> Self {
        Self {
            id,
            name: name.into(),
            flags: flags.bits(),
            timestamp: bson::DateTime::now(),
            actor_id,
            emote: None,
            actor: None,
        }
    }
}

/// A named collection of active emotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EmoteSet {
    /// Set ID.
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// Name.
    #[validate(length(min = 1, max = 48))]
    pub name: String,

    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Frozen against edits.
    #[serde(default)]
    pub immutable: bool,

    /// Editable only by the owner or a super-administrator.
    #[serde(default)]
    pub privileged: bool,

    /// Active emotes.
    #[serde(default)]
    pub emotes: Vec<ActiveEmote>,

    /// Capacity.
    #[serde(default)]
    pub emote_slots: i32,

    /// Set this one was forked from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ObjectId>,

    /// Owner.
    #[serde(default = "zero_id")]
    pub owner_id: ObjectId,

    /// Owner (relational).
    #[serde(default, skip_serializing)]
    pub owner: Option<Box<User>>,
}

impl EmoteSet {
    /// An empty set.
    pub fn new(id: ObjectId, owner_id: ObjectId, name: impl Into<String>, emote_slots: i32) -> Self {
        Self {
            id,
            name: name.into(),
            tags: Vec::new(),
            immutable: false,
            privileged: false,
            emotes: Vec::new(),
            emote_slots,
            parent_id: None,
            owner_id,
            owner: None,
        }
    }

    /// Active emote by id, with its index.
    #[must_use]
    pub fn active(&self, id: ObjectId) -> Option<(usize, &ActiveEmote)> {
        self.emotes.iter().enumerate().find(|(_, e)| e.id == id)
    }

    /// Whether another active emote than `except` already uses `name`.
    #[must_use]
    pub fn name_taken(&self, name: &str, except: Option<ObjectId>) -> bool {
        self.emotes
            .iter()
            .any(|e| e.name == name && Some(e.id) != except)
    }

    /// Whether the set has no free slots.
    #[must_use]
    pub fn is_full(&self) -> bool {
        i32::try_from(self.emotes.len()).unwrap_or(i32::MAX) >= self.emote_slots
    }

    /// Check that active ids and names are unique.
    pub fn check_active_emotes(&self) -> AppResult<()> {
        for (i, e) in self.emotes.iter().enumerate() {
            let earlier = &self.emotes[..i];
            if earlier.iter().any(|o| o.id == e.id) {
                return Err(AppError::EmoteAlreadyEnabled(e.id.to_hex()));
            }
            if earlier.iter().any(|o| o.name == e.name) {
                return Err(AppError::EmoteNameConflict {
                    name: e.name.clone(),
                });
            }
        }
        Ok(())
    }
}
