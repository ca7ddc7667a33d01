//! Ban entity.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{BanEffect, User, never};

/// A restriction placed on a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Ban {
    /// Ban ID.
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Banned user.
    pub victim_id: ObjectId,
    /// Moderator who issued the ban.
    pub actor_id: ObjectId,
    /// Reason shown to the victim.
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    /// Expiry. The epoch means never.
    #[serde(default = "never")]
    pub expire_at: bson::DateTime,
    /// Raw [`BanEffect`] bits.
    #[serde(default)]
    pub effects: i32,

    /// Victim (relational).
    #[serde(default, skip_serializing)]
    pub victim: Option<Box<User>>,
    /// Actor (relational).
    #[serde(default, skip_serializing)]
    pub actor: Option<Box<User>>,
}

impl Ban {
    /// Create a ban.
    pub fn new(
        id: ObjectId,
        victim_id: ObjectId,
        actor_id: ObjectId,
        reason: impl Into<String>,
        expire_at: bson::DateTime,
        effects: BanEffect,
    ) -> Self {
        Self {
            id,
            victim_id,
            actor_id,
            reason: reason.into(),
            expire_at,
            effects: effects.bits(),
            victim: None,
            actor: None,
        }
    }

    /// Effects as a typed bitfield.
    #[must_use]
    pub fn effect_flags(&self) -> BanEffect {
        BanEffect::from(self.effects)
    }

    /// Whether the ban never expires.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.expire_at == never()
    }

    /// Whether the ban is in force at `now`.
    #[must_use]
    pub fn is_active(&self, now: bson::DateTime) -> bool {
        self.is_permanent() || self.expire_at > now
    }
}
