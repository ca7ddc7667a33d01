//! Object kinds shared by audit logs, reports, messages and events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a referenced object. Stored as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ObjectKind {
    /// A user.
    User,
    /// An emote.
    Emote,
    /// An emote set.
    EmoteSet,
    /// A role.
    Role,
    /// An entitlement.
    Entitlement,
    /// A ban.
    Ban,
    /// A message.
    Message,
    /// A report.
    Report,
    /// A cosmetic.
    Cosmetic,
}

impl ObjectKind {
    /// Lowercase name used in event types.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Emote => "emote",
            Self::EmoteSet => "emote_set",
            Self::Role => "role",
            Self::Entitlement => "entitlement",
            Self::Ban => "ban",
            Self::Message => "message",
            Self::Report => "report",
            Self::Cosmetic => "cosmetic",
        }
    }
}

impl From<ObjectKind> for i32 {
    fn from(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::User => 1,
            ObjectKind::Emote => 2,
            ObjectKind::EmoteSet => 3,
            ObjectKind::Role => 4,
            ObjectKind::Entitlement => 5,
            ObjectKind::Ban => 6,
            ObjectKind::Message => 7,
            ObjectKind::Report => 8,
            ObjectKind::Cosmetic => 10,
        }
    }
}

impl TryFrom<i32> for ObjectKind {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::User,
            2 => Self::Emote,
            3 => Self::EmoteSet,
            4 => Self::Role,
            5 => Self::Entitlement,
            6 => Self::Ban,
            7 => Self::Message,
            8 => Self::Report,
            10 => Self::Cosmetic,
            other => return Err(format!("unknown object kind {other}")),
        })
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
