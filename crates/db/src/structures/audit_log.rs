//! Audit log entries.

use bson::oid::ObjectId;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use emotes_common::AppResult;

use super::ObjectKind;

/// What happened. Stored as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum AuditLogKind {
    /// Emote uploaded.
    CreateEmote,
    /// Emote deleted.
    DeleteEmote,
    /// Emote disabled.
    DisableEmote,
    /// Emote edited.
    UpdateEmote,
    /// Emote merged into another.
    MergeEmote,
    /// Emote deletion undone.
    UndoDeleteEmote,
    /// Emote re-enabled.
    EnableEmote,

    /// User token issued.
    SignUserToken,
    /// CSRF token issued.
    SignCsrfToken,

    /// User created.
    CreateUser,
    /// User deleted.
    DeleteUser,
    /// User banned.
    BanUser,
    /// User edited.
    EditUser,
    /// Ban lifted or changed.
    UnbanUser,

    /// Role created.
    CreateRole,
    /// Role edited.
    EditRole,
    /// Role deleted.
    DeleteRole,

    /// Emote set created.
    CreateEmoteSet,
    /// Emote set edited.
    UpdateEmoteSet,
    /// Emote set deleted.
    DeleteEmoteSet,

    /// Report filed.
    CreateReport,
    /// Report edited.
    UpdateReport,

    /// Message read state changed.
    ReadMessage,
    /// Message sent.
    SendMessage,
}

impl From<AuditLogKind> for i32 {
    fn from(kind: AuditLogKind) -> Self {
        use AuditLogKind as K;
        match kind {
            K::CreateEmote => 1,
            K::DeleteEmote => 2,
            K::DisableEmote => 3,
            K::UpdateEmote => 4,
            K::MergeEmote => 5,
            K::UndoDeleteEmote => 6,
            K::EnableEmote => 7,
            K::SignUserToken => 20,
            K::SignCsrfToken => 21,
            K::CreateUser => 30,
            K::DeleteUser => 31,
            K::BanUser => 32,
            K::EditUser => 33,
            K::UnbanUser => 36,
            K::CreateRole => 40,
            K::EditRole => 41,
            K::DeleteRole => 42,
            K::CreateEmoteSet => 70,
            K::UpdateEmoteSet => 71,
            K::DeleteEmoteSet => 72,
            K::CreateReport => 80,
            K::UpdateReport => 81,
            K::ReadMessage => 90,
            K::SendMessage => 91,
        }
    }
}

impl TryFrom<i32> for AuditLogKind {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        use AuditLogKind as K;
        Ok(match value {
            1 => K::CreateEmote,
            2 => K::DeleteEmote,
            3 => K::DisableEmote,
            4 => K::UpdateEmote,
            5 => K::MergeEmote,
            6 => K::UndoDeleteEmote,
            7 => K::EnableEmote,
            20 => K::SignUserToken,
            21 => K::SignCsrfToken,
            30 => K::CreateUser,
            31 => K::DeleteUser,
            32 => K::BanUser,
            33 => K::EditUser,
            36 => K::UnbanUser,
            40 => K::CreateRole,
            41 => K::EditRole,
            42 => K::DeleteRole,
            70 => K::CreateEmoteSet,
            71 => K::UpdateEmoteSet,
            72 => K::DeleteEmoteSet,
            80 => K::CreateReport,
            81 => K::UpdateReport,
            90 => K::ReadMessage,
            91 => K::SendMessage,
            other => return Err(format!("unknown audit log kind {other}")),
        })
    }
}

/// How a change value is shaped. Stored as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum AuditLogChangeFormat {
    /// [`AuditLogChangeSingleValue`].
    SingleValue,
    /// [`AuditLogChangeArray`].
    ArrayChange,
}

impl From<AuditLogChangeFormat> for i32 {
    fn from(f: AuditLogChangeFormat) -> Self {
        match f {
            AuditLogChangeFormat::SingleValue => 1,
            AuditLogChangeFormat::ArrayChange => 2,
        }
    }
}

impl TryFrom<i32> for AuditLogChangeFormat {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::SingleValue),
            2 => Ok(Self::ArrayChange),
            other => Err(format!("unknown change format {other}")),
        }
    }
}

/// A scalar change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogChangeSingleValue {
    /// Value before.
    #[serde(rename = "o")]
    pub old: Bson,
    /// Value after.
    #[serde(rename = "n")]
    pub new: Bson,
    /// Array position, for element updates.
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
}

/// A change to an array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditLogChangeArray {
    /// Appended elements.
    #[serde(default)]
    pub added: Vec<Bson>,
    /// Removed elements.
    #[serde(default)]
    pub removed: Vec<Bson>,
    /// Changed elements.
    #[serde(default)]
    pub updated: Vec<AuditLogChangeSingleValue>,
}

impl AuditLogChangeArray {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// One field-level change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogChange {
    /// Shape of `value`.
    pub format: AuditLogChangeFormat,
    /// Changed field.
    pub key: String,
    /// Encoded change.
    pub value: Bson,
}

impl AuditLogChange {
    /// A scalar change from `old` to `new`.
    pub fn single<O: Serialize, N: Serialize>(
        key: impl Into<String>,
        old: &O,
        new: &N,
        position: Option<i32>,
    ) -> AppResult<Self> {
        let value = AuditLogChangeSingleValue {
            old: bson::to_bson(old)?,
            new: bson::to_bson(new)?,
            position,
        };
        Ok(Self {
            format: AuditLogChangeFormat::SingleValue,
            key: key.into(),
            value: bson::to_bson(&value)?,
        })
    }

    /// An array change.
    pub fn array(key: impl Into<String>, change: &AuditLogChangeArray) -> AppResult<Self> {
        Ok(Self {
            format: AuditLogChangeFormat::ArrayChange,
            key: key.into(),
            value: bson::to_bson(change)?,
        })
    }
}

/// A record of one mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    /// Entry ID.
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// What happened.
    pub kind: AuditLogKind,
    /// Who did it.
    pub actor_id: ObjectId,
    /// Object acted on.
    pub target_id: ObjectId,
    /// Kind of the object acted on.
    pub target_kind: ObjectKind,
    /// Field-level changes.
    #[serde(default)]
    pub changes: Vec<AuditLogChange>,
    /// Free-form context.
    #[serde(default)]
    pub extra: Document,
    /// Reason given by the actor.
    #[serde(default)]
    pub reason: String,
}

impl AuditLog {
    /// An entry with no changes.
    #[must_use]
    pub fn new(
        id: ObjectId,
        kind: AuditLogKind,
        actor_id: ObjectId,
        target_kind: ObjectKind,
        target_id: ObjectId,
    ) -> Self {
        Self {
            id,
            kind,
            actor_id,
            target_id,
            target_kind,
            changes: Vec::new(),
            extra: Document::new(),
            reason: String::new(),
        }
    }

    /// Append a change.
    #[must_use]
    pub fn with_change(mut self, change: AuditLogChange) -> Self {
        self.changes.push(change);
        self
    }

    /// Set the reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}
