//! Emote entity.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use emotes_common::{AppError, AppResult, BitField};

use super::{EMOTE_NAME_REGEX, EMOTE_TAG_REGEX, EMOTE_VERSION_NAME_REGEX, EmoteFlags, User};

/// Processing lifecycle. Stored as an integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum EmoteLifecycle {
    /// Processing failed.
    Failed,
    /// Deleted by the owner or a moderator.
    Deleted,
    /// Waiting for processing.
    #[default]
    Pending,
    /// Being processed.
    Processing,
    /// Disabled by a moderator.
    Disabled,
    /// Usable.
    Live,
}

impl EmoteLifecycle {
    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Transitions only move forward, except between `Deleted` and `Live`.
    #[must_use]
    pub fn can_transition(self, next: Self) -> bool {
        next >= self || (self == Self::Live && next == Self::Deleted)
    }
}

impl From<EmoteLifecycle> for i32 {
    fn from(l: EmoteLifecycle) -> Self {
        match l {
            EmoteLifecycle::Failed => -2,
            EmoteLifecycle::Deleted => -1,
            EmoteLifecycle::Pending => 0,
            EmoteLifecycle::Processing => 1,
            EmoteLifecycle::Disabled => 2,
            EmoteLifecycle::Live => 3,
        }
    }
}

impl TryFrom<i32> for EmoteLifecycle {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            -2 => Self::Failed,
            -1 => Self::Deleted,
            0 => Self::Pending,
            1 => Self::Processing,
            2 => Self::Disabled,
            3 => Self::Live,
            other => return Err(format!("unknown emote lifecycle {other}")),
        })
    }
}

/// Emote state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmoteState {
    /// Lifecycle.
    #[serde(default)]
    pub lifecycle: EmoteLifecycle,
}

/// One rendition size of a format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmoteFormatSize {
    /// Scale label, e.g. `1x`.
    pub scale: String,
    /// Width in pixels.
    #[serde(rename = "w")]
    pub width: i32,
    /// Height in pixels.
    #[serde(rename = "h")]
    pub height: i32,
    /// Whether the rendition is animated.
    #[serde(default)]
    pub animated: bool,
    /// Byte length.
    #[serde(default)]
    pub length: i64,
    /// Processing time in milliseconds.
    #[serde(default)]
    pub time: i64,
}

/// An encoded format with its sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmoteFormat {
    /// MIME type.
    pub name: String,
    /// Sizes.
    #[serde(default)]
    pub sizes: Vec<EmoteFormatSize>,
}

/// A stored image file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFile {
    /// File name, e.g. `2x.webp`.
    pub name: String,
    /// Object storage key.
    pub key: String,
    /// Object storage bucket.
    #[serde(default)]
    pub bucket: String,
    /// MIME type.
    #[serde(default)]
    pub content_type: String,
    /// Width in pixels.
    #[serde(default)]
    pub width: i32,
    /// Height in pixels.
    #[serde(default)]
    pub height: i32,
    /// Frame count.
    #[serde(default)]
    pub frame_count: i32,
    /// Byte size.
    #[serde(default)]
    pub size: i64,
}

/// State of one version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmoteVersionState {
    /// Lifecycle.
    #[serde(default)]
    pub lifecycle: EmoteLifecycle,
    /// Number of sets this version is active in.
    #[serde(default)]
    pub channel_count: i32,
}

/// One uploaded revision of an emote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmoteVersion {
    /// Version id. Active emotes reference this id.
    pub id: ObjectId,
    /// Version name.
    #[serde(default)]
    pub name: String,
    /// Version description.
    #[serde(default)]
    pub description: String,
    /// Upload time.
    pub created_at: bson::DateTime,
    /// Stored files.
    #[serde(default)]
    pub image_files: Vec<ImageFile>,
    /// State.
    #[serde(default)]
    pub state: EmoteVersionState,
}

impl EmoteVersion {
    /// A new pending version.
    #[must_use]
    pub fn new(id: ObjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            created_at: bson::DateTime::now(),
            image_files: Vec::new(),
            state: EmoteVersionState::default(),
        }
    }
}

/// An uploaded emote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Emote {
    /// Emote ID.
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// Owner.
    pub owner_id: ObjectId,

    /// Name.
    #[validate(regex(path = *EMOTE_NAME_REGEX))]
    pub name: String,

    /// Raw [`EmoteFlags`] bits.
    #[serde(default)]
    pub flags: i32,

    /// Search tags.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Frame count of the source.
    #[serde(default)]
    pub frame_count: i32,

    /// Encoded formats.
    #[serde(default)]
    pub formats: Vec<EmoteFormat>,

    /// State.
    #[serde(default)]
    pub state: EmoteState,

    /// Emote this one was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ObjectId>,

    /// Emotes derived from this one.
    #[serde(default)]
    pub children_ids: Vec<ObjectId>,

    /// Versions, newest last.
    #[serde(default)]
    pub versions: Vec<EmoteVersion>,

    /// Owner (relational).
    #[serde(default, skip_serializing)]
    pub owner: Option<Box<User>>,
}

impl Emote {
    /// A live emote with a single version sharing the emote's id.
    pub fn new(id: ObjectId, owner_id: ObjectId, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut version = EmoteVersion::new(id, name.clone());
        version.state.lifecycle = EmoteLifecycle::Live;
        Self {
            id,
            owner_id,
            name,
            flags: 0,
            tags: Vec::new(),
            frame_count: 1,
            formats: Vec::new(),
            state: EmoteState {
                lifecycle: EmoteLifecycle::Live,
            },
            parent_id: None,
            children_ids: Vec::new(),
            versions: vec![version],
            owner: None,
        }
    }

    /// Flags as a typed bitfield.
    #[must_use]
    pub fn emote_flags(&self) -> EmoteFlags {
        EmoteFlags::from(self.flags)
    }

    /// Whether the private flag is set.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.emote_flags().has(EmoteFlags::Private)
    }

    /// Whether the listed flag is set.
    #[must_use]
    pub fn is_listed(&self) -> bool {
        self.emote_flags().has(EmoteFlags::Listed)
    }

    /// Version by id.
    #[must_use]
    pub fn version(&self, id: ObjectId) -> Option<(usize, &EmoteVersion)> {
        self.versions.iter().enumerate().find(|(_, v)| v.id == id)
    }

    /// Whether any version carries `id`.
    #[must_use]
    pub fn has_version(&self, id: ObjectId) -> bool {
        self.version(id).is_some()
    }

    /// Run field validators and structural checks.
    pub fn check(&self) -> AppResult<()> {
        self.validate()?;

        for (i, tag) in self.tags.iter().enumerate() {
            if !EMOTE_TAG_REGEX.is_match(tag) {
                return Err(AppError::ValidationRejected(format!("tag '{tag}' is invalid")));
            }
            if self.tags[..i].contains(tag) {
                return Err(AppError::ValidationRejected(format!("tag '{tag}' is repeated")));
            }
        }

        for v in &self.versions {
            if !v.name.is_empty() && !EMOTE_VERSION_NAME_REGEX.is_match(&v.name) {
                return Err(AppError::ValidationRejected(format!(
                    "version name '{}' is invalid",
                    v.name
                )));
            }
        }
        Ok(())
    }
}
