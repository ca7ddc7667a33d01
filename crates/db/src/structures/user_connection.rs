//! External account bindings.

use bson::Document;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use emotes_common::AppResult;

use super::EmoteSet;

/// External platform of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserConnectionPlatform {
    /// Twitch.
    Twitch,
    /// YouTube.
    Youtube,
    /// Discord.
    Discord,
}

/// OAuth grant held for a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConnectionGrant {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    #[serde(default)]
    pub refresh_token: String,
    /// Granted scopes.
    #[serde(default)]
    pub scope: Vec<String>,
    /// Access token expiry.
    pub expires_at: bson::DateTime,
}

/// A user's binding to an external account.
///
/// `data` holds the platform payload. Read it raw as a [`Document`] or
/// [`convert`](UserConnection::convert) it into a platform struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConnection<D = Document> {
    /// Platform-side account id.
    pub id: String,
    /// Platform.
    pub platform: UserConnectionPlatform,
    /// When the binding was made.
    pub linked_at: bson::DateTime,
    /// Emote capacity granted through this connection.
    #[serde(default)]
    pub emote_slots: i32,
    /// Active emote set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emote_set_id: Option<bson::oid::ObjectId>,
    /// Platform payload.
    pub data: D,
    /// OAuth grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant: Option<UserConnectionGrant>,

    /// Active emote set (relational).
    #[serde(default, skip_serializing)]
    pub emote_set: Option<Box<EmoteSet>>,
}

impl<D> UserConnection<D> {
    fn with_data<T>(self, data: T) -> UserConnection<T> {
        UserConnection {
            id: self.id,
            platform: self.platform,
            linked_at: self.linked_at,
            emote_slots: self.emote_slots,
            emote_set_id: self.emote_set_id,
            data,
            grant: self.grant,
            emote_set: self.emote_set,
        }
    }
}

impl<D: Serialize> UserConnection<D> {
    /// Re-encode the payload as a raw document.
    pub fn to_raw(self) -> AppResult<UserConnection> {
        let data = bson::to_document(&self.data)?;
        Ok(self.with_data(data))
    }
}

impl UserConnection {
    /// Decode the payload into a platform struct.
    pub fn convert<T: DeserializeOwned>(mut self) -> AppResult<UserConnection<T>> {
        let data = bson::from_document(std::mem::take(&mut self.data))?;
        Ok(self.with_data(data))
    }
}

/// Twitch account payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwitchUserData {
    /// Twitch user id.
    pub id: String,
    /// Login name.
    pub login: String,
    /// Display name.
    pub display_name: String,
    /// `partner`, `affiliate` or empty.
    #[serde(default)]
    pub broadcaster_type: String,
    /// Channel description.
    #[serde(default)]
    pub description: String,
    /// Avatar URL.
    #[serde(default)]
    pub profile_image_url: String,
}

/// YouTube channel payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoutubeUserData {
    /// Channel id.
    pub id: String,
    /// Channel title.
    pub title: String,
    /// Channel description.
    #[serde(default)]
    pub description: String,
    /// Avatar URL.
    #[serde(default)]
    pub profile_image_url: String,
    /// Total views.
    #[serde(default)]
    pub view_count: i64,
}

/// Discord account payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordUserData {
    /// Snowflake id.
    pub id: String,
    /// Username.
    pub username: String,
    /// Legacy discriminator.
    #[serde(default)]
    pub discriminator: String,
    /// Avatar hash.
    #[serde(default)]
    pub avatar: String,
}
