//! User entity.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use emotes_common::{AppError, AppResult, BitField, ZERO_ID};

use super::{
    DISCRIMINATOR_REGEX, Emote, Role, RolePermission, UserConnection, UserConnectionPlatform,
    UserEditorPermission, fold_permissions,
};

/// Account type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    /// A person.
    #[default]
    Regular,
    /// An automated account.
    Bot,
    /// A platform-owned account.
    System,
}

/// Derived user state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    /// Position of the user's most senior role, kept for sorting.
    #[serde(default)]
    pub role_position: i32,
    /// Avatar awaiting processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_avatar_id: Option<String>,
}

/// A user allowed to act on behalf of the containing user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEditor {
    /// The editor's user id.
    pub id: ObjectId,
    /// Raw [`UserEditorPermission`] bits.
    #[serde(default)]
    pub permissions: i32,
    /// Shown on the editee's public profile.
    #[serde(default)]
    pub visible: bool,
    /// When the editor was added.
    pub added_at: bson::DateTime,

    /// The editor, or the editee for `editor_of` views (relational).
    #[serde(default, skip_serializing)]
    pub user: Option<Box<User>>,
}

impl UserEditor {
    /// Create an editor entry.
    #[must_use]
    pub fn new(id: ObjectId, permissions: UserEditorPermission, visible: bool) -> Self {
        Self {
            id,
            permissions: permissions.bits(),
            visible,
            added_at: bson::DateTime::now(),
            user: None,
        }
    }

    /// Whether the editor holds `flag`.
    #[must_use]
    pub fn has_permission(&self, flag: UserEditorPermission) -> bool {
        UserEditorPermission::from(self.permissions).has(flag)
    }
}

/// A platform account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct User {
    /// User ID.
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// Account type.
    #[serde(rename = "type", default)]
    pub user_type: UserType,

    /// Unique login name.
    #[validate(length(min = 1, max = 25))]
    pub username: String,

    /// Display name.
    #[serde(default)]
    pub display_name: String,

    /// Four digit discriminator.
    #[validate(regex(path = *DISCRIMINATOR_REGEX))]
    #[serde(default)]
    pub discriminator: String,

    /// Contact address.
    #[validate(email)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Directly assigned roles.
    #[serde(default)]
    pub role_ids: Vec<ObjectId>,

    /// Users allowed to act for this user.
    #[serde(default)]
    pub editors: Vec<UserEditor>,

    /// Users this user has blocked.
    #[serde(default)]
    pub blocked_user_ids: Vec<ObjectId>,

    /// Current avatar.
    #[serde(default)]
    pub avatar_id: String,

    /// Profile text.
    #[serde(default)]
    #[validate(length(max = 500))]
    pub biography: String,

    /// Incremented to invalidate issued tokens.
    #[serde(default)]
    pub token_version: i32,

    /// External account bindings.
    #[serde(default)]
    pub connections: Vec<UserConnection>,

    /// Derived state.
    #[serde(default)]
    pub state: UserState,

    /// Resolved roles (relational).
    #[serde(default, skip_serializing)]
    pub roles: Vec<Role>,

    /// Users this user is an editor of (relational).
    #[serde(default, skip_serializing)]
    pub editor_of: Vec<UserEditor>,

    /// Emotes owned by this user (relational).
    #[serde(default, skip_serializing)]
    pub owned_emotes: Vec<Emote>,
}

impl User {
    /// A regular user with no roles.
    pub fn new(id: ObjectId, username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            id,
            user_type: UserType::Regular,
            display_name: username.clone(),
            username,
            discriminator: "0000".to_string(),
            email: None,
            role_ids: Vec::new(),
            editors: Vec::new(),
            blocked_user_ids: Vec::new(),
            avatar_id: String::new(),
            biography: String::new(),
            token_version: 0,
            connections: Vec::new(),
            state: UserState::default(),
            roles: Vec::new(),
            editor_of: Vec::new(),
            owned_emotes: Vec::new(),
        }
    }

    /// The deleted-user placeholder carried by the zero id.
    #[must_use]
    pub fn deleted() -> Self {
        Self {
            user_type: UserType::System,
            ..Self::new(ZERO_ID, "*DeletedUser")
        }
    }

    /// Whether this is the zero-id placeholder.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.id == ZERO_ID
    }

    /// Effective permissions folded over resolved roles.
    #[must_use]
    pub fn final_permissions(&self) -> RolePermission {
        fold_permissions(&self.roles)
    }

    /// Whether the user's effective permissions grant `flag`.
    ///
    /// The super-administrator bit grants everything.
    #[must_use]
    pub fn has_permission(&self, flag: RolePermission) -> bool {
        self.final_permissions().allows(flag)
    }

    /// Most senior resolved role.
    #[must_use]
    pub fn highest_role(&self) -> Option<&Role> {
        self.roles.iter().max_by_key(|r| r.position)
    }

    /// Position of the most senior resolved role.
    #[must_use]
    pub fn highest_role_position(&self) -> Option<i32> {
        self.highest_role().map(|r| r.position)
    }

    /// Whether this user's most senior role strictly outranks `position`.
    #[must_use]
    pub fn outranks(&self, position: i32) -> bool {
        self.highest_role_position().is_some_and(|p| p > position)
    }

    /// Editor entry for `editor_id`.
    #[must_use]
    pub fn editor(&self, editor_id: ObjectId) -> Option<&UserEditor> {
        self.editors.iter().find(|e| e.id == editor_id)
    }

    /// Whether `editor_id` is an editor of this user holding `flag`.
    #[must_use]
    pub fn editor_has(&self, editor_id: ObjectId, flag: UserEditorPermission) -> bool {
        self.editor(editor_id).is_some_and(|e| e.has_permission(flag))
    }

    /// Whether this user blocked `other`.
    #[must_use]
    pub fn has_blocked(&self, other: ObjectId) -> bool {
        self.blocked_user_ids.contains(&other)
    }

    /// Connection for a platform.
    #[must_use]
    pub fn connection(&self, platform: UserConnectionPlatform) -> Option<&UserConnection> {
        self.connections.iter().find(|c| c.platform == platform)
    }

    /// Connection by platform-side id.
    #[must_use]
    pub fn connection_by_id(&self, id: &str) -> Option<&UserConnection> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// Run field validators and structural checks.
    pub fn check(&self) -> AppResult<()> {
        self.validate()?;

        let mut platforms = Vec::with_capacity(self.connections.len());
        for c in &self.connections {
            if platforms.contains(&c.platform) {
                return Err(AppError::ValidationRejected(format!(
                    "more than one {:?} connection",
                    c.platform
                )));
            }
            platforms.push(c.platform);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bson::doc;

    fn role(position: i32, allowed: RolePermission) -> Role {
        Role {
            position,
            allowed: allowed.bits(),
            ..Role::new(ObjectId::new(), "r")
        }
    }

    #[test]
    fn test_has_permission_and_rank() {
        let mut user = User::new(ObjectId::new(), "alice");
        assert!(!user.has_permission(RolePermission::ManageRoles));
        assert!(!user.outranks(0));

        user.roles = vec![role(10, RolePermission::ManageRoles), role(2, RolePermission::none())];
        assert!(user.has_permission(RolePermission::ManageRoles));
        assert_eq!(user.highest_role_position(), Some(10));
        assert!(user.outranks(9));
        assert!(!user.outranks(10));

        user.roles.push(role(1, RolePermission::SuperAdministrator));
        assert!(user.has_permission(RolePermission::ManageBans));
    }

    #[test]
    fn test_editor_permissions() {
        let editor_id = ObjectId::new();
        let mut user = User::new(ObjectId::new(), "bob");
        user.editors.push(UserEditor::new(
            editor_id,
            UserEditorPermission::ModifyEmotes | UserEditorPermission::UsePrivateEmotes,
            true,
        ));

        assert!(user.editor_has(editor_id, UserEditorPermission::ModifyEmotes));
        assert!(!user.editor_has(editor_id, UserEditorPermission::ManageEditors));
        assert!(!user.editor_has(ObjectId::new(), UserEditorPermission::ModifyEmotes));
    }

    #[test]
    fn test_check_rejects_bad_fields() {
        let mut user = User::new(ObjectId::new(), "carol");
        user.check().unwrap();

        user.discriminator = "12a4".to_string();
        assert!(matches!(user.check(), Err(AppError::ValidationRejected(_))));

        user.discriminator = "1234".to_string();
        user.email = Some("not-an-email".to_string());
        assert!(user.check().is_err());

        user.email = Some("carol@example.com".to_string());
        user.username = "x".repeat(26);
        assert!(user.check().is_err());
    }

    #[test]
    fn test_check_rejects_duplicate_platform() {
        let mut user = User::new(ObjectId::new(), "dave");
        let conn = UserConnection {
            id: "1".to_string(),
            platform: UserConnectionPlatform::Twitch,
            linked_at: bson::DateTime::now(),
            emote_slots: 0,
            emote_set_id: None,
            data: doc! {},
            grant: None,
            emote_set: None,
        };
        user.connections = vec![conn.clone(), UserConnection { id: "2".to_string(), ..conn }];
        assert!(user.check().is_err());
    }

    #[test]
    fn test_relations_are_not_stored() {
        let mut user = User::new(ObjectId::new(), "erin");
        user.roles.push(role(1, RolePermission::CreateEmote));
        let doc = bson::to_document(&user).unwrap();
        assert!(doc.get("roles").is_none());
        assert_eq!(doc.get_str("type").unwrap(), "regular");
        assert!(doc.get_object_id("_id").is_ok());
    }
}
