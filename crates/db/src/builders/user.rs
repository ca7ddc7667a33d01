use bson::oid::ObjectId;
use bson::{Document, doc};

use super::{Buildable, Builder};
use crate::structures::{ObjectKind, User, UserEditor, UserEditorPermission};

/// Builder for [`User`].
pub type UserBuilder = Builder<User>;

impl Buildable for User {
    const KIND: ObjectKind = ObjectKind::User;

    fn object_id(&self) -> ObjectId {
        self.id
    }
}

fn editor_doc(e: &UserEditor) -> Document {
    doc! {
        "id": e.id,
        "permissions": e.permissions,
        "visible": e.visible,
        "added_at": e.added_at,
    }
}

impl Builder<User> {
    /// Set the username.
    pub fn set_username(&mut self, username: impl Into<String>) -> &mut Self {
        let (user, update) = self.parts();
        user.username = username.into();
        update.set("username", user.username.clone());
        self
    }

    /// Set the display name.
    pub fn set_display_name(&mut self, name: impl Into<String>) -> &mut Self {
        let (user, update) = self.parts();
        user.display_name = name.into();
        update.set("display_name", user.display_name.clone());
        self
    }

    /// Set the discriminator.
    pub fn set_discriminator(&mut self, discriminator: impl Into<String>) -> &mut Self {
        let (user, update) = self.parts();
        user.discriminator = discriminator.into();
        update.set("discriminator", user.discriminator.clone());
        self
    }

    /// Set the email.
    pub fn set_email(&mut self, email: impl Into<String>) -> &mut Self {
        let (user, update) = self.parts();
        let email = email.into();
        update.set("email", email.clone());
        user.email = Some(email);
        self
    }

    /// Set the avatar.
    pub fn set_avatar_id(&mut self, avatar_id: impl Into<String>) -> &mut Self {
        let (user, update) = self.parts();
        user.avatar_id = avatar_id.into();
        update.set("avatar_id", user.avatar_id.clone());
        self
    }

    /// Set the biography.
    pub fn set_biography(&mut self, biography: impl Into<String>) -> &mut Self {
        let (user, update) = self.parts();
        user.biography = biography.into();
        update.set("biography", user.biography.clone());
        self
    }

    /// Invalidate every issued token.
    pub fn bump_token_version(&mut self) -> &mut Self {
        let (user, update) = self.parts();
        user.token_version += 1;
        update.set("token_version", user.token_version);
        self
    }

    /// Set the cached role position.
    pub fn set_role_position(&mut self, position: i32) -> &mut Self {
        let (user, update) = self.parts();
        user.state.role_position = position;
        update.set("state.role_position", position);
        self
    }

    /// Assign a role.
    pub fn add_role(&mut self, role_id: ObjectId) -> &mut Self {
        let (user, update) = self.parts();
        if !user.role_ids.contains(&role_id) {
            user.role_ids.push(role_id);
        }
        update.add_to_set("role_ids", role_id);
        self
    }

    /// Unassign a role.
    pub fn remove_role(&mut self, role_id: ObjectId) -> &mut Self {
        let (user, update) = self.parts();
        user.role_ids.retain(|id| *id != role_id);
        update.pull("role_ids", role_id);
        self
    }

    /// Add an editor.
    pub fn add_editor(&mut self, editor: UserEditor) -> &mut Self {
        let (user, update) = self.parts();
        update.push("editors", editor_doc(&editor));
        user.editors.push(editor);
        self
    }

    /// Change an editor's permissions and visibility. Returns whether the
    /// editor exists.
    pub fn update_editor(
        &mut self,
        editor_id: ObjectId,
        permissions: UserEditorPermission,
        visible: bool,
    ) -> bool {
        let (user, update) = self.parts();
        let Some(i) = user.editors.iter().position(|e| e.id == editor_id) else {
            return false;
        };
        let editor = &mut user.editors[i];
        editor.permissions = permissions.bits();
        editor.visible = visible;
        update.set(format!("editors.{i}.permissions"), editor.permissions);
        update.set(format!("editors.{i}.visible"), visible);
        true
    }

    /// Remove an editor. Returns the removed entry.
    pub fn remove_editor(&mut self, editor_id: ObjectId) -> Option<UserEditor> {
        let (user, update) = self.parts();
        let i = user.editors.iter().position(|e| e.id == editor_id)?;
        update.pull("editors", doc! { "id": editor_id });
        Some(user.editors.remove(i))
    }

    /// Set the active emote set of a connection. Returns whether the
    /// connection exists.
    pub fn set_connection_emote_set(&mut self, connection_id: &str, set_id: Option<ObjectId>) -> bool {
        let (user, update) = self.parts();
        let Some(i) = user.connections.iter().position(|c| c.id == connection_id) else {
            return false;
        };
        user.connections[i].emote_set_id = set_id;
        let key = format!("connections.{i}.emote_set_id");
        match set_id {
            Some(id) => update.set(key, id),
            None => update.unset(key),
        };
        true
    }

    /// Block another user.
    pub fn block_user(&mut self, other: ObjectId) -> &mut Self {
        let (user, update) = self.parts();
        if !user.blocked_user_ids.contains(&other) {
            user.blocked_user_ids.push(other);
        }
        update.add_to_set("blocked_user_ids", other);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::{UserConnection, UserConnectionPlatform};

    #[test]
    fn test_roles_use_set_operators() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let mut builder = UserBuilder::new(User::new(ObjectId::new(), "alice"));
        builder.add_role(a).add_role(a).add_role(b);

        assert_eq!(builder.snapshot().role_ids, vec![a, b]);
        assert_eq!(
            builder.update().to_document(),
            doc! { "$addToSet": { "role_ids": { "$each": [a, b] } } }
        );
    }

    #[test]
    fn test_editor_lifecycle() {
        let editor_id = ObjectId::new();
        let mut builder = UserBuilder::new(User::new(ObjectId::new(), "bob"));
        builder.add_editor(UserEditor::new(editor_id, UserEditorPermission::ModifyEmotes, true));
        assert!(builder.update_editor(editor_id, UserEditorPermission::ManageEditors, false));
        assert!(!builder.update_editor(ObjectId::new(), UserEditorPermission::none(), false));

        assert!(builder.update().has_key("editors"));
        assert!(builder.update().has_key("editors.0.permissions"));
        assert!(builder.snapshot().editor_has(editor_id, UserEditorPermission::ManageEditors));

        assert!(builder.remove_editor(editor_id).is_some());
        assert!(builder.snapshot().editors.is_empty());
        assert!(builder.remove_editor(editor_id).is_none());
    }

    #[test]
    fn test_connection_emote_set() {
        let set_id = ObjectId::new();
        let mut user = User::new(ObjectId::new(), "carol");
        user.connections.push(UserConnection {
            id: "tw-1".to_string(),
            platform: UserConnectionPlatform::Twitch,
            linked_at: bson::DateTime::now(),
            emote_slots: 600,
            emote_set_id: None,
            data: Document::new(),
            grant: None,
            emote_set: None,
        });

        let mut builder = UserBuilder::new(user);
        assert!(builder.set_connection_emote_set("tw-1", Some(set_id)));
        assert!(!builder.set_connection_emote_set("yt-1", Some(set_id)));

        assert_eq!(builder.snapshot().connections[0].emote_set_id, Some(set_id));
        assert_eq!(
            builder.update().to_document(),
            doc! { "$set": { "connections.0.emote_set_id": set_id } }
        );
    }
}
