use bson::oid::ObjectId;

use super::{Buildable, Builder};
use crate::structures::{ObjectKind, Role, RolePermission};

/// Builder for [`Role`].
pub type RoleBuilder = Builder<Role>;

impl Buildable for Role {
    const KIND: ObjectKind = ObjectKind::Role;

    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Builder<Role> {
    /// Set the name.
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        let (role, update) = self.parts();
        role.name = name.into();
        update.set("name", role.name.clone());
        self
    }

    /// Set the position.
    pub fn set_position(&mut self, position: i32) -> &mut Self {
        let (role, update) = self.parts();
        role.position = position;
        update.set("position", position);
        self
    }

    /// Set the color.
    pub fn set_color(&mut self, color: i32) -> &mut Self {
        let (role, update) = self.parts();
        role.color = color;
        update.set("color", color);
        self
    }

    /// Set the granted permissions.
    pub fn set_allowed(&mut self, allowed: RolePermission) -> &mut Self {
        let (role, update) = self.parts();
        role.allowed = allowed.bits();
        update.set("allowed", role.allowed);
        self
    }

    /// Set the revoked permissions.
    pub fn set_denied(&mut self, denied: RolePermission) -> &mut Self {
        let (role, update) = self.parts();
        role.denied = denied.bits();
        update.set("denied", role.denied);
        self
    }

    /// Mark as granted to everyone.
    pub fn set_default(&mut self, default: bool) -> &mut Self {
        let (role, update) = self.parts();
        role.default = default;
        update.set("default", default);
        self
    }

    /// Hide from public listings.
    pub fn set_invisible(&mut self, invisible: bool) -> &mut Self {
        let (role, update) = self.parts();
        role.invisible = invisible;
        update.set("invisible", invisible);
        self
    }

    /// Link or unlink a Discord role.
    pub fn set_discord_id(&mut self, discord_id: Option<i64>) -> &mut Self {
        let (role, update) = self.parts();
        role.discord_id = discord_id;
        match discord_id {
            Some(id) => update.set("discord_id", id),
            None => update.unset("discord_id"),
        };
        self
    }
}
