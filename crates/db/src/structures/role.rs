//! Role entity.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::RolePermission;

/// A named permission grant with a seniority position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Role {
    /// Role ID.
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// Display name.
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    /// Seniority. Higher positions outrank lower ones.
    #[serde(default)]
    pub position: i32,

    /// Packed RGBA color.
    #[serde(default)]
    pub color: i32,

    /// Granted permission bits.
    #[serde(default)]
    pub allowed: i64,

    /// Revoked permission bits.
    #[serde(default)]
    pub denied: i64,

    /// Granted to every user implicitly.
    #[serde(default)]
    pub default: bool,

    /// Hidden from public role listings.
    #[serde(default)]
    pub invisible: bool,

    /// Linked Discord role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_id: Option<i64>,
}

impl Role {
    /// A role with no permissions at position 0.
    pub fn new(id: ObjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            position: 0,
            color: 0,
            allowed: 0,
            denied: 0,
            default: false,
            invisible: false,
            discord_id: None,
        }
    }

    /// Granted bits as a typed bitfield.
    #[must_use]
    pub fn allowed_permissions(&self) -> RolePermission {
        RolePermission::from(self.allowed)
    }

    /// Revoked bits as a typed bitfield.
    #[must_use]
    pub fn denied_permissions(&self) -> RolePermission {
        RolePermission::from(self.denied)
    }
}

/// Fold roles into an effective permission bitfield.
///
/// Roles are applied in ascending position so the most senior role has the
/// last word on any bit.
#[must_use]
pub fn fold_permissions<'a>(roles: impl IntoIterator<Item = &'a Role>) -> RolePermission {
    let mut sorted: Vec<&Role> = roles.into_iter().collect();
    sorted.sort_by_key(|r| r.position);

    sorted.into_iter().fold(RolePermission::none(), |acc, r| {
        (acc & !r.denied_permissions()) | r.allowed_permissions()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use emotes_common::BitField;

    fn role(position: i32, allowed: RolePermission, denied: RolePermission) -> Role {
        Role {
            position,
            allowed: allowed.bits(),
            denied: denied.bits(),
            ..Role::new(ObjectId::new(), format!("role-{position}"))
        }
    }

    #[test]
    fn test_fold_senior_role_wins() {
        let junior = role(1, RolePermission::CreateEmote, RolePermission::none());
        let senior = role(5, RolePermission::none(), RolePermission::CreateEmote);

        let perms = fold_permissions([&senior, &junior]);
        assert!(!perms.has(RolePermission::CreateEmote));

        let regrant = role(9, RolePermission::CreateEmote, RolePermission::none());
        let perms = fold_permissions([&senior, &junior, &regrant]);
        assert!(perms.has(RolePermission::CreateEmote));
    }

    #[test]
    fn test_fold_empty() {
        assert_eq!(fold_permissions(std::iter::empty()), RolePermission::none());
    }
}
