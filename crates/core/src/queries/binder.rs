//! Reassembly of object graphs from denormalized aggregate results.

use std::collections::HashMap;

use bson::oid::ObjectId;

use emotes_db::structures::{
    Emote, EmoteSet, Entitlement, EntitlementKind, Role, User, now,
};

/// Resolves roles and back-fills relations on query results.
#[derive(Debug, Clone, Default)]
pub struct Binder {
    roles: HashMap<ObjectId, Role>,
    defaults: Vec<ObjectId>,
}

impl Binder {
    /// A binder over every known role. Roles flagged `default` are granted to
    /// every bound user.
    #[must_use]
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        let roles: HashMap<ObjectId, Role> = roles.into_iter().map(|r| (r.id, r)).collect();
        let mut defaults: Vec<ObjectId> = roles.values().filter(|r| r.default).map(|r| r.id).collect();
        defaults.sort();
        Self { roles, defaults }
    }

    /// Resolve each user's roles from direct grants, applicable role
    /// entitlements and default roles. Returns the users keyed by id.
    #[must_use]
    pub fn users(
        &self,
        users: impl IntoIterator<Item = User>,
        entitlements: &[Entitlement],
    ) -> HashMap<ObjectId, User> {
        let now = now();
        let mut granted: HashMap<ObjectId, Vec<&Entitlement>> = HashMap::new();
        for ent in entitlements
            .iter()
            .filter(|e| e.kind == EntitlementKind::Role)
        {
            granted.entry(ent.user_id).or_default().push(ent);
        }

        users
            .into_iter()
            .map(|mut user| {
                let direct = user.role_ids.clone();
                for ent in granted.get(&user.id).map(Vec::as_slice).unwrap_or_default() {
                    if !ent.applies(&direct, now) {
                        continue;
                    }
                    if let Some(role_id) = ent.ref_id() {
                        if !user.role_ids.contains(&role_id) {
                            user.role_ids.push(role_id);
                        }
                    }
                }
                self.resolve_roles(&mut user);
                (user.id, user)
            })
            .collect()
    }

    /// Attach default roles and resolve `roles[]` from `role_ids`.
    pub fn resolve_roles(&self, user: &mut User) {
        for id in &self.defaults {
            if !user.role_ids.contains(id) {
                user.role_ids.push(*id);
            }
        }
        let mut roles: Vec<Role> = user
            .role_ids
            .iter()
            .filter_map(|id| self.roles.get(id).cloned())
            .collect();
        roles.sort_by_key(|r| r.position);
        user.state.role_position = roles.last().map_or(0, |r| r.position);
        user.roles = roles;
    }

    /// Attach each emote's owner.
    #[must_use]
    pub fn emotes(&self, emotes: Vec<Emote>, users: &HashMap<ObjectId, User>) -> Vec<Emote> {
        emotes
            .into_iter()
            .map(|mut emote| {
                emote.owner = users.get(&emote.owner_id).cloned().map(Box::new);
                emote
            })
            .collect()
    }

    /// Attach set owners, active emotes with their owners, and the actors
    /// who enabled them.
    #[must_use]
    pub fn emote_sets(
        &self,
        sets: Vec<EmoteSet>,
        emotes: Vec<Emote>,
        users: &HashMap<ObjectId, User>,
    ) -> Vec<EmoteSet> {
        let emotes = self.emotes(emotes, users);
        let by_version: HashMap<ObjectId, &Emote> = emotes
            .iter()
            .flat_map(|e| e.versions.iter().map(move |v| (v.id, e)))
            .collect();

        sets.into_iter()
            .map(|mut set| {
                set.owner = users.get(&set.owner_id).cloned().map(Box::new);
                for active in &mut set.emotes {
                    active.emote = by_version.get(&active.id).map(|e| Box::new((*e).clone()));
                    active.actor = users.get(&active.actor_id).cloned().map(Box::new);
                }
                set
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use emotes_db::structures::{ActiveEmote, ActiveEmoteFlags, EntitlementDataRole};

    fn role(name: &str, position: i32, default: bool) -> Role {
        Role {
            position,
            default,
            ..Role::new(ObjectId::new(), name)
        }
    }

    #[test]
    fn test_users_merge_entitlements_and_defaults() {
        let everyone = role("Everyone", 0, true);
        let moderator = role("Moderator", 10, false);
        let binder = Binder::new([everyone.clone(), moderator.clone()]);

        let user = User::new(ObjectId::new(), "alice");
        let ent = Entitlement::new(
            ObjectId::new(),
            user.id,
            EntitlementDataRole { ref_id: moderator.id },
        )
        .to_raw()
        .unwrap();

        let users = binder.users([user.clone()], &[ent]);
        let bound = &users[&user.id];
        assert!(bound.role_ids.contains(&moderator.id));
        assert!(bound.role_ids.contains(&everyone.id));
        assert_eq!(bound.roles.len(), 2);
        assert_eq!(bound.highest_role_position(), Some(10));
        assert_eq!(bound.state.role_position, 10);
    }

    #[test]
    fn test_disabled_entitlement_is_ignored() {
        let moderator = role("Moderator", 10, false);
        let binder = Binder::new([moderator.clone()]);
        let user = User::new(ObjectId::new(), "bob");
        let mut ent = Entitlement::new(
            ObjectId::new(),
            user.id,
            EntitlementDataRole { ref_id: moderator.id },
        )
        .to_raw()
        .unwrap();
        ent.disabled = true;

        let users = binder.users([user.clone()], &[ent]);
        assert!(users[&user.id].roles.is_empty());
    }

    #[test]
    fn test_emote_sets_backfill_relations() {
        let binder = Binder::default();
        let owner = User::new(ObjectId::new(), "owner");
        let emote = Emote::new(ObjectId::new(), owner.id, "peepoHappy");
        let mut set = EmoteSet::new(ObjectId::new(), owner.id, "Channel", 10);
        set.emotes.push(ActiveEmote::new(
            emote.id,
            "peepoHappy",
            ActiveEmoteFlags::none(),
            owner.id,
        ));
        let users = HashMap::from([(owner.id, owner.clone())]);

        let sets = binder.emote_sets(vec![set], vec![emote.clone()], &users);
        let active = &sets[0].emotes[0];
        assert_eq!(active.emote.as_ref().unwrap().id, emote.id);
        assert_eq!(active.emote.as_ref().unwrap().owner.as_ref().unwrap().id, owner.id);
        assert_eq!(active.actor.as_ref().unwrap().username, "owner");
        assert_eq!(sets[0].owner.as_ref().unwrap().id, owner.id);
    }
}
