//! Emote set mutations.

use std::collections::HashMap;

use bson::oid::ObjectId;
use bson::{Bson, doc};
use tracing::{debug, info};

use emotes_common::{AppError, AppResult};
use emotes_db::builders::EmoteSetBuilder;
use emotes_db::store::{by_id, find_as, find_one_as};
use emotes_db::structures::{
    ActiveEmote, ActiveEmoteFlags, AuditLogChange, AuditLogChangeArray, AuditLogChangeSingleValue,
    AuditLogKind, EMOTE_NAME_REGEX, Emote, EmoteSet, ObjectKind, RolePermission, User,
    UserEditorPermission,
};
use emotes_db::{Collection, FindOptions, UpdateOp};
use emotes_events::{ChangeField, ChangeMap, EventType};

use super::{ListItemAction, Mutator, require, set_changes, set_fields, store_error};

/// Options for emote set create and edit.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditEmoteSetOptions {
    /// Skip structural validation of the set.
    pub skip_validation: bool,
}

/// One change to a set's active emotes.
#[derive(Debug, Clone)]
pub struct EmoteSetEmoteChange {
    /// Add, update or remove.
    pub action: ListItemAction,
    /// Emote (version) id.
    pub id: ObjectId,
    /// Alias in the set. Defaults to the emote's name on add.
    pub name: Option<String>,
    /// Per-set flags.
    pub flags: Option<ActiveEmoteFlags>,
}

impl EmoteSetEmoteChange {
    /// Add `id` under its own name.
    #[must_use]
    pub const fn add(id: ObjectId) -> Self {
        Self {
            action: ListItemAction::Add,
            id,
            name: None,
            flags: None,
        }
    }

    /// Rename an active emote.
    #[must_use]
    pub fn rename(id: ObjectId, name: impl Into<String>) -> Self {
        Self {
            action: ListItemAction::Update,
            id,
            name: Some(name.into()),
            flags: None,
        }
    }

    /// Remove an active emote.
    #[must_use]
    pub const fn remove(id: ObjectId) -> Self {
        Self {
            action: ListItemAction::Remove,
            id,
            name: None,
            flags: None,
        }
    }

    /// Use an alias.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Mutator {
    /// Create an emote set.
    pub async fn create_emote_set(
        &self,
        actor: &User,
        b: &mut EmoteSetBuilder,
        opt: EditEmoteSetOptions,
    ) -> AppResult<()> {
        b.ensure_usable()?;
        require(actor, RolePermission::EditEmoteSet)?;

        let set = b.snapshot();
        if set.name.trim().is_empty() {
            return Err(AppError::MissingRequiredField("name".into()));
        }
        if !opt.skip_validation {
            self.check_set_name(&set.name)?;
        }

        self.insert(Collection::EmoteSets, b).await?;

        let set = b.snapshot();
        info!(actor_id = %actor.id, emote_set_id = %set.id, name = %set.name, "Emote set created");
        self.audit(self.audit_entry(
            AuditLogKind::CreateEmoteSet,
            actor.id,
            ObjectKind::EmoteSet,
            set.id,
        ))
        .await;

        let event = ChangeMap::new(set.id, ObjectKind::EmoteSet)
            .by(actor.id)
            .with_object(set)?;
        self.dispatch(EventType::CreateEmoteSet, event).await;
        Ok(())
    }

    /// Edit an emote set's properties.
    pub async fn edit_emote_set(
        &self,
        actor: &User,
        b: &mut EmoteSetBuilder,
        opt: EditEmoteSetOptions,
    ) -> AppResult<()> {
        b.ensure_usable()?;
        require(actor, RolePermission::EditEmoteSet)?;

        let initial = b.initial();
        if initial.immutable && !unlocks_only(actor, b) {
            return Err(AppError::forbidden("this emote set is immutable"));
        }
        if initial.privileged && !actor.has_permission(RolePermission::SuperAdministrator) {
            return Err(AppError::forbidden("this emote set is privileged"));
        }
        if initial.owner_id != actor.id && !actor.has_permission(RolePermission::EditAnyEmoteSet) {
            return Err(AppError::forbidden("you do not own this emote set"));
        }

        let update = b.update();
        if update.has(UpdateOp::Set, "privileged")
            && !actor.has_permission(RolePermission::SuperAdministrator)
        {
            return Err(AppError::forbidden("only super administrators can change privileged sets"));
        }
        if update.has(UpdateOp::Set, "name") || !opt.skip_validation {
            self.check_set_name(&b.snapshot().name)?;
        }

        let changes = set_changes(b)?;
        let fields = set_fields(b)?;
        let id = b.snapshot().id;
        self.persist(Collection::EmoteSets, b).await?;

        info!(actor_id = %actor.id, emote_set_id = %id, fields = changes.len(), "Emote set edited");
        let mut log = self.audit_entry(AuditLogKind::UpdateEmoteSet, actor.id, ObjectKind::EmoteSet, id);
        log.changes = changes;
        self.audit(log).await;

        let mut event = ChangeMap::new(id, ObjectKind::EmoteSet).by(actor.id);
        event.updated = fields;
        self.dispatch(EventType::UpdateEmoteSet, event).await;
        Ok(())
    }

    /// Add, rename or remove active emotes in one write.
    pub async fn set_emote_set_emotes(
        &self,
        actor: &User,
        b: &mut EmoteSetBuilder,
        changes: Vec<EmoteSetEmoteChange>,
    ) -> AppResult<()> {
        b.ensure_usable()?;
        let set_id = b.snapshot().id;
        let _guard = self.locks.lock(&format!("emote_set:{set_id}")).await;

        let owner = self.set_owner(b.initial()).await?;
        let can_edit_any = actor.has_permission(RolePermission::EditAnyEmoteSet);
        {
            let set = b.initial();
            if set.immutable {
                return Err(AppError::forbidden("this emote set is immutable"));
            }
            if set.privileged && !actor.has_permission(RolePermission::SuperAdministrator) {
                return Err(AppError::forbidden("this emote set is privileged"));
            }
            let is_editor = owner
                .as_ref()
                .is_some_and(|o| o.editor_has(actor.id, UserEditorPermission::ModifyEmotes));
            if set.owner_id != actor.id && !can_edit_any && !is_editor {
                return Err(AppError::forbidden("you do not have permission to modify this emote set"));
            }
        }

        let targets = self.target_emotes(&changes).await?;

        let checkpoint = b.checkpoint();
        let (array, event) = match apply_emote_changes(actor, b, changes, &targets, can_edit_any) {
            Ok(applied) => applied,
            Err(e) => {
                b.rollback(checkpoint);
                return Err(e);
            }
        };
        self.persist_or_rollback(Collection::EmoteSets, b, checkpoint).await?;

        info!(
            actor_id = %actor.id,
            emote_set_id = %set_id,
            added = array.added.len(),
            updated = array.updated.len(),
            removed = array.removed.len(),
            "Emote set emotes changed"
        );
        let log = self
            .audit_entry(AuditLogKind::UpdateEmoteSet, actor.id, ObjectKind::EmoteSet, set_id)
            .with_change(AuditLogChange::array("emotes", &array)?);
        self.audit(log).await;
        self.dispatch(EventType::UpdateEmoteSet, event).await;
        Ok(())
    }

    fn check_set_name(&self, name: &str) -> AppResult<()> {
        let (a, b) = (self.limits.emote_set_name_min, self.limits.emote_set_name_max);
        let (min, max) = (a.min(b), a.max(b));
        let len = name.chars().count();
        if len < min || len > max {
            return Err(AppError::ValidationRejected(format!(
                "emote set name must be between {min} and {max} characters"
            )));
        }
        Ok(())
    }

    async fn set_owner(&self, set: &EmoteSet) -> AppResult<Option<User>> {
        if let Some(owner) = &set.owner {
            return Ok(Some(owner.as_ref().clone()));
        }
        find_one_as(self.store.as_ref(), Collection::Users, by_id(set.owner_id))
            .await
            .map_err(store_error)
    }

    /// Emotes referenced by add changes, keyed by the requested id, with
    /// their owners.
    async fn target_emotes(
        &self,
        changes: &[EmoteSetEmoteChange],
    ) -> AppResult<HashMap<ObjectId, (Emote, Option<User>)>> {
        let ids: Vec<ObjectId> = changes
            .iter()
            .filter(|c| c.action == ListItemAction::Add)
            .map(|c| c.id)
            .collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let emotes: Vec<Emote> = find_as(
            self.store.as_ref(),
            Collection::Emotes,
            doc! { "versions.id": { "$in": ids.clone() } },
            FindOptions::default(),
        )
        .await
        .map_err(store_error)?;

        let owner_ids: Vec<ObjectId> = emotes.iter().map(|e| e.owner_id).collect();
        let owners: Vec<User> = find_as(
            self.store.as_ref(),
            Collection::Users,
            doc! { "_id": { "$in": owner_ids } },
            FindOptions::default(),
        )
        .await
        .map_err(store_error)?;
        debug!(emotes = emotes.len(), owners = owners.len(), "Loaded target emotes");

        let mut out = HashMap::with_capacity(ids.len());
        for id in ids {
            let Some(emote) = emotes.iter().find(|e| e.id == id || e.has_version(id)) else {
                continue;
            };
            let owner = owners.iter().find(|u| u.id == emote.owner_id).cloned();
            out.insert(id, (emote.clone(), owner));
        }
        Ok(out)
    }
}

/// Apply a batch to the builder, failing on the first invalid change.
fn apply_emote_changes(
    actor: &User,
    b: &mut EmoteSetBuilder,
    changes: Vec<EmoteSetEmoteChange>,
    targets: &HashMap<ObjectId, (Emote, Option<User>)>,
    can_edit_any: bool,
) -> AppResult<(AuditLogChangeArray, ChangeMap)> {
    let set_id = b.snapshot().id;
    let mut array = AuditLogChangeArray::default();
    let mut event = ChangeMap::new(set_id, ObjectKind::EmoteSet).by(actor.id);
    for change in changes {
        match change.action {
            ListItemAction::Add => {
                let Some((emote, emote_owner)) = targets.get(&change.id) else {
                    return Err(AppError::UnknownEmote(change.id.to_hex()));
                };
                if emote.is_private()
                    && emote.owner_id != actor.id
                    && !actor.has_permission(RolePermission::BypassPrivacy)
                    && !emote_owner.as_ref().is_some_and(|o| {
                        o.editor_has(actor.id, UserEditorPermission::UsePrivateEmotes)
                    })
                {
                    return Err(AppError::forbidden("emote is private"));
                }

                let set = b.snapshot();
                if set.is_full() && !can_edit_any {
                    return Err(AppError::NoSpaceAvailable {
                        slots: set.emote_slots,
                    });
                }
                if set.active(change.id).is_some() {
                    return Err(AppError::EmoteAlreadyEnabled(change.id.to_hex()));
                }
                let name = change.name.unwrap_or_else(|| emote.name.clone());
                check_alias(&name)?;
                if set.name_taken(&name, None) {
                    return Err(AppError::EmoteNameConflict { name });
                }

                let flags = change.flags.unwrap_or_else(ActiveEmoteFlags::none);
                b.add_active_emote(change.id, name, flags, actor.id);
                let index = b.snapshot().emotes.len() - 1;
                let active = &b.snapshot().emotes[index];
                array.added.push(active_bson(active));
                event
                    .added
                    .push(ChangeField::of("emotes", &Bson::Null, active)?.at(to_i32(index)));
            }
            ListItemAction::Update => {
                let Some((index, old)) = b.snapshot().active(change.id) else {
                    return Err(AppError::EmoteNotEnabled(change.id.to_hex()));
                };
                let old = old.clone();
                if let Some(name) = &change.name {
                    check_alias(name)?;
                    if b.snapshot().name_taken(name, Some(change.id)) {
                        return Err(AppError::EmoteNameConflict { name: name.clone() });
                    }
                }

                b.update_active_emote(change.id, change.name, change.flags);
                let new = &b.snapshot().emotes[index];
                array.updated.push(AuditLogChangeSingleValue {
                    old: active_bson(&old),
                    new: active_bson(new),
                    position: Some(to_i32(index)),
                });
                event
                    .updated
                    .push(ChangeField::of("emotes", &old, new)?.at(to_i32(index)));
            }
            ListItemAction::Remove => {
                let Some((index, removed)) = b.remove_active_emote(change.id) else {
                    return Err(AppError::EmoteNotEnabled(change.id.to_hex()));
                };
                array.removed.push(active_bson(&removed));
                event
                    .removed
                    .push(ChangeField::of("emotes", &removed, &Bson::Null)?.at(to_i32(index)));
            }
        }
    }

    if b.update().is_empty() {
        return Err(AppError::UnknownEmote("no target emotes found".into()));
    }
    b.collapse_active_emotes();
    b.snapshot().check_active_emotes()?;
    Ok((array, event))
}

/// Whether the only pending change is a super administrator clearing
/// `immutable`.
fn unlocks_only(actor: &User, b: &EmoteSetBuilder) -> bool {
    actor.has_permission(RolePermission::SuperAdministrator)
        && !b.snapshot().immutable
        && b.update().to_document() == doc! { "$set": { "immutable": false } }
}

fn check_alias(name: &str) -> AppResult<()> {
    if EMOTE_NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(AppError::NameInvalid(name.to_string()))
    }
}

fn active_bson(e: &ActiveEmote) -> Bson {
    Bson::Document(doc! {
        "id": e.id,
        "name": e.name.clone(),
        "flags": e.flags,
    })
}

fn to_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
