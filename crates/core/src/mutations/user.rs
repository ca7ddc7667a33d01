//! User mutations: role assignment, active emote sets and editors.

use bson::oid::ObjectId;
use bson::{Bson, doc};
use tracing::info;

use emotes_common::{AppError, AppResult};
use emotes_db::builders::UserBuilder;
use emotes_db::store::{by_id, find_one_as};
use emotes_db::structures::{
    AuditLogChange, AuditLogChangeArray, AuditLogChangeSingleValue, AuditLogKind, EmoteSet,
    ObjectKind, Role, RolePermission, User, UserEditor, UserEditorPermission,
};
use emotes_db::Collection;
use emotes_events::{ChangeField, ChangeMap, EventType};

use super::{ListItemAction, Mutator, require, set_changes, store_error};
use super::role::ensure_outranks;

/// Which emote set a connection should use.
#[derive(Debug, Clone)]
pub struct SetActiveEmoteSetOptions {
    /// Connection id on the target user.
    pub connection_id: String,
    /// The set to activate, or `None` to clear it.
    pub emote_set_id: Option<ObjectId>,
}

/// A change to a user's editor list.
#[derive(Debug, Clone)]
pub struct EditorChange {
    /// The editor's user id.
    pub editor_id: ObjectId,
    /// Granted permissions, for add and update.
    pub permissions: UserEditorPermission,
    /// Whether the editor is listed publicly.
    pub visible: bool,
    /// Add, update or remove.
    pub action: ListItemAction,
}

impl Mutator {
    /// Grant or revoke a role the actor outranks.
    pub async fn set_user_role(
        &self,
        actor: &User,
        b: &mut UserBuilder,
        role: &Role,
        action: ListItemAction,
    ) -> AppResult<()> {
        b.ensure_usable()?;
        require(actor, RolePermission::ManageRoles)?;
        ensure_outranks(actor, role.position)?;

        let checkpoint = b.checkpoint();
        let mut change = AuditLogChangeArray::default();
        match action {
            ListItemAction::Add => {
                if b.snapshot().role_ids.contains(&role.id) {
                    return Err(AppError::DontBeSilly("the user already has this role".into()));
                }
                b.add_role(role.id);
                change.added.push(Bson::ObjectId(role.id));
            }
            ListItemAction::Remove => {
                if !b.snapshot().role_ids.contains(&role.id) {
                    return Err(AppError::DontBeSilly("the user does not have this role".into()));
                }
                b.remove_role(role.id);
                change.removed.push(Bson::ObjectId(role.id));
            }
            ListItemAction::Update => {
                return Err(AppError::DontBeSilly("roles cannot be updated on a user".into()));
            }
        }

        let target = b.snapshot().id;
        self.persist_or_rollback(Collection::Users, b, checkpoint).await?;

        info!(actor_id = %actor.id, target_id = %target, role_id = %role.id, ?action, "User roles changed");
        let log = self
            .audit_entry(AuditLogKind::EditUser, actor.id, ObjectKind::User, target)
            .with_change(AuditLogChange::array("role_ids", &change)?);
        self.audit(log).await;

        let field = ChangeField::of("role_ids", &Bson::Null, &role.id.to_hex())?;
        let mut event = ChangeMap::new(target, ObjectKind::User).by(actor.id);
        match action {
            ListItemAction::Add => event.added.push(field),
            _ => event.removed.push(field),
        }
        self.dispatch(EventType::UpdateUser, event).await;
        Ok(())
    }

    /// Point one of the user's connections at an emote set.
    pub async fn set_user_active_emote_set(
        &self,
        actor: &User,
        b: &mut UserBuilder,
        opt: SetActiveEmoteSetOptions,
    ) -> AppResult<()> {
        b.ensure_usable()?;

        let target = b.initial();
        if actor.id != target.id
            && !actor.has_permission(RolePermission::ManageUsers)
            && !target.editor_has(actor.id, UserEditorPermission::ModifyEmotes)
        {
            return Err(AppError::forbidden(
                "you are not allowed to change this user's active emote set",
            ));
        }

        let Some(index) = target
            .connections
            .iter()
            .position(|c| c.id == opt.connection_id)
        else {
            return Err(AppError::UnknownUserConnection(opt.connection_id));
        };
        let old_set_id = target.connections[index].emote_set_id;

        if let Some(set_id) = opt.emote_set_id {
            let set: EmoteSet = find_one_as(self.store.as_ref(), Collection::EmoteSets, by_id(set_id))
                .await
                .map_err(store_error)?
                .ok_or_else(|| AppError::UnknownEmoteSet(set_id.to_hex()))?;
            if set.owner_id != actor.id && !actor.has_permission(RolePermission::EditAnyEmoteSet) {
                return Err(AppError::forbidden("you do not own this emote set"));
            }
        }

        let checkpoint = b.checkpoint();
        b.set_connection_emote_set(&opt.connection_id, opt.emote_set_id);
        let changes = match set_changes(b) {
            Ok(changes) => changes,
            Err(e) => {
                b.rollback(checkpoint);
                return Err(e);
            }
        };
        let target_id = b.snapshot().id;
        self.persist_or_rollback(Collection::Users, b, checkpoint).await?;

        info!(
            actor_id = %actor.id,
            target_id = %target_id,
            connection_id = %opt.connection_id,
            emote_set_id = ?opt.emote_set_id,
            "Active emote set changed"
        );
        let mut log = self.audit_entry(AuditLogKind::EditUser, actor.id, ObjectKind::User, target_id);
        log.changes = changes;
        if log.changes.is_empty() {
            log = log.with_change(AuditLogChange::single(
                format!("connections.{index}.emote_set_id"),
                &old_set_id,
                &opt.emote_set_id,
                None,
            )?);
        }
        self.audit(log).await;

        let mut event = ChangeMap::new(target_id, ObjectKind::User).by(actor.id);
        event.updated.push(
            ChangeField::of(
                "connections",
                &old_set_id.map(|id| id.to_hex()),
                &opt.emote_set_id.map(|id| id.to_hex()),
            )?
            .at(i32::try_from(index).unwrap_or(i32::MAX)),
        );
        self.dispatch(EventType::UpdateUser, event).await;
        Ok(())
    }

    /// Add, update or remove one of the user's editors.
    ///
    /// Editors may always remove themselves.
    pub async fn modify_user_editors(
        &self,
        actor: &User,
        b: &mut UserBuilder,
        change: EditorChange,
    ) -> AppResult<()> {
        b.ensure_usable()?;

        let target = b.initial();
        let leaving = change.action == ListItemAction::Remove && change.editor_id == actor.id;
        if actor.id != target.id
            && !leaving
            && !actor.has_permission(RolePermission::ManageUsers)
            && !target.editor_has(actor.id, UserEditorPermission::ManageEditors)
        {
            return Err(AppError::forbidden("you are not allowed to change this user's editors"));
        }

        let target_id = target.id;
        if change.action == ListItemAction::Add {
            if change.editor_id == target_id {
                return Err(AppError::DontBeSilly("you can't be your own editor".into()));
            }
            if target.editor(change.editor_id).is_some() {
                return Err(AppError::DontBeSilly("this user is already an editor".into()));
            }
            let exists = self
                .store
                .count(Collection::Users, by_id(change.editor_id))
                .await
                .map_err(store_error)?;
            if exists == 0 {
                return Err(AppError::UnknownUser(change.editor_id.to_hex()));
            }
        }

        let checkpoint = b.checkpoint();
        let (array, event) = match apply_editor_change(actor.id, b, &change) {
            Ok(applied) => applied,
            Err(e) => {
                b.rollback(checkpoint);
                return Err(e);
            }
        };
        self.persist_or_rollback(Collection::Users, b, checkpoint).await?;

        info!(
            actor_id = %actor.id,
            target_id = %target_id,
            editor_id = %change.editor_id,
            action = ?change.action,
            "User editors changed"
        );
        let log = self
            .audit_entry(AuditLogKind::EditUser, actor.id, ObjectKind::User, target_id)
            .with_change(AuditLogChange::array("editors", &array)?);
        self.audit(log).await;
        self.dispatch(EventType::UpdateUser, event).await;
        Ok(())
    }
}

/// Apply one editor change to the builder.
fn apply_editor_change(
    actor_id: ObjectId,
    b: &mut UserBuilder,
    change: &EditorChange,
) -> AppResult<(AuditLogChangeArray, ChangeMap)> {
    let mut array = AuditLogChangeArray::default();
    let mut event = ChangeMap::new(b.snapshot().id, ObjectKind::User).by(actor_id);
    match change.action {
        ListItemAction::Add => {
            let editor = UserEditor::new(change.editor_id, change.permissions, change.visible);
            array.added.push(editor_bson(&editor));
            event.added.push(ChangeField::of("editors", &Bson::Null, &editor)?);
            b.add_editor(editor);
        }
        ListItemAction::Update => {
            let old = b
                .snapshot()
                .editor(change.editor_id)
                .cloned()
                .ok_or_else(|| AppError::UnknownUser(change.editor_id.to_hex()))?;
            b.update_editor(change.editor_id, change.permissions, change.visible);
            let new = b
                .snapshot()
                .editor(change.editor_id)
                .cloned()
                .ok_or_else(|| AppError::UnknownUser(change.editor_id.to_hex()))?;
            array.updated.push(AuditLogChangeSingleValue {
                old: editor_bson(&old),
                new: editor_bson(&new),
                position: None,
            });
            event.updated.push(ChangeField::of("editors", &old, &new)?);
        }
        ListItemAction::Remove => {
            let removed = b
                .remove_editor(change.editor_id)
                .ok_or_else(|| AppError::UnknownUser(change.editor_id.to_hex()))?;
            array.removed.push(editor_bson(&removed));
            event.removed.push(ChangeField::of("editors", &removed, &Bson::Null)?);
        }
    }
    Ok((array, event))
}

fn editor_bson(e: &UserEditor) -> Bson {
    Bson::Document(doc! {
        "id": e.id,
        "permissions": e.permissions,
        "visible": e.visible,
    })
}
