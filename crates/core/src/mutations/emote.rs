//! Emote mutations.

use bson::oid::ObjectId;
use tracing::{info, warn};

use emotes_common::{AppError, AppResult};
use emotes_db::builders::EmoteBuilder;
use emotes_db::store::{by_id, find_one_as};
use emotes_db::structures::{
    AuditLogChange, AuditLogKind, Emote, EmoteLifecycle, ObjectKind, RolePermission, User,
    UserEditorPermission,
};
use emotes_db::{Collection, ObjectAcl, UpdateOp};
use emotes_events::{ChangeField, ChangeMap, EventType};

use super::{Mutator, set_changes, set_fields, store_error};

/// Options for [`Mutator::edit_emote`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EditEmoteOptions {
    /// Skip structural validation of the edited emote.
    pub skip_validation: bool,
}

/// Options for [`Mutator::delete_emote`].
#[derive(Debug, Clone, Default)]
pub struct DeleteEmoteOptions {
    /// Only affect this version.
    pub version_id: Option<ObjectId>,
    /// Restore instead of delete.
    pub undo: bool,
    /// Recorded on the audit log.
    pub reason: String,
}

impl Mutator {
    /// Edit an emote.
    ///
    /// Changing `owner_id` transfers the emote, which requires the new owner
    /// to exist and the actor to be the current owner or hold
    /// `EditAnyEmote`.
    pub async fn edit_emote(
        &self,
        actor: &User,
        b: &mut EmoteBuilder,
        opt: EditEmoteOptions,
    ) -> AppResult<()> {
        b.ensure_usable()?;
        self.authorize_emote(actor, b.initial()).await?;

        let update = b.update();
        if update.has(UpdateOp::Set, "owner_id") {
            let initial = b.initial();
            if initial.owner_id != actor.id && !actor.has_permission(RolePermission::EditAnyEmote) {
                return Err(AppError::forbidden("only the owner can transfer this emote"));
            }
            let new_owner = b.snapshot().owner_id;
            let exists = self
                .store
                .count(Collection::Users, by_id(new_owner))
                .await
                .map_err(store_error)?;
            if exists == 0 {
                return Err(AppError::UnknownUser(new_owner.to_hex()));
            }
        }
        if update.touches("state.lifecycle") {
            let (from, to) = (b.initial().state.lifecycle, b.snapshot().state.lifecycle);
            if !from.can_transition(to) {
                return Err(AppError::ValidationRejected(format!(
                    "lifecycle cannot change from {from:?} to {to:?}"
                )));
            }
        }
        if !opt.skip_validation {
            b.snapshot().check()?;
        }

        let changes = set_changes(b)?;
        let fields = set_fields(b)?;
        let id = b.snapshot().id;
        self.persist(Collection::Emotes, b).await?;

        info!(actor_id = %actor.id, emote_id = %id, fields = changes.len(), "Emote edited");
        let mut log = self.audit_entry(AuditLogKind::UpdateEmote, actor.id, ObjectKind::Emote, id);
        log.changes = changes;
        self.audit(log).await;

        let mut event = ChangeMap::new(id, ObjectKind::Emote).by(actor.id);
        event.updated = fields;
        self.dispatch(EventType::UpdateEmote, event).await;
        Ok(())
    }

    /// Delete an emote or one of its versions, or restore it with `undo`.
    ///
    /// Affected versions change lifecycle and their image files move between
    /// public and private object ACLs. The audit log is written even when an
    /// ACL transition fails.
    pub async fn delete_emote(
        &self,
        actor: &User,
        b: &mut EmoteBuilder,
        opt: DeleteEmoteOptions,
    ) -> AppResult<()> {
        b.ensure_usable()?;
        self.authorize_emote(actor, b.initial()).await?;

        let (lifecycle, acl) = if opt.undo {
            (EmoteLifecycle::Live, ObjectAcl::PublicRead)
        } else {
            (EmoteLifecycle::Deleted, ObjectAcl::Private)
        };

        let targets: Vec<ObjectId> = match opt.version_id {
            Some(version_id) => {
                if !b.initial().has_version(version_id) {
                    return Err(AppError::UnknownEmote(format!(
                        "version {version_id} not found"
                    )));
                }
                vec![version_id]
            }
            None => b.initial().versions.iter().map(|v| v.id).collect(),
        };

        let previous: Vec<(i32, EmoteLifecycle)> = targets
            .iter()
            .filter_map(|vid| b.initial().version(*vid))
            .map(|(i, v)| (i32::try_from(i).unwrap_or(i32::MAX), v.state.lifecycle))
            .collect();
        for version_id in &targets {
            b.set_version_lifecycle(*version_id, lifecycle);
        }
        if opt.version_id.is_none() {
            b.set_lifecycle(lifecycle);
        }

        let id = b.snapshot().id;
        let files: Vec<(String, String)> = b
            .snapshot()
            .versions
            .iter()
            .filter(|v| targets.contains(&v.id))
            .flat_map(|v| v.image_files.iter())
            .map(|f| {
                let bucket = if f.bucket.is_empty() {
                    self.storage_config.bucket.clone()
                } else {
                    f.bucket.clone()
                };
                (bucket, f.key.clone())
            })
            .collect();

        self.persist(Collection::Emotes, b).await?;

        for (bucket, key) in &files {
            if let Err(e) = self.storage.set_acl(bucket, key, acl).await {
                warn!(emote_id = %id, bucket, key, acl = acl.as_str(), error = %e, "Failed to change object ACL");
            }
        }

        let (kind, event_type) = if opt.undo {
            (AuditLogKind::UndoDeleteEmote, EventType::UpdateEmote)
        } else {
            (AuditLogKind::DeleteEmote, EventType::DeleteEmote)
        };
        info!(
            actor_id = %actor.id,
            emote_id = %id,
            versions = targets.len(),
            undo = opt.undo,
            "Emote lifecycle changed"
        );

        let mut log = self
            .audit_entry(kind, actor.id, ObjectKind::Emote, id)
            .with_reason(opt.reason);
        for (i, old) in &previous {
            log = log.with_change(AuditLogChange::single(
                "versions.state.lifecycle",
                &i32::from(*old),
                &i32::from(lifecycle),
                Some(*i),
            )?);
        }
        self.audit(log).await;

        let mut event = ChangeMap::new(id, ObjectKind::Emote).by(actor.id);
        for (i, old) in &previous {
            event.updated.push(
                ChangeField::of("versions", &i32::from(*old), &i32::from(lifecycle))?.at(*i),
            );
        }
        self.dispatch(event_type, event).await;
        Ok(())
    }

    /// The actor may edit any emote, owns this one, or edits for its owner
    /// with `ManageOwnedEmotes`.
    async fn authorize_emote(&self, actor: &User, emote: &Emote) -> AppResult<()> {
        if actor.has_permission(RolePermission::EditAnyEmote) || emote.owner_id == actor.id {
            return Ok(());
        }

        let owner = match &emote.owner {
            Some(owner) => Some(owner.as_ref().clone()),
            None => find_one_as::<User>(self.store.as_ref(), Collection::Users, by_id(emote.owner_id))
                .await
                .map_err(store_error)?,
        };
        if owner.is_some_and(|o| o.editor_has(actor.id, UserEditorPermission::ManageOwnedEmotes)) {
            return Ok(());
        }
        Err(AppError::forbidden("you do not have permission to modify this emote"))
    }
}
