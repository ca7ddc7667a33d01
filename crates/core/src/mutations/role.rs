//! Role mutations.

use bson::doc;
use tracing::info;
use validator::Validate;

use emotes_common::{AppError, AppResult};
use emotes_db::builders::RoleBuilder;
use emotes_db::store::by_id;
use emotes_db::structures::{AuditLogKind, ObjectKind, RolePermission, User};
use emotes_db::Collection;

use super::{Mutator, rank, require, set_changes, store_error};

impl Mutator {
    /// Create a role.
    pub async fn create_role(&self, actor: &User, b: &mut RoleBuilder) -> AppResult<()> {
        b.ensure_usable()?;
        require(actor, RolePermission::ManageRoles)?;
        b.snapshot().validate()?;

        self.insert(Collection::Roles, b).await?;

        let role = b.snapshot();
        info!(actor_id = %actor.id, role_id = %role.id, name = %role.name, "Role created");
        self.audit(self.audit_entry(AuditLogKind::CreateRole, actor.id, ObjectKind::Role, role.id))
            .await;
        Ok(())
    }

    /// Edit a role the actor outranks.
    pub async fn edit_role(&self, actor: &User, b: &mut RoleBuilder) -> AppResult<()> {
        b.ensure_usable()?;
        require(actor, RolePermission::ManageRoles)?;
        ensure_outranks(actor, b.initial().position)?;
        if b.snapshot().position != b.initial().position {
            ensure_outranks(actor, b.snapshot().position)?;
        }
        b.snapshot().validate()?;

        let changes = set_changes(b)?;
        self.persist(Collection::Roles, b).await?;

        let role = b.snapshot();
        info!(actor_id = %actor.id, role_id = %role.id, "Role edited");
        let mut log = self.audit_entry(AuditLogKind::EditRole, actor.id, ObjectKind::Role, role.id);
        log.changes = changes;
        self.audit(log).await;
        Ok(())
    }

    /// Delete a role the actor outranks and unassign it from every user.
    pub async fn delete_role(&self, actor: &User, b: &mut RoleBuilder) -> AppResult<()> {
        b.ensure_usable()?;
        require(actor, RolePermission::ManageRoles)?;
        ensure_outranks(actor, b.initial().position)?;

        let id = b.snapshot().id;
        let deleted = self
            .store
            .delete_one(Collection::Roles, by_id(id))
            .await
            .map_err(store_error)?;
        if deleted == 0 {
            return Err(AppError::UnknownRole(id.to_hex()));
        }

        let unassigned = self
            .store
            .update_many(
                Collection::Users,
                doc! { "role_ids": id },
                doc! { "$pull": { "role_ids": id } },
            )
            .await
            .map_err(store_error)?;
        b.taint();

        info!(actor_id = %actor.id, role_id = %id, unassigned = unassigned.modified, "Role deleted");
        self.audit(self.audit_entry(AuditLogKind::DeleteRole, actor.id, ObjectKind::Role, id))
            .await;
        Ok(())
    }
}

/// Roles at or above the actor's highest position are off limits.
pub(super) fn ensure_outranks(actor: &User, position: i32) -> AppResult<()> {
    if rank(actor) > position {
        Ok(())
    } else {
        Err(AppError::forbidden(
            "the role is higher than or equal to your highest role",
        ))
    }
}
