//! Report mutations.

use bson::doc;
use bson::oid::ObjectId;
use tracing::info;
use validator::Validate;

use emotes_common::{AppError, AppResult};
use emotes_db::Collection;
use emotes_db::builders::ReportBuilder;
use emotes_db::store::by_id;
use emotes_db::structures::{AuditLogKind, ObjectKind, RolePermission, User};

use super::{Mutator, not_found, require, set_changes, store_error};

impl Mutator {
    /// File a report against a user, emote or emote set.
    pub async fn create_report(&self, actor: &User, b: &mut ReportBuilder) -> AppResult<()> {
        b.ensure_usable()?;
        require(actor, RolePermission::CreateReport)?;

        let (kind, target_id) = (b.snapshot().target_kind, b.snapshot().target_id);
        if kind == ObjectKind::User && target_id == actor.id {
            return Err(AppError::DontBeSilly("you cannot report yourself".into()));
        }
        let coll = match kind {
            ObjectKind::User => Collection::Users,
            ObjectKind::Emote => Collection::Emotes,
            ObjectKind::EmoteSet => Collection::EmoteSets,
            _ => {
                return Err(AppError::ValidationRejected(format!(
                    "{kind} objects cannot be reported"
                )));
            }
        };
        let exists = self
            .store
            .count(coll, by_id(target_id))
            .await
            .map_err(store_error)?;
        if exists == 0 {
            return Err(not_found(kind, target_id));
        }
        b.snapshot().validate()?;

        self.insert(Collection::Reports, b).await?;

        let report = b.snapshot();
        info!(
            actor_id = %actor.id,
            report_id = %report.id,
            case_id = %report.case_id,
            target_kind = %kind,
            target_id = %target_id,
            "Report filed"
        );
        self.audit(self.audit_entry(AuditLogKind::CreateReport, actor.id, ObjectKind::Report, report.id))
            .await;
        Ok(())
    }

    /// Change a report's status, priority, assignees or notes.
    pub async fn edit_report(&self, actor: &User, b: &mut ReportBuilder) -> AppResult<()> {
        b.ensure_usable()?;
        require(actor, RolePermission::ManageReports)?;

        let added: Vec<ObjectId> = b
            .snapshot()
            .assignee_ids
            .iter()
            .filter(|id| !b.initial().assignee_ids.contains(id))
            .copied()
            .collect();
        if !added.is_empty() {
            let found = self
                .store
                .count(Collection::Users, doc! { "_id": { "$in": added.clone() } })
                .await
                .map_err(store_error)?;
            if found != added.len() as u64 {
                return Err(AppError::UnknownUser("assignee not found".into()));
            }
        }
        b.snapshot().validate()?;

        let changes = set_changes(b)?;
        let id = b.snapshot().id;
        self.persist(Collection::Reports, b).await?;

        info!(actor_id = %actor.id, report_id = %id, assigned = added.len(), "Report edited");
        let mut log = self.audit_entry(AuditLogKind::UpdateReport, actor.id, ObjectKind::Report, id);
        log.changes = changes;
        self.audit(log).await;
        Ok(())
    }
}
