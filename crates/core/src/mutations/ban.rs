//! Ban mutations.

use std::collections::HashMap;

use bson::oid::ObjectId;
use tracing::{info, warn};
use validator::Validate;

use emotes_common::{AppError, AppResult};
use emotes_db::Builder;
use emotes_db::Collection;
use emotes_db::builders::BanBuilder;
use emotes_db::store::{by_id, find_one_as};
use emotes_db::structures::{
    AuditLogKind, Ban, Message, MessageDataInbox, ObjectKind, RolePermission, User,
};

use super::{Mutator, SendInboxOptions, rank, require, set_changes, store_error};

/// Options for [`Mutator::create_ban`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BanOptions {
    /// Do not notify the victim.
    pub skip_notification: bool,
}

impl Mutator {
    /// Ban a user ranked below the actor and notify them.
    pub async fn create_ban(&self, actor: &User, b: &mut BanBuilder, opt: BanOptions) -> AppResult<()> {
        b.ensure_usable()?;
        require(actor, RolePermission::ManageBans)?;

        let victim_id = b.snapshot().victim_id;
        if victim_id == actor.id {
            return Err(AppError::DontBeSilly("you cannot ban yourself".into()));
        }
        self.ensure_outranks_victim(actor, victim_id).await?;
        b.snapshot().validate()?;

        self.insert(Collection::Bans, b).await?;

        let ban = b.snapshot();
        info!(
            actor_id = %actor.id,
            victim_id = %victim_id,
            ban_id = %ban.id,
            effects = ban.effects,
            permanent = ban.is_permanent(),
            "User banned"
        );
        let log = self
            .audit_entry(AuditLogKind::BanUser, actor.id, ObjectKind::User, victim_id)
            .with_reason(ban.reason.clone());
        self.audit(log).await;

        if !opt.skip_notification {
            self.notify_ban(actor, ban).await;
        }
        Ok(())
    }

    /// Change a ban's reason, expiry or effects.
    pub async fn edit_ban(&self, actor: &User, b: &mut BanBuilder) -> AppResult<()> {
        b.ensure_usable()?;
        require(actor, RolePermission::ManageBans)?;
        self.ensure_outranks_victim(actor, b.initial().victim_id).await?;
        b.snapshot().validate()?;

        let changes = set_changes(b)?;
        let (id, victim_id) = (b.snapshot().id, b.snapshot().victim_id);
        self.persist(Collection::Bans, b).await?;

        info!(actor_id = %actor.id, ban_id = %id, victim_id = %victim_id, "Ban edited");
        let mut log = self.audit_entry(AuditLogKind::UnbanUser, actor.id, ObjectKind::User, victim_id);
        log.changes = changes;
        self.audit(log).await;
        Ok(())
    }

    async fn ensure_outranks_victim(&self, actor: &User, victim_id: ObjectId) -> AppResult<()> {
        let victim: User = find_one_as(self.store.as_ref(), Collection::Users, by_id(victim_id))
            .await
            .map_err(store_error)?
            .ok_or_else(|| AppError::UnknownUser(victim_id.to_hex()))?;
        if rank(&victim) >= rank(actor) {
            return Err(AppError::forbidden(
                "the victim has an equal or higher privilege level",
            ));
        }
        Ok(())
    }

    /// Inbox notice to the victim. Failures are logged.
    async fn notify_ban(&self, actor: &User, ban: &Ban) {
        let mut mb = Builder::new(Message::new(
            self.id_gen.generate(),
            actor.id,
            ban_notice(ban),
        ));
        let opt = SendInboxOptions {
            recipients: vec![ban.victim_id],
            consider_blocked_users: false,
        };
        if let Err(e) = self.deliver_inbox(actor.id, &mut mb, opt).await {
            warn!(ban_id = %ban.id, victim_id = %ban.victim_id, error = %e, "Failed to notify ban victim");
        }
    }
}

fn ban_notice(ban: &Ban) -> MessageDataInbox {
    let expire_at = if ban.is_permanent() {
        "never".to_string()
    } else {
        ban.expire_at
            .to_chrono()
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string()
    };
    let placeholders = HashMap::from([
        ("BAN_REASON".to_string(), ban.reason.clone()),
        ("BAN_EFFECT_NAMES".to_string(), ban.effect_flags().names().join(", ")),
        ("BAN_EXPIRE_AT".to_string(), expire_at),
    ]);

    MessageDataInbox {
        subject: "inbox.generic.client_banned.subject".into(),
        content: "inbox.generic.client_banned.content".into(),
        important: true,
        system: true,
        placeholders,
        ..MessageDataInbox::default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use emotes_db::structures::{BanEffect, never};

    #[test]
    fn test_ban_notice_placeholders() {
        let ban = Ban::new(
            ObjectId::new(),
            ObjectId::new(),
            ObjectId::new(),
            "spam",
            never(),
            BanEffect::NoOwnership | BanEffect::MemoryHole,
        );
        let notice = ban_notice(&ban);
        assert_eq!(notice.placeholders["BAN_EXPIRE_AT"], "never");
        assert_eq!(notice.placeholders["BAN_EFFECT_NAMES"], "No Ownership, Memory Hole");
        assert_eq!(notice.placeholders["BAN_REASON"], "spam");
        assert!(notice.system);
    }

    #[test]
    fn test_ban_notice_formats_expiry() {
        let ban = Ban::new(
            ObjectId::new(),
            ObjectId::new(),
            ObjectId::new(),
            "spam",
            bson::DateTime::from_millis(1_700_000_000_000),
            BanEffect::NoAuth,
        );
        assert_eq!(ban_notice(&ban).placeholders["BAN_EXPIRE_AT"], "2023-11-14 22:13:20 UTC");
    }
}
