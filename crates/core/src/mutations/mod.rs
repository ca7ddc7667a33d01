//! Mutation engine.
//!
//! Every operation follows the same protocol: reject an unusable builder,
//! authorize the actor against their resolved roles, validate, persist the
//! builder's update map, write one audit log entry, publish a change event
//! and taint the builder. Audit log and event writes are best-effort.

mod ban;
mod emote;
mod emote_set;
mod message;
mod report;
mod role;
mod user;

pub use ban::BanOptions;
pub use emote::{DeleteEmoteOptions, EditEmoteOptions};
pub use emote_set::{EditEmoteSetOptions, EmoteSetEmoteChange};
pub use message::{ReadStateResult, SendInboxOptions, SetReadStatesOptions};
pub(crate) use message::mod_request_permission;
pub use user::{EditorChange, SetActiveEmoteSetOptions};

use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use emotes_common::config::{LimitsConfig, StorageConfig};
use emotes_common::{AppError, AppResult, IdGenerator, LocalMutexMap};
use emotes_db::store::{by_id, insert_as};
use emotes_db::structures::{
    AuditLog, AuditLogChange, AuditLogKind, ObjectKind, RolePermission, User,
};
use emotes_db::{
    Buildable, Builder, Checkpoint, Collection, DocumentStore, ObjectStorage, ReturnDocument,
    UpdateOp,
};
use emotes_events::{ChangeField, ChangeMap, EventPublisher, EventType};

/// Which list operation a mutation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListItemAction {
    /// Add an item.
    Add,
    /// Change an existing item.
    Update,
    /// Remove an item.
    Remove,
}

/// Authorization-checked writes.
pub struct Mutator {
    store: Arc<dyn DocumentStore>,
    storage: Arc<dyn ObjectStorage>,
    events: Arc<dyn EventPublisher>,
    locks: LocalMutexMap,
    id_gen: IdGenerator,
    limits: LimitsConfig,
    storage_config: StorageConfig,
}

impl Mutator {
    /// Create a mutation engine with default limits.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn ObjectStorage>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            storage,
            events,
            locks: LocalMutexMap::new(),
            id_gen: IdGenerator::new(),
            limits: LimitsConfig::default(),
            storage_config: StorageConfig::default(),
        }
    }

    /// Use configured domain limits.
    #[must_use]
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Use configured object storage settings.
    #[must_use]
    pub fn with_storage_config(mut self, config: StorageConfig) -> Self {
        self.storage_config = config;
        self
    }

    /// Write the builder's update map and adopt the stored document.
    ///
    /// An empty update map skips the write.
    async fn persist<T>(&self, coll: Collection, builder: &mut Builder<T>) -> AppResult<()>
    where
        T: Buildable + DeserializeOwned,
    {
        if builder.update().is_empty() {
            debug!(kind = %T::KIND, "Nothing to write");
            builder.taint();
            return Ok(());
        }

        let id = builder.snapshot().object_id();
        let stored = self
            .store
            .find_one_and_update(
                coll,
                by_id(id),
                builder.update().to_document(),
                ReturnDocument::After,
            )
            .await
            .map_err(store_error)?;

        let Some(stored) = stored else {
            return Err(not_found(T::KIND, id));
        };
        builder.commit(bson::from_document(stored)?);
        Ok(())
    }

    /// Persist, restoring `checkpoint` if the write fails.
    async fn persist_or_rollback<T>(
        &self,
        coll: Collection,
        builder: &mut Builder<T>,
        checkpoint: Checkpoint<T>,
    ) -> AppResult<()>
    where
        T: Buildable + DeserializeOwned,
    {
        let result = self.persist(coll, builder).await;
        if result.is_err() {
            builder.rollback(checkpoint);
        }
        result
    }

    /// Insert the builder's snapshot as a new document.
    async fn insert<T>(&self, coll: Collection, builder: &mut Builder<T>) -> AppResult<()>
    where
        T: Buildable + Serialize + Sync,
    {
        insert_as(self.store.as_ref(), coll, builder.snapshot())
            .await
            .map_err(store_error)?;
        let stored = builder.snapshot().clone();
        builder.commit(stored);
        Ok(())
    }

    /// Append an audit log entry. Failures are logged.
    async fn audit(&self, log: AuditLog) {
        let (kind, target) = (log.kind, log.target_id);
        if let Err(e) = insert_as(self.store.as_ref(), Collection::AuditLogs, &log).await {
            error!(?kind, target_id = %target, error = %e, "Failed to write audit log");
        }
    }

    /// Publish a dispatch event. Failures are logged.
    async fn dispatch(&self, event_type: EventType, change: ChangeMap) {
        let id = change.id.clone();
        if let Err(e) = self.events.dispatch(event_type, change).await {
            warn!(event = event_type.as_str(), object_id = %id, error = %e, "Failed to publish event");
        }
    }

    fn audit_entry(
        &self,
        kind: AuditLogKind,
        actor_id: ObjectId,
        target_kind: ObjectKind,
        target_id: ObjectId,
    ) -> AuditLog {
        AuditLog::new(self.id_gen.generate(), kind, actor_id, target_kind, target_id)
    }
}

/// Surface a store failure as an internal error.
fn store_error(e: AppError) -> AppError {
    match e {
        AppError::InternalServerError(_) => e,
        other => AppError::internal(other),
    }
}

/// Fail unless `actor` holds `flag`.
fn require(actor: &User, flag: RolePermission) -> AppResult<()> {
    if actor.has_permission(flag) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("missing permission {flag:?}")))
    }
}

/// Seniority of a user: their highest resolved role, falling back to the
/// denormalized position when roles were not loaded.
fn rank(user: &User) -> i32 {
    user.highest_role_position().unwrap_or(user.state.role_position)
}

/// The not-found error for an object kind.
fn not_found(kind: ObjectKind, id: ObjectId) -> AppError {
    let id = id.to_hex();
    match kind {
        ObjectKind::User => AppError::UnknownUser(id),
        ObjectKind::Emote => AppError::UnknownEmote(id),
        ObjectKind::EmoteSet => AppError::UnknownEmoteSet(id),
        ObjectKind::Role => AppError::UnknownRole(id),
        ObjectKind::Ban => AppError::UnknownBan(id),
        ObjectKind::Message => AppError::UnknownMessage(id),
        ObjectKind::Report => AppError::UnknownReport(id),
        ObjectKind::Entitlement | ObjectKind::Cosmetic => {
            AppError::internal(format!("{kind} {id} not found"))
        }
    }
}

/// Single-value audit changes for every `$set` path of the builder,
/// reading old values from its initial snapshot.
fn set_changes<T: Buildable + Serialize>(builder: &Builder<T>) -> AppResult<Vec<AuditLogChange>> {
    let update = builder.update().to_document();
    let Ok(sets) = update.get_document(UpdateOp::Set.as_str()) else {
        return Ok(Vec::new());
    };
    let initial = bson::to_document(builder.initial())?;

    let mut changes = Vec::with_capacity(sets.len());
    for (key, new) in sets {
        let old = path_value(&initial, key).cloned().unwrap_or(Bson::Null);
        changes.push(AuditLogChange::single(key.clone(), &old, new, None)?);
    }
    Ok(changes)
}

/// Field changes for an event, one per `$set` path.
fn set_fields<T: Buildable + Serialize>(builder: &Builder<T>) -> AppResult<Vec<ChangeField>> {
    set_changes(builder)?
        .into_iter()
        .map(|c| {
            let old = c.value.as_document().and_then(|d| d.get("o")).cloned();
            let new = c.value.as_document().and_then(|d| d.get("n")).cloned();
            ChangeField::of(
                c.key,
                &old.map(Bson::into_relaxed_extjson),
                &new.map(Bson::into_relaxed_extjson),
            )
        })
        .collect()
}

/// Read a dotted path with numeric array segments.
fn path_value<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(d) => d.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bson::doc;
    use emotes_db::structures::Role;

    #[test]
    fn test_path_value() {
        let d = doc! { "a": { "b": [ { "c": 1 }, { "c": 2 } ] } };
        assert_eq!(path_value(&d, "a.b.1.c"), Some(&Bson::Int32(2)));
        assert_eq!(path_value(&d, "a.x"), None);
        assert_eq!(path_value(&d, "a.b.9"), None);
    }

    #[test]
    fn test_set_changes_read_initial_values() {
        let mut b = Builder::new(Role::new(ObjectId::new(), "old"));
        b.set_name("new").set_position(4);

        let changes = set_changes(&b).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].key, "name");
        let value = changes[0].value.as_document().unwrap();
        assert_eq!(value.get_str("o").unwrap(), "old");
        assert_eq!(value.get_str("n").unwrap(), "new");
    }

    #[test]
    fn test_rank_falls_back_to_state() {
        let mut user = User::new(ObjectId::new(), "a");
        user.state.role_position = 7;
        assert_eq!(rank(&user), 7);
        user.roles.push(Role { position: 3, ..Role::new(ObjectId::new(), "r") });
        assert_eq!(rank(&user), 3);
    }
}
