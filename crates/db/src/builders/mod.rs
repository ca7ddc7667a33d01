//! Builders pair an entity snapshot with the store update that produces it.
//!
//! Every setter changes the snapshot and records the matching operation in
//! an [`UpdateMap`]. A builder is single-use: after a successful mutation
//! it is tainted and rejects further use.

mod ban;
mod emote;
mod emote_set;
mod entitlement;
mod message;
mod report;
mod role;
mod update;
mod user;

pub use ban::BanBuilder;
pub use emote::EmoteBuilder;
pub use emote_set::EmoteSetBuilder;
pub use entitlement::EntitlementBuilder;
pub use message::MessageBuilder;
pub use report::ReportBuilder;
pub use role::RoleBuilder;
pub use update::{UpdateMap, UpdateOp};
pub use user::UserBuilder;

use bson::oid::ObjectId;

use emotes_common::{AppError, AppResult, ZERO_ID};

use crate::structures::ObjectKind;

/// An entity a builder can wrap.
pub trait Buildable: Clone {
    /// Kind recorded in audit logs.
    const KIND: ObjectKind;

    /// The entity id.
    fn object_id(&self) -> ObjectId;
}

/// Pending state of a builder at some point in time.
#[derive(Debug, Clone)]
pub struct Checkpoint<T> {
    snapshot: T,
    update: UpdateMap,
}

/// Single-use accumulator of changes to one entity.
#[derive(Debug, Clone)]
pub struct Builder<T> {
    snapshot: T,
    initial: T,
    update: UpdateMap,
    tainted: bool,
}

impl<T: Buildable> Builder<T> {
    /// Wrap an entity.
    pub fn new(entity: T) -> Self {
        Self {
            initial: entity.clone(),
            snapshot: entity,
            update: UpdateMap::new(),
            tainted: false,
        }
    }

    /// Current state with pending changes applied.
    pub const fn snapshot(&self) -> &T {
        &self.snapshot
    }

    /// State before any change.
    pub const fn initial(&self) -> &T {
        &self.initial
    }

    /// Pending store operations.
    pub const fn update(&self) -> &UpdateMap {
        &self.update
    }

    /// Pending store operations, for collapsing before a write.
    pub fn update_mut(&mut self) -> &mut UpdateMap {
        &mut self.update
    }

    /// Whether the builder was consumed by a mutation.
    pub const fn is_tainted(&self) -> bool {
        self.tainted
    }

    /// Fail if the builder cannot be used for a mutation.
    pub fn ensure_usable(&self) -> AppResult<()> {
        if self.tainted {
            return Err(AppError::MutateTaintedObject);
        }
        if self.snapshot.object_id() == ZERO_ID {
            return Err(AppError::IncompleteMutation(format!(
                "{} builder has no object",
                T::KIND
            )));
        }
        Ok(())
    }

    /// Adopt the stored state after a write and mark the builder used.
    pub fn commit(&mut self, stored: T) {
        self.snapshot = stored;
        self.update.clear();
        self.tainted = true;
    }

    /// Mark the builder used without replacing the snapshot.
    pub fn taint(&mut self) {
        self.update.clear();
        self.tainted = true;
    }

    /// Capture pending changes so a failed batch can be undone.
    pub fn checkpoint(&self) -> Checkpoint<T> {
        Checkpoint {
            snapshot: self.snapshot.clone(),
            update: self.update.clone(),
        }
    }

    /// Restore pending changes captured by [`Builder::checkpoint`].
    pub fn rollback(&mut self, checkpoint: Checkpoint<T>) {
        self.snapshot = checkpoint.snapshot;
        self.update = checkpoint.update;
    }

    /// Take the snapshot.
    pub fn into_snapshot(self) -> T {
        self.snapshot
    }

    pub(crate) fn parts(&mut self) -> (&mut T, &mut UpdateMap) {
        (&mut self.snapshot, &mut self.update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::Role;

    #[test]
    fn test_taint_blocks_reuse() {
        let mut b = RoleBuilder::new(Role::new(ObjectId::new(), "Staff"));
        b.set_name("Moderator");
        assert!(b.ensure_usable().is_ok());

        let stored = b.snapshot().clone();
        b.commit(stored);
        assert!(b.is_tainted());
        assert!(b.update().is_empty());
        assert_eq!(b.ensure_usable(), Err(AppError::MutateTaintedObject));
    }

    #[test]
    fn test_zero_id_is_incomplete() {
        let b = RoleBuilder::new(Role::new(ZERO_ID, "Nobody"));
        assert!(matches!(b.ensure_usable(), Err(AppError::IncompleteMutation(_))));
    }

    #[test]
    fn test_rollback_discards_later_changes() {
        let mut b = RoleBuilder::new(Role::new(ObjectId::new(), "Staff"));
        b.set_name("Moderator");
        let checkpoint = b.checkpoint();
        b.set_position(7);

        b.rollback(checkpoint);
        assert_eq!(b.snapshot().name, "Moderator");
        assert_eq!(b.snapshot().position, 0);
        assert!(b.update().has(UpdateOp::Set, "name"));
        assert!(!b.update().has_key("position"));
        assert!(!b.is_tainted());
    }

    #[test]
    fn test_initial_is_preserved() {
        let mut b = RoleBuilder::new(Role::new(ObjectId::new(), "Staff"));
        b.set_position(4);
        assert_eq!(b.initial().position, 0);
        assert_eq!(b.snapshot().position, 4);
    }
}
