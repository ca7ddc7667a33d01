//! Report relation fragments.

use super::{Fragment, Stage};
use crate::store::Collection;
use crate::structures::ObjectKind;

/// Attach the reporter as `reporter`.
#[must_use]
pub fn report_relation_reporter() -> Fragment {
    Fragment::new()
        .then(Stage::lookup(Collection::Users, "actor_id", "_id", "reporter"))
        .then(Stage::unwind("reporter", true))
}

/// Attach assigned moderators as `assignees[]`.
#[must_use]
pub fn report_relation_assignees() -> Fragment {
    Fragment::new().then(Stage::lookup(
        Collection::Users,
        "assignee_ids",
        "_id",
        "assignees",
    ))
}

/// Attach the reported object as `target`. Kinds without a collection attach nothing.
#[must_use]
pub fn report_relation_target(kind: ObjectKind) -> Fragment {
    let from = match kind {
        ObjectKind::User => Collection::Users,
        ObjectKind::Emote => Collection::Emotes,
        ObjectKind::EmoteSet => Collection::EmoteSets,
        _ => return Fragment::new(),
    };
    Fragment::new()
        .then(Stage::lookup(from, "target_id", "_id", "target"))
        .then(Stage::unwind("target", true))
}
