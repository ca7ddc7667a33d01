//! Ban relation fragments.

use super::{Fragment, Stage};
use crate::store::Collection;

/// Attach the banned user as `victim`.
#[must_use]
pub fn ban_relation_victim() -> Fragment {
    Fragment::new()
        .then(Stage::lookup(Collection::Users, "victim_id", "_id", "victim"))
        .then(Stage::unwind("victim", true))
}

/// Attach the issuing moderator as `actor`.
#[must_use]
pub fn ban_relation_actor() -> Fragment {
    Fragment::new()
        .then(Stage::lookup(Collection::Users, "actor_id", "_id", "actor"))
        .then(Stage::unwind("actor", true))
}
