//! Emote relation fragments.

use bson::doc;

use super::{Fragment, Stage, user_relation_editors, user_relation_roles};
use crate::store::Collection;

/// Which owner relations to attach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnerRelationOptions {
    /// Attach the owner's editors.
    pub editors: bool,
    /// Attach the owner's roles.
    pub roles: bool,
}

/// Attach the emote's owner as `owner`, optionally with editors and roles.
#[must_use]
pub fn get_emote_relationship_owner(opt: OwnerRelationOptions) -> Fragment {
    let mut pipeline = Fragment::new().then(Stage::Match(doc! {
        "$expr": { "$eq": ["$_id", "$$owner_id"] },
    }));
    if opt.editors {
        pipeline = pipeline.concat(user_relation_editors());
    }
    if opt.roles {
        pipeline = pipeline.concat(user_relation_roles());
    }

    Fragment::new()
        .then(Stage::LookupPipeline {
            from: Collection::Users,
            let_vars: doc! { "owner_id": "$owner_id" },
            pipeline: pipeline.into_pipeline(),
            as_field: "owner".to_string(),
        })
        .then(Stage::unwind("owner", true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_compose_sub_fragments() {
        let bare = get_emote_relationship_owner(OwnerRelationOptions::default());
        let full = get_emote_relationship_owner(OwnerRelationOptions {
            editors: true,
            roles: true,
        });

        let inner_len = |f: &Fragment| match &f.stages()[0] {
            Stage::LookupPipeline { pipeline, .. } => pipeline.len(),
            _ => 0,
        };
        assert_eq!(inner_len(&bare), 1);
        assert_eq!(
            inner_len(&full),
            1 + user_relation_editors().len() + user_relation_roles().len()
        );
        assert_eq!(full.stages()[1], Stage::unwind("owner", true));
    }
}
