//! Emote set relation fragments.

use bson::doc;

use super::{Fragment, OwnerRelationOptions, Stage, get_emote_relationship_owner};
use crate::store::Collection;

/// Attach each active emote's emote as `.emote`, matched by version id.
///
/// With `with_owners`, each emote also carries its owner and the owner's
/// roles.
#[must_use]
pub fn emote_set_relation_active_emotes(with_owners: bool) -> Fragment {
    let lookup = if with_owners {
        let pipeline = Fragment::new()
            .then(Stage::Match(doc! {
                "versions.id": { "$exists": true },
                "$expr": { "$gt": [{ "$size": { "$setIntersection": [
                    "$versions.id",
                    { "$ifNull": ["$$active_ids", []] },
                ] } }, 0] },
            }))
            .concat(get_emote_relationship_owner(OwnerRelationOptions {
                editors: false,
                roles: true,
            }));
        Stage::LookupPipeline {
            from: Collection::Emotes,
            let_vars: doc! { "active_ids": "$emotes.id" },
            pipeline: pipeline.into_pipeline(),
            as_field: "_active_emotes".to_string(),
        }
    } else {
        Stage::lookup(Collection::Emotes, "emotes.id", "versions.id", "_active_emotes")
    };

    Fragment::new()
        .then(lookup)
        .then(Stage::Set(doc! {
            "emotes": {
                "$map": {
                    "input": { "$ifNull": ["$emotes", []] },
                    "as": "ae",
                    "in": { "$mergeObjects": ["$$ae", {
                        "emote": { "$arrayElemAt": [{
                            "$filter": {
                                "input": "$_active_emotes",
                                "as": "e",
                                "cond": { "$in": ["$$ae.id", "$$e.versions.id"] },
                            },
                        }, 0] },
                    }] },
                },
            },
        }))
        .then(Stage::Unset(vec!["_active_emotes".to_string()]))
}

/// Attach the set's owner as `owner` with roles.
#[must_use]
pub fn emote_set_relation_owner() -> Fragment {
    get_emote_relationship_owner(OwnerRelationOptions {
        editors: false,
        roles: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lookup_matches_versions() {
        let fragment = emote_set_relation_active_emotes(false);
        assert_eq!(
            fragment.stages()[0],
            Stage::lookup(Collection::Emotes, "emotes.id", "versions.id", "_active_emotes")
        );
        assert_eq!(fragment.len(), 3);
    }
}
