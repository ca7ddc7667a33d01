//! User relation fragments.

use bson::doc;

use super::{Fragment, Stage};
use crate::store::Collection;

/// Attach `roles[]`: direct `role_ids` unioned with ROLE entitlement
/// references, resolved against the roles collection.
#[must_use]
pub fn user_relation_roles() -> Fragment {
    Fragment::new()
        .then(Stage::LookupPipeline {
            from: Collection::Entitlements,
            let_vars: doc! { "user_id": "$_id" },
            pipeline: vec![
                Stage::Match(doc! {
                    "kind": "role",
                    "disabled": { "$ne": true },
                    "$expr": { "$eq": ["$user_id", "$$user_id"] },
                }),
                Stage::Project(doc! { "ref": "$data.ref" }),
            ],
            as_field: "_role_entitlements".to_string(),
        })
        .then(Stage::Set(doc! {
            "role_ids": {
                "$setUnion": [
                    { "$ifNull": ["$role_ids", []] },
                    "$_role_entitlements.ref",
                ],
            },
        }))
        .then(Stage::lookup(Collection::Roles, "role_ids", "_id", "roles"))
        .then(Stage::Unset(vec!["_role_entitlements".to_string()]))
}

/// Attach each `editors[]` element's user as `.user`.
#[must_use]
pub fn user_relation_editors() -> Fragment {
    Fragment::new()
        .then(Stage::lookup(Collection::Users, "editors.id", "_id", "_editor_users"))
        .then(Stage::Set(doc! {
            "editors": {
                "$map": {
                    "input": { "$ifNull": ["$editors", []] },
                    "as": "e",
                    "in": { "$mergeObjects": ["$$e", {
                        "user": { "$arrayElemAt": [{
                            "$filter": {
                                "input": "$_editor_users",
                                "as": "u",
                                "cond": { "$eq": ["$$u._id", "$$e.id"] },
                            },
                        }, 0] },
                    }] },
                },
            },
        }))
        .then(Stage::Unset(vec!["_editor_users".to_string()]))
}

/// Attach `editor_of[]`: users whose `editors[]` contain this user, each as
/// the matching editor entry with the editee as `.user`.
#[must_use]
pub fn user_relation_editor_of() -> Fragment {
    Fragment::new()
        .then(Stage::LookupPipeline {
            from: Collection::Users,
            let_vars: doc! { "user_id": "$_id" },
            pipeline: vec![
                Stage::Match(doc! {
                    "$expr": { "$in": ["$$user_id", { "$ifNull": ["$editors.id", []] }] },
                }),
                Stage::Project(doc! {
                    "username": 1,
                    "display_name": 1,
                    "avatar_id": 1,
                    "role_ids": 1,
                    "editors": 1,
                }),
            ],
            as_field: "_editor_of".to_string(),
        })
        .then(Stage::Set(doc! {
            "editor_of": {
                "$map": {
                    "input": "$_editor_of",
                    "as": "u",
                    "in": { "$mergeObjects": [
                        { "$arrayElemAt": [{
                            "$filter": {
                                "input": "$$u.editors",
                                "as": "e",
                                "cond": { "$eq": ["$$e.id", "$_id"] },
                            },
                        }, 0] },
                        { "id": "$$u._id", "user": "$$u" },
                    ] },
                },
            },
        }))
        .then(Stage::Unset(vec!["_editor_of".to_string()]))
}

/// Attach `owned_emotes[]`.
#[must_use]
pub fn user_relation_owned_emotes() -> Fragment {
    Fragment::new().then(Stage::lookup(
        Collection::Emotes,
        "_id",
        "owner_id",
        "owned_emotes",
    ))
}

/// Attach each connection's emote set, with its active emotes and their
/// owners' roles.
#[must_use]
pub fn user_connection_emote_set_relation() -> Fragment {
    let set_pipeline = Fragment::new()
        .then(Stage::Match(doc! {
            "$expr": { "$in": ["$_id", { "$ifNull": ["$$set_ids", []] }] },
        }))
        .concat(super::emote_set_relation_active_emotes(true));

    Fragment::new()
        .then(Stage::LookupPipeline {
            from: Collection::EmoteSets,
            let_vars: doc! { "set_ids": "$connections.emote_set_id" },
            pipeline: set_pipeline.into_pipeline(),
            as_field: "_connection_sets".to_string(),
        })
        .then(Stage::Set(doc! {
            "connections": {
                "$map": {
                    "input": { "$ifNull": ["$connections", []] },
                    "as": "c",
                    "in": { "$mergeObjects": ["$$c", {
                        "emote_set": { "$arrayElemAt": [{
                            "$filter": {
                                "input": "$_connection_sets",
                                "as": "s",
                                "cond": { "$eq": ["$$s._id", "$$c.emote_set_id"] },
                            },
                        }, 0] },
                    }] },
                },
            },
        }))
        .then(Stage::Unset(vec!["_connection_sets".to_string()]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_fragment_filters_role_entitlements() {
        let fragment = user_relation_roles();
        let Stage::LookupPipeline { from, pipeline, .. } = &fragment.stages()[0] else {
            panic!("expected a pipeline lookup");
        };
        assert_eq!(*from, Collection::Entitlements);
        assert_eq!(
            pipeline[0],
            Stage::Match(doc! {
                "kind": "role",
                "disabled": { "$ne": true },
                "$expr": { "$eq": ["$user_id", "$$user_id"] },
            })
        );
        assert!(matches!(
            &fragment.stages()[2],
            Stage::Lookup { from: Collection::Roles, .. }
        ));
    }

    #[test]
    fn test_connection_relation_nests_three_levels() {
        let fragment = user_connection_emote_set_relation();
        let Stage::LookupPipeline { from, pipeline, .. } = &fragment.stages()[0] else {
            panic!("expected a pipeline lookup");
        };
        assert_eq!(*from, Collection::EmoteSets);

        let emotes = pipeline.iter().find_map(|s| match s {
            Stage::LookupPipeline {
                from: Collection::Emotes,
                pipeline,
                ..
            } => Some(pipeline),
            _ => None,
        });
        let owners = emotes.and_then(|p| {
            p.iter().find_map(|s| match s {
                Stage::LookupPipeline {
                    from: Collection::Users,
                    pipeline,
                    ..
                } => Some(pipeline),
                _ => None,
            })
        });
        let has_roles = owners.is_some_and(|p| {
            p.iter()
                .any(|s| matches!(s, Stage::Lookup { from: Collection::Roles, .. }))
        });
        assert!(has_roles);
    }
}
