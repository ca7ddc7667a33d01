//! Ban and report listings for moderators.

use bson::{Document, doc};

use emotes_common::AppResult;
use emotes_db::aggregations::{
    Stage, ban_relation_actor, ban_relation_victim, report_relation_assignees,
    report_relation_reporter,
};
use emotes_db::store::aggregate_as;
use emotes_db::structures::{Ban, Report};
use emotes_db::{Collection, Fragment};

use super::{Query, store_error};

impl Query {
    /// Bans matching `filter`, newest first, with victim and actor.
    pub async fn ban_list(&self, filter: Document, limit: i64) -> AppResult<Vec<Ban>> {
        let pipeline = Fragment::new()
            .then(Stage::Match(filter))
            .then(Stage::Sort(doc! { "_id": -1 }))
            .then(Stage::Limit(limit.clamp(1, self.limits.max_search_limit.max(1))))
            .concat(ban_relation_victim())
            .concat(ban_relation_actor());

        aggregate_as(self.store.as_ref(), Collection::Bans, pipeline.into_pipeline())
            .await
            .map_err(store_error)
    }

    /// Reports matching `filter`, newest first, with reporter and assignees.
    pub async fn reports(&self, filter: Document, limit: i64) -> AppResult<Vec<Report>> {
        let pipeline = Fragment::new()
            .then(Stage::Match(filter))
            .then(Stage::Sort(doc! { "_id": -1 }))
            .then(Stage::Limit(limit.clamp(1, self.limits.max_search_limit.max(1))))
            .concat(report_relation_reporter())
            .concat(report_relation_assignees());

        aggregate_as(self.store.as_ref(), Collection::Reports, pipeline.into_pipeline())
            .await
            .map_err(store_error)
    }
}
