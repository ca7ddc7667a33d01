//! Role queries.

use std::time::Duration;

use bson::{Document, doc};
use tracing::debug;

use emotes_common::{AppError, AppResult};
use emotes_db::store::{find_as, find_one_as};
use emotes_db::structures::{EmoteSet, Role, System};
use emotes_db::{Collection, FindOptions};

use super::{Query, store_error};

const DEFAULT_ROLES_TTL: Duration = Duration::from_secs(5 * 60);

impl Query {
    /// Roles matching `filter`, most senior first.
    pub async fn roles(&self, filter: Document) -> AppResult<Vec<Role>> {
        let key = filter.to_string();
        if let Some(roles) = self.role_cache.get(&key) {
            return Ok(roles);
        }

        let roles: Vec<Role> = find_as(
            self.store.as_ref(),
            Collection::Roles,
            filter,
            FindOptions::default().sort(doc! { "position": -1 }),
        )
        .await
        .map_err(store_error)?;
        debug!(filter = %key, roles = roles.len(), "Loaded roles");
        self.role_cache.insert(key, roles.clone());
        Ok(roles)
    }

    /// Roles granted to every user.
    pub async fn default_roles(&self) -> AppResult<Vec<Role>> {
        let key = self.cache.keys().key(&["roles", "default"]);
        if let Some(roles) = self.cached::<Vec<Role>>(&key).await {
            return Ok(roles);
        }

        let roles = self.roles(doc! { "default": true }).await?;
        self.cache
            .set_json_best_effort(&key, &roles, DEFAULT_ROLES_TTL)
            .await;
        Ok(roles)
    }

    /// The platform's global emote set.
    pub async fn global_emote_set(&self) -> AppResult<EmoteSet> {
        if let Some(set) = self.global_set.get(&()) {
            return Ok(set);
        }

        let system: System = find_one_as(self.store.as_ref(), Collection::System, Document::new())
            .await
            .map_err(store_error)?
            .ok_or_else(|| AppError::internal("system document is missing"))?;
        let set = self
            .emote_set(system.emote_set_id)
            .await?
            .ok_or_else(|| AppError::UnknownEmoteSet(system.emote_set_id.to_hex()))?;
        self.global_set.insert((), set.clone());
        Ok(set)
    }
}
