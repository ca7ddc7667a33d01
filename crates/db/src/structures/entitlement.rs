//! Entitlements: grants of roles, badges, paints, subscriptions and emote
//! sets attached to a user.

use bson::Document;
use bson::oid::ObjectId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use emotes_common::AppResult;

/// Entitlement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementKind {
    /// Subscription.
    Subscription,
    /// Badge cosmetic.
    Badge,
    /// Paint cosmetic.
    Paint,
    /// Role.
    Role,
    /// Emote set.
    EmoteSet,
}

/// Conditions under which an entitlement applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementCondition {
    /// Applies if the user holds any of these roles.
    #[serde(default)]
    pub any_roles: Vec<ObjectId>,
    /// Applies only if the user holds all of these roles.
    #[serde(default)]
    pub all_roles: Vec<ObjectId>,
    /// Not before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_date: Option<bson::DateTime>,
    /// Not after.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_date: Option<bson::DateTime>,
}

impl EntitlementCondition {
    /// Whether the condition holds for a user with `role_ids` at `now`.
    #[must_use]
    pub fn holds(&self, role_ids: &[ObjectId], now: bson::DateTime) -> bool {
        if self.min_date.is_some_and(|d| now < d) || self.max_date.is_some_and(|d| now > d) {
            return false;
        }
        if !self.any_roles.is_empty() && !self.any_roles.iter().any(|r| role_ids.contains(r)) {
            return false;
        }
        self.all_roles.iter().all(|r| role_ids.contains(r))
    }
}

/// The application that granted an entitlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementApp {
    /// App name.
    pub name: String,
    /// App-specific state.
    #[serde(default)]
    pub state: Document,
}

/// A typed entitlement payload.
pub trait EntitlementData: Serialize + DeserializeOwned {
    /// The kind this payload belongs to.
    const KIND: EntitlementKind;
}

/// A grant attached to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entitlement<D = Document> {
    /// Entitlement ID.
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Kind.
    pub kind: EntitlementKind,
    /// Kind-specific payload.
    pub data: D,
    /// Recipient.
    pub user_id: ObjectId,
    /// Applicability conditions.
    #[serde(default)]
    pub condition: EntitlementCondition,
    /// Revoked.
    #[serde(default)]
    pub disabled: bool,
    /// Granting application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<EntitlementApp>,
}

impl<D: EntitlementData> Entitlement<D> {
    /// Create an entitlement of the payload's kind.
    pub const fn new(id: ObjectId, user_id: ObjectId, data: D) -> Self {
        Self {
            id,
            kind: D::KIND,
            data,
            user_id,
            condition: EntitlementCondition {
                any_roles: Vec::new(),
                all_roles: Vec::new(),
                min_date: None,
                max_date: None,
            },
            disabled: false,
            app: None,
        }
    }
}

impl<D> Entitlement<D> {
    fn with_data<T>(self, data: T) -> Entitlement<T> {
        Entitlement {
            id: self.id,
            kind: self.kind,
            data,
            user_id: self.user_id,
            condition: self.condition,
            disabled: self.disabled,
            app: self.app,
        }
    }

    /// Whether the entitlement is in effect for a user holding `role_ids`.
    #[must_use]
    pub fn applies(&self, role_ids: &[ObjectId], now: bson::DateTime) -> bool {
        !self.disabled && self.condition.holds(role_ids, now)
    }
}

impl<D: Serialize> Entitlement<D> {
    /// Re-encode the payload as a raw document.
    pub fn to_raw(self) -> AppResult<Entitlement> {
        let data = bson::to_document(&self.data)?;
        Ok(self.with_data(data))
    }
}

impl Entitlement {
    /// Decode the payload into a typed struct.
    pub fn convert<T: DeserializeOwned>(mut self) -> AppResult<Entitlement<T>> {
        let data = bson::from_document(std::mem::take(&mut self.data))?;
        Ok(self.with_data(data))
    }

    /// The object referenced by the payload, if any.
    #[must_use]
    pub fn ref_id(&self) -> Option<ObjectId> {
        self.data.get_object_id("ref").ok()
    }
}

/// Role grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementDataRole {
    /// Granted role.
    #[serde(rename = "ref")]
    pub ref_id: ObjectId,
}

impl EntitlementData for EntitlementDataRole {
    const KIND: EntitlementKind = EntitlementKind::Role;
}

/// Badge grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementDataBadge {
    /// Granted badge cosmetic.
    #[serde(rename = "ref")]
    pub ref_id: ObjectId,
    /// Displayed on the profile.
    #[serde(default)]
    pub selected: bool,
    /// Role the badge stands for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_binding: Option<ObjectId>,
}

impl EntitlementData for EntitlementDataBadge {
    const KIND: EntitlementKind = EntitlementKind::Badge;
}

/// Paint grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementDataPaint {
    /// Granted paint cosmetic.
    #[serde(rename = "ref")]
    pub ref_id: ObjectId,
    /// Displayed on the profile.
    #[serde(default)]
    pub selected: bool,
}

impl EntitlementData for EntitlementDataPaint {
    const KIND: EntitlementKind = EntitlementKind::Paint;
}

/// Subscription grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementDataSubscription {
    /// Subscription id.
    #[serde(rename = "ref")]
    pub ref_id: ObjectId,
}

impl EntitlementData for EntitlementDataSubscription {
    const KIND: EntitlementKind = EntitlementKind::Subscription;
}

/// Emote set grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementDataEmoteSet {
    /// Granted set.
    #[serde(rename = "ref")]
    pub ref_id: ObjectId,
}

impl EntitlementData for EntitlementDataEmoteSet {
    const KIND: EntitlementKind = EntitlementKind::EmoteSet;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_roundtrip_keeps_ref() {
        let role_id = ObjectId::new();
        let ent = Entitlement::new(ObjectId::new(), ObjectId::new(), EntitlementDataRole { ref_id: role_id });
        assert_eq!(ent.kind, EntitlementKind::Role);

        let raw = ent.to_raw().unwrap();
        assert_eq!(raw.ref_id(), Some(role_id));

        let doc = bson::to_document(&raw).unwrap();
        assert_eq!(doc.get_str("kind").unwrap(), "role");

        let typed = raw.convert::<EntitlementDataRole>().unwrap();
        assert_eq!(typed.data.ref_id, role_id);
    }

    #[test]
    fn test_condition() {
        let staff = ObjectId::new();
        let other = ObjectId::new();
        let now = bson::DateTime::now();

        let mut cond = EntitlementCondition::default();
        assert!(cond.holds(&[], now));

        cond.any_roles = vec![staff];
        assert!(!cond.holds(&[other], now));
        assert!(cond.holds(&[other, staff], now));

        cond.max_date = Some(bson::DateTime::from_millis(0));
        assert!(!cond.holds(&[staff], now));
    }
}
