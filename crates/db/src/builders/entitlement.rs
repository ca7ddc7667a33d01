use bson::oid::ObjectId;
use bson::doc;

use super::{Buildable, Builder};
use crate::structures::{Entitlement, EntitlementCondition, ObjectKind};

/// Builder for [`Entitlement`].
pub type EntitlementBuilder<D = bson::Document> = Builder<Entitlement<D>>;

impl<D: Clone> Buildable for Entitlement<D> {
    const KIND: ObjectKind = ObjectKind::Entitlement;

    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl<D: Clone> Builder<Entitlement<D>> {
    /// Revoke or restore.
    pub fn set_disabled(&mut self, disabled: bool) -> &mut Self {
        let (ent, update) = self.parts();
        ent.disabled = disabled;
        update.set("disabled", disabled);
        self
    }

    /// Replace the applicability conditions.
    pub fn set_condition(&mut self, condition: EntitlementCondition) -> &mut Self {
        let (ent, update) = self.parts();
        let mut encoded = doc! {
            "any_roles": condition.any_roles.clone(),
            "all_roles": condition.all_roles.clone(),
        };
        if let Some(d) = condition.min_date {
            encoded.insert("min_date", d);
        }
        if let Some(d) = condition.max_date {
            encoded.insert("max_date", d);
        }
        ent.condition = condition;
        update.set("condition", encoded);
        self
    }
}
