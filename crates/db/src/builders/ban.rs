use bson::oid::ObjectId;

use super::{Buildable, Builder};
use crate::structures::{Ban, BanEffect, ObjectKind};

/// Builder for [`Ban`].
pub type BanBuilder = Builder<Ban>;

impl Buildable for Ban {
    const KIND: ObjectKind = ObjectKind::Ban;

    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Builder<Ban> {
    /// Change the reason.
    pub fn set_reason(&mut self, reason: impl Into<String>) -> &mut Self {
        let (ban, update) = self.parts();
        ban.reason = reason.into();
        update.set("reason", ban.reason.clone());
        self
    }

    /// Change the expiry.
    pub fn set_expire_at(&mut self, expire_at: bson::DateTime) -> &mut Self {
        let (ban, update) = self.parts();
        ban.expire_at = expire_at;
        update.set("expire_at", expire_at);
        self
    }

    /// Replace the effects.
    pub fn set_effects(&mut self, effects: BanEffect) -> &mut Self {
        let (ban, update) = self.parts();
        ban.effects = effects.bits();
        update.set("effects", ban.effects);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_ban_setters() {
        let ban = Ban::new(
            ObjectId::new(),
            ObjectId::new(),
            ObjectId::new(),
            "spam",
            crate::structures::never(),
            BanEffect::NoAuth,
        );
        let mut b = BanBuilder::new(ban);
        b.set_effects(BanEffect::NoAuth | BanEffect::MemoryHole)
            .set_reason("repeated spam");

        assert!(b.snapshot().effect_flags().contains(BanEffect::MemoryHole));
        assert_eq!(
            b.update().to_document(),
            doc! { "$set": { "effects": (1 << 1) | (1 << 3), "reason": "repeated spam" } }
        );
    }
}
