use bson::oid::ObjectId;

use super::{Buildable, Builder};
use crate::structures::{Emote, EmoteFlags, EmoteLifecycle, ObjectKind};

/// Builder for [`Emote`].
pub type EmoteBuilder = Builder<Emote>;

impl Buildable for Emote {
    const KIND: ObjectKind = ObjectKind::Emote;

    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Builder<Emote> {
    /// Rename the emote.
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        let (emote, update) = self.parts();
        emote.name = name.into();
        update.set("name", emote.name.clone());
        self
    }

    /// Transfer ownership.
    pub fn set_owner_id(&mut self, owner_id: ObjectId) -> &mut Self {
        let (emote, update) = self.parts();
        emote.owner_id = owner_id;
        update.set("owner_id", owner_id);
        self
    }

    /// Replace the flags.
    pub fn set_flags(&mut self, flags: EmoteFlags) -> &mut Self {
        let (emote, update) = self.parts();
        emote.flags = flags.bits();
        update.set("flags", emote.flags);
        self
    }

    /// Replace the tags. Duplicates are dropped, first occurrence wins.
    pub fn set_tags(&mut self, tags: Vec<String>) -> &mut Self {
        let (emote, update) = self.parts();
        let mut deduped: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !deduped.contains(&tag) {
                deduped.push(tag);
            }
        }
        emote.tags = deduped;
        update.set("tags", emote.tags.clone());
        self
    }

    /// Set the emote-level lifecycle.
    pub fn set_lifecycle(&mut self, lifecycle: EmoteLifecycle) -> &mut Self {
        let (emote, update) = self.parts();
        emote.state.lifecycle = lifecycle;
        update.set("state.lifecycle", i32::from(lifecycle));
        self
    }

    /// Set the parent emote.
    pub fn set_parent_id(&mut self, parent_id: Option<ObjectId>) -> &mut Self {
        let (emote, update) = self.parts();
        emote.parent_id = parent_id;
        match parent_id {
            Some(id) => update.set("parent_id", id),
            None => update.unset("parent_id"),
        };
        self
    }

    /// Set one version's lifecycle. Returns whether the version exists.
    pub fn set_version_lifecycle(&mut self, version_id: ObjectId, lifecycle: EmoteLifecycle) -> bool {
        let (emote, update) = self.parts();
        let Some(i) = emote.versions.iter().position(|v| v.id == version_id) else {
            return false;
        };
        emote.versions[i].state.lifecycle = lifecycle;
        update.set(format!("versions.{i}.state.lifecycle"), i32::from(lifecycle));
        true
    }

    /// Rename one version. Returns whether the version exists.
    pub fn set_version_name(&mut self, version_id: ObjectId, name: impl Into<String>) -> bool {
        let (emote, update) = self.parts();
        let Some(i) = emote.versions.iter().position(|v| v.id == version_id) else {
            return false;
        };
        emote.versions[i].name = name.into();
        update.set(format!("versions.{i}.name"), emote.versions[i].name.clone());
        true
    }

    /// Describe one version. Returns whether the version exists.
    pub fn set_version_description(&mut self, version_id: ObjectId, description: impl Into<String>) -> bool {
        let (emote, update) = self.parts();
        let Some(i) = emote.versions.iter().position(|v| v.id == version_id) else {
            return false;
        };
        emote.versions[i].description = description.into();
        update.set(
            format!("versions.{i}.description"),
            emote.versions[i].description.clone(),
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_tags_are_deduplicated() {
        let mut b = EmoteBuilder::new(Emote::new(ObjectId::new(), ObjectId::new(), "Pog"));
        b.set_tags(vec!["pog".into(), "hype".into(), "pog".into()]);
        assert_eq!(b.snapshot().tags, vec!["pog", "hype"]);
        assert_eq!(
            b.update().to_document(),
            doc! { "$set": { "tags": ["pog", "hype"] } }
        );
    }

    #[test]
    fn test_version_lifecycle_uses_positional_path() {
        let emote = Emote::new(ObjectId::new(), ObjectId::new(), "Pog");
        let version = emote.versions[0].id;
        let mut b = EmoteBuilder::new(emote);

        assert!(b.set_version_lifecycle(version, EmoteLifecycle::Deleted));
        assert!(!b.set_version_lifecycle(ObjectId::new(), EmoteLifecycle::Deleted));
        assert_eq!(
            b.update().to_document(),
            doc! { "$set": { "versions.0.state.lifecycle": -1 } }
        );
        assert_eq!(b.initial().versions[0].state.lifecycle, EmoteLifecycle::Live);
    }
}
