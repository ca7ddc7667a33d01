use bson::oid::ObjectId;
use bson::{Bson, Document, doc};

use super::{Buildable, Builder};
use crate::structures::{ActiveEmote, ActiveEmoteFlags, EmoteSet, ObjectKind};

/// Builder for [`EmoteSet`].
pub type EmoteSetBuilder = Builder<EmoteSet>;

impl Buildable for EmoteSet {
    const KIND: ObjectKind = ObjectKind::EmoteSet;

    fn object_id(&self) -> ObjectId {
        self.id
    }
}

/// Stored form of an active emote.
#[must_use]
pub fn active_emote_doc(e: &ActiveEmote) -> Document {
    doc! {
        "id": e.id,
        "name": e.name.clone(),
        "flags": e.flags,
        "timestamp": e.timestamp,
        "actor_id": e.actor_id,
    }
}

impl Builder<EmoteSet> {
    /// Rename the set.
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        let (set, update) = self.parts();
        set.name = name.into();
        update.set("name", set.name.clone());
        self
    }

    /// Replace the tags.
    pub fn set_tags(&mut self, tags: Vec<String>) -> &mut Self {
        let (set, update) = self.parts();
        set.tags = tags;
        update.set("tags", set.tags.clone());
        self
    }

    /// Freeze or unfreeze the set.
    pub fn set_immutable(&mut self, immutable: bool) -> &mut Self {
        let (set, update) = self.parts();
        set.immutable = immutable;
        update.set("immutable", immutable);
        self
    }

    /// Restrict edits to the owner and super-administrators.
    pub fn set_privileged(&mut self, privileged: bool) -> &mut Self {
        let (set, update) = self.parts();
        set.privileged = privileged;
        update.set("privileged", privileged);
        self
    }

    /// Set the capacity.
    pub fn set_emote_slots(&mut self, slots: i32) -> &mut Self {
        let (set, update) = self.parts();
        set.emote_slots = slots;
        update.set("emote_slots", slots);
        self
    }

    /// Transfer ownership.
    pub fn set_owner_id(&mut self, owner_id: ObjectId) -> &mut Self {
        let (set, update) = self.parts();
        set.owner_id = owner_id;
        update.set("owner_id", owner_id);
        self
    }

    /// Enable an emote.
    pub fn add_active_emote(
        &mut self,
        id: ObjectId,
        name: impl Into<String>,
        flags: ActiveEmoteFlags,
        actor_id: ObjectId,
    ) -> &mut Self {
        let (set, update) = self.parts();
        let active = ActiveEmote::new(id, name, flags, actor_id);
        update.push("emotes", active_emote_doc(&active));
        set.emotes.push(active);
        self
    }

    /// Rename or reflag an active emote. Returns its index, or `None` if it
    /// is not active.
    pub fn update_active_emote(
        &mut self,
        id: ObjectId,
        name: Option<String>,
        flags: Option<ActiveEmoteFlags>,
    ) -> Option<usize> {
        let (set, update) = self.parts();
        let i = set.emotes.iter().position(|e| e.id == id)?;
        let active = &mut set.emotes[i];
        if let Some(name) = name {
            update.set(format!("emotes.{i}.name"), name.clone());
            active.name = name;
        }
        if let Some(flags) = flags {
            active.flags = flags.bits();
            update.set(format!("emotes.{i}.flags"), active.flags);
        }
        Some(i)
    }

    /// Disable an emote. Returns the removed entry and its former index.
    pub fn remove_active_emote(&mut self, id: ObjectId) -> Option<(usize, ActiveEmote)> {
        let (set, update) = self.parts();
        let i = set.emotes.iter().position(|e| e.id == id)?;
        update.pull("emotes", doc! { "id": id });
        Some((i, set.emotes.remove(i)))
    }

    /// Collapse mixed operations on the active emote list into a single
    /// `$set` of the current list.
    pub fn collapse_active_emotes(&mut self) -> &mut Self {
        let (set, update) = self.parts();
        if update.operators_on("emotes") > 1 {
            let all: Vec<Bson> = set
                .emotes
                .iter()
                .map(|e| Bson::Document(active_emote_doc(e)))
                .collect();
            update.flatten_key("emotes", all);
        }
        self
    }
}
