use bson::oid::ObjectId;
use serde::Serialize;

use emotes_common::AppResult;

use super::{Buildable, Builder};
use crate::structures::{Message, ObjectKind};

/// Builder for [`Message`].
pub type MessageBuilder<D = bson::Document> = Builder<Message<D>>;

impl<D: Clone> Buildable for Message<D> {
    const KIND: ObjectKind = ObjectKind::Message;

    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl<D: Clone + Serialize> Builder<Message<D>> {
    /// Hide or reveal the author.
    pub fn set_anonymous(&mut self, anonymous: bool) -> &mut Self {
        let (msg, update) = self.parts();
        msg.anonymous = anonymous;
        update.set("anonymous", anonymous);
        self
    }

    /// Replace the payload.
    pub fn set_data(&mut self, data: D) -> AppResult<&mut Self> {
        let encoded = bson::to_bson(&data)?;
        let (msg, update) = self.parts();
        msg.data = data;
        update.set("data", encoded);
        Ok(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::builders::UpdateOp;
    use crate::structures::MessageDataInbox;

    #[test]
    fn test_replace_payload() {
        let msg = Message::new(ObjectId::new(), ObjectId::new(), MessageDataInbox::default());
        let mut b = MessageBuilder::new(msg);
        b.set_data(MessageDataInbox {
            subject: "Hello".to_string(),
            content: "World".to_string(),
            ..Default::default()
        })
        .unwrap()
        .set_anonymous(true);

        let data = b.update().get(UpdateOp::Set, "data").unwrap().as_document().unwrap();
        assert_eq!(data.get_str("subject").unwrap(), "Hello");
        assert!(b.snapshot().anonymous);
    }
}
