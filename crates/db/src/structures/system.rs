//! Platform singleton document.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::zero_id;

/// Platform-wide settings. One document exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    /// Document ID.
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// The global emote set.
    #[serde(default = "zero_id")]
    pub emote_set_id: ObjectId,
}
