//! Entity structures.
//!
//! Field names are the stored document keys. Relational fields (`roles`,
//! `owner`, `editor_of`, ...) are attached by read pipelines and never
//! written back.

mod audit_log;
mod ban;
mod cosmetic;
mod emote;
mod emote_set;
mod entitlement;
mod kind;
mod message;
mod permissions;
mod report;
mod role;
mod system;
mod user;
mod user_connection;

pub use audit_log::*;
pub use ban::*;
pub use cosmetic::*;
pub use emote::*;
pub use emote_set::*;
pub use entitlement::*;
pub use kind::*;
pub use message::*;
pub use permissions::*;
pub use report::*;
pub use role::*;
pub use system::*;
pub use user::*;
pub use user_connection::*;

use std::sync::LazyLock;

use bson::oid::ObjectId;
use emotes_common::ZERO_ID;
use regex::Regex;

/// Emote names.
#[allow(clippy::unwrap_used)]
pub static EMOTE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-_A-Za-z():0-9]{2,100}$").unwrap());

/// Emote version names.
#[allow(clippy::unwrap_used)]
pub static EMOTE_VERSION_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9 _\-.,!?'()]{2,40}$").unwrap());

/// Emote tags.
#[allow(clippy::unwrap_used)]
pub static EMOTE_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-z]{3,30}$").unwrap());

/// User discriminators.
#[allow(clippy::unwrap_used)]
pub static DISCRIMINATOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}$").unwrap());

pub(crate) const fn zero_id() -> ObjectId {
    ZERO_ID
}

/// Current time as a stored timestamp.
#[must_use]
pub fn now() -> bson::DateTime {
    bson::DateTime::now()
}

/// The "never" timestamp (Unix epoch).
#[must_use]
pub const fn never() -> bson::DateTime {
    bson::DateTime::from_millis(0)
}
