//! Object identifier utilities.
//!
//! Entities are keyed by 12-byte object ids with an embedded creation
//! timestamp. The all-zero id is a sentinel meaning "none" or "deleted".

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};

use crate::{AppError, AppResult};

/// The zero object id.
pub const ZERO_ID: ObjectId = ObjectId::from_bytes([0; 12]);

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new object id stamped with the current time.
    #[must_use]
    pub fn generate(&self) -> ObjectId {
        ObjectId::new()
    }

    /// Generate an object id for the given instant with zeroed entropy bytes.
    ///
    /// Useful as a range boundary when querying by creation time.
    #[must_use]
    pub fn from_timestamp(&self, at: DateTime<Utc>) -> ObjectId {
        let secs = u32::try_from(at.timestamp().max(0)).unwrap_or(u32::MAX);
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        ObjectId::from_bytes(bytes)
    }
}

/// Parse a hex string into an object id.
pub fn parse_id(s: &str) -> AppResult<ObjectId> {
    ObjectId::parse_str(s).map_err(|_| AppError::BadObjectId(s.to_string()))
}

/// Parse a list of hex strings, failing on the first bad entry.
pub fn parse_ids<S: AsRef<str>>(values: &[S]) -> AppResult<Vec<ObjectId>> {
    values.iter().map(|s| parse_id(s.as_ref())).collect()
}

/// Whether the id is the zero sentinel.
#[must_use]
pub fn is_zero(id: &ObjectId) -> bool {
    *id == ZERO_ID
}

/// Creation time embedded in the id.
#[must_use]
pub fn timestamp_of(id: &ObjectId) -> DateTime<Utc> {
    id.timestamp().to_chrono()
}
