//! Error types for emotes-rs.
//!
//! Every error carries a numeric code of the form `70XY..` where `X` is `4`
//! for client errors and `5` for server errors, and `Y` groups the error:
//! `0` generic, `1` type, `4` not found, `6` bad mutation, `7` miscellaneous.

use serde_json::{Map, Value, json};
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AppError {
    // === Authorization ===
    #[error("Authorization Required")]
    Unauthorized,

    #[error("Insufficient Privilege: {0}")]
    InsufficientPrivilege(String),

    // === Type / Validation ===
    #[error("Bad Object ID: {0}")]
    BadObjectId(String),

    #[error("Bad Int: {0}")]
    BadInt(String),

    #[error("Validation Rejected: {0}")]
    ValidationRejected(String),

    #[error("Missing Required Field: {0}")]
    MissingRequiredField(String),

    #[error("Name Invalid: {0}")]
    NameInvalid(String),

    // === Not Found ===
    #[error("Unknown Emote: {0}")]
    UnknownEmote(String),

    #[error("Unknown Emote Set: {0}")]
    UnknownEmoteSet(String),

    #[error("Unknown User: {0}")]
    UnknownUser(String),

    #[error("Unknown Role: {0}")]
    UnknownRole(String),

    #[error("Unknown Report: {0}")]
    UnknownReport(String),

    #[error("Unknown Message: {0}")]
    UnknownMessage(String),

    #[error("Unknown Ban: {0}")]
    UnknownBan(String),

    #[error("Unknown User Connection: {0}")]
    UnknownUserConnection(String),

    // === Bad Mutation ===
    #[error("Emote Not Enabled: {0}")]
    EmoteNotEnabled(String),

    #[error("Emote Already Enabled: {0}")]
    EmoteAlreadyEnabled(String),

    #[error("Emote Name Conflict: {name}")]
    EmoteNameConflict {
        /// The conflicting active name.
        name: String,
    },

    #[error("No Space Available: this set has {slots} slots")]
    NoSpaceAvailable {
        /// Capacity of the set.
        slots: i32,
    },

    #[error("Mutate Tainted Object")]
    MutateTaintedObject,

    #[error("Don't Be Silly: {0}")]
    DontBeSilly(String),

    // === Server ===
    #[error("Internal Server Error: {0}")]
    InternalServerError(String),

    #[error("Incomplete Mutation: {0}")]
    IncompleteMutation(String),
}

impl AppError {
    /// Shorthand for an insufficient-privilege error.
    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::InsufficientPrivilege(detail.into())
    }

    /// Shorthand for an internal-server-error wrapping an underlying failure.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::InternalServerError(detail.to_string())
    }

    /// Returns the numeric error code.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Unauthorized => 70401,
            Self::InsufficientPrivilege(_) => 70403,

            Self::BadObjectId(_) => 70410,
            Self::BadInt(_) => 70411,
            Self::ValidationRejected(_) => 70412,
            Self::MissingRequiredField(_) => 70413,
            Self::NameInvalid(_) => 70414,

            Self::UnknownEmote(_) => 70440,
            Self::UnknownEmoteSet(_) => 70441,
            Self::UnknownUser(_) => 70442,
            Self::UnknownRole(_) => 70443,
            Self::UnknownReport(_) => 70444,
            Self::UnknownMessage(_) => 70445,
            Self::UnknownBan(_) => 70446,
            Self::UnknownUserConnection(_) => 70447,

            Self::EmoteNotEnabled(_) => 704_610,
            Self::EmoteAlreadyEnabled(_) => 704_611,
            Self::EmoteNameConflict { .. } => 704_612,
            Self::NoSpaceAvailable { .. } => 704_620,
            Self::MutateTaintedObject => 704_630,

            Self::DontBeSilly(_) => 70470,

            Self::InternalServerError(_) => 70500,
            Self::IncompleteMutation(_) => 70560,
        }
    }

    /// Returns the short, stable message for this error kind.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Authorization Required",
            Self::InsufficientPrivilege(_) => "Insufficient Privilege",
            Self::BadObjectId(_) => "Bad Object ID",
            Self::BadInt(_) => "Bad Int",
            Self::ValidationRejected(_) => "Validation Rejected",
            Self::MissingRequiredField(_) => "Missing Required Field",
            Self::NameInvalid(_) => "Name Invalid",
            Self::UnknownEmote(_) => "Unknown Emote",
            Self::UnknownEmoteSet(_) => "Unknown Emote Set",
            Self::UnknownUser(_) => "Unknown User",
            Self::UnknownRole(_) => "Unknown Role",
            Self::UnknownReport(_) => "Unknown Report",
            Self::UnknownMessage(_) => "Unknown Message",
            Self::UnknownBan(_) => "Unknown Ban",
            Self::UnknownUserConnection(_) => "Unknown User Connection",
            Self::EmoteNotEnabled(_) => "Emote Not Enabled",
            Self::EmoteAlreadyEnabled(_) => "Emote Already Enabled",
            Self::EmoteNameConflict { .. } => "Emote Name Conflict",
            Self::NoSpaceAvailable { .. } => "No Space Available",
            Self::MutateTaintedObject => "Mutate Tainted Object",
            Self::DontBeSilly(_) => "Don't Be Silly",
            Self::InternalServerError(_) => "Internal Server Error",
            Self::IncompleteMutation(_) => "Incomplete Mutation",
        }
    }

    /// Returns the HTTP-equivalent status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::InsufficientPrivilege(_) | Self::DontBeSilly(_) => 403,
            Self::BadObjectId(_)
            | Self::BadInt(_)
            | Self::ValidationRejected(_)
            | Self::MissingRequiredField(_)
            | Self::NameInvalid(_) => 400,
            Self::UnknownEmote(_)
            | Self::UnknownEmoteSet(_)
            | Self::UnknownUser(_)
            | Self::UnknownRole(_)
            | Self::UnknownReport(_)
            | Self::UnknownMessage(_)
            | Self::UnknownBan(_)
            | Self::UnknownUserConnection(_) => 404,
            Self::EmoteNotEnabled(_)
            | Self::EmoteAlreadyEnabled(_)
            | Self::EmoteNameConflict { .. }
            | Self::NoSpaceAvailable { .. }
            | Self::MutateTaintedObject => 400,
            Self::InternalServerError(_) | Self::IncompleteMutation(_) => 500,
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Structured details attached to the error.
    #[must_use]
    pub fn fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        match self {
            Self::NoSpaceAvailable { slots } => {
                fields.insert("SLOTS".to_string(), json!(slots));
            }
            Self::EmoteNameConflict { name } => {
                fields.insert("NAME".to_string(), json!(name));
            }
            _ => {}
        }
        fields
    }

    /// Replaces the detail text of errors that carry one.
    #[must_use]
    pub fn with_detail(self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match self {
            Self::InsufficientPrivilege(_) => Self::InsufficientPrivilege(detail),
            Self::BadObjectId(_) => Self::BadObjectId(detail),
            Self::BadInt(_) => Self::BadInt(detail),
            Self::ValidationRejected(_) => Self::ValidationRejected(detail),
            Self::MissingRequiredField(_) => Self::MissingRequiredField(detail),
            Self::NameInvalid(_) => Self::NameInvalid(detail),
            Self::UnknownEmote(_) => Self::UnknownEmote(detail),
            Self::UnknownEmoteSet(_) => Self::UnknownEmoteSet(detail),
            Self::UnknownUser(_) => Self::UnknownUser(detail),
            Self::UnknownRole(_) => Self::UnknownRole(detail),
            Self::UnknownReport(_) => Self::UnknownReport(detail),
            Self::UnknownMessage(_) => Self::UnknownMessage(detail),
            Self::UnknownBan(_) => Self::UnknownBan(detail),
            Self::UnknownUserConnection(_) => Self::UnknownUserConnection(detail),
            Self::EmoteNotEnabled(_) => Self::EmoteNotEnabled(detail),
            Self::EmoteAlreadyEnabled(_) => Self::EmoteAlreadyEnabled(detail),
            Self::DontBeSilly(_) => Self::DontBeSilly(detail),
            Self::InternalServerError(_) => Self::InternalServerError(detail),
            Self::IncompleteMutation(_) => Self::IncompleteMutation(detail),
            other => other,
        }
    }

    /// Renders the error as an API-style JSON body.
    #[must_use]
    pub fn to_json(&self) -> Value {
        if self.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = self.code(), "Client error occurred");
        }

        json!({
            "error": self.to_string(),
            "error_code": self.code(),
            "status_code": self.status_code(),
            "details": self.fields(),
        })
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationRejected(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::InternalServerError(format!("config: {err}"))
    }
}

impl From<bson::ser::Error> for AppError {
    fn from(err: bson::ser::Error) -> Self {
        Self::InternalServerError(format!("encode: {err}"))
    }
}

impl From<bson::de::Error> for AppError {
    fn from(err: bson::de::Error) -> Self {
        Self::InternalServerError(format!("decode: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalServerError(format!("json: {err}"))
    }
}

impl From<fred::error::Error> for AppError {
    fn from(err: fred::error::Error) -> Self {
        Self::InternalServerError(format!("redis: {err}"))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalServerError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_format() {
        assert_eq!(AppError::Unauthorized.code(), 70401);
        assert_eq!(AppError::forbidden("x").code(), 70403);
        assert_eq!(AppError::UnknownEmoteSet(String::new()).code(), 70441);
        assert_eq!(AppError::NoSpaceAvailable { slots: 5 }.code(), 704_620);
        assert_eq!(AppError::internal("boom").code(), 70500);
    }

    #[test]
    fn test_client_vs_server() {
        assert!(!AppError::MutateTaintedObject.is_server_error());
        assert!(AppError::IncompleteMutation(String::new()).is_server_error());
        assert_eq!(AppError::UnknownUser(String::new()).status_code(), 404);
    }

    #[test]
    fn test_fields_carry_slots() {
        let err = AppError::NoSpaceAvailable { slots: 5 };
        assert_eq!(err.fields().get("SLOTS"), Some(&json!(5)));
        assert!(err.to_string().contains('5'));
    }

    #[test]
    fn test_with_detail() {
        let err = AppError::UnknownEmote(String::new()).with_detail("no target emotes found");
        assert_eq!(
            err,
            AppError::UnknownEmote("no target emotes found".to_string())
        );
        assert_eq!(
            AppError::MutateTaintedObject.with_detail("ignored"),
            AppError::MutateTaintedObject
        );
    }
}
