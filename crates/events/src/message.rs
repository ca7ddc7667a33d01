//! Event envelope and payloads.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use emotes_common::{AppError, AppResult};
use emotes_db::structures::ObjectKind;

/// Envelope operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Opcode {
    /// A change to an object.
    Dispatch,
    /// Greeting sent on connect.
    Hello,
    /// Keep-alive.
    Heartbeat,
    /// The server asks the client to reconnect.
    Reconnect,
    /// Acknowledgement of a client command.
    InboundSignal,
    /// Client authentication.
    Identify,
    /// Client session resumption.
    Resume,
    /// Client subscription.
    Subscribe,
    /// Client-originated signal.
    Signal,
}

impl Opcode {
    /// Lowercase name used in pub/sub topics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Hello => "hello",
            Self::Heartbeat => "heartbeat",
            Self::Reconnect => "reconnect",
            Self::InboundSignal => "inbound_signal",
            Self::Identify => "identify",
            Self::Resume => "resume",
            Self::Subscribe => "subscribe",
            Self::Signal => "signal",
        }
    }

    /// Pub/sub topic carrying this opcode.
    #[must_use]
    pub fn topic(self) -> String {
        format!("{TOPIC_PREFIX}{}", self.as_str())
    }
}

/// Prefix of every event topic.
pub const TOPIC_PREFIX: &str = "events:op:";

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        match op {
            Opcode::Dispatch => 0,
            Opcode::Hello => 1,
            Opcode::Heartbeat => 2,
            Opcode::Reconnect => 4,
            Opcode::InboundSignal => 5,
            Opcode::Identify => 33,
            Opcode::Resume => 34,
            Opcode::Subscribe => 35,
            Opcode::Signal => 36,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = AppError;

    fn try_from(value: u8) -> AppResult<Self> {
        Ok(match value {
            0 => Self::Dispatch,
            1 => Self::Hello,
            2 => Self::Heartbeat,
            4 => Self::Reconnect,
            5 => Self::InboundSignal,
            33 => Self::Identify,
            34 => Self::Resume,
            35 => Self::Subscribe,
            36 => Self::Signal,
            other => return Err(AppError::BadInt(format!("unknown opcode {other}"))),
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason a session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    ServerError,
    UnknownOperation,
    InvalidPayload,
    AuthFailure,
    AlreadyIdentified,
    RateLimit,
    Restart,
    Maintenance,
    Timeout,
}

impl CloseCode {
    /// Numeric close code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::ServerError => 4000,
            Self::UnknownOperation => 4001,
            Self::InvalidPayload => 4002,
            Self::AuthFailure => 4003,
            Self::AlreadyIdentified => 4004,
            Self::RateLimit => 4005,
            Self::Restart => 4006,
            Self::Maintenance => 4007,
            Self::Timeout => 4008,
        }
    }

    /// Human-readable reason.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::ServerError => "an error occured on the server's end",
            Self::UnknownOperation => "the opcode sent is not valid",
            Self::InvalidPayload => "the payload sent could not be processed",
            Self::AuthFailure => "authentication failed",
            Self::AlreadyIdentified => "the session is already identified",
            Self::RateLimit => "too many messages were sent",
            Self::Restart => "the server is restarting",
            Self::Maintenance => "the server is in maintenance mode",
            Self::Timeout => "the session timed out",
        }
    }

    /// Look up a close code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            4000 => Self::ServerError,
            4001 => Self::UnknownOperation,
            4002 => Self::InvalidPayload,
            4003 => Self::AuthFailure,
            4004 => Self::AlreadyIdentified,
            4005 => Self::RateLimit,
            4006 => Self::Restart,
            4007 => Self::Maintenance,
            4008 => Self::Timeout,
            _ => return None,
        })
    }
}

/// Event envelope `{op, t, d, s}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<D = Value> {
    /// Operation.
    pub op: Opcode,
    /// Milliseconds since the epoch.
    pub t: i64,
    /// Operation-specific payload.
    pub d: D,
    /// Sequence number.
    #[serde(default)]
    pub s: u64,
}

impl<D: Serialize> Message<D> {
    /// Wrap a payload, stamped with the current time.
    pub fn new(op: Opcode, d: D, s: u64) -> Self {
        Self {
            op,
            t: chrono::Utc::now().timestamp_millis(),
            d,
            s,
        }
    }

    /// Erase the payload type.
    pub fn to_raw(&self) -> AppResult<Message> {
        Ok(Message {
            op: self.op,
            t: self.t,
            d: serde_json::to_value(&self.d)?,
            s: self.s,
        })
    }

    /// JSON form of the envelope.
    pub fn to_bytes(&self) -> AppResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl Message {
    /// Decode the payload as `T`.
    pub fn convert<T: DeserializeOwned>(self) -> AppResult<Message<T>> {
        Ok(Message {
            op: self.op,
            t: self.t,
            d: serde_json::from_value(self.d)?,
            s: self.s,
        })
    }

    /// Parse an envelope from JSON.
    pub fn from_bytes(raw: &[u8]) -> AppResult<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// Payload of [`Opcode::Hello`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    pub heartbeat_interval: u64,
    pub session_id: String,
    pub subscription_limit: i32,
}

/// Payload of [`Opcode::Heartbeat`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub count: u64,
}

/// Payload of [`Opcode::Reconnect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPayload {
    pub reason: String,
}

/// Payload of [`Opcode::Subscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribePayload {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub condition: std::collections::HashMap<String, String>,
}

/// Kind of change carried by a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "emote.create")]
    CreateEmote,
    #[serde(rename = "emote.update")]
    UpdateEmote,
    #[serde(rename = "emote.delete")]
    DeleteEmote,
    #[serde(rename = "emote_set.create")]
    CreateEmoteSet,
    #[serde(rename = "emote_set.update")]
    UpdateEmoteSet,
    #[serde(rename = "emote_set.delete")]
    DeleteEmoteSet,
    #[serde(rename = "user.create")]
    CreateUser,
    #[serde(rename = "user.update")]
    UpdateUser,
    #[serde(rename = "user.delete")]
    DeleteUser,
}

impl EventType {
    /// Dotted name, `<object>.<action>`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateEmote => "emote.create",
            Self::UpdateEmote => "emote.update",
            Self::DeleteEmote => "emote.delete",
            Self::CreateEmoteSet => "emote_set.create",
            Self::UpdateEmoteSet => "emote_set.update",
            Self::DeleteEmoteSet => "emote_set.delete",
            Self::CreateUser => "user.create",
            Self::UpdateUser => "user.update",
            Self::DeleteUser => "user.delete",
        }
    }

    /// The object part of the name.
    #[must_use]
    pub fn object(self) -> &'static str {
        self.as_str().split('.').next().unwrap_or_default()
    }
}

/// One changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeField {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i32>,
    #[serde(default)]
    pub old_value: Value,
    #[serde(default)]
    pub new_value: Value,
}

impl ChangeField {
    /// A change of `key`.
    pub fn new(key: impl Into<String>, old_value: Value, new_value: Value) -> Self {
        Self {
            key: key.into(),
            index: None,
            old_value,
            new_value,
        }
    }

    /// Set the array position the change applies to.
    #[must_use]
    pub const fn at(mut self, index: i32) -> Self {
        self.index = Some(index);
        self
    }

    /// Build a change from serializable values.
    pub fn of<O: Serialize, N: Serialize>(
        key: impl Into<String>,
        old_value: &O,
        new_value: &N,
    ) -> AppResult<Self> {
        Ok(Self::new(
            key,
            serde_json::to_value(old_value)?,
            serde_json::to_value(new_value)?,
        ))
    }
}

/// Field-level description of a change to one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeMap {
    /// Hex id of the changed object.
    pub id: String,
    pub kind: ObjectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<ChangeField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated: Vec<ChangeField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<ChangeField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
}

impl ChangeMap {
    /// An empty change map for an object.
    pub fn new(id: bson::oid::ObjectId, kind: ObjectKind) -> Self {
        Self {
            id: id.to_hex(),
            kind,
            actor_id: None,
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            object: None,
        }
    }

    /// Record the actor.
    #[must_use]
    pub fn by(mut self, actor: bson::oid::ObjectId) -> Self {
        self.actor_id = Some(actor.to_hex());
        self
    }

    /// Attach the full object.
    pub fn with_object<T: Serialize>(mut self, object: &T) -> AppResult<Self> {
        self.object = Some(serde_json::to_value(object)?);
        Ok(self)
    }

    /// Whether no field changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Payload of [`Opcode::Dispatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPayload {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub body: ChangeMap,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    #[test]
    fn test_opcode_wire_values() {
        assert_eq!(u8::from(Opcode::Subscribe), 35);
        assert_eq!(Opcode::try_from(36).unwrap(), Opcode::Signal);
        assert!(Opcode::try_from(3).is_err());
        assert_eq!(Opcode::Dispatch.topic(), "events:op:dispatch");
    }

    #[test]
    fn test_close_codes() {
        for code in 4000..=4008 {
            let c = CloseCode::from_code(code).unwrap();
            assert_eq!(c.code(), code);
            assert!(!c.reason().is_empty());
        }
        assert!(CloseCode::from_code(4009).is_none());
    }

    #[test]
    fn test_dispatch_envelope_shape() {
        let id = ObjectId::new();
        let mut body = ChangeMap::new(id, ObjectKind::EmoteSet);
        body.added
            .push(ChangeField::new("emotes", Value::Null, Value::from("x")).at(0));
        let msg = Message::new(
            Opcode::Dispatch,
            DispatchPayload {
                event_type: EventType::UpdateEmoteSet,
                body,
            },
            7,
        );

        let raw = msg.to_raw().unwrap();
        assert_eq!(raw.d["type"], "emote_set.update");
        assert_eq!(raw.d["body"]["id"], id.to_hex());
        assert_eq!(raw.d["body"]["kind"], 3);

        let json = String::from_utf8(msg.to_bytes().unwrap()).unwrap();
        assert!(json.contains("\"op\":0"));
        assert!(json.contains("\"s\":7"));

        let back = Message::from_bytes(json.as_bytes())
            .unwrap()
            .convert::<DispatchPayload>()
            .unwrap();
        assert_eq!(back.d.event_type, EventType::UpdateEmoteSet);
        assert_eq!(back.d.body.added.len(), 1);
    }
}
