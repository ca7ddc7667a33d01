//! Event envelope, in-process emitter and pub/sub publishing for emotes-rs.

pub mod emitter;
pub mod message;
pub mod publisher;

pub use emitter::{EventEmitter, Unbind};
pub use message::{
    ChangeField, ChangeMap, CloseCode, DispatchPayload, EventType, Message, Opcode,
};
pub use publisher::{
    EventPublisher, LocalEventPublisher, NoOpEventPublisher, RedisEventPublisher,
    RedisEventSubscriber,
};
