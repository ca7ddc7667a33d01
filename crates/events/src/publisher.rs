//! Event publishing.
//!
//! Mutations publish envelopes through an [`EventPublisher`]. Production
//! deployments use Redis pub/sub on `events:op:<opcode>`; single-process
//! deployments and tests can publish straight into an [`EventEmitter`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use fred::clients::{Client, SubscriberClient};
use fred::interfaces::{EventInterface, PubsubInterface};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use emotes_common::AppResult;

use crate::emitter::EventEmitter;
use crate::message::{ChangeMap, DispatchPayload, EventType, Message, Opcode, TOPIC_PREFIX};

/// Publishes event envelopes.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an encoded envelope for `op`.
    async fn publish_raw(&self, op: Opcode, payload: Bytes) -> AppResult<()>;

    /// Publish a dispatch of `body` as `event_type`.
    async fn dispatch(&self, event_type: EventType, body: ChangeMap) -> AppResult<()> {
        let msg = Message::new(Opcode::Dispatch, DispatchPayload { event_type, body }, 0);
        self.publish_raw(Opcode::Dispatch, Bytes::from(msg.to_bytes()?))
            .await
    }
}

/// Publisher that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish_raw(&self, _op: Opcode, _payload: Bytes) -> AppResult<()> {
        Ok(())
    }
}

/// Publisher that delivers into a process-local emitter, keyed by opcode name.
#[derive(Clone)]
pub struct LocalEventPublisher {
    emitter: EventEmitter,
}

impl LocalEventPublisher {
    /// Publish into `emitter`.
    #[must_use]
    pub const fn new(emitter: EventEmitter) -> Self {
        Self { emitter }
    }
}

#[async_trait]
impl EventPublisher for LocalEventPublisher {
    async fn publish_raw(&self, op: Opcode, payload: Bytes) -> AppResult<()> {
        let delivered = self.emitter.publish_raw(op.as_str(), payload);
        debug!(%op, delivered, "Published local event");
        Ok(())
    }
}

/// Publisher over Redis pub/sub.
#[derive(Clone)]
pub struct RedisEventPublisher {
    client: Arc<Client>,
}

impl RedisEventPublisher {
    /// Publish through a connected client.
    #[must_use]
    pub const fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish_raw(&self, op: Opcode, payload: Bytes) -> AppResult<()> {
        let topic = op.topic();
        let _: () = self.client.publish(topic.as_str(), payload).await?;
        debug!(topic, "Published event");
        Ok(())
    }
}

/// Forwards Redis event topics into an [`EventEmitter`].
pub struct RedisEventSubscriber {
    subscriber: SubscriberClient,
    emitter: EventEmitter,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RedisEventSubscriber {
    /// Bridge `subscriber` into `emitter`.
    #[must_use]
    pub const fn new(subscriber: SubscriberClient, emitter: EventEmitter) -> Self {
        Self {
            subscriber,
            emitter,
            task: Mutex::new(None),
        }
    }

    /// Pattern-subscribe to every event topic and start forwarding.
    ///
    /// Payloads are published on the emitter under the topic suffix, for
    /// example `dispatch` for `events:op:dispatch`.
    pub async fn start(&self) -> AppResult<()> {
        self.subscriber.psubscribe(format!("{TOPIC_PREFIX}*")).await?;
        info!(pattern = %format!("{TOPIC_PREFIX}*"), "Subscribed to event topics");

        let emitter = self.emitter.clone();
        let mut stream = self.subscriber.message_rx();
        let handle = tokio::spawn(async move {
            while let Ok(message) = stream.recv().await {
                let Some(event) = message.channel.strip_prefix(TOPIC_PREFIX) else {
                    continue;
                };
                let Some(payload) = message.value.as_string() else {
                    warn!(channel = %message.channel, "Dropping non-string event payload");
                    continue;
                };
                emitter.publish_raw(event, Bytes::from(payload));
            }
            info!("Event stream ended");
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Stop forwarding and unsubscribe.
    pub async fn stop(&self) -> AppResult<()> {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        self.subscriber
            .punsubscribe(format!("{TOPIC_PREFIX}*"))
            .await?;
        Ok(())
    }
}
