//! Broker client contract for the notification service.
//!
//! Consumers receive a stream of acknowledgeable [`Delivery`] items per named
//! queue or exchange. The broker gives at-least-once semantics: a delivery
//! that is never acked is redelivered. [`redis_queue::RedisEventQueue`] is the
//! production transport (Redis Streams consumer groups);
//! [`memory::MemoryEventQueue`] backs tests.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod memory;
pub mod redis_queue;

/// Queue fed by the post service on publish.
pub const NEW_POST_QUEUE: &str = "new-post";
/// Queue fed by the social graph service on follow.
pub const FOLLOWS_QUEUE: &str = "follows";
/// Queue fed when a follower toggles per-author new-post notifications.
pub const FOLLOWER_SETTINGS_QUEUE: &str = "followers-new-post-notifications-enabled-updates";
/// Exchange broadcasting account creation to every interested service.
pub const USERS_CREATED_EXCHANGE: &str = "users.created";
/// Exchange broadcasting account profile updates.
pub const USERS_UPDATE_EXCHANGE: &str = "users.update";

#[derive(Debug, Error)]
pub enum MqError {
    #[error("Broker error: {0}")]
    Broker(#[from] redis::RedisError),

    #[error("Consume error: {0}")]
    Consume(String),
}

/// Transport-specific acknowledgement backend for a single delivery.
#[async_trait]
pub trait Acker: Send {
    async fn ack(&mut self) -> Result<(), MqError>;
    async fn nack(&mut self, requeue: bool) -> Result<(), MqError>;
}

/// One message handed to a consumer loop.
///
/// `ack` marks the message consumed; `nack(requeue)` rejects it, optionally
/// putting it back at the tail of the queue. Both consume the delivery.
pub struct Delivery {
    pub body: Vec<u8>,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(body: Vec<u8>, acker: Box<dyn Acker>) -> Self {
        Self { body, acker }
    }

    pub async fn ack(mut self) -> Result<(), MqError> {
        self.acker.ack().await
    }

    pub async fn nack(mut self, requeue: bool) -> Result<(), MqError> {
        self.acker.nack(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// An at-least-once broker a consumer loop can read from.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Consume a work queue: deliveries are shared among the consumers of
    /// this service's group.
    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>, MqError>;

    /// Consume a broadcast exchange: every subscribing service receives its
    /// own copy of each message.
    async fn consume_exchange(&self, exchange: &str) -> Result<mpsc::Receiver<Delivery>, MqError>;
}
