//! Redis Streams broker transport.
//!
//! Each queue/exchange is a stream; this service reads through a consumer
//! group, so deliveries stay pending until `XACK`. Work queues and exchanges
//! share the transport — the group name is what separates a shared work pool
//! from a per-service broadcast subscription.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use tokio::sync::mpsc;

use crate::{Acker, Delivery, EventQueue, MqError};

/// Field name carrying the message payload inside a stream entry.
const BODY_FIELD: &str = "body";

/// How long a blocking read waits before cycling (ms).
const BLOCK_MS: usize = 5000;

/// Max entries fetched per read.
const READ_COUNT: usize = 32;

/// In-process buffer between the reader task and the consumer loop.
const CONSUME_BUFFER: usize = 64;

pub struct RedisEventQueue {
    manager: ConnectionManager,
    group: String,
    consumer: String,
}

impl RedisEventQueue {
    /// Connect to the broker. `group` is the service-level consumer group
    /// (one per service, so exchanges fan out across services while
    /// instances of the same service share work). `consumer` names this
    /// instance within the group.
    pub async fn connect(redis_url: &str, group: &str, consumer: &str) -> Result<Self, MqError> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        tracing::info!(group, consumer, "Connected to broker");
        Ok(Self {
            manager,
            group: group.to_string(),
            consumer: consumer.to_string(),
        })
    }

    /// Append a message to a stream. Used by producers and tests.
    pub async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), MqError> {
        let mut conn = self.manager.clone();
        redis::cmd("XADD")
            .arg(queue)
            .arg("*")
            .arg(BODY_FIELD)
            .arg(body)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Create the consumer group if it doesn't exist yet.
    async fn ensure_group(&self, stream: &str) -> Result<(), MqError> {
        let mut conn = self.manager.clone();
        let created: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(&self.group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn spawn_reader(&self, stream: String) -> mpsc::Receiver<Delivery> {
        let (tx, rx) = mpsc::channel(CONSUME_BUFFER);
        let manager = self.manager.clone();
        let group = self.group.clone();
        let consumer = self.consumer.clone();

        tokio::spawn(async move {
            let mut conn = manager.clone();
            loop {
                let opts = StreamReadOptions::default()
                    .group(&group, &consumer)
                    .block(BLOCK_MS)
                    .count(READ_COUNT);

                let reply: Result<StreamReadReply, redis::RedisError> =
                    conn.xread_options(&[stream.as_str()], &[">"], &opts).await;

                match reply {
                    Ok(reply) => {
                        for key in reply.keys {
                            for entry in key.ids {
                                let body = match entry.map.get(BODY_FIELD) {
                                    Some(redis::Value::BulkString(b)) => b.clone(),
                                    _ => Vec::new(),
                                };
                                let acker = RedisAcker {
                                    manager: manager.clone(),
                                    stream: stream.clone(),
                                    group: group.clone(),
                                    entry_id: entry.id.clone(),
                                    body: body.clone(),
                                };
                                let delivery = Delivery::new(body, Box::new(acker));
                                if tx.send(delivery).await.is_err() {
                                    // Consumer loop is gone; stop reading.
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(stream = %stream, error = %e, "Stream read failed, retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        rx
    }
}

#[async_trait]
impl EventQueue for RedisEventQueue {
    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>, MqError> {
        self.ensure_group(queue).await?;
        Ok(self.spawn_reader(queue.to_string()))
    }

    async fn consume_exchange(&self, exchange: &str) -> Result<mpsc::Receiver<Delivery>, MqError> {
        self.ensure_group(exchange).await?;
        Ok(self.spawn_reader(exchange.to_string()))
    }
}

struct RedisAcker {
    manager: ConnectionManager,
    stream: String,
    group: String,
    entry_id: String,
    body: Vec<u8>,
}

#[async_trait]
impl Acker for RedisAcker {
    async fn ack(&mut self) -> Result<(), MqError> {
        let mut conn = self.manager.clone();
        redis::cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&self.entry_id)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn nack(&mut self, requeue: bool) -> Result<(), MqError> {
        let mut conn = self.manager.clone();
        if requeue {
            redis::cmd("XADD")
                .arg(&self.stream)
                .arg("*")
                .arg(BODY_FIELD)
                .arg(&self.body)
                .query_async::<()>(&mut conn)
                .await?;
        }
        redis::cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&self.entry_id)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
