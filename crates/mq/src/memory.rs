//! In-process broker for tests.
//!
//! Messages published before a consumer attaches are buffered; `nack` with
//! requeue puts the body back at the tail. Acks are counted so tests can
//! assert a consumer's acknowledgement policy.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::{Acker, Delivery, EventQueue, MqError};

const CHANNEL_CAPACITY: usize = 128;

#[derive(Default)]
struct Inner {
    buffered: HashMap<String, VecDeque<Vec<u8>>>,
    senders: HashMap<String, mpsc::Sender<Delivery>>,
    acked: usize,
}

#[derive(Clone, Default)]
pub struct MemoryEventQueue {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), MqError> {
        let sender = {
            let mut inner = self.inner.lock().await;
            match inner.senders.get(queue) {
                Some(tx) if !tx.is_closed() => tx.clone(),
                _ => {
                    inner
                        .buffered
                        .entry(queue.to_string())
                        .or_default()
                        .push_back(body.to_vec());
                    return Ok(());
                }
            }
        };

        sender
            .send(self.delivery(queue, body.to_vec()))
            .await
            .map_err(|_| MqError::Consume(format!("consumer for '{queue}' is gone")))
    }

    /// Number of deliveries acked across all queues.
    pub async fn acked(&self) -> usize {
        self.inner.lock().await.acked
    }

    fn delivery(&self, queue: &str, body: Vec<u8>) -> Delivery {
        let acker = MemoryAcker {
            queue: queue.to_string(),
            body: body.clone(),
            mq: self.clone(),
        };
        Delivery::new(body, Box::new(acker))
    }
}

#[async_trait]
impl EventQueue for MemoryEventQueue {
    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>, MqError> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let backlog = {
            let mut inner = self.inner.lock().await;
            inner.senders.insert(queue.to_string(), tx.clone());
            inner.buffered.remove(queue).unwrap_or_default()
        };

        for body in backlog {
            tx.send(self.delivery(queue, body))
                .await
                .map_err(|_| MqError::Consume(format!("consumer for '{queue}' is gone")))?;
        }

        Ok(rx)
    }

    async fn consume_exchange(&self, exchange: &str) -> Result<mpsc::Receiver<Delivery>, MqError> {
        self.consume(exchange).await
    }
}

struct MemoryAcker {
    queue: String,
    body: Vec<u8>,
    mq: MemoryEventQueue,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(&mut self) -> Result<(), MqError> {
        self.mq.inner.lock().await.acked += 1;
        Ok(())
    }

    async fn nack(&mut self, requeue: bool) -> Result<(), MqError> {
        if requeue {
            let body = std::mem::take(&mut self.body);
            self.mq.publish(&self.queue, &body).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_before_consume_is_buffered() {
        let mq = MemoryEventQueue::new();
        mq.publish("q", b"one").await.unwrap();
        mq.publish("q", b"two").await.unwrap();

        let mut rx = mq.consume("q").await.unwrap();
        assert_eq!(rx.recv().await.unwrap().body, b"one");
        assert_eq!(rx.recv().await.unwrap().body, b"two");
    }

    #[tokio::test]
    async fn test_ack_is_counted() {
        let mq = MemoryEventQueue::new();
        mq.publish("q", b"msg").await.unwrap();

        let mut rx = mq.consume("q").await.unwrap();
        let delivery = rx.recv().await.unwrap();
        delivery.ack().await.unwrap();

        assert_eq!(mq.acked().await, 1);
    }

    #[tokio::test]
    async fn test_nack_with_requeue_redelivers() {
        let mq = MemoryEventQueue::new();
        mq.publish("q", b"again").await.unwrap();

        let mut rx = mq.consume("q").await.unwrap();
        let delivery = rx.recv().await.unwrap();
        delivery.nack(true).await.unwrap();

        let redelivered = rx.recv().await.unwrap();
        assert_eq!(redelivered.body, b"again");
    }

    #[tokio::test]
    async fn test_nack_without_requeue_drops() {
        let mq = MemoryEventQueue::new();
        mq.publish("q", b"gone").await.unwrap();

        let mut rx = mq.consume("q").await.unwrap();
        let delivery = rx.recv().await.unwrap();
        delivery.nack(false).await.unwrap();

        mq.publish("q", b"next").await.unwrap();
        assert_eq!(rx.recv().await.unwrap().body, b"next");
    }
}
