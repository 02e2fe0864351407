//! Delivery dispatcher — decouples notification persistence from live push.
//!
//! Deliveries are sharded by receiver across a fixed set of bounded channels,
//! each drained by exactly one worker task. A given user's deliveries always
//! land on the same shard, so per-user FIFO holds while different users are
//! pushed in parallel. Producers never block: a full shard drops the delivery
//! (the durable store remains the system of record).

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use herald_common::types::NotificationDelivery;

use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct DeliveryDispatcher {
    shards: Arc<Vec<mpsc::Sender<NotificationDelivery>>>,
}

impl DeliveryDispatcher {
    /// Spawn `workers` shard workers, each draining its own bounded channel.
    /// `total_capacity` is divided evenly across the shards.
    pub fn start(registry: Arc<ConnectionRegistry>, workers: usize, total_capacity: usize) -> Self {
        let workers = workers.max(1);
        let per_shard = (total_capacity / workers).max(1);

        let mut shards = Vec::with_capacity(workers);
        for shard in 0..workers {
            let (tx, rx) = mpsc::channel(per_shard);
            tokio::spawn(run_worker(shard, rx, registry.clone()));
            shards.push(tx);
        }

        tracing::info!(workers, per_shard, "Delivery dispatcher started");
        Self {
            shards: Arc::new(shards),
        }
    }

    /// Enqueue a delivery for the receiver's shard. Best-effort: a full shard
    /// drops the delivery rather than blocking the caller.
    pub fn dispatch(&self, delivery: NotificationDelivery) {
        let shard = self.shard_for(delivery.receiver_id);
        match self.shards[shard].try_send(delivery) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(
                    receiver_id = %dropped.receiver_id,
                    shard,
                    "Delivery shard full, dropping live push"
                );
            }
            Err(TrySendError::Closed(dropped)) => {
                tracing::error!(
                    receiver_id = %dropped.receiver_id,
                    shard,
                    "Delivery shard worker is gone"
                );
            }
        }
    }

    fn shard_for(&self, receiver_id: Uuid) -> usize {
        let mut hasher = DefaultHasher::new();
        receiver_id.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }
}

async fn run_worker(
    shard: usize,
    mut rx: mpsc::Receiver<NotificationDelivery>,
    registry: Arc<ConnectionRegistry>,
) {
    while let Some(delivery) = rx.recv().await {
        let Some(sender) = registry.sender_for(delivery.receiver_id) else {
            // Not connected: the notification is already durable, drop the push.
            tracing::debug!(receiver_id = %delivery.receiver_id, "No live connection, skipping push");
            continue;
        };

        let payload = serde_json::json!({
            "type": delivery.kind,
            "content": delivery.content,
            "resource_id": delivery.resource_id,
        });

        if let Err(e) = sender.try_send(payload) {
            tracing::warn!(
                receiver_id = %delivery.receiver_id,
                shard,
                error = %e,
                "Failed to push notification to live connection"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Duration, timeout};

    fn delivery(receiver_id: Uuid) -> NotificationDelivery {
        NotificationDelivery {
            receiver_id,
            kind: "newpost".to_string(),
            content: "author has created new post: title".to_string(),
            resource_id: "42".to_string(),
        }
    }

    #[tokio::test]
    async fn test_push_reaches_registered_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = DeliveryDispatcher::start(registry.clone(), 2, 16);

        let user = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(user, tx);

        dispatcher.dispatch(delivery(user));

        let payload = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload["type"], "newpost");
        assert_eq!(payload["resource_id"], "42");
    }

    #[tokio::test]
    async fn test_dispatch_without_connection_does_not_error() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = DeliveryDispatcher::start(registry, 2, 16);

        // No connection registered; must neither panic nor block.
        dispatcher.dispatch(delivery(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_dispatch_never_blocks_on_full_shard() {
        let registry = Arc::new(ConnectionRegistry::new());
        // Single shard of capacity 1; flooding it exercises the drop-on-full path.
        let dispatcher = DeliveryDispatcher::start(registry.clone(), 1, 1);

        let user = Uuid::new_v4();
        for _ in 0..100 {
            dispatcher.dispatch(delivery(user));
        }
        // Reaching here means dispatch stayed non-blocking.
    }

    #[tokio::test]
    async fn test_per_user_deliveries_arrive_in_order() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = DeliveryDispatcher::start(registry.clone(), 4, 64);

        let user = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(16);
        registry.register(user, tx);

        for i in 0..5 {
            let mut d = delivery(user);
            d.resource_id = i.to_string();
            dispatcher.dispatch(d);
        }

        for i in 0..5 {
            let payload = timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(payload["resource_id"], i.to_string());
        }
    }
}
