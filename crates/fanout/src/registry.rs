//! Connection registry — which users currently hold a live connection.
//!
//! Maps a user id to the sending half of that user's connection channel. The
//! WebSocket handler owns the socket itself: it forwards values from the
//! channel to the wire and runs the read loop that detects disconnection.
//! Registering a second connection for the same user replaces the first;
//! dropping the replaced sender closes the old connection's forward task.

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Sending half of a live connection's outbound channel.
pub type ConnectionSender = mpsc::Sender<serde_json::Value>;

#[derive(Default)]
pub struct ConnectionRegistry {
    conns: DashMap<Uuid, ConnectionSender>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the mapping, replacing any prior connection for this user.
    /// Last registration wins.
    pub fn register(&self, user_id: Uuid, sender: ConnectionSender) {
        if self.conns.insert(user_id, sender).is_some() {
            tracing::debug!(user_id = %user_id, "Replaced existing live connection");
        }
    }

    /// Remove the mapping if present. Idempotent.
    pub fn unregister(&self, user_id: Uuid) {
        self.conns.remove(&user_id);
    }

    /// Look up the live connection for a user, if any.
    pub fn sender_for(&self, user_id: Uuid) -> Option<ConnectionSender> {
        self.conns.get(&user_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(1);

        registry.register(user, tx);
        let sender = registry.sender_for(user).unwrap();
        sender.send(serde_json::json!({"hello": true})).await.unwrap();
        assert_eq!(rx.recv().await.unwrap()["hello"], true);
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (tx1, mut rx1) = mpsc::channel::<serde_json::Value>(1);
        let (tx2, _rx2) = mpsc::channel::<serde_json::Value>(1);

        registry.register(user, tx1);
        registry.register(user, tx2);
        assert_eq!(registry.len(), 1);

        // The first sender was dropped on replacement, so its channel closed.
        assert!(rx1.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(1);

        registry.register(user, tx);
        registry.unregister(user);
        registry.unregister(user);
        assert!(registry.sender_for(user).is_none());
        assert!(registry.is_empty());
    }
}
