//! User and follower projection consumers.
//!
//! The notification service keeps a local copy of upstream user and follower
//! state so fan-out never calls out to other services. Four loops maintain
//! it: account creation and profile updates arrive on broadcast exchanges,
//! follow relationships and per-author notification toggles on work queues.
//! All four share the fan-out consumer's policy for failures: log,
//! acknowledge, drop.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::events::{Follow, FollowerSettingsUpdate, UserCreated};
use herald_common::types::{Follower, User};
use herald_mq::{Delivery, EventQueue};

use crate::store::UserStore;

/// Profile columns a user-update event may touch; everything else is dropped.
const ALLOWED_UPDATE_FIELDS: &[&str] = &["username", "display_name", "avatar_url"];

pub struct UserSyncConsumer {
    pool: PgPool,
}

impl UserSyncConsumer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Consume the users-created exchange, inserting local user rows.
    pub async fn run_user_created<Q: EventQueue>(&self, mq: &Q) -> Result<(), AppError> {
        let mut messages = mq
            .consume_exchange(herald_mq::USERS_CREATED_EXCHANGE)
            .await
            .map_err(|e| AppError::Queue(e.to_string()))?;

        tracing::info!(exchange = herald_mq::USERS_CREATED_EXCHANGE, "User-created consumer started");

        while let Some(message) = messages.recv().await {
            let Ok(event) = serde_json::from_slice::<UserCreated>(&message.body) else {
                ack_or_log(message, "user-created").await;
                continue;
            };

            let user = User {
                id: event.id,
                username: event.username,
                display_name: event.display_name,
                avatar_url: event.avatar_url,
            };

            if let Err(e) = UserStore::create(&self.pool, &user).await {
                tracing::error!(user_id = %user.id, error = %e, "Failed to create user projection");
            }
            ack_or_log(message, "user-created").await;
        }

        Ok(())
    }

    /// Consume the users-update exchange, applying partial profile updates.
    pub async fn run_user_updates<Q: EventQueue>(&self, mq: &Q) -> Result<(), AppError> {
        let mut messages = mq
            .consume_exchange(herald_mq::USERS_UPDATE_EXCHANGE)
            .await
            .map_err(|e| AppError::Queue(e.to_string()))?;

        tracing::info!(exchange = herald_mq::USERS_UPDATE_EXCHANGE, "User-update consumer started");

        while let Some(message) = messages.recv().await {
            let Ok(raw) = serde_json::from_slice::<serde_json::Map<String, Value>>(&message.body)
            else {
                ack_or_log(message, "user-update").await;
                continue;
            };

            let Some((user_id, updates)) = sanitize_updates(raw) else {
                ack_or_log(message, "user-update").await;
                continue;
            };

            if !updates.is_empty() {
                if let Err(e) = UserStore::update_by_id(&self.pool, user_id, &updates).await {
                    tracing::error!(user_id = %user_id, error = %e, "Failed to update user projection");
                }
            }
            ack_or_log(message, "user-update").await;
        }

        Ok(())
    }

    /// Consume the follows queue, recording new follower relationships.
    /// New relationships start with new-post notifications disabled.
    pub async fn run_follower_created<Q: EventQueue>(&self, mq: &Q) -> Result<(), AppError> {
        let mut messages = mq
            .consume(herald_mq::FOLLOWS_QUEUE)
            .await
            .map_err(|e| AppError::Queue(e.to_string()))?;

        tracing::info!(queue = herald_mq::FOLLOWS_QUEUE, "Follower consumer started");

        while let Some(message) = messages.recv().await {
            let Ok(event) = serde_json::from_slice::<Follow>(&message.body) else {
                ack_or_log(message, "follow").await;
                continue;
            };

            let follower = Follower {
                user_id: event.user_id,
                follower_id: event.follower_id,
                new_post_notifications_enabled: false,
            };

            if let Err(e) = UserStore::create_follower(&self.pool, &follower).await {
                tracing::error!(
                    user_id = %event.user_id,
                    follower_id = %event.follower_id,
                    error = %e,
                    "Failed to create follower"
                );
            }
            ack_or_log(message, "follow").await;
        }

        Ok(())
    }

    /// Consume the follower-settings queue, flipping the per-author toggle.
    pub async fn run_follower_settings<Q: EventQueue>(&self, mq: &Q) -> Result<(), AppError> {
        let mut messages = mq
            .consume(herald_mq::FOLLOWER_SETTINGS_QUEUE)
            .await
            .map_err(|e| AppError::Queue(e.to_string()))?;

        tracing::info!(
            queue = herald_mq::FOLLOWER_SETTINGS_QUEUE,
            "Follower-settings consumer started"
        );

        while let Some(message) = messages.recv().await {
            let Ok(event) = serde_json::from_slice::<FollowerSettingsUpdate>(&message.body) else {
                ack_or_log(message, "follower-settings").await;
                continue;
            };

            if let Err(e) = UserStore::set_follower_new_post_notifications_enabled(
                &self.pool,
                event.user_id,
                event.follower_id,
                event.enabled,
            )
            .await
            {
                tracing::error!(
                    user_id = %event.user_id,
                    follower_id = %event.follower_id,
                    error = %e,
                    "Failed to update follower notification setting"
                );
            }
            ack_or_log(message, "follower-settings").await;
        }

        Ok(())
    }
}

/// Extract the target user id and keep only the allowed profile columns.
/// Returns `None` when the payload carries no usable `user_id`.
fn sanitize_updates(
    mut raw: serde_json::Map<String, Value>,
) -> Option<(Uuid, serde_json::Map<String, Value>)> {
    let user_id = raw
        .remove("user_id")
        .and_then(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()))?;

    raw.retain(|key, _| ALLOWED_UPDATE_FIELDS.contains(&key.as_str()));
    Some((user_id, raw))
}

async fn ack_or_log(message: Delivery, context: &'static str) {
    if let Err(e) = message.ack().await {
        tracing::error!(context, error = %e, "Failed to ack message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_sanitize_updates_keeps_allowed_fields() {
        let user_id = Uuid::new_v4();
        let raw = map(serde_json::json!({
            "user_id": user_id.to_string(),
            "username": "bob",
            "display_name": "Bob",
            "role": "admin",
            "id": "evil-override"
        }));

        let (id, updates) = sanitize_updates(raw).unwrap();
        assert_eq!(id, user_id);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates["username"], "bob");
        assert_eq!(updates["display_name"], "Bob");
        assert!(!updates.contains_key("role"));
        assert!(!updates.contains_key("id"));
    }

    #[test]
    fn test_sanitize_updates_requires_user_id() {
        assert!(sanitize_updates(map(serde_json::json!({"username": "bob"}))).is_none());
        assert!(
            sanitize_updates(map(serde_json::json!({
                "user_id": "not-a-uuid",
                "username": "bob"
            })))
            .is_none()
        );
    }

    #[test]
    fn test_sanitize_updates_allows_null_values() {
        let user_id = Uuid::new_v4();
        let raw = map(serde_json::json!({
            "user_id": user_id.to_string(),
            "display_name": null
        }));

        let (_, updates) = sanitize_updates(raw).unwrap();
        assert_eq!(updates["display_name"], Value::Null);
    }
}
