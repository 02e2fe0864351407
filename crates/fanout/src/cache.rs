//! Redis-backed read cache helpers.

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use herald_common::error::AppError;

/// TTL for cached notification pages.
pub const USER_NOTIFICATIONS_TTL: Duration = Duration::from_secs(120);

/// Cache key for one page of a user's notifications.
pub fn user_notifications_key(user_id: Uuid, limit: i64, offset: i64) -> String {
    format!("user:{user_id}-notifications:{limit}:{offset}")
}

/// Fetch and deserialize a cached value. `Ok(None)` is a miss; a present but
/// undecodable value is an internal error, not a miss.
pub async fn get_json<T: DeserializeOwned>(
    redis: &ConnectionManager,
    key: &str,
) -> Result<Option<T>, AppError> {
    let mut conn = redis.clone();
    let raw: Option<String> = conn.get(key).await?;

    match raw {
        None => Ok(None),
        Some(payload) => {
            let value = serde_json::from_str(&payload).map_err(|e| {
                AppError::Internal(format!("corrupt cache entry at '{key}': {e}"))
            })?;
            Ok(Some(value))
        }
    }
}

/// Serialize and store a value with a TTL.
pub async fn set_json<T: Serialize>(
    redis: &ConnectionManager,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), AppError> {
    let payload = serde_json::to_string(value)
        .map_err(|e| AppError::Internal(format!("failed to serialize cache entry: {e}")))?;

    let mut conn = redis.clone();
    conn.set_ex::<_, _, ()>(key, payload, ttl.as_secs()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_notifications_key_format() {
        let user = Uuid::nil();
        assert_eq!(
            user_notifications_key(user, 10, 20),
            "user:00000000-0000-0000-0000-000000000000-notifications:10:20"
        );
    }
}
