use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A per-follower notification record.
///
/// Created by the fan-out consumer, read via the cached list endpoint,
/// and removed only by the retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    /// Free-form tag, e.g. "newpost".
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub receiver_id: Uuid,
    pub content: String,
    /// Opaque reference to the triggering resource (e.g. a post id).
    pub resource_id: String,
    pub created_at: DateTime<Utc>,
}

/// A notification row about to be inserted; id and timestamp are
/// store-assigned.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: String,
    pub receiver_id: Uuid,
    pub content: String,
    pub resource_id: String,
}

/// A platform-wide announcement visible to every user until they mark it read.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GlobalNotification {
    pub id: i64,
    pub poster_id: Uuid,
    pub title: String,
    pub content: String,
    pub resource_link: String,
    pub created_at: DateTime<Utc>,
}

/// A follower relationship with its per-relationship notification toggle.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Follower {
    pub user_id: Uuid,
    pub follower_id: Uuid,
    pub new_post_notifications_enabled: bool,
}

/// Local projection of an upstream user, maintained by the sync consumers.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Transient payload handed to the delivery dispatcher.
///
/// Never persisted; exists only for the lifetime of one channel transit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDelivery {
    pub receiver_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub resource_id: String,
}
