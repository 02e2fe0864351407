//! Broker event payloads.
//!
//! Wire format is snake_case JSON as published by the upstream post/user
//! services. User-update events are a free-form map (see
//! `herald_fanout::users`) and have no struct here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Published on the `new-post` queue when an author publishes a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostCreated {
    pub post_id: i64,
    pub user_id: Uuid,
    pub post_title: String,
    pub created_at: DateTime<Utc>,
}

/// Published on the `follows` queue when a user follows another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub user_id: Uuid,
    pub follower_id: Uuid,
}

/// Published when a follower toggles new-post notifications for an author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerSettingsUpdate {
    pub user_id: Uuid,
    pub follower_id: Uuid,
    pub enabled: bool,
}

/// Broadcast on the `users.created` exchange for every new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreated {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}
