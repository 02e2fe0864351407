//! Durable store operations for notifications, users and followers.

use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{Follower, GlobalNotification, NewNotification, Notification, User};

/// Server-side cap on notification page size.
pub const GET_NOTIFICATIONS_MAX_LIMIT: i64 = 10;

pub struct NotificationStore;

impl NotificationStore {
    /// Followers of `author_id` who opted into new-post notifications.
    pub async fn get_interested_followers(
        pool: &PgPool,
        author_id: Uuid,
    ) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT follower_id FROM followers
            WHERE user_id = $1 AND new_post_notifications_enabled = true
            "#,
        )
        .bind(author_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Insert a batch of notifications in one multi-row statement.
    /// Atomic per call; a no-op for an empty batch.
    pub async fn create_batch(
        pool: &PgPool,
        notifications: &[NewNotification],
    ) -> Result<(), AppError> {
        if notifications.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO notifications(type, receiver_id, content, resource_id) ");
        builder.push_values(notifications, |mut row, n| {
            row.push_bind(&n.kind)
                .push_bind(n.receiver_id)
                .push_bind(&n.content)
                .push_bind(&n.resource_id);
        });

        builder.build().execute(pool).await?;
        Ok(())
    }

    /// Insert notifications in chunks of `batch_size` rows, failing fast on
    /// the first chunk error.
    pub async fn create_batched(
        pool: &PgPool,
        notifications: &[NewNotification],
        batch_size: usize,
    ) -> Result<(), AppError> {
        for chunk in notifications.chunks(batch_size.max(1)) {
            Self::create_batch(pool, chunk).await?;
        }
        Ok(())
    }

    /// A user's notifications, newest first. `limit` is clamped to
    /// [`GET_NOTIFICATIONS_MAX_LIMIT`].
    pub async fn get_user_notifications(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, AppError> {
        let limit = limit.min(GET_NOTIFICATIONS_MAX_LIMIT);

        let notifications: Vec<Notification> = sqlx::query_as(
            r#"
            SELECT n.id, n.type, n.receiver_id, n.content, n.resource_id, n.created_at
            FROM notifications n
            WHERE n.receiver_id = $1
            ORDER BY n.created_at DESC
            LIMIT $2
            OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(notifications)
    }

    /// Delete notifications older than `days`. Returns the number removed.
    pub async fn delete_old_notifications(pool: &PgPool, days: i32) -> Result<u64, AppError> {
        let result =
            sqlx::query("DELETE FROM notifications WHERE created_at < NOW() - MAKE_INTERVAL(days => $1)")
                .bind(days)
                .execute(pool)
                .await?;

        Ok(result.rows_affected())
    }

    /// Insert a global notification and return its store-assigned id.
    /// Input bounds are validated by the service layer.
    pub async fn create_global_notification(
        pool: &PgPool,
        poster_id: Uuid,
        title: &str,
        content: &str,
        resource_link: &str,
    ) -> Result<i64, AppError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO global_notifications(poster_id, title, content, resource_link)
            VALUES($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(poster_id)
        .bind(title)
        .bind(content)
        .bind(resource_link)
        .fetch_one(pool)
        .await?;

        Ok(id)
    }

    /// Global notifications the user has not yet marked read, newest first.
    /// `limit` is clamped to [`GET_NOTIFICATIONS_MAX_LIMIT`].
    pub async fn get_global_notifications(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GlobalNotification>, AppError> {
        let limit = limit.min(GET_NOTIFICATIONS_MAX_LIMIT);

        let notifications: Vec<GlobalNotification> = sqlx::query_as(
            r#"
            SELECT g.id, g.poster_id, g.title, g.content, g.resource_link, g.created_at
            FROM global_notifications g
            LEFT JOIN checked_global_notifications c
                ON c.user_id = $1 AND c.notification_id = g.id
            WHERE c.notification_id IS NULL
            ORDER BY g.created_at DESC
            LIMIT $2
            OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(notifications)
    }

    /// Record that a user has read a global notification. A repeated mark is
    /// a successful no-op.
    pub async fn mark_global_notification_as_read(
        pool: &PgPool,
        user_id: Uuid,
        notification_id: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO checked_global_notifications(user_id, notification_id)
            VALUES($1, $2)
            ON CONFLICT (user_id, notification_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(notification_id)
        .execute(pool)
        .await?;

        Ok(())
    }
}

pub struct UserStore;

impl UserStore {
    /// Insert a user projection row; an already-known id is a no-op.
    pub async fn create(pool: &PgPool, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users(id, username, display_name, avatar_url)
            VALUES($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<User, AppError> {
        let user: User = sqlx::query_as(
            "SELECT u.id, u.username, u.display_name, u.avatar_url FROM users u WHERE u.id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        Ok(user)
    }

    /// Apply a partial profile update. Columns are restricted to the allowed
    /// set by the caller; a missing user row is tolerated.
    pub async fn update_by_id(
        pool: &PgPool,
        id: Uuid,
        updates: &serde_json::Map<String, Value>,
    ) -> Result<(), AppError> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
        let mut assignments = builder.separated(", ");
        for (column, value) in updates {
            assignments.push(column.as_str());
            assignments.push_unseparated(" = ");
            match value {
                Value::Null => assignments.push_bind_unseparated(Option::<String>::None),
                Value::String(s) => assignments.push_bind_unseparated(Some(s.clone())),
                other => assignments.push_bind_unseparated(Some(other.to_string())),
            };
        }
        builder.push(" WHERE id = ").push_bind(id);

        builder.build().execute(pool).await?;
        Ok(())
    }

    /// Insert a follower relationship; an existing pair is a no-op.
    pub async fn create_follower(pool: &PgPool, follower: &Follower) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO followers(user_id, follower_id, new_post_notifications_enabled)
            VALUES($1, $2, $3)
            ON CONFLICT (user_id, follower_id) DO NOTHING
            "#,
        )
        .bind(follower.user_id)
        .bind(follower.follower_id)
        .bind(follower.new_post_notifications_enabled)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Flip the per-relationship new-post notification flag.
    pub async fn set_follower_new_post_notifications_enabled(
        pool: &PgPool,
        user_id: Uuid,
        follower_id: Uuid,
        enabled: bool,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE followers
            SET new_post_notifications_enabled = $3
            WHERE user_id = $1 AND follower_id = $2
            "#,
        )
        .bind(user_id)
        .bind(follower_id)
        .bind(enabled)
        .execute(pool)
        .await?;

        Ok(())
    }
}
