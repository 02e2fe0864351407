//! Notification service — cached reads and global notifications.

use redis::aio::ConnectionManager;
use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{GlobalNotification, Notification};

use crate::cache;
use crate::store::NotificationStore;

/// Upper bound for `title` and `resource_link` on global notifications.
const GLOBAL_NOTIFICATION_TEXT_MAX: usize = 255;

/// Parameters for creating a global notification.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateGlobalNotificationParams {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub resource_link: String,
}

pub struct NotificationService;

impl NotificationService {
    /// One page of a user's notifications, served from the read cache when
    /// possible. A cache miss reads the store and repopulates the cache with
    /// a short TTL; any cache failure other than a miss aborts the read.
    pub async fn get_user_notifications(
        pool: &PgPool,
        redis: &ConnectionManager,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, AppError> {
        let key = cache::user_notifications_key(user_id, limit, offset);

        match cache::get_json::<Vec<Notification>>(redis, &key).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Notification cache read failed");
                return Err(AppError::Internal("internal server error".to_string()));
            }
        }

        let notifications =
            NotificationStore::get_user_notifications(pool, user_id, limit, offset).await?;

        // Best-effort repopulation; the read itself already succeeded.
        if let Err(e) =
            cache::set_json(redis, &key, &notifications, cache::USER_NOTIFICATIONS_TTL).await
        {
            tracing::error!(user_id = %user_id, error = %e, "Failed to cache notifications");
        }

        Ok(notifications)
    }

    /// Validate and persist a global notification, returning its id.
    pub async fn create_global_notification(
        pool: &PgPool,
        poster_id: Uuid,
        params: &CreateGlobalNotificationParams,
    ) -> Result<i64, AppError> {
        Self::validate_global_notification(params)?;

        let id = NotificationStore::create_global_notification(
            pool,
            poster_id,
            &params.title,
            &params.content,
            &params.resource_link,
        )
        .await?;

        tracing::info!(id, poster_id = %poster_id, "Global notification created");
        Ok(id)
    }

    pub async fn get_global_notifications(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GlobalNotification>, AppError> {
        NotificationStore::get_global_notifications(pool, user_id, limit, offset).await
    }

    pub async fn mark_global_notification_as_read(
        pool: &PgPool,
        user_id: Uuid,
        notification_id: i64,
    ) -> Result<(), AppError> {
        NotificationStore::mark_global_notification_as_read(pool, user_id, notification_id).await
    }

    fn validate_global_notification(
        params: &CreateGlobalNotificationParams,
    ) -> Result<(), AppError> {
        if params.title.is_empty()
            || params.title.chars().count() > GLOBAL_NOTIFICATION_TEXT_MAX
            || params.resource_link.chars().count() > GLOBAL_NOTIFICATION_TEXT_MAX
        {
            return Err(AppError::Validation(
                "title is required; title and resource_link must be at most 255 characters"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(title: &str, resource_link: &str) -> CreateGlobalNotificationParams {
        CreateGlobalNotificationParams {
            title: title.to_string(),
            content: "body".to_string(),
            resource_link: resource_link.to_string(),
        }
    }

    #[test]
    fn test_empty_title_rejected() {
        let result = NotificationService::validate_global_notification(&params("", ""));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_title_boundary_255_accepted() {
        let title = "t".repeat(255);
        assert!(NotificationService::validate_global_notification(&params(&title, "")).is_ok());
    }

    #[test]
    fn test_title_256_rejected() {
        let title = "t".repeat(256);
        let result = NotificationService::validate_global_notification(&params(&title, ""));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_resource_link_boundary_255_accepted() {
        let link = "l".repeat(255);
        assert!(NotificationService::validate_global_notification(&params("title", &link)).is_ok());
    }

    #[test]
    fn test_resource_link_256_rejected() {
        let link = "l".repeat(256);
        let result = NotificationService::validate_global_notification(&params("title", &link));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
