//! Retention scheduler — periodic purge of stale notification rows.

use std::time::Duration;

use sqlx::PgPool;
use tokio::time::MissedTickBehavior;

use crate::store::NotificationStore;

/// Notifications older than this many days are purged.
const OLD_NOTIFICATIONS_DAYS: i32 = 14;

/// Time between retention sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

pub struct RetentionScheduler {
    pool: PgPool,
}

impl RetentionScheduler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run sweeps forever. A failed sweep is logged and retried on the next
    /// natural tick.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the first sweep lands
        // one full interval after boot.
        ticker.tick().await;

        tracing::info!(
            interval_hours = SWEEP_INTERVAL.as_secs() / 3600,
            retention_days = OLD_NOTIFICATIONS_DAYS,
            "Retention scheduler started"
        );

        loop {
            ticker.tick().await;
            match NotificationStore::delete_old_notifications(&self.pool, OLD_NOTIFICATIONS_DAYS)
                .await
            {
                Ok(deleted) => {
                    tracing::info!(deleted, days = OLD_NOTIFICATIONS_DAYS, "Purged old notifications");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to delete old notifications");
                }
            }
        }
    }
}
