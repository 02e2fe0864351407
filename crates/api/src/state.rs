//! Shared application state for the Axum API server.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use herald_common::config::AppConfig;
use herald_fanout::registry::ConnectionRegistry;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub redis: ConnectionManager,
    pub config: AppConfig,
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        redis: ConnectionManager,
        config: AppConfig,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            pool,
            redis,
            config,
            registry,
        }
    }
}
