use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create the PostgreSQL connection pool shared by the consumers, the
/// scheduler and the API handlers. `max_connections` comes from
/// `AppConfig::db_max_connections`.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "Connected to PostgreSQL");
    Ok(pool)
}
