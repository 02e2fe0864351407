use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (cache reads + stream broker)
    pub redis_url: String,

    /// JWT secret for API authentication
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// Port the HTTP/WebSocket server listens on (default: 3000)
    pub app_port: u16,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Number of delivery dispatcher workers (default: 5)
    pub delivery_workers: usize,

    /// Total capacity of the delivery queue, split across workers (default: 1000)
    pub delivery_queue_capacity: usize,

    /// Consumer name within the broker consumer group (default: hostname-ish)
    pub mq_consumer_name: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("JWT_EXPIRY_HOURS must be a valid u64"))?,
            app_port: std::env::var("APP_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("APP_PORT must be a valid u16"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            delivery_workers: std::env::var("DELIVERY_WORKERS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DELIVERY_WORKERS must be a valid usize"))?,
            delivery_queue_capacity: std::env::var("DELIVERY_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DELIVERY_QUEUE_CAPACITY must be a valid usize"))?,
            mq_consumer_name: std::env::var("MQ_CONSUMER_NAME")
                .unwrap_or_else(|_| "herald-0".to_string()),
        })
    }
}
