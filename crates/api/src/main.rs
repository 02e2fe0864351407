//! Herald notification service binary entrypoint.
//!
//! One process runs everything: the event consumers, the delivery
//! dispatcher, the retention scheduler, and the HTTP/WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use herald_common::config::AppConfig;
use herald_common::db::create_pool;
use herald_common::redis_pool::create_redis_pool;
use herald_fanout::dispatcher::DeliveryDispatcher;
use herald_fanout::fanout::PostFanoutConsumer;
use herald_fanout::registry::ConnectionRegistry;
use herald_fanout::retention::RetentionScheduler;
use herald_fanout::users::UserSyncConsumer;
use herald_mq::redis_queue::RedisEventQueue;

use herald_api::routes::create_router;
use herald_api::state::AppState;

/// Consumer group shared by all instances of this service.
const MQ_GROUP: &str = "herald";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_api=info,herald_fanout=info,herald_mq=info".into()),
        )
        .json()
        .init();

    tracing::info!("Starting Herald notification service...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Cache connection
    let redis = create_redis_pool(&config.redis_url).await?;

    // Broker connection; a failure here is fatal.
    let mq = Arc::new(
        RedisEventQueue::connect(&config.redis_url, MQ_GROUP, &config.mq_consumer_name).await?,
    );

    // Live delivery plumbing
    let registry = Arc::new(ConnectionRegistry::new());
    let dispatcher = DeliveryDispatcher::start(
        registry.clone(),
        config.delivery_workers,
        config.delivery_queue_capacity,
    );

    // Fan-out consumer
    {
        let consumer = PostFanoutConsumer::new(pool.clone(), dispatcher);
        let mq = mq.clone();
        tokio::spawn(async move {
            if let Err(e) = consumer.run(mq.as_ref()).await {
                tracing::error!(error = %e, "Fan-out consumer exited");
            }
        });
    }

    // User/follower projection consumers
    let sync = Arc::new(UserSyncConsumer::new(pool.clone()));
    {
        let sync = sync.clone();
        let mq = mq.clone();
        tokio::spawn(async move {
            if let Err(e) = sync.run_user_created(mq.as_ref()).await {
                tracing::error!(error = %e, "User-created consumer exited");
            }
        });
    }
    {
        let sync = sync.clone();
        let mq = mq.clone();
        tokio::spawn(async move {
            if let Err(e) = sync.run_user_updates(mq.as_ref()).await {
                tracing::error!(error = %e, "User-update consumer exited");
            }
        });
    }
    {
        let sync = sync.clone();
        let mq = mq.clone();
        tokio::spawn(async move {
            if let Err(e) = sync.run_follower_created(mq.as_ref()).await {
                tracing::error!(error = %e, "Follower consumer exited");
            }
        });
    }
    {
        let sync = sync.clone();
        let mq = mq.clone();
        tokio::spawn(async move {
            if let Err(e) = sync.run_follower_settings(mq.as_ref()).await {
                tracing::error!(error = %e, "Follower-settings consumer exited");
            }
        });
    }

    // Retention scheduler
    {
        let scheduler = RetentionScheduler::new(pool.clone());
        tokio::spawn(async move { scheduler.run().await });
    }

    // HTTP + WebSocket server
    let app_port = config.app_port;
    let state = AppState::new(pool, redis, config, registry);
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], app_port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run with shutdown on Ctrl+C. Unacked broker messages are redelivered
    // to the group on restart; in-flight live pushes are droppable.
    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping...");
        }
    }

    tracing::info!("Herald notification service stopped.");
    Ok(())
}
