use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use orders_rs::{
    config::Backend,
    handlers::{create_order_router, health_check},
    init_observability,
    repositories::{OrderRepository, PostgresOrderRepository, RedisOrderRepository},
    Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_environment()?;

    init_observability(
        &config.observability.service_name,
        &config.observability.log_level,
        config.observability.enable_json_logging,
    )?;

    info!("Starting orders-rs service");
    info!("Storage backend: {:?}", config.database.backend);

    // The only place that branches on the active backend. Everything above
    // the repository trait is backend-agnostic.
    let repository: Arc<dyn OrderRepository> = match config.database.backend {
        Backend::Redis => {
            let client = redis::Client::open(config.database.redis_url.as_str())?;
            let mut connection = client.get_multiplexed_tokio_connection().await?;
            // Verify connectivity before accepting traffic.
            let _: String = redis::cmd("PING").query_async(&mut connection).await?;
            info!("Connected to redis");
            Arc::new(RedisOrderRepository::new(connection))
        }
        Backend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .connect(&config.database.postgres_url)
                .await?;
            let repository = PostgresOrderRepository::new(pool);
            repository.ensure_schema().await?;
            info!("Connected to postgres");
            Arc::new(repository)
        }
    };

    let app = create_app(repository, config.server.request_timeout());

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let listener = TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn create_app(repository: Arc<dyn OrderRepository>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health/status", get(health_check))
        .merge(create_order_router(repository))
        // Middleware layers, outer to inner
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(request_timeout))
}
