use boardroom::{
    bootstrap_admin, create_db_pool, create_router,
    events::{create_redis_pool, EventPublisherBuilder},
    init_tracing, run_migrations, shutdown_telemetry, AppState, Config,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    init_tracing(&config);

    info!(
        service = "boardroom",
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting server"
    );

    let issues = config.validate_for_production();
    for issue in &issues {
        warn!(issue = %issue, "Configuration warning");
    }

    info!(
        database_url = %config.database.url.split('@').next_back().unwrap_or("***"),
        max_connections = config.database.max_connections,
        "Connecting to database"
    );

    let db_pool = create_db_pool(&config).unwrap_or_else(|e| {
        error!(error = %e, "Failed to create database pool");
        std::process::exit(1);
    });

    info!("Database connection pool created");

    if config.server.run_migrations {
        if let Err(e) = run_migrations(&db_pool) {
            error!(error = %e, "Failed to run migrations");
            std::process::exit(1);
        }
    }

    if let Err(e) = bootstrap_admin(&db_pool, &config) {
        error!(error = %e, "Failed to bootstrap administrator");
        std::process::exit(1);
    }

    let redis_pool = create_redis_pool(&config.redis);
    let publisher = EventPublisherBuilder::new(db_pool.clone())
        .maybe_redis_pool(redis_pool.clone())
        .stream_name(config.redis.stream_name.clone())
        .spawn();

    let state = AppState::new(db_pool, redis_pool, &config).unwrap_or_else(|e| {
        error!(error = %e, "Failed to load token signing keys");
        std::process::exit(1);
    });
    let app = create_router(state, &config);

    let http_addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, address = %http_addr, "Failed to bind HTTP server");
            std::process::exit(1);
        });

    info!(
        http_address = %http_addr,
        docs_url = %format!("http://{}/swagger-ui", http_addr),
        "HTTP server ready"
    );

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    {
        error!(error = %e, "HTTP server error");
    }

    info!("Shutting down event publisher...");
    publisher.shutdown().await;

    shutdown_telemetry();

    info!("Server shutdown complete");
}
