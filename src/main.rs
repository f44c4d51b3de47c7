use library_circulation::{
    adapters::{PgStore, SystemClock},
    api::{AppState, create_router},
    application::lending::LendingEngine,
    config::Config,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "library_circulation=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    tracing::info!(
        loan_period_days = config.policy.loan_period_days,
        renewal_limit = config.policy.renewal_limit,
        daily_fine = %config.policy.daily_fine,
        concurrent_limit = config.policy.concurrent_limit,
        "Lending policy loaded"
    );

    // Initialize database connection pool
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    // Initialize adapters
    let store = Arc::new(PgStore::new(pool));
    let engine = LendingEngine::new(store, config.policy.clone()).with_retry(config.retry);

    // Create application state
    let app_state = Arc::new(AppState {
        engine,
        clock: Arc::new(SystemClock),
    });

    // Create router
    let app = create_router(app_state);

    // Server configuration
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    // Start server
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
