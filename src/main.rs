use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use novalnet_gateway::fulfillment::OrderLedger;
use novalnet_gateway::gateway::NovalnetClient;
use novalnet_gateway::lifecycle::PaymentContext;
use novalnet_gateway::notify::LogNotifier;
use novalnet_gateway::settings::StaticResolver;
use novalnet_gateway::store::postgres::PostgresTransactionStore;
use novalnet_gateway::{config, create_app, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env()?;

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database pool
    let pool = db::create_pool(&config.database_url).await?;

    // Run migrations
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let resolver = StaticResolver::from_file(&config.gateway_config_path)?;
    let client = NovalnetClient::new(config.gateway_base_url.clone());
    tracing::info!("Processor client initialized with URL: {}", config.gateway_base_url);

    let ctx = PaymentContext {
        store: Arc::new(PostgresTransactionStore::new(pool.clone())),
        catalog: Arc::new(OrderLedger::new(pool.clone())),
        notifier: Arc::new(LogNotifier),
        client,
    };

    let state = AppState {
        db: pool,
        ctx,
        resolver: Arc::new(resolver),
        public_base_url: config.public_base_url.clone(),
        webhook_allowed_host: config.webhook_allowed_host.clone(),
    };

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}
