use anyhow::Context;
use fcm_provider::{FcmConfig, FcmProvider};
use notification_service::{
    Config, NotificationConsumer, PgRegistryUpdater, StdinSource, StdoutSink,
};
use push_delivery::{CancellationToken, DeliveryEngine};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing; reports go to stdout, so logs go to stderr
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,push_delivery=debug,sqlx=warn".into());
    let json_logs = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(env = %config.app.env, "Starting notification service");

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database.url)
        .await
        .context("failed to connect to database")?;
    tracing::info!("Successfully connected to database");

    let fcm = FcmProvider::new(
        FcmConfig::new(config.fcm.server_key.clone()).with_endpoint(config.fcm.endpoint.clone()),
    )
    .context("failed to build FCM client")?;

    let engine = DeliveryEngine::builder(Arc::new(fcm))
        .config(config.engine_config())
        .registry(Arc::new(PgRegistryUpdater::new(db_pool.clone())))
        .build()
        .context("invalid delivery engine configuration")?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, cancelling in-flight deliveries");
            signal_token.cancel();
        }
    });

    let consumer = NotificationConsumer::new(Arc::new(engine), Arc::new(StdoutSink));
    let mut source = StdinSource::new();
    let stats = consumer.run(&mut source, shutdown).await?;

    match notification_service::metrics::render() {
        Ok(text) => tracing::debug!(metrics = %text, "Final metrics snapshot"),
        Err(e) => tracing::warn!("Failed to render metrics: {}", e),
    }

    db_pool.close().await;
    tracing::info!(
        processed = stats.processed,
        rejected = stats.rejected,
        "Notification service stopped"
    );
    Ok(())
}
