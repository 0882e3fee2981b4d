//! Traccar position relay

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use traccar_relay::{
    config::AppConfig,
    database,
    errors::RelayError,
    listener::{Backoff, NotificationListener, PgNotificationSource},
    mqtt::MqttBus,
    relay,
};

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    #[cfg(feature = "dotenvy")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    let pool = database::connect(&config.database).await?;
    info!("successfully connected to postgres");

    let source = PgNotificationSource::connect(&pool, &config.database.channel).await?;
    let listener = NotificationListener::new(
        source,
        config.database.positions_table.clone(),
        Backoff::from(&config.database),
    );
    let bus = MqttBus::connect(&config.mqtt)?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_listener(shutdown.clone()));

    let handle = relay::spawn(listener, bus, config.relay.queue_capacity, shutdown);

    // Returns only after the publisher has released the bus connection
    let result = handle.join().await;
    if let Err(e) = &result {
        error!("relay stopped with error: {}", e);
    }

    pool.close().await;
    info!("relay stopped");
    result
}

/// Cancel `token` on Ctrl+C or SIGTERM
async fn shutdown_listener(token: CancellationToken) {
    let ctrl_c = signal::ctrl_c();
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received shutdown signal"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }

    token.cancel();
}
