use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marquee_api::worker::{start_payment_worker, PaymentWorkerConfig};
use marquee_api::{app, AppState, ReservationMetrics};
use marquee_booking::{ReservationService, Stores};
use marquee_core::{ReservationSettings, SystemClock};
use marquee_store::{Config, DbClient, EventProducer, PgSeatLedger, PgShowCatalog, RedisClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "marquee_api=debug,marquee_booking=debug,marquee_store=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    info!("Starting Marquee on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let rules = match db.fetch_reservation_rules(config.reservation.clone()).await {
        Ok(rules) => rules,
        Err(e) => {
            warn!("Using configured reservation rules, business_rules unreadable: {}", e);
            config.reservation.clone()
        }
    };
    let settings = ReservationSettings::from(&rules);
    info!(
        "Claims hold for {:?}, checkout extends by {:?}, payments time out after {:?}",
        settings.claim_ttl, settings.checkout_extension, settings.payment_timeout
    );

    let redis = RedisClient::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    let producer = EventProducer::new(&config.kafka.brokers, &config.kafka.bookings_topic)
        .context("Failed to create Kafka producer")?;

    let stores = Stores {
        ledger: Arc::new(PgSeatLedger::new(db.pool.clone())),
        catalog: Arc::new(PgShowCatalog::new(db.pool.clone())),
        cache: Arc::new(redis),
        publisher: Arc::new(producer),
    };
    let reservations = Arc::new(ReservationService::new(stores, Arc::new(SystemClock), settings));
    let metrics = Arc::new(ReservationMetrics::new()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(start_payment_worker(
        PaymentWorkerConfig {
            brokers: config.kafka.brokers.clone(),
            group_id: config.kafka.group_id.clone(),
            topic: config.kafka.payment_confirmations_topic.clone(),
        },
        reservations.clone(),
        metrics.clone(),
        shutdown_rx,
    ));

    let app = app(AppState::new(reservations, metrics));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    match worker.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Payment worker failed: {}", e),
        Err(e) => error!("Payment worker panicked: {}", e),
    }

    db.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Unable to listen for shutdown signal: {}", e),
    }
}
