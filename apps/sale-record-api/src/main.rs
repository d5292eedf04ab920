//! # Sale Record API server
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tracing ──► config ──► SQLite (+migrations) ──► broker                 │
//! │                                                   │                     │
//! │             publish worker ◄──────────────────────┤                     │
//! │             order consumer ◄── Redis pub/sub ─────┘                     │
//! │             HTTP server ──► until Ctrl-C / SIGTERM                      │
//! │                                                                         │
//! │  Shutdown: consumer ──► publish queue drained ──► pool closed           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sale_record_api::broker::{DiscardBroker, EventBroker, RedisBroker};
use sale_record_api::consumer::EventConsumer;
use sale_record_api::lookup::HttpLookups;
use sale_record_api::publisher::{PublishChannels, PublishWorker};
use sale_record_api::routes::{self, AppState};
use sale_record_api::{Reconciler, ServiceConfig};
use salerecord_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("Starting sale record service...");

    let config = ServiceConfig::load().context("invalid configuration")?;
    info!(
        env = %config.app_env,
        port = config.http_port,
        database = %config.database_path,
        "Configuration loaded"
    );

    let db = Database::new(config.db_config())
        .await
        .context("failed to open database")?;

    // Broker: Redis when configured, otherwise outbound events are dropped.
    let redis = match &config.redis_url {
        Some(url) => Some(redis::Client::open(url.as_str()).context("invalid redis url")?),
        None => None,
    };
    let broker: Arc<dyn EventBroker> = match &redis {
        Some(client) => Arc::new(
            RedisBroker::connect(client)
                .await
                .context("failed to connect to redis")?,
        ),
        None => {
            warn!("No redis_url configured, events are neither consumed nor delivered");
            Arc::new(DiscardBroker)
        }
    };

    let (worker, publisher) = PublishWorker::new(
        broker,
        PublishChannels {
            sale_record: config.sale_record_channel.clone(),
            sale_fail: config.sale_fail_channel.clone(),
        },
        config.publish_queue_capacity,
    );
    let publish_task = tokio::spawn(worker.run());

    let lookups = HttpLookups::new(config.services.clone(), config.lookup_timeout())
        .context("failed to build lookup client")?;
    let reconciler = Reconciler::new(
        db.clone(),
        Arc::new(lookups),
        publisher.clone(),
        config.reconcile_settings(),
    );

    let consumer = redis.map(|client| {
        let (consumer, handle) = EventConsumer::new(
            client,
            config.order_event_channel.clone(),
            reconciler.clone(),
            config.consumer_max_in_flight,
        );
        (tokio::spawn(consumer.run()), handle)
    });

    let app = routes::router(AppState {
        reconciler,
        query_settings: config.query_settings(),
        service_name: Arc::from(config.service_name.as_str()),
    });

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(%address, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if let Some((task, handle)) = consumer {
        handle.shutdown().await;
        if let Err(e) = task.await {
            error!(error = %e, "Consumer task failed");
        }
    }

    publisher.shutdown().await;
    if let Err(e) = publish_task.await {
        error!(error = %e, "Publish worker task failed");
    }

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
