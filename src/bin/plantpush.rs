use anyhow::Result;
use plantpush::{
    chain::{HttpPlantReader, PlantReader},
    config::Config,
    gateway::{HttpPushGateway, PushGateway},
    http::{context::AppContext, server::build_router},
    storage::{
        NoopNotificationStore, NotificationStore, RedisNotificationStore, create_cache_pool,
    },
};
use std::{env, sync::Arc};
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let version = plantpush::config::version()?;

    env::args().for_each(|arg| {
        if arg == "--version" {
            println!("{version}");
            std::process::exit(0);
        }
    });

    let config = Config::new()?;

    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "plantpush=info,tower_http=info".into()),
    );

    // JSON logs in deployment, pretty for local runs
    let fmt_layer = if std::env::var("JSON_LOGS").is_ok() {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .pretty()
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!(version = %version, "Starting plantpush application");

    // Without Redis every marker claim succeeds and nothing throttles,
    // matching a first-boot environment with no persistent state
    let store: Arc<dyn NotificationStore> = match &config.redis_url {
        Some(redis_url) => match create_cache_pool(redis_url) {
            Ok(pool) => {
                tracing::info!("Redis pool created successfully");
                Arc::new(RedisNotificationStore::new(pool))
            }
            Err(e) => {
                tracing::warn!(error = ?e, "Failed to create Redis pool, running without persistence");
                Arc::new(NoopNotificationStore::new())
            }
        },
        None => {
            tracing::info!("Redis not configured, running without persistence");
            Arc::new(NoopNotificationStore::new())
        }
    };

    let http_client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(config.user_agent.clone())
        .timeout(*config.http_client_timeout.as_ref())
        .build()?;

    let gateway: Arc<dyn PushGateway> = Arc::new(HttpPushGateway::new(
        http_client.clone(),
        config.gateway_base_url.clone(),
        config.gateway_api_key.clone(),
    ));
    if config.gateway_api_key.is_none() {
        tracing::warn!("GATEWAY_API_KEY not set, recipient discovery and sends are disabled");
    }

    let plant_reader: Arc<dyn PlantReader> = Arc::new(HttpPlantReader::new(
        http_client.clone(),
        config.plant_indexer_url.clone(),
    ));

    let port = *config.http_port.as_ref();
    let external_base = config.external_base.clone();
    let context = AppContext::new(config, http_client, store, gateway, plant_reader);
    let router = build_router(context);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to port {}: {}", port, e))?;

    tracing::info!(port = port, external_base = %external_base, version = %version, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    tracing::info!("Application shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating shutdown");
        },
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating shutdown");
        },
    }
}
