//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vidrelay_api::{create_router, metrics, ApiConfig, AppState};
use vidrelay_media::{FileMetadataGenerator, MediaConfig, MediaFetcher};
use vidrelay_notify::{ChannelNotifier, LogChannel, Notifier, TwilioConfig, TwilioWhatsApp};
use vidrelay_publish::{YouTubeConfig, YouTubePublisher};
use vidrelay_worker::{JobScheduler, Pipeline, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;

    // Install rustls crypto provider (required for rustls 0.23+)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting vidrelay-api");

    let config = ApiConfig::from_env();
    info!(
        "API config: host={}, port={}, production={}",
        config.host,
        config.port,
        config.is_production()
    );

    let scheduler = Arc::new(build_scheduler().await?);

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("failed to install Prometheus recorder")?)
    } else {
        None
    };

    let state = AppState::new(config.clone(), Arc::clone(&scheduler));
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    scheduler.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("vidrelay=info,tower_http=info"))
        .context("invalid log filter")?;

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

/// Wire the production adapters into a running scheduler.
async fn build_scheduler() -> anyhow::Result<JobScheduler> {
    let media_config = MediaConfig::from_env();
    tokio::fs::create_dir_all(&media_config.work_dir)
        .await
        .with_context(|| format!("failed to create {}", media_config.work_dir.display()))?;

    let fetcher = MediaFetcher::new(&media_config).context("failed to build fetcher")?;
    let generator = FileMetadataGenerator::new(&media_config);

    let youtube_config = YouTubeConfig::from_env();
    if youtube_config.access_token.is_none() {
        warn!("YOUTUBE_ACCESS_TOKEN is not set; uploads will fail with an auth error");
    }
    let publisher = YouTubePublisher::new(youtube_config).context("failed to build publisher")?;

    let notifier: Arc<dyn Notifier> = match TwilioConfig::from_env() {
        Some(twilio) => {
            info!("Delivering chat notifications via Twilio WhatsApp");
            let channel = TwilioWhatsApp::new(twilio).context("failed to build Twilio client")?;
            Arc::new(ChannelNotifier::new(channel))
        }
        None => {
            warn!("Twilio is not configured; chat notifications are only logged");
            Arc::new(ChannelNotifier::new(LogChannel))
        }
    };

    let worker_config = WorkerConfig::from_env();
    info!(
        "Worker config: max_jobs={}, visibility={}",
        worker_config.max_concurrent_jobs, worker_config.publish_visibility
    );

    let pipeline = Pipeline::new(
        Arc::new(fetcher),
        Arc::new(generator),
        Arc::new(publisher),
        notifier,
        &worker_config,
    );
    JobScheduler::start(Arc::new(pipeline), worker_config).context("failed to start scheduler")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
