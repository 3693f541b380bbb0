use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod emitter;
mod http;
mod payload;
mod queue;

use crate::config::{Config, QueueConfig};
use crate::http::{router, AppState};
use crate::queue::QueueBackend;

/// Set by the Lambda runtime in every function sandbox
const LAMBDA_RUNTIME_API: &str = "AWS_LAMBDA_RUNTIME_API";

/// Resolves on SIGTERM or SIGINT.
async fn shutdown_signal() {
    let sigterm = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to setup SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = sigterm => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let on_lambda = std::env::var_os(LAMBDA_RUNTIME_API).is_some();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(!on_lambda)
        .init();

    let config = Config::from_env().context("Invalid emitter configuration")?;

    info!("Workers per invocation: {}", config.num_workers);
    info!("Payload file: {}", config.payload_path.display());
    match &config.queue {
        QueueConfig::Sqs { queue_url, region } => {
            info!("Target SQS queue: {} ({})", queue_url, region)
        }
        QueueConfig::Faktory { url, queue, .. } => {
            info!("Target Faktory queue: {} at {}", queue, url)
        }
    }

    let queue = QueueBackend::from_config(&config.queue)
        .await
        .context("Failed to set up queue client")?;
    info!("Using {} queue backend", queue.name());

    let app = router(AppState::new(queue, &config));

    if on_lambda {
        info!("Running as a Lambda function");
        lambda_http::run(app)
            .await
            .map_err(|e| anyhow::anyhow!(e))
            .context("Lambda runtime failed")?;
        return Ok(());
    }

    info!("Starting emitter service on {}", config.bind_addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Emitter service terminated");
    Ok(())
}
