use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use discussions_automod::automod::{self, Automod, ErrorSink};
use discussions_automod::config::Config;
use discussions_automod::discussions::DiscussionsClient;

/// How long in-flight actions get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting discussions-automod");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let filters = config.load_filters().with_context(|| {
        format!(
            "Failed to load filters from {}",
            config.filters_path.display()
        )
    })?;
    if filters.is_empty() {
        warn!(
            path = %config.filters_path.display(),
            "No filters configured, posts will only be watched"
        );
    }
    info!(
        domain = %config.domain,
        filters = filters.len(),
        default_webhook = config.default_webhook_url.is_some(),
        "Configuration loaded"
    );

    let client = DiscussionsClient::new(&config).context("Failed to create discussions client")?;
    client
        .init()
        .await
        .context("Failed to initialize discussions client")?;

    let (errors, failures) = ErrorSink::channel();
    let failure_logger = tokio::spawn(automod::log_failures(failures));

    let automod = Automod::new(&config, Arc::new(client), filters, errors)
        .context("Failed to create automod")?;

    automod::poll_loop(&automod, config.filter_interval, shutdown_signal()).await;

    info!("Shutting down...");

    let drained = automod.drain(SHUTDOWN_GRACE).await;
    drop(automod);
    if drained {
        // All error sinks are gone now, so the logger finishes once it has
        // flushed the remaining failures.
        let _ = failure_logger.await;
    } else {
        warn!("Some moderation actions were still running at shutdown");
    }

    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,discussions_automod=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
