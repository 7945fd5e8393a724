//! Healthwatch - HTTP endpoint monitoring with Telegram alerts.
//!
//! Periodically probes registered URLs, tracks up/down transitions and
//! certificate expiry, and reports them to a single Telegram chat.

mod config;
mod db;
mod monitor;
mod notify;
mod probe;
mod scheduler;
mod web;

#[cfg(test)]
mod testutil;

use config::{ConfigError, ServerConfig};
use db::Store;
use monitor::Monitor;
use notify::{Notifier, TelegramNotifier};
use probe::HttpProber;
use scheduler::Scheduler;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    let directive = if config::debug_from_env() {
        "healthwatch=debug"
    } else {
        "healthwatch=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load()?;
    cfg.validate()?;
    let chat_id = cfg
        .telegram_chat
        .ok_or(ConfigError::Missing("HEALTHWATCH_TELEGRAM_CHAT"))?;

    tracing::info!("Starting healthwatch on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let prober = Arc::new(HttpProber::new(cfg.http_timeout())?);
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(
        &cfg.telegram_api_url,
        &cfg.telegram_token,
        chat_id,
        cfg.telegram_proxy.as_deref(),
    )?);

    let monitor = Arc::new(Monitor::new(
        store.clone(),
        prober,
        notifier.clone(),
        cfg.ssl_expiry_alert_days,
    ));

    if let Err(e) = notifier.send("Server health check bot started").await {
        tracing::error!("Failed to send startup message: {}", e);
    }

    // Start scheduler
    let scheduler = Scheduler::new(monitor.clone(), cfg.check_interval(), cfg.alert_threshold);
    scheduler.start().await;

    // Serve until a termination signal arrives
    let server = Server::new(cfg.http_port, cfg.api_key.clone(), store, monitor);
    let served = server.start(shutdown_signal()).await;

    scheduler.stop().await;
    if let Err(e) = notifier.send("Server health check bot stopped").await {
        tracing::error!("Failed to send shutdown message: {}", e);
    }

    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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

    tracing::info!("Shutdown signal received");
}
