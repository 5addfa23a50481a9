// ABOUTME: Main entry point for the goob chat bot
// ABOUTME: Initializes logging, config, metrics, and the store, then runs the dispatcher and live poller

use anyhow::{Context, Result};
use clap::Parser;
use goob_core::config::Config;
use goob_core::paths;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Chat bot with durable history, duplicate-link detection, birthdays, and stream alerts
#[derive(Parser)]
#[command(name = "goob")]
#[command(author, version, about)]
struct Args {
    /// Config file (skips the default search order)
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides store.path)
    #[arg(long)]
    db: Option<PathBuf>,
}

/// Stdout plus a daily-rolling file under the data directory's logs/ folder.
/// The returned guard flushes the file writer on drop.
fn init_logging() -> Result<WorkerGuard> {
    let log_dir = paths::log_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "goob.log"));

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

fn install_metrics(listen: &str) -> Result<()> {
    let addr: std::net::SocketAddr = listen
        .parse()
        .with_context(|| format!("Invalid metrics listen address '{}'", listen))?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    tracing::info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let _log_guard = init_logging()?;

    tracing::info!("Starting goob");

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(db) = &args.db {
        config.store.path = Some(db.to_string_lossy().to_string());
    }

    tracing::info!(
        db = %config.store.db_path().display(),
        timezone = %config.timezone,
        birthdays = config.birthdays.len(),
        reply = config.reply_settings().is_some(),
        live_streams = config.live_settings().map(|l| l.streams.len()).unwrap_or(0),
        "Configuration loaded"
    );

    if let Some(listen) = &config.metrics.listen {
        install_metrics(listen)?;
    }

    let store = goob::app::open_store(&config)?;
    run(config, store).await
}

#[cfg(feature = "telegram")]
async fn run(config: Config, store: goob_core::Store) -> Result<()> {
    use goob::providers::TwitchClient;
    use goob::telegram::TelegramTransport;
    use goob_core::poller::LivePoller;
    use goob_core::{Dispatcher, HandlerContext, HandlerRegistry, InboundTransport, SendAdapter};
    use std::sync::Arc;

    let transport = Arc::new(TelegramTransport::new(&config.telegram).await?);
    let bot = transport.bot_user().await?;
    let outbound = SendAdapter::new(transport.clone(), store.clone());
    let ctx = HandlerContext::new(store, outbound.clone(), config.dupe.ignored_domains.clone()).with_bot(bot);

    let mut registry = HandlerRegistry::new();
    goob::register_all(&mut registry, &config, goob::app::completion_provider(&config)?)?;

    if let Some(live) = config.live_settings() {
        let provider = Arc::new(TwitchClient::from_settings(live)?);
        let poller = LivePoller::new(provider, outbound, live.streams.clone(), live.poll_interval());
        tokio::spawn(async move { poller.run().await });
    }

    let dispatcher = Dispatcher::new(registry, ctx);
    let events = transport.event_stream().await?;
    tracing::info!(platform = transport.platform_id(), "Bot ready");

    tokio::select! {
        _ = dispatcher.run(events) => {
            tracing::warn!("Event stream closed");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }
    Ok(())
}

#[cfg(not(feature = "telegram"))]
async fn run(_config: Config, _store: goob_core::Store) -> Result<()> {
    anyhow::bail!("goob was built without a chat transport; rebuild with `--features telegram`")
}
