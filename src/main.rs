use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nexus_alerting::alerting::engine::AlertEngine;
use nexus_alerting::alerting::sources::{FileRuleRepository, InMemoryRuleRepository, RuleRepository};
use nexus_alerting::notifications::senders::toast::ToastSender;
use nexus_alerting::notifications::service::NotificationService;
use nexus_alerting::server::config::ServerConfig;
use nexus_alerting::server::host_metrics::HostMetricsSource;
use nexus_alerting::server::log_stream::stdin_lines;
use nexus_alerting::version::VERSION;

const TOAST_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(author, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Path to the rules file; overrides `rules_file` from the configuration
    #[arg(short, long)]
    rules: Option<String>,
}

fn init_logging(log_dir: &str) -> WorkerGuard {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "alerting.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
        std::future::pending::<()>().await;
    }
}

/// Re-reads the rules file on SIGHUP. A bad file is logged and the
/// previous rules stay active.
#[cfg(unix)]
fn spawn_reload_on_hangup(repository: Arc<FileRuleRepository>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGHUP handler; rules reload disabled.");
            return;
        }
    };
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            info!(path = ?repository.path(), "SIGHUP received, reloading rules.");
            if let Err(e) = repository.reload().await {
                error!(error = %e, "Failed to reload rules; keeping the previous set.");
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_repository: Arc<FileRuleRepository>) {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Manually check for --version before full parsing to keep the output simple.
    if std::env::args().any(|arg| arg == "--version") {
        println!("Alerting version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    let config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return Err(e.into());
        }
    };

    let _log_guard = init_logging(&config.log_dir);
    info!("Starting alerting service, version: {}", VERSION);

    // --- Rules ---
    let repository: Arc<dyn RuleRepository> = match args.rules.or(config.rules_file.clone()) {
        Some(path) => {
            let file_repository = Arc::new(FileRuleRepository::load(&path)?);
            spawn_reload_on_hangup(file_repository.clone());
            file_repository
        }
        None => {
            warn!("No rules file configured; starting with an empty rule set.");
            Arc::new(InMemoryRuleRepository::default())
        }
    };

    // --- Notifications ---
    let toasts = ToastSender::new(TOAST_CAPACITY);
    let mut toast_rx = toasts.subscribe();
    tokio::spawn(async move {
        loop {
            match toast_rx.recv().await {
                Ok(toast) => info!(
                    alert_id = %toast.alert_id,
                    severity = %toast.severity,
                    title = %toast.title,
                    "Toast: {}",
                    toast.message
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Toast consumer lagged behind.");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    let notifications = Arc::new(NotificationService::from_config(&config.notifications, toasts)?);

    // --- Engine ---
    let engine = Arc::new(
        AlertEngine::new(repository, config.alert_retention).with_notifications(notifications),
    );

    engine
        .clone()
        .run(
            HostMetricsSource::new(),
            stdin_lines(),
            Duration::from_secs(config.metrics_interval_seconds),
            shutdown_signal(),
        )
        .await;

    let summary = engine.summary().await;
    info!(
        active = summary.active,
        acknowledged = summary.acknowledged,
        resolved = summary.resolved,
        "Alerting service stopped."
    );
    Ok(())
}
