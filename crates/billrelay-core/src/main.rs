//! BillRelay CLI
//!
//! Command-line interface for the BillRelay balance notification service.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use billrelay::alerting::{maintenance, NotificationChecker, TelegramNotifier};
use billrelay::api::{AppState, HttpServer};
use billrelay::billing::BillingClient;
use billrelay::bot::{telegram, Assistant};
use billrelay::config::{Config, LogFormat, LoggingConfig};
use billrelay::models::{actions, format_amount, LogLevel};
use billrelay::store::{open_store, Repository};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use teloxide::Bot;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// BillRelay - balance notifications over Telegram
#[derive(Parser)]
#[command(name = "billrelay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "BILLRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot, the notification checker, daily jobs and the HTTP API
    Serve,

    /// Run one notification check and exit
    Check,

    /// List active notifications
    Notifications {
        /// Only notifications of this chat
        #[arg(long)]
        chat_id: Option<i64>,
    },

    /// Manage the log sheet
    Logs {
        #[command(subcommand)]
        command: LogsCommands,
    },

    /// Check that the store answers
    Health,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum LogsCommands {
    /// Remove log rows older than the retention period
    Cleanup {
        /// Retention in days (defaults to maintenance.log_retention_days)
        #[arg(long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        generate_completions(shell);
        return ExitCode::SUCCESS;
    }

    // Load configuration
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let _guard = match init_tracing(&config.logging, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Serve => run_serve(config).await,
        Commands::Check => run_check(config, cli.format).await,
        Commands::Notifications { chat_id } => {
            run_notifications(config, chat_id, cli.format).await
        }
        Commands::Logs { command } => run_logs(config, command).await,
        Commands::Health => run_health(config, cli.format).await,
        Commands::Completions { .. } => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    let config = Config::load(path)?;
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &LoggingConfig, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log filter: {level}"))?;

    let (pretty, json) = match config.format {
        LogFormat::Pretty => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    let (file, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().json().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .with(file)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

async fn open_repository(config: &Config) -> anyhow::Result<Arc<Repository>> {
    let store = open_store(&config.storage)
        .await
        .context("failed to open the row store")?;
    info!(backend = store.backend_name(), "Row store opened");

    Ok(Arc::new(Repository::new(
        store,
        config.storage.timezone()?,
        config.notifications.default_utc_offset_hours,
        config.storage.cache_ttl,
    )))
}

fn install_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    }
}

async fn run_serve(config: Config) -> anyhow::Result<()> {
    config.validate_telegram()?;

    let metrics = install_metrics();
    let repo = open_repository(&config).await?;
    let billing = Arc::new(BillingClient::new(&config.billing)?);
    let bot = Bot::new(config.telegram.token.clone());

    let checker = Arc::new(NotificationChecker::new(
        Arc::clone(&repo),
        Arc::new(TelegramNotifier::new(bot.clone())),
        config.notifications.check_interval,
    ));
    let assistant = Arc::new(Assistant::new(
        Arc::clone(&repo),
        billing,
        config.notifications.time_options.clone(),
    ));

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn({
        let checker = Arc::clone(&checker);
        let cancel = cancel.clone();
        async move { checker.run(cancel).await }
    }));
    tasks.extend(maintenance::spawn_all(&repo, &config.maintenance, &cancel));

    if config.server.enabled {
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let server = HttpServer::new(AppState {
            repo: Arc::clone(&repo),
            checker: Arc::clone(&checker),
            metrics,
        });
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.serve(&addr, cancel).await {
                error!(error = %e, "HTTP server failed");
            }
        }));
    }

    tasks.push(spawn_signal_handler(cancel.clone())?);
    info!(version = env!("CARGO_PKG_VERSION"), "BillRelay started");

    telegram::run_bot(bot, assistant, cancel.clone()).await;

    info!("Shutting down");
    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    Ok(())
}

/// Cancel `cancel` on SIGINT or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) -> anyhow::Result<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt()).context("failed to listen for SIGINT")?;
    let mut sigterm = signal(SignalKind::terminate()).context("failed to listen for SIGTERM")?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
            () = cancel.cancelled() => return,
        }
        cancel.cancel();
    }))
}

async fn run_check(config: Config, format: OutputFormat) -> anyhow::Result<()> {
    config.validate_telegram()?;

    let repo = open_repository(&config).await?;
    let notifier = Arc::new(TelegramNotifier::new(Bot::new(config.telegram.token.clone())));
    let checker = NotificationChecker::new(repo, notifier, config.notifications.check_interval);

    let summary = checker.check_all().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            println!("Notification check");
            println!("  evaluated: {}", summary.evaluated);
            println!("  not due:   {}", summary.not_due);
            println!("  alerted:   {}", summary.alerted);
            println!("  failed:    {}", summary.failed);
            println!("  skipped:   {}", summary.skipped);
        }
    }
    Ok(())
}

async fn run_notifications(
    config: Config,
    chat_id: Option<i64>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let repo = open_repository(&config).await?;
    let notifications = match chat_id {
        Some(chat_id) => repo.user_notifications(chat_id).await?,
        None => repo.active_notifications().await?,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&notifications)?),
        OutputFormat::Text => {
            if notifications.is_empty() {
                println!("No active notifications");
                return Ok(());
            }
            println!(
                "{:>5}  {:>12}  {:<20}  {:>10}  {:<6}  {:<4}",
                "ID", "CHAT", "ACCOUNT", "THRESHOLD", "TIME", "SENT"
            );
            for n in &notifications {
                println!(
                    "{:>5}  {:>12}  {:<20}  {:>10}  {:<6}  {:<4}",
                    n.id,
                    n.chat_id,
                    n.account_login,
                    format_amount(n.threshold),
                    n.check_time.map_or_else(|| "any".to_string(), |t| t.to_string()),
                    if n.sent { "yes" } else { "no" },
                );
            }
        }
    }
    Ok(())
}

async fn run_logs(config: Config, command: LogsCommands) -> anyhow::Result<()> {
    match command {
        LogsCommands::Cleanup { days } => {
            let days = days.unwrap_or(config.maintenance.log_retention_days);
            let repo = open_repository(&config).await?;
            let removed = repo.cleanup_logs(days).await?;
            repo.add_log(
                LogLevel::Info,
                actions::LOG_CLEANUP,
                format!("Removed {removed} rows older than {days} days"),
            )
            .await?;
            println!("Removed {removed} log row(s) older than {days} day(s)");
        }
    }
    Ok(())
}

async fn run_health(config: Config, format: OutputFormat) -> anyhow::Result<()> {
    let repo = open_repository(&config).await?;
    let backend = repo.store().backend_name();
    let result = repo.ping().await;

    match format {
        OutputFormat::Json => {
            let body = serde_json::json!({
                "status": if result.is_ok() { "ok" } else { "degraded" },
                "version": env!("CARGO_PKG_VERSION"),
                "store": backend,
                "error": result.as_ref().err().map(ToString::to_string),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => {
            println!("BillRelay {}", env!("CARGO_PKG_VERSION"));
            match &result {
                Ok(()) => println!("Store ({backend}): ok"),
                Err(e) => println!("Store ({backend}): {e}"),
            }
        }
    }

    result.context("store health check failed")
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "billrelay", &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sigterm_cancels_token() {
        let cancel = CancellationToken::new();
        let handler = spawn_signal_handler(cancel.clone()).unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
            .await
            .unwrap();
        handler.await.unwrap();
    }

    #[tokio::test]
    async fn test_signal_handler_ends_with_token() {
        let cancel = CancellationToken::new();
        let handler = spawn_signal_handler(cancel.clone()).unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handler)
            .await
            .unwrap()
            .unwrap();
    }
}
