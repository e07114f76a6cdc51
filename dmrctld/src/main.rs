mod systemd;

use anyhow::Result;
use clap::Parser;
use dmrctl_core::{run_server, settings::Settings, ReadyCallback};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dmrctld", about = "Local HTTP control API for the DMR engine")]
struct Args {
    /// Путь к YAML-файлу настроек (необязательно)
    #[arg(short, long)]
    settings: Option<String>,

    /// Адрес API, например 127.0.0.1:8080
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Путь к INI-файлу конфигурации движка
    #[arg(long)]
    config_path: Option<PathBuf>,

    /// Подстрока командной строки процесса движка
    #[arg(long)]
    engine_pattern: Option<String>,

    /// Перезапускать движок после изменения конфигурации
    #[arg(long)]
    restart_on_change: bool,
}

impl Args {
    /// Настройки из файла (или по умолчанию) с учётом флагов командной строки.
    fn into_settings(self) -> Result<Settings> {
        let mut settings = match &self.settings {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        if let Some(addr) = self.listen {
            settings.listen_addr = addr;
        }
        if let Some(path) = self.config_path {
            settings.config_path = path;
        }
        if let Some(pattern) = self.engine_pattern {
            settings.engine_pattern = pattern;
        }
        if self.restart_on_change {
            settings.restart.enabled = true;
        }

        settings.validate()?;
        Ok(settings)
    }
}

/// Уровень логирования, если `RUST_LOG` не задан или не разбирается.
const DEFAULT_LOG_FILTER: &str = "info";

/// Фильтр логов из значения `RUST_LOG`.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let settings = args.into_settings()?;

    tracing::info!(
        "Starting dmrctld (restart_on_change = {})",
        settings.restart.enabled
    );

    // Создаём канал для graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        tracing::info!("Received SIGINT, initiating graceful shutdown");
        let _ = shutdown_tx.send(());
    });

    let on_ready: ReadyCallback = Box::new(|addr| {
        if let Err(e) = systemd::notify_ready() {
            tracing::debug!("systemd notify skipped: {:#}", e);
        }
        systemd::notify_status(&format!("Serving DMR control API on http://{addr}"));
    });

    run_server(settings, Some(on_ready), shutdown_rx).await
}
