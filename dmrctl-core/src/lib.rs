pub mod api;
pub mod engine;
pub mod probe;
pub mod restart;
pub mod settings;
pub mod store;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::api::{ApiServer, ApiStateBuilder};
use crate::probe::ProcfsProbe;
use crate::restart::CommandRestarter;
use crate::settings::Settings;
use crate::store::ConfigStore;

/// Callback функция для уведомления о готовности сервиса (например, для systemd notify).
/// Получает фактический адрес, на котором слушает API.
pub type ReadyCallback = Box<dyn Fn(SocketAddr) + Send + Sync>;

/// Собирает состояние API из настроек.
///
/// Перезапуск движка подключается только при `restart.enabled`.
pub fn build_api_state(settings: &Settings) -> Result<api::ApiState> {
    let mut builder = ApiStateBuilder::new(ConfigStore::new(settings.config_path.clone()))
        .probe(Arc::new(ProcfsProbe))
        .engine_pattern(settings.engine_pattern.clone())
        .cors_allow_origin(&settings.cors_allow_origin)?;

    if settings.restart.enabled {
        builder = builder.restarter(Arc::new(CommandRestarter::systemctl(
            &settings.restart.unit,
        )));
    }

    Ok(builder.build())
}

/// Запускает API и работает до сигнала `shutdown`.
///
/// # Параметры
///
/// - `settings`: проверенные настройки сервиса
/// - `on_ready`: вызывается после того, как адрес занят
/// - `shutdown`: канал, изменение которого останавливает сервер
pub async fn run_server(
    settings: Settings,
    on_ready: Option<ReadyCallback>,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    let state = build_api_state(&settings)?;

    info!(
        config_path = %settings.config_path.display(),
        engine_pattern = %settings.engine_pattern,
        restart_enabled = settings.restart.enabled,
        "Starting DMR control API"
    );

    let handle = ApiServer::new(settings.listen_addr, state).start().await?;

    if let Some(callback) = on_ready {
        callback(handle.local_addr());
    }

    // ошибка означает, что отправитель закрыт: это тоже сигнал остановки
    let _ = shutdown.changed().await;

    info!("Shutting down DMR control API");
    handle.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn build_api_state_keeps_restart_disabled_by_default() {
        let state = build_api_state(&Settings::default()).expect("state");
        assert!(!state.restart_enabled());
    }

    #[test]
    fn build_api_state_enables_restart_when_configured() {
        let mut settings = Settings::default();
        settings.restart.enabled = true;
        let state = build_api_state(&settings).expect("state");
        assert!(state.restart_enabled());
    }

    #[tokio::test]
    async fn run_server_reports_ready_and_stops_on_shutdown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = Settings {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            config_path: dir.path().join("config.ini"),
            ..Settings::default()
        };

        let ready_addr = Arc::new(Mutex::new(None));
        let ready_clone = ready_addr.clone();
        let on_ready: ReadyCallback = Box::new(move |addr| {
            *ready_clone.lock().unwrap() = Some(addr);
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let server = tokio::spawn(run_server(settings, Some(on_ready), shutdown_rx));

        for _ in 0..100 {
            if ready_addr.lock().unwrap().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let addr = ready_addr.lock().unwrap().expect("server ready");
        assert_ne!(addr.port(), 0);

        shutdown_tx.send(()).unwrap();
        server.await.unwrap().expect("clean shutdown");
    }
}
