//! HTTP сервер для Control API.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Json},
    routing::{any, get, post},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::api::ApiError;
use crate::engine::{EngineConfig, DMR_SERVICE, SERVICE_RUNNING};
use crate::probe::{ProcessProbe, ProcfsProbe, DEFAULT_ENGINE_PATTERN};
use crate::restart::EngineRestarter;
use crate::store::ConfigStore;

/// Состояние API сервера.
#[derive(Clone)]
pub struct ApiState {
    store: Arc<ConfigStore>,
    probe: Arc<dyn ProcessProbe>,
    engine_pattern: Arc<str>,
    /// `None`, если перезапуск движка выключен.
    restarter: Option<Arc<dyn EngineRestarter>>,
    cors_allow_origin: HeaderValue,
}

impl ApiState {
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn restart_enabled(&self) -> bool {
        self.restarter.is_some()
    }
}

/// Построитель `ApiState`.
///
/// По умолчанию процесс движка ищется через `/proc` по шаблону `mmdvm`,
/// перезапуск выключен.
pub struct ApiStateBuilder {
    store: Arc<ConfigStore>,
    probe: Arc<dyn ProcessProbe>,
    engine_pattern: String,
    restarter: Option<Arc<dyn EngineRestarter>>,
    cors_allow_origin: HeaderValue,
}

impl ApiStateBuilder {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store: Arc::new(store),
            probe: Arc::new(ProcfsProbe),
            engine_pattern: DEFAULT_ENGINE_PATTERN.to_string(),
            restarter: None,
            cors_allow_origin: HeaderValue::from_static("http://127.0.0.1:8080"),
        }
    }

    pub fn probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn engine_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.engine_pattern = pattern.into();
        self
    }

    /// Включает перезапуск движка.
    pub fn restarter(mut self, restarter: Arc<dyn EngineRestarter>) -> Self {
        self.restarter = Some(restarter);
        self
    }

    pub fn cors_allow_origin(mut self, origin: &str) -> Result<Self> {
        self.cors_allow_origin = HeaderValue::from_str(origin)
            .with_context(|| format!("invalid CORS origin {origin:?}"))?;
        Ok(self)
    }

    pub fn build(self) -> ApiState {
        ApiState {
            store: self.store,
            probe: self.probe,
            engine_pattern: Arc::from(self.engine_pattern),
            restarter: self.restarter,
            cors_allow_origin: self.cors_allow_origin,
        }
    }
}

/// Обработчик для endpoint `/health`.
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "dmrctl-api"
    }))
}

/// Создаёт роутер для API.
fn create_router(state: ApiState) -> Router {
    let config_cors = CorsLayer::new()
        .allow_origin(state.cors_allow_origin.clone())
        .allow_methods([Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/config", post(config_handler).layer(config_cors))
        .route("/api/reset", post(reset_handler))
        .route("/api/backup", any(backup_handler))
        .route("/api/restart", post(restart_handler))
        .with_state(state)
}

/// Выполняет блокирующую работу (файл, `/proc`) вне async-потоков.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("Blocking API task failed: {}", e);
        ApiError::Internal("Internal server error")
    })
}

/// Обработчик для endpoint `/api/status`.
///
/// Читает конфигурацию и дополняет её состоянием процесса движка.
async fn status_handler(State(state): State<ApiState>) -> Result<Json<EngineConfig>, ApiError> {
    let store = state.store.clone();
    let probe = state.probe.clone();
    let pattern = state.engine_pattern.clone();

    let status = run_blocking(move || {
        let mut status = store.load();
        if probe.is_running(&pattern) {
            status.set_service_state(DMR_SERVICE, SERVICE_RUNNING);
        }
        status
    })
    .await?;

    info!(config = %status, dmr = status.dmr_state(), "DMR status requested");
    Ok(Json(status))
}

/// Обработчик для endpoint `/api/config`.
///
/// Тело проверяется только на корректность JSON и типы полей; отсутствующие
/// поля и `null` становятся нулями, `services` игнорируется.
async fn config_handler(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let cfg: EngineConfig = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Rejected config update with malformed body");
        ApiError::BadRequest("Invalid JSON")
    })?;

    let store = state.store.clone();
    let to_save = cfg.clone();
    run_blocking(move || store.save(&to_save))
        .await?
        .map_err(|e| {
            error!(error = %e, config = %cfg, "Failed to save DMR configuration");
            ApiError::Internal("Failed to save config")
        })?;

    let restarted = match &state.restarter {
        Some(restarter) => match restarter.restart().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Engine restart after config update failed");
                false
            }
        },
        None => false,
    };

    info!(config = %cfg, restarted = restarted, "DMR configuration updated");

    Ok((
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(json!({ "result": "ok" })),
    ))
}

/// Обработчик для endpoint `/api/reset`.
///
/// Тело запроса игнорируется.
async fn reset_handler(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let defaults = EngineConfig::default();

    let store = state.store.clone();
    let to_save = defaults.clone();
    run_blocking(move || store.save(&to_save))
        .await?
        .map_err(|e| {
            error!(error = %e, "Failed to reset DMR configuration");
            ApiError::Internal("Failed to reset config")
        })?;

    info!(config = %defaults, "DMR configuration reset to defaults");
    Ok(Json(json!({ "result": "config reset to defaults" })))
}

/// Обработчик для endpoint `/api/backup`.
///
/// Отдаёт файл конфигурации как есть, в виде вложения.
async fn backup_handler(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let path = state.store.path();

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        warn!(path = %path.display(), error = %e, "DMR configuration backup failed");
        ApiError::from_file_error(&e)
    })?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("config.ini");
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    info!(path = %path.display(), size = bytes.len(), "DMR configuration backup requested");

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// Обработчик для endpoint `/api/restart`.
async fn restart_handler(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let Some(restarter) = state.restarter.clone() else {
        info!("DMR engine restart requested, but restart is disabled");
        return Err(ApiError::Unavailable("Engine restart is disabled"));
    };

    restarter.restart().await.map_err(|e| {
        error!(error = %format!("{e:#}"), "Failed to restart DMR engine");
        ApiError::Internal("Failed to restart engine")
    })?;

    info!("DMR engine restarted");
    Ok(Json(json!({ "result": "engine restarted" })))
}

/// HTTP API сервер управления движком.
///
/// Сервер запускается в отдельной задаче и может быть остановлен через handle.
///
/// # Примеры использования
///
/// ```no_run
/// use dmrctl_core::api::{ApiServer, ApiStateBuilder};
/// use dmrctl_core::store::ConfigStore;
/// use std::net::SocketAddr;
///
/// # async fn example() -> anyhow::Result<()> {
/// let addr: SocketAddr = "127.0.0.1:8080".parse()?;
/// let state = ApiStateBuilder::new(ConfigStore::new("config.ini")).build();
/// let handle = ApiServer::new(addr, state).start().await?;
///
/// // Сервер работает в фоне
/// // ...
///
/// handle.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct ApiServer {
    /// Адрес для прослушивания
    addr: SocketAddr,
    state: ApiState,
}

impl ApiServer {
    pub fn new(addr: SocketAddr, state: ApiState) -> Self {
        Self { addr, state }
    }

    /// Запускает API сервер в фоновой задаче.
    ///
    /// # Ошибки
    ///
    /// Возвращает ошибку, если не удалось занять адрес.
    pub async fn start(self) -> Result<ApiServerHandle> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("Failed to bind API server to {}", self.addr))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read API server local address")?;

        info!("Starting DMR API server on http://{}", local_addr);

        let router = create_router(self.state);
        let server = axum::serve(listener, router);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let graceful = server.with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            });

            if let Err(e) = graceful.await {
                error!("API server error: {}", e);
            } else {
                info!("API server stopped");
            }
        });

        Ok(ApiServerHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }
}

/// Handle для управления API сервером.
pub struct ApiServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl ApiServerHandle {
    /// Фактический адрес сервера (полезно при запуске на порту 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Останавливает API сервер.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            tx.send(()).map_err(|_| {
                anyhow::anyhow!("Failed to send shutdown signal to API server (receiver dropped)")
            })?;
        }
        Ok(())
    }
}
