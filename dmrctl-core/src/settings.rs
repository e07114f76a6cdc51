use anyhow::{ensure, Context, Result};
use axum::http::HeaderValue;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::probe::DEFAULT_ENGINE_PATTERN;
use crate::restart::DEFAULT_ENGINE_UNIT;
use crate::store::DEFAULT_CONFIG_PATH;

/// Настройки HTTP-сервиса управления.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Адрес, на котором слушает API.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Путь к INI-файлу конфигурации движка.
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,
    /// Подстрока командной строки процесса движка.
    #[serde(default = "default_engine_pattern")]
    pub engine_pattern: String,
    /// Значение `Access-Control-Allow-Origin` для ответа на обновление конфигурации.
    #[serde(default = "default_cors_allow_origin")]
    pub cors_allow_origin: String,

    #[serde(default)]
    pub restart: RestartSettings,
}

/// Перезапуск движка после изменения конфигурации.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RestartSettings {
    /// Выключено по умолчанию.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_restart_unit")]
    pub unit: String,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

fn default_engine_pattern() -> String {
    DEFAULT_ENGINE_PATTERN.to_string()
}

fn default_cors_allow_origin() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_restart_unit() -> String {
    DEFAULT_ENGINE_UNIT.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            config_path: default_config_path(),
            engine_pattern: default_engine_pattern(),
            cors_allow_origin: default_cors_allow_origin(),
            restart: RestartSettings::default(),
        }
    }
}

impl Default for RestartSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            unit: default_restart_unit(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {path}"))?;
        let settings: Settings = serde_yaml::from_str(&data)
            .with_context(|| format!("failed to parse YAML settings at {path}"))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.config_path.as_os_str().is_empty(),
            "config_path must not be empty"
        );
        ensure!(
            !self.engine_pattern.trim().is_empty(),
            "engine_pattern must not be empty"
        );
        ensure!(
            self.cors_allow_origin.starts_with("http://")
                || self.cors_allow_origin.starts_with("https://"),
            "cors_allow_origin must start with http:// or https:// (got {:?})",
            self.cors_allow_origin
        );
        ensure!(
            HeaderValue::from_str(&self.cors_allow_origin).is_ok(),
            "cors_allow_origin must be a valid header value (got {:?})",
            self.cors_allow_origin
        );

        self.restart.validate()?;

        Ok(())
    }
}

impl RestartSettings {
    fn validate(&self) -> Result<()> {
        ensure!(
            !self.unit.trim().is_empty(),
            "restart.unit must not be empty"
        );
        Ok(())
    }
}
