//! Хранилище конфигурации движка в INI-файле.
//!
//! Чтение никогда не завершается ошибкой: если файл отсутствует или не
//! разбирается, возвращается запись по умолчанию целиком. Файл, который не
//! является корректным UTF-8, считается неразбираемым. Если файл
//! корректен, но в секции `[dmr]` не хватает ключей, значения по умолчанию
//! подставляются для каждого ключа отдельно. Таймслот по умолчанию в этих
//! двух случаях разный (2 и 1), и это поведение сохранено намеренно.
//!
//! Запись сохраняет посторонние секции и ключи файла, но не комментарии,
//! пустые строки и исходный порядок оформления: документ сериализуется
//! заново из разобранных секций. Новый файл сначала
//! пишется рядом во временный файл и затем переименовывается поверх
//! старого; записи внутри процесса сериализуются мьютексом. Между разными
//! процессами по-прежнему побеждает последний писатель.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use ini::Ini;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::{
    default_services, EngineConfig, DEFAULT_CALLSIGN, DEFAULT_COLOR_CODE, DEFAULT_DMR_ID,
    DEFAULT_FREQUENCY_MHZ,
};

/// Путь к файлу конфигурации по умолчанию (относительно рабочего каталога).
pub const DEFAULT_CONFIG_PATH: &str = "config.ini";

/// Секция INI-файла с параметрами движка.
pub const DMR_SECTION: &str = "dmr";

const KEY_CALLSIGN: &str = "callsign";
const KEY_DMR_ID: &str = "dmr_id";
const KEY_FREQUENCY: &str = "frequency";
const KEY_TIMESLOT: &str = "timeslot";
const KEY_COLOR_CODE: &str = "color_code";

/// Таймслот, если файл прочитан, но ключа `timeslot` в нём нет.
const SECTION_DEFAULT_TIMESLOT: i64 = 1;

/// Ошибки записи конфигурации.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize configuration for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write configuration to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to replace {path} with {tmp_path}: {source}")]
    Replace {
        path: PathBuf,
        tmp_path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Файловое хранилище `EngineConfig`.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Путь к INI-файлу.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Читает конфигурацию, подставляя значения по умолчанию.
    ///
    /// `services` всегда равно `{dmr: stopped}`: состояние движка
    /// определяется только при формировании статуса.
    pub fn load(&self) -> EngineConfig {
        match self.read_document() {
            Ok(doc) => engine_config_from_document(&doc),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %format!("{e:#}"),
                    "Failed to load engine config, using defaults"
                );
                EngineConfig::default()
            }
        }
    }

    /// Сохраняет пять скалярных полей в секцию `[dmr]`.
    ///
    /// Если текущий файл не читается, запись начинается с пустого документа.
    pub fn save(&self, cfg: &EngineConfig) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut doc = match self.read_document() {
            Ok(doc) => doc,
            Err(e) => {
                debug!(
                    path = %self.path.display(),
                    error = %format!("{e:#}"),
                    "Existing engine config not readable, starting from an empty document"
                );
                Ini::new()
            }
        };

        write_engine_section(&mut doc, cfg);

        let mut contents = Vec::new();
        doc.write_to(&mut contents)
            .map_err(|source| StoreError::Serialize {
                path: self.path.clone(),
                source,
            })?;
        self.replace_file(&contents)?;

        info!(path = %self.path.display(), config = %cfg, "DMR configuration saved");
        Ok(())
    }

    fn read_document(&self) -> Result<Ini> {
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read engine config from {}", self.path.display()))?;
        Ini::load_from_str(&data)
            .with_context(|| format!("failed to parse INI config at {}", self.path.display()))
    }

    fn replace_file(&self, contents: &[u8]) -> Result<(), StoreError> {
        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, contents).map_err(|source| StoreError::Write {
            path: tmp_path.clone(),
            source,
        })?;

        if let Err(source) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::Replace {
                path: self.path.clone(),
                tmp_path,
                source,
            });
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_PATH)
    }
}

/// Строит `EngineConfig` из разобранного INI-документа.
///
/// Отсутствующий или неразбираемый ключ заменяется значением по умолчанию.
pub fn engine_config_from_document(doc: &Ini) -> EngineConfig {
    let section = doc.section(Some(DMR_SECTION));
    let get = |key: &str| section.and_then(|props| props.get(key));

    EngineConfig {
        callsign: get(KEY_CALLSIGN)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_CALLSIGN)
            .to_string(),
        id: parse_or(get(KEY_DMR_ID), DEFAULT_DMR_ID),
        frequency: parse_or(get(KEY_FREQUENCY), DEFAULT_FREQUENCY_MHZ),
        timeslot: parse_or(get(KEY_TIMESLOT), SECTION_DEFAULT_TIMESLOT),
        color_code: parse_or(get(KEY_COLOR_CODE), DEFAULT_COLOR_CODE),
        services: default_services(),
    }
}

/// Записывает поля `cfg` в секцию `[dmr]`, не трогая остальные ключи.
pub fn write_engine_section(doc: &mut Ini, cfg: &EngineConfig) {
    doc.with_section(Some(DMR_SECTION))
        .set(KEY_CALLSIGN, cfg.callsign.as_str())
        .set(KEY_DMR_ID, cfg.id.to_string())
        .set(KEY_FREQUENCY, format!("{:.3}", cfg.frequency))
        .set(KEY_TIMESLOT, cfg.timeslot.to_string())
        .set(KEY_COLOR_CODE, cfg.color_code.to_string());
}

fn parse_or<T: FromStr>(raw: Option<&str>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
