//! Модель конфигурации DMR-движка.
//!
//! `EngineConfig` создаётся заново на каждый запрос: из INI-файла при чтении
//! или из JSON-тела при обновлении. Поле `services` никогда не сохраняется,
//! оно вычисляется при чтении статуса.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Имя сервиса DMR-движка в карте `services`.
pub const DMR_SERVICE: &str = "dmr";
pub const SERVICE_STOPPED: &str = "stopped";
pub const SERVICE_RUNNING: &str = "running";

pub const DEFAULT_CALLSIGN: &str = "N0CALL";
pub const DEFAULT_DMR_ID: i64 = 1_234_567;
pub const DEFAULT_FREQUENCY_MHZ: f64 = 438.800;
/// Таймслот для холодного старта (файла нет или он не читается).
pub const DEFAULT_TIMESLOT: i64 = 2;
pub const DEFAULT_COLOR_CODE: i64 = 1;

/// Конфигурация и статус DMR-движка.
///
/// JSON-представление использует имя `dmr_id` для идентификатора,
/// как и ключ в секции `[dmr]` INI-файла.
///
/// Значения полей не проверяются. Отсутствующее поле или `null` во входящем
/// JSON дают нулевое значение; ошибкой считается только неверный синтаксис
/// или тип.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Позывной (свободный текст).
    #[serde(default, deserialize_with = "null_as_zero")]
    pub callsign: String,
    /// DMR ID станции.
    #[serde(rename = "dmr_id", default, deserialize_with = "null_as_zero")]
    pub id: i64,
    /// Частота в МГц.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub frequency: f64,
    /// Таймслот, осмысленные значения 1 и 2.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub timeslot: i64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub color_code: i64,
    /// Состояние сервисов. Во входящих запросах игнорируется.
    #[serde(default = "default_services", deserialize_with = "null_as_default_services")]
    pub services: BTreeMap<String, String>,
}

fn null_as_zero<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_default_services<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_services))
}

/// Карта сервисов по умолчанию: `{dmr: stopped}`.
pub fn default_services() -> BTreeMap<String, String> {
    BTreeMap::from([(DMR_SERVICE.to_string(), SERVICE_STOPPED.to_string())])
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            callsign: DEFAULT_CALLSIGN.to_string(),
            id: DEFAULT_DMR_ID,
            frequency: DEFAULT_FREQUENCY_MHZ,
            timeslot: DEFAULT_TIMESLOT,
            color_code: DEFAULT_COLOR_CODE,
            services: default_services(),
        }
    }
}

impl EngineConfig {
    /// Устанавливает состояние сервиса `name`.
    pub fn set_service_state(&mut self, name: &str, state: &str) {
        self.services.insert(name.to_string(), state.to_string());
    }

    /// Текущее состояние DMR-сервиса (`stopped`, если ключ отсутствует).
    pub fn dmr_state(&self) -> &str {
        self.services
            .get(DMR_SERVICE)
            .map(String::as_str)
            .unwrap_or(SERVICE_STOPPED)
    }
}

impl fmt::Display for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "callsign={} dmr_id={} frequency={:.3} timeslot={} color_code={}",
            self.callsign, self.id, self.frequency, self.timeslot, self.color_code
        )
    }
}
