//! HTTP API управления DMR-движком.
//!
//! Модуль предоставляет REST API для чтения статуса движка, обновления,
//! сброса и резервного копирования его конфигурации.

mod error;
mod server;

pub use error::ApiError;
pub use server::{ApiServer, ApiServerHandle, ApiState, ApiStateBuilder};
