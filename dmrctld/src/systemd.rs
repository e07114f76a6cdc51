//! Интеграция с systemd через sd-notify.
//!
//! - READY=1 - после того, как API занял адрес
//! - STATUS=... - строка статуса для `systemctl status dmrctld`
//!
//! Вне systemd уведомления не доставляются, и это не ошибка для сервиса.

use anyhow::{Context, Result};
use libsystemd::daemon::NotifyState;

/// Максимальная длина строки статуса.
const MAX_STATUS_LEN: usize = 200;

/// Отправляет systemd уведомление READY=1.
pub fn notify_ready() -> Result<()> {
    libsystemd::daemon::notify(false, &[NotifyState::Ready])
        .context("Failed to send READY notification to systemd")?;
    Ok(())
}

/// Отправляет systemd уведомление STATUS=..., ошибки игнорируются.
pub fn notify_status(status: &str) {
    let state = NotifyState::Status(truncate_status(status).to_string());
    let _ = libsystemd::daemon::notify(false, &[state]);
}

/// Обрезает статус по границе символа.
fn truncate_status(status: &str) -> &str {
    if status.len() <= MAX_STATUS_LEN {
        return status;
    }
    let mut end = MAX_STATUS_LEN;
    while !status.is_char_boundary(end) {
        end -= 1;
    }
    &status[..end]
}
