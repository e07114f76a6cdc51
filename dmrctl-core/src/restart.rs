//! Перезапуск внешнего движка.
//!
//! Способность выключена по умолчанию и включается только явно через
//! настройки `restart.enabled`.

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

/// Systemd unit движка по умолчанию.
pub const DEFAULT_ENGINE_UNIT: &str = "mmdvm.service";

#[async_trait]
pub trait EngineRestarter: Send + Sync {
    async fn restart(&self) -> Result<()>;
}

/// Перезапуск внешней командой, по умолчанию `systemctl restart <unit>`.
#[derive(Debug, Clone)]
pub struct CommandRestarter {
    program: String,
    args: Vec<String>,
}

impl CommandRestarter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn systemctl(unit: &str) -> Self {
        Self::new("systemctl", vec!["restart".to_string(), unit.to_string()])
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl EngineRestarter for CommandRestarter {
    async fn restart(&self) -> Result<()> {
        let command_line = self.command_line();
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .await
            .with_context(|| format!("failed to run `{command_line}`"))?;

        ensure!(status.success(), "`{command_line}` exited with {status}");

        info!(command = %command_line, "Engine restart command completed");
        Ok(())
    }
}
