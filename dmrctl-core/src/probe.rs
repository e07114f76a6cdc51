//! Проверка, запущен ли внешний процесс движка.
//!
//! Проверка выполняется по подстроке командной строки процесса, как
//! `pgrep -f`. Любая ошибка при обходе таблицы процессов трактуется как
//! «процесс не найден».

use procfs::process::all_processes;
use procfs::ProcResult;
use tracing::debug;

/// Подстрока командной строки движка по умолчанию.
pub const DEFAULT_ENGINE_PATTERN: &str = "mmdvm";

/// Способность ответить на вопрос «жив ли процесс, соответствующий шаблону».
pub trait ProcessProbe: Send + Sync {
    fn is_running(&self, pattern: &str) -> bool;
}

/// Проверка через `/proc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcfsProbe;

impl ProcessProbe for ProcfsProbe {
    fn is_running(&self, pattern: &str) -> bool {
        match find_matching_pid(pattern) {
            Ok(Some(pid)) => {
                debug!(pid = pid, pattern = pattern, "Engine process found");
                true
            }
            Ok(None) => {
                debug!(pattern = pattern, "No engine process found");
                false
            }
            Err(e) => {
                debug!(
                    pattern = pattern,
                    error = %e,
                    "Failed to scan process table, treating engine as stopped"
                );
                false
            }
        }
    }
}

/// Проверка с фиксированным ответом.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticProbe {
    pub running: bool,
}

impl StaticProbe {
    pub fn new(running: bool) -> Self {
        Self { running }
    }
}

impl ProcessProbe for StaticProbe {
    fn is_running(&self, _pattern: &str) -> bool {
        self.running
    }
}

/// Ищет первый процесс (кроме текущего), командная строка которого
/// содержит `pattern`.
fn find_matching_pid(pattern: &str) -> ProcResult<Option<i32>> {
    let self_pid = std::process::id() as i32;

    for proc in all_processes()? {
        // процесс мог завершиться во время обхода
        let Ok(proc) = proc else { continue };
        if proc.pid == self_pid {
            continue;
        }
        let Ok(args) = proc.cmdline() else { continue };
        if cmdline_matches(&args, pattern) {
            return Ok(Some(proc.pid));
        }
    }

    Ok(None)
}

/// Склеивает аргументы через пробел и ищет в них подстроку.
pub fn cmdline_matches(args: &[String], pattern: &str) -> bool {
    !args.is_empty() && args.join(" ").contains(pattern)
}
