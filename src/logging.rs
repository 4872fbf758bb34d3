//! File logging bootstrap.
//!
//! Events are written as `event=<name> key=value ...` lines so they can be
//! grepped without a parser.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::info;

const LOG_FILE_BASENAME: &str = "taskbook";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 2 * 1024 * 1024;
const MAX_LOG_FILES: usize = 3;

static LOGGING_STATE: OnceLock<LoggingState> = OnceLock::new();

struct LoggingState {
    level: &'static str,
    log_dir: PathBuf,
    _logger: LoggerHandle,
}

/// 初始化文件日志
///
/// 同一目录、同一级别重复调用是幂等的；换目录或换级别会被拒绝。
pub fn init_logging(level: &str, log_dir: &Path) -> Result<(), String> {
    let level = normalize_level(level)?;

    if let Some(state) = LOGGING_STATE.get() {
        return check_active(state, level, log_dir);
    }

    std::fs::create_dir_all(log_dir)
        .map_err(|err| format!("failed to create log directory `{}`: {err}", log_dir.display()))?;

    let logger = Logger::try_with_str(level)
        .map_err(|err| format!("invalid log level `{level}`: {err}"))?
        .log_to_file(
            FileSpec::default()
                .directory(log_dir)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::Direct)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    let state = LoggingState {
        level,
        log_dir: log_dir.to_path_buf(),
        _logger: logger,
    };
    if let Err(state) = LOGGING_STATE.set(state) {
        // 并发初始化：保留先到者
        return match LOGGING_STATE.get() {
            Some(active) => check_active(active, state.level, &state.log_dir),
            None => Ok(()),
        };
    }

    info!(
        "event=logging_init level={} log_dir={} version={}",
        level,
        log_dir.display(),
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}

fn check_active(state: &LoggingState, level: &str, log_dir: &Path) -> Result<(), String> {
    if state.log_dir != log_dir {
        return Err(format!(
            "logging already initialized at `{}`; refusing to switch to `{}`",
            state.log_dir.display(),
            log_dir.display()
        ));
    }
    if state.level != level {
        return Err(format!(
            "logging already initialized with level `{}`; refusing to switch to `{}`",
            state.level, level
        ));
    }
    Ok(())
}

/// Active `(level, log_dir)`, if logging was started.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.log_dir.clone()))
}

pub fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        "off" => Ok("off"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error|off"
        )),
    }
}
