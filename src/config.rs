/// 应用配置管理
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{TaskbookError, TaskbookResult};
use crate::fs::storage::write_atomic;

/// 覆盖配置文件位置的环境变量
pub const CONFIG_ENV: &str = "TASKBOOK_CONFIG";
const DEFAULT_DIRECTORY: &str = "~/.taskbook";
const HOME_MARKER: &str = "~";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// 数据根目录（支持 `~`）
    pub taskbook_directory: String,
    /// 看板视图中是否显示已完成任务
    pub display_complete_tasks: bool,
    /// 是否在视图底部显示进度概览
    pub display_progress_overview: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            taskbook_directory: DEFAULT_DIRECTORY.to_string(),
            display_complete_tasks: true,
            display_progress_overview: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Store root with `~` expanded. A blank setting falls back to the
    /// default directory.
    pub fn store_root(&self) -> TaskbookResult<PathBuf> {
        let raw = self.taskbook_directory.trim();
        let raw = if raw.is_empty() { DEFAULT_DIRECTORY } else { raw };
        let home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        expand_home(raw, home.as_deref())
    }
}

fn expand_home(raw: &str, home: Option<&Path>) -> TaskbookResult<PathBuf> {
    let Some(rest) = raw.strip_prefix(HOME_MARKER) else {
        return Ok(PathBuf::from(raw));
    };
    // `~user` 这种写法不展开
    if !rest.is_empty() && !rest.starts_with(['/', '\\']) {
        return Ok(PathBuf::from(raw));
    }

    let home =
        home.ok_or_else(|| TaskbookError::Config("cannot resolve home directory".to_string()))?;
    Ok(home.join(rest.trim_start_matches(['/', '\\'])))
}

/// 获取配置文件路径
/// Linux: ~/.config/taskbook/config.json
/// macOS: ~/Library/Application Support/taskbook/config.json
/// Windows: %APPDATA%\taskbook\config.json
///
/// `TASKBOOK_CONFIG` 优先。
pub fn get_config_path() -> TaskbookResult<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    let config_dir = directories::BaseDirs::new()
        .ok_or_else(|| TaskbookError::Config("cannot resolve user config directory".to_string()))?
        .config_dir()
        .to_path_buf();
    Ok(config_dir.join("taskbook").join("config.json"))
}

/// 加载配置
pub fn load_config() -> TaskbookResult<Config> {
    load_config_from(&get_config_path()?)
}

/// Reads settings from `path`, creating the file with defaults when it does
/// not exist yet. Missing keys take their defaults.
pub fn load_config_from(path: &Path) -> TaskbookResult<Config> {
    if !path.exists() {
        let config = Config::default();
        save_config_to(path, &config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path).map_err(|e| TaskbookError::io(path, e))?;
    if content.trim().is_empty() {
        return Ok(Config::default());
    }

    serde_json::from_str(&content)
        .map_err(|e| TaskbookError::Config(format!("{}: {}", path.display(), e)))
}

/// 保存配置（临时文件 + 重命名）
pub fn save_config_to(path: &Path, config: &Config) -> TaskbookResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // 确保目录存在
    std::fs::create_dir_all(parent).map_err(|e| TaskbookError::io(parent, e))?;

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| TaskbookError::Config(e.to_string()))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("config");
    write_atomic(parent, stem, path, &content)
}

/// 更新数据根目录
pub fn set_taskbook_directory(path: &Path, directory: &str) -> TaskbookResult<Config> {
    let directory = directory.trim();
    if directory.is_empty() {
        return Err(TaskbookError::MissingInput("directory"));
    }

    let mut config = load_config_from(path)?;
    config.taskbook_directory = directory.to_string();
    save_config_to(path, &config)?;
    Ok(config)
}

/// 显示当前配置
pub fn show_config(path: &Path, config: &Config) {
    println!("Configuration ({})", path.display());
    println!("  taskbookDirectory:       {}", config.taskbook_directory);
    println!("  displayCompleteTasks:    {}", config.display_complete_tasks);
    println!("  displayProgressOverview: {}", config.display_progress_overview);
    println!("  logLevel:                {}", config.log_level);
}
