/// 错误类型
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the item store engine.
///
/// Validation errors abort an operation before anything is written. The
/// storage and configuration variants are fatal for the running process.
#[derive(Debug, Error)]
pub enum TaskbookError {
    #[error("missing {0}")]
    MissingInput(&'static str),

    #[error("unknown id: {0}")]
    UnknownId(String),

    #[error("invalid date `{0}` (expected YYYY/MM/DD)")]
    InvalidDate(String),

    #[error("invalid priority `{0}` (expected 1, 2 or 3)")]
    InvalidPriority(String),

    #[error("invalid data source `{0}` (expected active, archive or all)")]
    InvalidDataSource(String),

    #[error("invalid time `{0}` (expected a positive number of minutes)")]
    InvalidTime(String),

    #[error("item {0} must keep at least one board")]
    LastBoard(u32),

    #[error("store file {} is corrupt: {}", .path.display(), .source)]
    CorruptStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot create directory {}: {}", .path.display(), .source)]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o failure on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("remote sync failed: {0}")]
    Sync(String),
}

impl TaskbookError {
    /// 致命错误：进程应立即以非零状态退出
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CorruptStore { .. }
                | Self::DirectoryUnavailable { .. }
                | Self::Io { .. }
                | Self::Config(_)
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type TaskbookResult<T> = std::result::Result<T, TaskbookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let missing = TaskbookError::DirectoryUnavailable {
            path: PathBuf::from("/nope"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(missing.is_fatal());
        assert!(!TaskbookError::UnknownId("7".to_string()).is_fatal());
        assert!(!TaskbookError::Sync("push rejected".to_string()).is_fatal());
    }

    #[test]
    fn test_messages_name_the_offending_input() {
        let err = TaskbookError::UnknownId("a12".to_string());
        assert_eq!(err.to_string(), "unknown id: a12");

        let err = TaskbookError::InvalidDataSource("remote".to_string());
        assert!(err.to_string().contains("`remote`"));
    }
}
