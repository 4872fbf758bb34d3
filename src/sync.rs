//! Commit and push the store directory with git.

use std::path::Path;
use std::process::{Command, Output};

use chrono::Local;
use log::{info, warn};

use crate::error::{TaskbookError, TaskbookResult};

/// 提交并推送：`git -C <root> commit -a -m <时间>`，然后 `git -C <root> push`
///
/// 失败只报告，不回滚本地数据。
pub fn save_remote(root: &Path) -> TaskbookResult<()> {
    let message = Local::now().format("%d/%m/%Y, %H:%M:%S").to_string();

    run_git(root, &["commit", "-a", "-m", &message])?;
    run_git(root, &["push"])?;

    info!("event=remote_sync status=ok root={}", root.display());
    Ok(())
}

fn run_git(root: &Path, args: &[&str]) -> TaskbookResult<Output> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .map_err(|e| TaskbookError::Sync(format!("cannot run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() { stdout } else { stderr };
        warn!("event=remote_sync status=error step={} code={:?}", args[0], output.status.code());
        return Err(TaskbookError::Sync(format!(
            "git {} failed: {}",
            args[0],
            detail.trim()
        )));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sync_outside_repository_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = save_remote(dir.path()).unwrap_err();
        assert!(matches!(err, TaskbookError::Sync(_)));
        assert!(!err.is_fatal());
    }
}
