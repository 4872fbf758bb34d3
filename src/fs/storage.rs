use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::{TaskbookError, TaskbookResult};
use crate::models::{Store, StoreKind};

/// 临时文件目录名（原子写入用）
const SCRATCH_DIR: &str = ".temp";
/// 日志目录名
const LOG_DIR: &str = "logs";

/// On-disk layout of a taskbook directory.
///
/// ```text
/// <root>/
///   storage/storage.json   active items
///   archive/archive.json   archived items
///   .temp/                 scratch files for atomic writes
/// ```
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    scratch_dir: PathBuf,
}

impl Storage {
    /// Opens (and bootstraps) the store rooted at `root`.
    ///
    /// Creates the four directories when missing and purges scratch files
    /// left behind by an interrupted write.
    pub fn open(root: impl Into<PathBuf>) -> TaskbookResult<Self> {
        let root = root.into();
        let storage = Self {
            scratch_dir: root.join(SCRATCH_DIR),
            root,
        };

        for dir in [
            storage.root.clone(),
            storage.root.join(StoreKind::Active.dir_name()),
            storage.root.join(StoreKind::Archive.dir_name()),
            storage.scratch_dir.clone(),
        ] {
            ensure_dir(&dir)?;
        }

        storage.purge_scratch()?;
        debug!("event=storage_open root={}", storage.root.display());
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 日志目录；日志要在打开存储之前启动，所以不依赖实例
    pub fn log_dir(root: &Path) -> PathBuf {
        root.join(LOG_DIR)
    }

    /// Path of the JSON document backing `kind`.
    pub fn path_for(&self, kind: StoreKind) -> PathBuf {
        self.root.join(kind.dir_name()).join(kind.file_name())
    }

    /// Loads a whole store. A missing file is an empty store; a blank or
    /// malformed one is corrupt.
    pub fn load(&self, kind: StoreKind) -> TaskbookResult<Store> {
        let path = self.path_for(kind);

        if !path.exists() {
            return Ok(Store::new());
        }

        let content = fs::read_to_string(&path).map_err(|e| TaskbookError::io(&path, e))?;
        let store: Store = serde_json::from_str(&content)
            .map_err(|source| TaskbookError::CorruptStore { path: path.clone(), source })?;

        debug!("event=store_load store={} items={}", kind.label(), store.len());
        Ok(store)
    }

    /// Writes a whole store atomically.
    ///
    /// The document goes to a fresh file in the scratch directory first and
    /// is then renamed over the destination, so readers only ever see the
    /// previous or the new version.
    pub fn save(&self, kind: StoreKind, store: &Store) -> TaskbookResult<()> {
        let path = self.path_for(kind);
        let content = serde_json::to_string_pretty(store).map_err(|source| {
            TaskbookError::CorruptStore {
                path: path.clone(),
                source,
            }
        })?;

        let stem = kind.file_name().trim_end_matches(".json");
        write_atomic(&self.scratch_dir, stem, &path, &content)?;

        info!("event=store_save store={} items={}", kind.label(), store.len());
        Ok(())
    }

    /// 清理上次中断写入遗留的临时文件
    fn purge_scratch(&self) -> TaskbookResult<()> {
        let mut purged = 0;

        let entries =
            fs::read_dir(&self.scratch_dir).map_err(|e| TaskbookError::io(&self.scratch_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| TaskbookError::io(&self.scratch_dir, e))?;
            let path = entry.path();

            if path.is_file() {
                fs::remove_file(&path).map_err(|e| TaskbookError::io(&path, e))?;
                purged += 1;
            }
        }

        if purged > 0 {
            warn!("event=scratch_purge files={} dir={}", purged, self.scratch_dir.display());
        }
        Ok(())
    }
}

/// 原子写入：先写到 `scratch_dir` 下的临时文件并落盘，再重命名覆盖 `path`
///
/// `scratch_dir` must be on the same filesystem as `path`.
pub(crate) fn write_atomic(
    scratch_dir: &Path,
    stem: &str,
    path: &Path,
    content: &str,
) -> TaskbookResult<()> {
    let mut temp = tempfile::Builder::new()
        .prefix(&format!("{}.TEMP-", stem))
        .suffix(".json")
        .rand_bytes(8)
        .tempfile_in(scratch_dir)
        .map_err(|e| TaskbookError::io(scratch_dir, e))?;

    let written = temp
        .write_all(content.as_bytes())
        .and_then(|_| temp.write_all(b"\n"))
        .and_then(|_| temp.as_file().sync_all());
    written.map_err(|e| TaskbookError::io(temp.path(), e))?;

    temp.persist(path).map_err(|e| TaskbookError::io(path, e.error))?;
    Ok(())
}

fn ensure_dir(dir: &Path) -> TaskbookResult<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|source| TaskbookError::DirectoryUnavailable {
        path: dir.to_path_buf(),
        source,
    })
}
