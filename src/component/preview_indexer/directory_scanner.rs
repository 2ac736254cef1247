use super::cache_store::CacheStore;
use crate::signal::ShutdownSignal;
use crate::tools::is_video_file;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// 單一影片檔的分類結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// 有完整索引且修改時間相同
    Unchanged,
    /// 沒有索引，或索引的預覽檔已不在磁碟上
    Incomplete,
    /// 有完整索引但檔案被改過
    Modified,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// 需要（重新）生成的影片，依走訪順序
    pub dirty: Vec<PathBuf>,
    pub video_files: usize,
    pub skipped_directories: usize,
    pub pruned: usize,
    pub cancelled: bool,
}

#[must_use]
pub fn classify(cache: &CacheStore, path: &Path, modified: SystemTime) -> Classification {
    if !cache.is_complete(path) {
        Classification::Incomplete
    } else if cache.modified_time(path) == Some(modified) {
        Classification::Unchanged
    } else {
        Classification::Modified
    }
}

/// 走訪所有根目錄，找出需要生成預覽的影片並更新快取的時間戳
///
/// 目錄的修改時間若與快取相同，整個子樹直接跳過。這只比對目錄本身的時間，
/// 子目錄內新增的檔案若沒有改變上層目錄時間就會被漏掉。
pub fn scan_directories(
    roots: &[PathBuf],
    cache: &mut CacheStore,
    shutdown_signal: &ShutdownSignal,
) -> ScanOutcome {
    let mut outcome = ScanOutcome {
        pruned: cache.prune_missing(),
        ..ScanOutcome::default()
    };

    if outcome.pruned > 0 {
        info!("已移除 {} 筆來源不存在的快取", outcome.pruned);
    }

    for root in roots {
        if outcome.cancelled {
            break;
        }
        // 快取以絕對路徑為鍵，相對的根目錄先補成絕對路徑
        let root = match std::path::absolute(root) {
            Ok(root) => root,
            Err(e) => {
                warn!("無法取得絕對路徑，跳過 {}: {e}", root.display());
                continue;
            }
        };
        scan_root(&root, cache, shutdown_signal, &mut outcome);
    }

    info!(
        "掃描完成: {} 個影片, {} 個待生成{}",
        outcome.video_files,
        outcome.dirty.len(),
        if outcome.cancelled { "（已中斷）" } else { "" }
    );

    outcome
}

fn scan_root(
    root: &Path,
    cache: &mut CacheStore,
    shutdown_signal: &ShutdownSignal,
    outcome: &mut ScanOutcome,
) {
    let mut walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        if shutdown_signal.is_shutdown_requested() {
            warn!("收到中斷訊號，停止掃描");
            outcome.cancelled = true;
            return;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("檔案或目錄錯誤，跳過: {e}");
                continue;
            }
        };
        let path = entry.path();

        if path.to_str().is_none() {
            warn!("路徑不是 UTF-8，跳過: {}", path.display());
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        let modified = match entry
            .metadata()
            .map_err(std::io::Error::from)
            .and_then(|meta| meta.modified())
        {
            Ok(modified) => modified,
            Err(e) => {
                warn!("無法讀取修改時間，跳過 {}: {e}", path.display());
                continue;
            }
        };

        if entry.file_type().is_dir() {
            if cache.modified_time(path) == Some(modified) {
                debug!("目錄無需更新，跳過: {}", path.display());
                outcome.skipped_directories += 1;
                walker.skip_current_dir();
            }
            continue;
        }

        if !is_video_file(path) {
            debug!("不是影片，跳過: {}", path.display());
            continue;
        }
        outcome.video_files += 1;

        match classify(cache, path, modified) {
            Classification::Unchanged => {
                debug!("無需更新: {}", path.display());
            }
            Classification::Incomplete => {
                debug!("尚無預覽，待生成: {}", path.display());
                cache.remove_video(path);
                cache.set_modified_time(path, modified);
                outcome.dirty.push(path.to_path_buf());
            }
            Classification::Modified => {
                debug!("檔案已變更，待重新生成: {}", path.display());
                cache.evict(path);
                cache.set_modified_time(path, modified);
                outcome.dirty.push(path.to_path_buf());
            }
        }
    }
}
