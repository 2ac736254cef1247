use super::models::{PreviewArtifact, VideoRecord};
use crate::tools::{ensure_parent_dir, path_exists};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// 持久化快取：路徑 -> 上次看到的修改時間，路徑 -> 影片索引
///
/// 本身不加鎖，由擁有者（索引執行緒）負責序列化存取。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStore {
    #[serde(rename = "mod", default)]
    mod_times: BTreeMap<PathBuf, SystemTime>,
    #[serde(default)]
    videos: BTreeMap<PathBuf, VideoRecord>,
}

impl CacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("無法讀取快取檔案: {}", path.display()))?;

        if content.trim().is_empty() {
            return Ok(Self::new());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("無法解析快取檔案: {}", path.display()))
    }

    /// 載入快取；檔案不存在或損毀時回到空快取
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        if !path_exists(path) {
            info!("快取檔案不存在，從空快取開始: {}", path.display());
            return Self::new();
        }

        match Self::load(path) {
            Ok(cache) => {
                info!(
                    "已載入快取: {} 筆時間戳, {} 筆影片",
                    cache.mod_times.len(),
                    cache.videos.len()
                );
                cache
            }
            Err(e) => {
                warn!("快取讀取失敗，改用空快取: {e:#}");
                Self::new()
            }
        }
    }

    /// 寫入快取；兩個表都空的時候不寫，以免蓋掉磁碟上較完整的版本
    ///
    /// 回傳是否真的寫入。
    pub fn save(&self, path: &Path) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }

        let content = serde_json::to_string(self).context("無法序列化快取")?;
        ensure_parent_dir(path)?;

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        fs::write(&temp_path, content)
            .with_context(|| format!("無法寫入快取檔案: {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("無法寫入快取檔案: {}", path.display()))?;

        Ok(true)
    }

    /// 移除來源檔已不存在的項目（時間戳與索引一併移除）
    pub fn prune_missing(&mut self) -> usize {
        let missing: BTreeSet<PathBuf> = self
            .mod_times
            .keys()
            .chain(self.videos.keys())
            .filter(|path| !path_exists(path))
            .cloned()
            .collect();

        for path in &missing {
            if let Some(preview) = self.videos.get(path).and_then(|v| v.preview.as_ref()) {
                remove_preview_files(preview);
            }
            self.evict(path);
        }

        missing.len()
    }

    /// 是否有完整的索引：有預覽資料，且封面與精靈圖檔案現在仍存在
    #[must_use]
    pub fn is_complete(&self, path: &Path) -> bool {
        self.videos
            .get(path)
            .is_some_and(VideoRecord::has_artifacts_on_disk)
    }

    #[must_use]
    pub fn modified_time(&self, path: &Path) -> Option<SystemTime> {
        self.mod_times.get(path).copied()
    }

    pub fn set_modified_time(&mut self, path: &Path, modified: SystemTime) {
        self.mod_times.insert(path.to_path_buf(), modified);
    }

    #[must_use]
    pub fn video(&self, path: &Path) -> Option<&VideoRecord> {
        self.videos.get(path)
    }

    pub fn insert_video(&mut self, record: VideoRecord) {
        self.videos.insert(record.path.clone(), record);
    }

    pub fn remove_video(&mut self, path: &Path) -> Option<VideoRecord> {
        self.videos.remove(path)
    }

    /// 時間戳與索引一起移除
    pub fn evict(&mut self, path: &Path) {
        self.mod_times.remove(path);
        self.videos.remove(path);
    }

    /// 所有影片索引，依路徑排序
    #[must_use]
    pub fn videos(&self) -> Vec<VideoRecord> {
        self.videos.values().cloned().collect()
    }

    #[must_use]
    pub fn video_count(&self) -> usize {
        self.videos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mod_times.is_empty() && self.videos.is_empty()
    }
}

/// 刪除封面與精靈圖；所在目錄空了就一併移除
fn remove_preview_files(preview: &PreviewArtifact) {
    for file in [&preview.cover, &preview.thumbs.path] {
        match fs::remove_file(file) {
            Ok(()) => debug!("已刪除預覽檔: {}", file.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("無法刪除預覽檔 {}: {e}", file.display()),
        }
    }

    if let Some(dir) = preview.cover.parent() {
        // 非空目錄會失敗，留著即可
        let _ = fs::remove_dir(dir);
    }
}
