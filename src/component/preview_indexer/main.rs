use super::cache_store::CacheStore;
use super::directory_scanner::{ScanOutcome, scan_directories};
use super::pipeline::{GenerationPipeline, PipelineReport};
use super::video_store::VideoStore;
use crate::config::{CACHE_FILE_NAME, Config};
use crate::signal::ShutdownSignal;
use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::Arc;

/// 一次索引的結果
#[derive(Debug, Default)]
pub struct IndexReport {
    pub video_files: usize,
    pub dirty: usize,
    pub pruned: usize,
    pub generation: Option<PipelineReport>,
    pub cancelled: bool,
}

/// 預覽索引器
///
/// 流程：
/// 1. 載入快取（失敗則用空快取）
/// 2. 掃描影片資料夾，找出需要生成的影片
/// 3. 發佈目前的索引並寫入快取
/// 4. 依序生成預覽，結束後再發佈一次
pub struct PreviewIndexer {
    config: Config,
    video_store: Arc<VideoStore>,
    shutdown_signal: ShutdownSignal,
    show_progress: bool,
}

impl PreviewIndexer {
    #[must_use]
    pub const fn new(
        config: Config,
        video_store: Arc<VideoStore>,
        shutdown_signal: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            video_store,
            shutdown_signal,
            show_progress: true,
        }
    }

    #[must_use]
    pub const fn without_progress_bar(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// 執行一次完整索引；結束時（含錯誤）一定發出完成信號
    pub fn run(&self) -> Result<IndexReport> {
        let result = self.run_inner();
        self.shutdown_signal.mark_completed();
        result
    }

    fn run_inner(&self) -> Result<IndexReport> {
        // 預覽路徑寫進快取，必須與工作目錄無關
        let cache_dir = std::path::absolute(&self.config.cache_dir).with_context(|| {
            format!("無法取得快取目錄路徑: {}", self.config.cache_dir.display())
        })?;
        let cache_file = cache_dir.join(CACHE_FILE_NAME);
        let mut cache = CacheStore::load_or_default(&cache_file);

        let ScanOutcome {
            dirty,
            video_files,
            pruned,
            cancelled,
            ..
        } = scan_directories(&self.config.video_dirs, &mut cache, &self.shutdown_signal);

        self.video_store.replace_all(cache.videos());
        if let Err(e) = cache.save(&cache_file) {
            warn!("寫入快取資訊失敗: {e:#}");
        }

        let mut report = IndexReport {
            video_files,
            dirty: dirty.len(),
            pruned,
            generation: None,
            cancelled,
        };

        if cancelled || self.shutdown_signal.is_shutdown_requested() {
            report.cancelled = true;
            return Ok(report);
        }

        if dirty.is_empty() {
            info!("沒有需要生成的影片");
            return Ok(report);
        }

        let tools = self.config.tool_paths();
        let mut pipeline = GenerationPipeline::new(
            &tools,
            &self.config.preview,
            &cache_dir,
            &cache_file,
            &self.shutdown_signal,
        );
        if !self.show_progress {
            pipeline = pipeline.without_progress_bar();
        }

        let generation = pipeline.run(&mut cache, &self.video_store, &dirty);
        self.video_store.replace_all(cache.videos());

        let generation = generation?;
        report.cancelled = generation.cancelled;
        report.generation = Some(generation);
        Ok(report)
    }
}
