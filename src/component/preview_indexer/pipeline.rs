use super::cache_store::CacheStore;
use super::frame_extractor::{FrameExtraction, SamplingRate, extract_frames};
use super::models::{PreviewArtifact, VideoRecord};
use super::progress_relay::{ProgressRelay, ProgressSnapshot, ProgressSource};
use super::sprite_compositor::{compose_grid, fit_aspect, write_cover};
use super::video_store::VideoStore;
use crate::config::{PreviewSettings, ToolPaths};
use crate::signal::ShutdownSignal;
use crate::tools::{display_name, ensure_directory_exists, is_cancelled, probe_video};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PREVIEWS_DIR: &str = "previews";
pub const COVER_FILE: &str = "cover.jpg";
pub const SPRITE_FILE: &str = "thumbs.jpg";

/// 一次生成的統計
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub total: usize,
    pub generated: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// 依序為每個待生成的影片產生封面與精靈圖
///
/// 同一時間只有一個外部程序在跑。
pub struct GenerationPipeline<'a> {
    tools: &'a ToolPaths,
    settings: &'a PreviewSettings,
    cache_dir: &'a Path,
    cache_file: &'a Path,
    shutdown_signal: &'a ShutdownSignal,
    show_progress: bool,
}

impl<'a> GenerationPipeline<'a> {
    #[must_use]
    pub const fn new(
        tools: &'a ToolPaths,
        settings: &'a PreviewSettings,
        cache_dir: &'a Path,
        cache_file: &'a Path,
        shutdown_signal: &'a ShutdownSignal,
    ) -> Self {
        Self {
            tools,
            settings,
            cache_dir,
            cache_file,
            shutdown_signal,
            show_progress: true,
        }
    }

    /// 關閉終端機進度條（測試或非互動環境）
    #[must_use]
    pub const fn without_progress_bar(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// 處理所有待生成的影片；不論結果如何，結束時寫入快取一次
    pub fn run(
        &self,
        cache: &mut CacheStore,
        video_store: &VideoStore,
        dirty: &[PathBuf],
    ) -> Result<PipelineReport> {
        let result = self.process_all(cache, video_store, dirty);
        persist_cache(cache, self.cache_file);
        result
    }

    fn process_all(
        &self,
        cache: &mut CacheStore,
        video_store: &VideoStore,
        dirty: &[PathBuf],
    ) -> Result<PipelineReport> {
        let mut report = PipelineReport {
            total: dirty.len(),
            ..PipelineReport::default()
        };

        let mut relay = ProgressRelay::start().context("啟動進度服務錯誤")?;

        for (index, path) in dirty.iter().enumerate() {
            if self.shutdown_signal.is_shutdown_requested() {
                warn!("收到中斷訊號，停止生成");
                report.cancelled = true;
                break;
            }

            info!("生成預覽 [{}/{}]: {}", index + 1, dirty.len(), path.display());

            match self.generate(path, index + 1, dirty.len(), &relay) {
                Ok(record) => {
                    // 快取與發佈清單一起更新
                    cache.insert_video(record.clone());
                    video_store.upsert(record);
                    report.generated += 1;
                }
                Err(e) if is_cancelled(&e) => {
                    warn!("生成已中斷: {}", path.display());
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!("視訊資訊生成失敗 {}: {e:#}", path.display());
                    report.failed += 1;
                }
            }
        }

        relay.stop();

        info!(
            "生成結束 - 成功: {}, 失敗: {}, 共 {}{}",
            report.generated,
            report.failed,
            report.total,
            if report.cancelled { "（已中斷）" } else { "" }
        );

        Ok(report)
    }

    /// 單支影片：ffprobe -> 擷取畫格 -> 合成精靈圖與封面
    fn generate(
        &self,
        path: &Path,
        current: usize,
        count: usize,
        relay: &ProgressRelay,
    ) -> Result<VideoRecord> {
        let info = probe_video(&self.tools.ffprobe, path)?;

        let preview_dir = preview_dir_for(self.cache_dir, path);
        ensure_directory_exists(&preview_dir)?;

        let frames_dir = tempfile::Builder::new()
            .prefix(".frames-")
            .tempdir_in(self.cache_dir)
            .context("生成預覽目錄失敗")?;

        let progress_bar = self.progress_bar(current, count, info.duration);
        let bar = progress_bar.clone();
        relay.arm(ProgressSource::new(info.duration, move |snapshot| {
            render_progress(&bar, snapshot);
        }));

        let result = self.render_preview(
            path,
            info.width,
            info.height,
            info.duration,
            frames_dir.path(),
            &preview_dir,
            &relay.addr(),
        );

        progress_bar.finish_and_clear();
        // 沒被 ffmpeg 取走的來源不留到下一支影片
        drop(relay.take_source());

        if let Err(e) = frames_dir.close() {
            warn!("無法清理暫存目錄: {e}");
        }

        let preview = result?;
        Ok(VideoRecord {
            name: display_name(path),
            path: path.to_path_buf(),
            duration_ms: u64::try_from(info.duration.as_millis()).unwrap_or(u64::MAX),
            width: info.width,
            height: info.height,
            preview: Some(preview),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn render_preview(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        duration: Duration,
        frames_dir: &Path,
        preview_dir: &Path,
        progress_url: &str,
    ) -> Result<PreviewArtifact> {
        let settings = self.settings;
        let (frame_width, frame_height) =
            fit_aspect(width, height, settings.cover_width, settings.cover_height);

        let extraction = FrameExtraction {
            ffmpeg: &self.tools.ffmpeg,
            input: path,
            frames_dir,
            rate: SamplingRate::choose(settings.seconds_per_frame, settings.max_frames, duration),
            width: frame_width,
            height: frame_height,
            progress_url,
        };
        let frames = extract_frames(&extraction, self.shutdown_signal)?;

        let cover = preview_dir.join(COVER_FILE);
        write_cover(&frames, &cover)?;

        let thumbs = compose_grid(
            &frames,
            &preview_dir.join(SPRITE_FILE),
            settings.sheet_width,
            settings.sheet_height,
            settings.grid_rows(),
            settings.grid_cols(),
            settings.jpeg_quality,
        )?;

        Ok(PreviewArtifact { cover, thumbs })
    }

    fn progress_bar(&self, current: usize, count: usize, duration: Duration) -> ProgressBar {
        let total_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let bar = ProgressBar::with_draw_target(Some(total_ms), ProgressDrawTarget::stderr());
        if !self.show_progress {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }

        let style = ProgressStyle::with_template("{prefix} [{bar:30.cyan/blue}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.set_prefix(format!("進度 {current}/{count}"));
        bar
    }
}

/// 每支影片的預覽檔放在以來源路徑雜湊命名的固定目錄，重新生成時直接覆蓋
#[must_use]
pub fn preview_dir_for(cache_dir: &Path, video_path: &Path) -> PathBuf {
    let hash = blake3::hash(video_path.as_os_str().as_encoded_bytes());
    cache_dir
        .join(PREVIEWS_DIR)
        .join(&hash.to_hex().as_str()[..16])
}

fn render_progress(bar: &ProgressBar, snapshot: &ProgressSnapshot) {
    let elapsed_ms = u64::try_from(snapshot.out_time.as_millis()).unwrap_or(u64::MAX);
    bar.set_position(elapsed_ms);
    bar.set_message(progress_message(snapshot));
}

/// 例如 `00:05:00/00:10:00 2.0x 剩餘 00:02:30`
#[must_use]
pub fn progress_message(snapshot: &ProgressSnapshot) -> String {
    let mut message = format!(
        "{}/{} {:.1}x",
        format_hms(snapshot.out_time),
        format_hms(snapshot.duration),
        snapshot.speed
    );
    if let Some(remaining) = snapshot.remaining() {
        message.push_str(&format!(" 剩餘 {}", format_hms(remaining)));
    }
    message
}

fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn persist_cache(cache: &CacheStore, cache_file: &Path) {
    match cache.save(cache_file) {
        Ok(true) => info!("已寫入快取: {}", cache_file.display()),
        Ok(false) => {}
        Err(e) => warn!("寫入快取資訊失敗: {e:#}"),
    }
}
