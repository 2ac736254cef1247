use crate::signal::ShutdownSignal;
use crate::tools::run_cancellable;
use anyhow::{Context, Result, bail};
use log::debug;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// 畫格輸出檔名樣式，ffmpeg 會依序編號
pub const FRAME_PATTERN: &str = "thum%03d.jpg";

/// ffmpeg `fps=` 濾鏡使用的取樣率，以分數表示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingRate {
    pub frames: u64,
    pub seconds: u64,
}

impl SamplingRate {
    /// 依影片長度選擇取樣率
    ///
    /// `spf * max_frames` 秒超過影片長度時，上限不會被碰到，固定每 `spf` 秒一張；
    /// 否則在整支影片平均取 `max_frames` 張。長度為 0 的影片一定落在前者。
    #[must_use]
    pub fn choose(seconds_per_frame: u32, max_frames: u32, duration: Duration) -> Self {
        let spf = u64::from(seconds_per_frame.max(1));
        let max_frames = u64::from(max_frames.max(1));

        if Duration::from_secs(spf * max_frames) > duration {
            Self {
                frames: 1,
                seconds: spf,
            }
        } else {
            Self {
                frames: max_frames,
                seconds: duration.as_secs().max(1),
            }
        }
    }

    #[must_use]
    pub fn fps(&self) -> f64 {
        self.frames as f64 / self.seconds as f64
    }
}

impl fmt::Display for SamplingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.frames, self.seconds)
    }
}

/// 一次畫格擷取的參數
#[derive(Debug, Clone)]
pub struct FrameExtraction<'a> {
    pub ffmpeg: &'a Path,
    pub input: &'a Path,
    pub frames_dir: &'a Path,
    pub rate: SamplingRate,
    pub width: u32,
    pub height: u32,
    /// 進度接收位址（`tcp://host:port`）
    pub progress_url: &'a str,
}

impl FrameExtraction<'_> {
    #[must_use]
    pub fn build_command(&self) -> Command {
        let mut cmd = Command::new(self.ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-v", "error", "-progress"])
            .arg(self.progress_url)
            .arg("-i")
            .arg(self.input)
            .arg("-vf")
            .arg(format!("fps={}", self.rate))
            .arg("-s")
            .arg(format!("{}x{}", self.width, self.height))
            .arg(self.frames_dir.join(FRAME_PATTERN));
        cmd
    }
}

/// 呼叫 ffmpeg 擷取畫格，回傳依檔名排序的畫格路徑
pub fn extract_frames(
    extraction: &FrameExtraction<'_>,
    shutdown_signal: &ShutdownSignal,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(extraction.frames_dir).with_context(|| {
        format!(
            "無法建立縮圖目錄: {}",
            extraction.frames_dir.display()
        )
    })?;

    debug!(
        "擷取畫格: {} fps={} {}x{}",
        extraction.input.display(),
        extraction.rate,
        extraction.width,
        extraction.height
    );

    run_cancellable(extraction.build_command(), shutdown_signal)
        .with_context(|| format!("ffmpeg 擷取畫格失敗: {}", extraction.input.display()))?;

    let frames = list_frames(extraction.frames_dir)?;
    if frames.is_empty() {
        bail!("ffmpeg 沒有產生任何畫格: {}", extraction.input.display());
    }

    debug!("擷取了 {} 張畫格", frames.len());
    Ok(frames)
}

fn list_frames(frames_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = fs::read_dir(frames_dir)
        .with_context(|| format!("讀取縮圖失敗: {}", frames_dir.display()))?
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| entry.path())
        .collect();

    frames.sort();
    Ok(frames)
}
