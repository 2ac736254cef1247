use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// ffprobe 回報的影片基本資訊
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    pub duration: Duration,
    pub width: u32,
    pub height: u32,
}

#[derive(Deserialize)]
struct FfprobeOutput {
    format: Option<FormatInfo>,
    streams: Option<Vec<StreamInfo>>,
}

#[derive(Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct StreamInfo {
    width: Option<u32>,
    height: Option<u32>,
}

/// 使用 ffprobe 取得第一條視訊串流的尺寸與容器長度
pub fn probe_video(ffprobe: &Path, path: &Path) -> Result<ProbeInfo> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-show_format",
            "-print_format",
            "json",
        ])
        .arg(path)
        .output()
        .with_context(|| format!("無法執行 ffprobe: {}", path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("ffprobe 執行失敗 ({}): {}", output.status, stderr.trim());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&stdout)
        .with_context(|| format!("無法解析 ffprobe 輸出: {}", path.display()))
}

/// 解析 `-print_format json` 的輸出
pub fn parse_probe_output(json: &str) -> Result<ProbeInfo> {
    let probe: FfprobeOutput = serde_json::from_str(json).context("ffprobe 輸出不是合法 JSON")?;

    let stream = probe
        .streams
        .as_ref()
        .and_then(|streams| streams.first())
        .ok_or_else(|| anyhow!("找不到視訊串流"))?;

    let width = stream.width.ok_or_else(|| anyhow!("無法取得影片寬度"))?;
    let height = stream.height.ok_or_else(|| anyhow!("無法取得影片高度"))?;

    let raw_duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .ok_or_else(|| anyhow!("無法取得影片長度"))?;

    Ok(ProbeInfo {
        duration: parse_duration_seconds(raw_duration)?,
        width,
        height,
    })
}

/// 將 "123.456000" 這類秒數字串轉為毫秒精度的 `Duration`
fn parse_duration_seconds(raw: &str) -> Result<Duration> {
    let seconds: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("影片長度格式錯誤: {raw}"))?;

    if !seconds.is_finite() || seconds < 0.0 {
        bail!("影片長度不合理: {raw}");
    }

    Ok(Duration::from_millis((seconds * 1000.0).round() as u64))
}
