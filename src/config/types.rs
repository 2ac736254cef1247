use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const MAX_RECENT_PATHS: usize = 10;
pub const CACHE_FILE_NAME: &str = "cache.json";

/// 預覽圖取樣與尺寸設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    /// 每隔幾秒取一張
    pub seconds_per_frame: u32,
    /// 單支影片最多取幾張
    pub max_frames: u32,
    pub sheet_width: u32,
    pub sheet_height: u32,
    /// 擷取畫格（也是封面）的外框
    pub cover_width: u32,
    pub cover_height: u32,
    /// 精靈圖每格尺寸
    pub cell_width: u32,
    pub cell_height: u32,
    pub jpeg_quality: u8,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            seconds_per_frame: 5,
            max_frames: 100,
            sheet_width: 1600,
            sheet_height: 900,
            cover_width: 412,
            cover_height: 232,
            cell_width: 160,
            cell_height: 90,
            jpeg_quality: 80,
        }
    }
}

impl PreviewSettings {
    #[must_use]
    pub const fn grid_rows(&self) -> u32 {
        if self.cell_height == 0 {
            0
        } else {
            self.sheet_height / self.cell_height
        }
    }

    #[must_use]
    pub const fn grid_cols(&self) -> u32 {
        if self.cell_width == 0 {
            0
        } else {
            self.sheet_width / self.cell_width
        }
    }
}

/// 外部工具路徑
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffprobe: PathBuf,
    pub ffmpeg: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub video_dirs: Vec<PathBuf>,
    pub cache_dir: PathBuf,
    pub ffprobe: PathBuf,
    pub ffmpeg: PathBuf,
    pub preview: PreviewSettings,
    pub shutdown_grace_secs: u64,
    pub recent_paths: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video_dirs: Vec::new(),
            cache_dir: PathBuf::from(".preview_cache"),
            ffprobe: PathBuf::from("ffprobe"),
            ffmpeg: PathBuf::from("ffmpeg"),
            preview: PreviewSettings::default(),
            shutdown_grace_secs: 5,
            recent_paths: Vec::new(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE_NAME)
    }

    #[must_use]
    pub fn tool_paths(&self) -> ToolPaths {
        ToolPaths {
            ffprobe: self.ffprobe.clone(),
            ffmpeg: self.ffmpeg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_is_ten_by_ten() {
        let preview = PreviewSettings::default();
        assert_eq!(preview.grid_rows(), 10);
        assert_eq!(preview.grid_cols(), 10);
    }

    #[test]
    fn test_zero_cell_gives_empty_grid() {
        let preview = PreviewSettings {
            cell_width: 0,
            cell_height: 0,
            ..PreviewSettings::default()
        };
        assert_eq!(preview.grid_rows(), 0);
        assert_eq!(preview.grid_cols(), 0);
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"video_dirs": ["/videos"], "preview": {"max_frames": 50}}"#)
                .unwrap();
        assert_eq!(config.video_dirs, vec![PathBuf::from("/videos")]);
        assert_eq!(config.preview.max_frames, 50);
        assert_eq!(config.preview.seconds_per_frame, 5);
        assert_eq!(config.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.cache_file(), PathBuf::from(".preview_cache/cache.json"));
    }
}
