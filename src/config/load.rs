use crate::config::types::Config;
use crate::tools::{ensure_directory_exists, validate_directory_exists};
use anyhow::{Context, Result, bail};
use log::warn;
use std::fs;
use std::path::Path;

pub const SETTINGS_FILE: &str = "settings.json";

impl Config {
    /// 從工作目錄的 settings.json 載入，讀不到時使用預設值
    pub fn new() -> Result<Self> {
        Ok(Self::load_or_default(Path::new(SETTINGS_FILE)))
    }

    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load_settings(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("設定檔讀取失敗，使用預設值: {e:#}");
                Self::default()
            }
        }
    }

    pub fn load_settings(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))
    }

    /// 檢查設定是否可用，並建立快取目錄
    pub fn validate(&self) -> Result<()> {
        if self.video_dirs.is_empty() {
            bail!("未設定任何影片資料夾");
        }
        for dir in &self.video_dirs {
            validate_directory_exists(dir)?;
        }

        let preview = &self.preview;
        if preview.seconds_per_frame == 0 || preview.max_frames == 0 {
            bail!("取樣間隔與最大張數必須大於 0");
        }
        if preview.grid_rows() == 0 || preview.grid_cols() == 0 {
            bail!(
                "精靈圖尺寸 {}x{} 放不下任何 {}x{} 的格子",
                preview.sheet_width,
                preview.sheet_height,
                preview.cell_width,
                preview.cell_height
            );
        }
        if preview.cover_width == 0 || preview.cover_height == 0 {
            bail!("封面尺寸必須大於 0");
        }

        ensure_directory_exists(&self.cache_dir)
            .with_context(|| format!("無法建立快取目錄: {}", self.cache_dir.display()))
    }

    /// 將影片資料夾與快取目錄換成絕對路徑，快取鍵才不會隨工作目錄改變
    pub fn absolutize_paths(&mut self) -> Result<()> {
        for dir in &mut self.video_dirs {
            *dir = std::path::absolute(&*dir)
                .with_context(|| format!("無法取得資料夾路徑: {}", dir.display()))?;
        }
        self.cache_dir = std::path::absolute(&self.cache_dir)
            .with_context(|| format!("無法取得快取目錄路徑: {}", self.cache_dir.display()))?;
        Ok(())
    }
}
