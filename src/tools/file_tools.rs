use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;

/// 檔名去掉副檔名，作為影片顯示名稱
#[must_use]
pub fn display_name(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// 路徑是否存在（含 stat 失敗視為不存在）
#[must_use]
pub fn path_exists(path: &Path) -> bool {
    fs::metadata(path).is_ok()
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("無法建立目錄: {}", parent.display()))?;
    }
    Ok(())
}

pub fn validate_directory_exists(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => bail!("路徑不是資料夾: {}", path.display()),
        Err(_) => bail!("路徑不存在: {}", path.display()),
    }
}

pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("無法建立目錄: {}", path.display()))
}

/// 複製檔案，必要時建立目的地的上層目錄
pub fn copy_file(source: &Path, destination: &Path) -> Result<u64> {
    ensure_parent_dir(destination)?;
    fs::copy(source, destination).with_context(|| {
        format!(
            "無法複製檔案: {} -> {}",
            source.display(),
            destination.display()
        )
    })
}
