use crate::config::types::{Config, MAX_RECENT_PATHS};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn save_settings(config: &Config, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config).context("Failed to serialize settings")?;

    fs::write(path, content)
        .with_context(|| format!("Failed to write settings to {}", path.display()))?;

    Ok(())
}

/// 更新最近使用的路徑
/// 將新路徑加入最前面，去重並限制數量
pub fn add_recent_path(config: &mut Config, path: &str) {
    config.recent_paths.retain(|p| p != path);
    config.recent_paths.insert(0, path.to_string());
    config.recent_paths.truncate(MAX_RECENT_PATHS);
}
