use crate::tools::path_exists;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 精靈圖（多格縮圖合成的一張圖）描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailSprite {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub thumb_width: u32,
    pub thumb_height: u32,
    /// 實際放入的張數
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewArtifact {
    pub cover: PathBuf,
    pub thumbs: ThumbnailSprite,
}

/// 單支影片的索引資料，以絕對路徑為識別
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub name: String,
    pub path: PathBuf,
    pub duration_ms: u64,
    pub width: u32,
    pub height: u32,
    pub preview: Option<PreviewArtifact>,
}

impl VideoRecord {
    /// 封面與精靈圖都還在磁碟上才算完整
    #[must_use]
    pub fn has_artifacts_on_disk(&self) -> bool {
        self.preview.as_ref().is_some_and(|preview| {
            path_exists(&preview.cover) && path_exists(&preview.thumbs.path)
        })
    }
}
