//! 影片預覽索引元件
//!
//! 增量掃描影片資料夾，為每支影片產生封面與精靈圖，
//! 以快取檔記錄結果，未變更的影片不會重做。

mod cache_store;
mod directory_scanner;
mod frame_extractor;
mod main;
mod models;
mod pipeline;
mod progress_relay;
mod sprite_compositor;
mod video_store;

pub use cache_store::CacheStore;
pub use directory_scanner::{Classification, ScanOutcome, classify, scan_directories};
pub use frame_extractor::{FRAME_PATTERN, FrameExtraction, SamplingRate, extract_frames};
pub use main::{IndexReport, PreviewIndexer};
pub use models::{PreviewArtifact, ThumbnailSprite, VideoRecord};
pub use pipeline::{
    COVER_FILE, GenerationPipeline, PREVIEWS_DIR, PipelineReport, SPRITE_FILE, preview_dir_for,
    progress_message,
};
pub use progress_relay::{
    ProgressCallback, ProgressCollector, ProgressRelay, ProgressSnapshot, ProgressSource,
};
pub use sprite_compositor::{compose_grid, fit_aspect, write_cover};
pub use video_store::VideoStore;
