//! 功能元件模組

pub mod preview_indexer;

pub use preview_indexer::PreviewIndexer;
