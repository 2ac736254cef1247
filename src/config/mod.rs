pub mod load;
pub mod save;
pub mod types;

pub use load::SETTINGS_FILE;
pub use save::{add_recent_path, save_settings};
pub use types::{CACHE_FILE_NAME, Config, MAX_RECENT_PATHS, PreviewSettings, ToolPaths};
