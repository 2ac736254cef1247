mod content_sniffer;
mod ffprobe_info;
mod file_tools;
mod process_runner;

pub use content_sniffer::{detect_content_type, is_video_file, sniff_file};
pub use ffprobe_info::{ProbeInfo, parse_probe_output, probe_video};
pub use file_tools::{
    copy_file, display_name, ensure_directory_exists, ensure_parent_dir, path_exists,
    validate_directory_exists,
};
pub use process_runner::{Cancelled, is_cancelled, run_cancellable};
