use std::path::{Path, PathBuf};

pub const PROCESSED_DIR: &str = "data_processed";
pub const RAW_DIR: &str = "data_raw";

/// Walk upward from `start` until a directory containing the processed or
/// raw data folder is found. Falls back to `start` itself when no ancestor
/// qualifies; a root without data is reported by the loader, not here.
pub fn find_project_root(start: &Path) -> PathBuf {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    let mut dir = start.as_path();
    loop {
        if dir.join(PROCESSED_DIR).is_dir() || dir.join(RAW_DIR).is_dir() {
            return dir.to_path_buf();
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return start.clone(),
        }
    }
}
