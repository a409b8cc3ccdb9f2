//! Small shared helpers.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref().to_path_buf();
    if !path.exists() {
        let _ = fs::create_dir_all(&path);
    }
    path
}

/// Current timestamp in ISO format.
pub fn timestamp() -> String {
    Local::now().to_rfc3339()
}

/// Sanitize a call id for use as a filename.
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Truncate a string to `max` characters, appending an ellipsis when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{}...", cut)
}
