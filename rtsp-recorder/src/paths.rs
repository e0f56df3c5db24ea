//! Output path resolution.
//!
//! Pure functions from `(config, now, session id)` to directories and file
//! names. The only side effect lives in [`ensure_dir`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::config::{RecorderCategory, RecorderConfig};

/// Fixed manifest name inside a live-stream session directory.
pub const MANIFEST_NAME: &str = "cam.m3u8";

/// Category root under the configured folder.
pub fn directory_path(config: &RecorderConfig) -> PathBuf {
    match config.category {
        RecorderCategory::Record => config.folder.join("recordings"),
        RecorderCategory::Stream => config.folder.join("stream"),
        RecorderCategory::Audio | RecorderCategory::Image => match &config.name {
            Some(name) => config.folder.join(name),
            None => config.folder.clone(),
        },
    }
}

/// Today's directory: the category root joined with the formatted date.
pub fn today_path(config: &RecorderConfig, now: DateTime<Local>) -> PathBuf {
    directory_path(config).join(now.format(&config.dir_name_format).to_string())
}

/// Where the current session writes its segments.
///
/// Stream sessions get a subdirectory named by the session id, so
/// concurrent viewers never collide on disk. Everything else records into
/// today's directory.
pub fn session_path(config: &RecorderConfig, now: DateTime<Local>, session_id: &Uuid) -> PathBuf {
    if config.category == RecorderCategory::Stream {
        directory_path(config).join(session_id.to_string())
    } else {
        today_path(config, now)
    }
}

/// File the encoder writes into `folder`: the fixed manifest name for
/// streams, a timestamped name with a category extension otherwise.
pub fn file_name(config: &RecorderConfig, now: DateTime<Local>, folder: &Path) -> PathBuf {
    if config.category == RecorderCategory::Stream {
        folder.join(MANIFEST_NAME)
    } else {
        folder.join(format!(
            "{}{}",
            now.format(&config.file_name_format),
            config.category.extension()
        ))
    }
}

/// Create a directory if it does not exist yet. Idempotent and safe under
/// concurrent calls.
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}
