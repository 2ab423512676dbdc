use std::path::PathBuf;
use chrono::NaiveDateTime;
use tracing::debug;

use common::{date_folder_name, segment_timestamp, RecorderError, Result};

/// Derives segment paths of the form
/// `<root>/<YYYYMMDD>/<camera>_<YYYYMMDD_HHMMSS>.<ext>`.
///
/// The folder always comes from the instant being named, so a segment started
/// just after midnight lands in the new day's folder even if the supervisor
/// that asked for it still belongs to the previous day.
#[derive(Debug, Clone)]
pub struct OutputNamer {
    root: PathBuf,
    extension: String,
}

impl OutputNamer {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    /// Returns a path that does not exist yet, creating the day folder first.
    pub async fn next_path(&self, camera_name: &str, now: NaiveDateTime) -> Result<PathBuf> {
        let folder = self.root.join(date_folder_name(now.date()));
        tokio::fs::create_dir_all(&folder)
            .await
            .map_err(|e| RecorderError::filesystem(&folder, e))?;

        let stem = format!("{}_{}", camera_name, segment_timestamp(now));
        let mut candidate = folder.join(format!("{}.{}", stem, self.extension));
        let mut suffix = 1u32;

        // Same camera, same second: only possible after a very fast restart.
        while tokio::fs::try_exists(&candidate)
            .await
            .map_err(|e| RecorderError::filesystem(&candidate, e))?
        {
            candidate = folder.join(format!("{}_{}.{}", stem, suffix, self.extension));
            suffix += 1;
        }

        debug!("Next segment for {}: {:?}", camera_name, candidate);
        Ok(candidate)
    }
}
