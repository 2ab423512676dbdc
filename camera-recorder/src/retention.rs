use std::io;
use std::path::{Path, PathBuf};
use chrono::{Days, NaiveDate};
use tracing::{debug, error, info};

use common::{parse_date_folder, RecorderError, Result};

/// Outcome of one sweep.
#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    pub cutoff: Option<NaiveDate>,
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

type RemoveFolder = fn(&Path) -> io::Result<()>;

fn remove_folder(path: &Path) -> io::Result<()> {
    std::fs::remove_dir_all(path)
}

/// Deletes daily output folders that fell out of the retention window.
#[derive(Clone)]
pub struct RetentionSweeper {
    root: PathBuf,
    retention_days: u32,
    remove: RemoveFolder,
}

impl RetentionSweeper {
    pub fn new(root: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            root: root.into(),
            retention_days,
            remove: remove_folder,
        }
    }

    #[cfg(test)]
    fn with_remover(mut self, remove: RemoveFolder) -> Self {
        self.remove = remove;
        self
    }

    /// First date that is still kept.
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.retention_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Removes every `YYYYMMDD` folder dated strictly before the cutoff.
    ///
    /// The folder dated exactly at the cutoff survives. Other names and plain
    /// files are left alone; a folder that cannot be removed is reported and
    /// skipped.
    pub async fn sweep(&self, today: NaiveDate) -> Result<SweepReport> {
        let cutoff = self.cutoff(today);
        let mut report = SweepReport {
            cutoff: Some(cutoff),
            ..SweepReport::default()
        };

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Output root {:?} does not exist yet, nothing to sweep", self.root);
                return Ok(report);
            }
            Err(e) => return Err(RecorderError::filesystem(&self.root, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RecorderError::filesystem(&self.root, e))?
        {
            let path = entry.path();
            let date = match entry.file_name().to_str().and_then(parse_date_folder) {
                Some(date) => date,
                None => continue,
            };
            if date >= cutoff {
                continue;
            }
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => {}
                _ => continue,
            }

            let remove = self.remove;
            let target = path.clone();
            let removed = tokio::task::spawn_blocking(move || remove(&target))
                .await
                .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)));

            match removed {
                Ok(()) => {
                    info!("Removed old folder: {:?}", path);
                    report.removed.push(path);
                }
                Err(e) => {
                    error!("Failed to remove old folder {:?}: {}", path, e);
                    report.failed.push((path, e.to_string()));
                }
            }
        }

        report.removed.sort();
        report.failed.sort();
        Ok(report)
    }
}

impl std::fmt::Debug for RetentionSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionSweeper")
            .field("root", &self.root)
            .field("retention_days", &self.retention_days)
            .finish()
    }
}
